/// Decides whether a sampled idle time counts as "the user left".
pub struct IdleEvaluator {
    threshold_s: u32,
}

impl IdleEvaluator {
    pub fn from_seconds(threshold_s: u32) -> Self {
        Self { threshold_s }
    }

    pub fn is_idle(&self, idle_seconds: u32) -> bool {
        idle_seconds >= self.threshold_s
    }
}
