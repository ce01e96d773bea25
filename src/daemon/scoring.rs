/// Tunables for the session score. The multiplier starts at 1.0, rises by
/// `increment` for every full hour of session length and is capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreParams {
    pub increment: f64,
    pub max: f64,
}

pub const DEFAULT_MULTIPLIER_INCREMENT: f64 = 0.1;
pub const DEFAULT_MULTIPLIER_MAX: f64 = 3.0;

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            increment: DEFAULT_MULTIPLIER_INCREMENT,
            max: DEFAULT_MULTIPLIER_MAX,
        }
    }
}

impl ScoreParams {
    /// Multiplier for a session of the given whole-minute length. Callers
    /// clamp negative durations to zero before calling.
    pub fn multiplier(&self, duration_minutes: i64) -> f64 {
        let multiplier = 1.0 + (duration_minutes / 60) as f64 * self.increment;
        multiplier.min(self.max)
    }

    pub fn score(&self, duration_minutes: i64, multiplier: f64) -> f64 {
        duration_minutes as f64 * multiplier
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::time::round2;

    use super::*;

    #[test]
    fn multiplier_steps_up_every_full_hour() {
        let params = ScoreParams::default();
        assert_eq!(params.multiplier(0), 1.0);
        assert_eq!(params.multiplier(59), 1.0);
        assert_eq!(round2(params.multiplier(60)), 1.1);
        assert_eq!(round2(params.multiplier(119)), 1.1);
        assert_eq!(round2(params.multiplier(120)), 1.2);
    }

    #[test]
    fn multiplier_is_bounded_and_monotonic() {
        let params = ScoreParams::default();
        let mut previous = 0.0;
        for minutes in 0..=1500 {
            let multiplier = params.multiplier(minutes);
            assert!(multiplier >= 1.0 && multiplier <= params.max);
            assert!(multiplier >= previous);
            previous = multiplier;
        }
    }

    #[test]
    fn score_is_monotonic_in_duration() {
        let params = ScoreParams::default();
        let mut previous = 0.0;
        for minutes in 0..=1500 {
            let score = params.score(minutes, params.multiplier(minutes));
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn sixty_five_minute_session() {
        let params = ScoreParams::default();
        let multiplier = params.multiplier(65);
        assert_eq!(round2(multiplier), 1.1);
        assert_eq!(round2(params.score(65, multiplier)), 71.5);
    }

    #[test]
    fn twenty_hour_session_hits_the_cap() {
        let params = ScoreParams::default();
        let multiplier = params.multiplier(1200);
        assert_eq!(multiplier, 3.0);
        assert_eq!(params.score(1200, multiplier), 3600.0);
    }

    #[test]
    fn custom_params_are_honored() {
        let params = ScoreParams {
            increment: 0.5,
            max: 2.0,
        };
        assert_eq!(params.multiplier(60), 1.5);
        assert_eq!(params.multiplier(120), 2.0);
        assert_eq!(params.multiplier(600), 2.0);
    }
}
