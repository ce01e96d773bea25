use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{idle_api::IdleMonitor, utils::clock::Clock};

use super::lifecycle::SessionEvent;

/// Periodically samples the idle monitor and feeds ticks to the lifecycle
/// queue. The poller only reports; deciding whether a tick opens, refreshes
/// or closes a session is the lifecycle's business.
pub struct IdlePollModule {
    events: mpsc::Sender<SessionEvent>,
    monitor: Box<dyn IdleMonitor>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl IdlePollModule {
    pub fn new(
        events: mpsc::Sender<SessionEvent>,
        monitor: Box<dyn IdleMonitor>,
        shutdown: CancellationToken,
        poll_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            events,
            monitor,
            shutdown,
            poll_interval,
            time_provider,
        }
    }

    /// Executes the polling event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut sample_point = self.time_provider.instant();
        loop {
            sample_point += self.poll_interval;

            match self.monitor.idle_seconds() {
                Ok(idle_seconds) => {
                    debug!("Sampled {idle_seconds}s of idle time");
                    match self.events.try_send(SessionEvent::Tick { idle_seconds }) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            // The lifecycle is still persisting a previous
                            // event. Dropping the tick is safer than racing
                            // it; the next sample carries fresher data
                            // anyway.
                            warn!("Lifecycle queue is busy, dropping this tick")
                        }
                        Err(TrySendError::Closed(_)) => return Ok(()),
                    }
                }
                Err(e) => {
                    error!("Encountered an error while sampling idle time {e:?}")
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(sample_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        idle_api::MockIdleMonitor,
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
    };

    use super::*;

    #[tokio::test]
    async fn ticks_carry_the_sampled_idle_time() -> Result<()> {
        *TEST_LOGGING;
        let mut monitor = MockIdleMonitor::new();
        let mut samples = [0u32, 30, 400].into_iter().cycle();
        monitor
            .expect_idle_seconds()
            .returning(move || Ok(samples.next().unwrap()));

        let shutdown = CancellationToken::new();
        let (sender, mut receiver) = mpsc::channel(8);
        let poller = IdlePollModule::new(
            sender,
            Box::new(monitor),
            shutdown.clone(),
            Duration::from_millis(20),
            Box::new(DefaultClock),
        );
        let handle = tokio::spawn(poller.run());

        let mut seen = vec![];
        for _ in 0..3 {
            if let Some(SessionEvent::Tick { idle_seconds }) = receiver.recv().await {
                seen.push(idle_seconds);
            }
        }
        shutdown.cancel();
        handle.await??;

        assert_eq!(seen, vec![0, 30, 400]);
        Ok(())
    }

    #[tokio::test]
    async fn sampling_errors_do_not_kill_the_loop() -> Result<()> {
        *TEST_LOGGING;
        let mut monitor = MockIdleMonitor::new();
        let mut calls = 0;
        monitor.expect_idle_seconds().returning(move || {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("backend hiccup"))
            } else {
                Ok(12)
            }
        });

        let shutdown = CancellationToken::new();
        let (sender, mut receiver) = mpsc::channel(8);
        let poller = IdlePollModule::new(
            sender,
            Box::new(monitor),
            shutdown.clone(),
            Duration::from_millis(10),
            Box::new(DefaultClock),
        );
        let handle = tokio::spawn(poller.run());

        let received = receiver.recv().await;
        shutdown.cancel();
        handle.await??;

        assert!(matches!(
            received,
            Some(SessionEvent::Tick { idle_seconds: 12 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn closed_queue_stops_the_poller() -> Result<()> {
        *TEST_LOGGING;
        let mut monitor = MockIdleMonitor::new();
        monitor.expect_idle_seconds().returning(|| Ok(0));

        let (sender, receiver) = mpsc::channel(8);
        drop(receiver);
        let poller = IdlePollModule::new(
            sender,
            Box::new(monitor),
            CancellationToken::new(),
            Duration::from_millis(10),
            Box::new(DefaultClock),
        );

        poller.run().await?;
        Ok(())
    }
}
