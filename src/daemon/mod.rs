use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    idle_api::{GenericIdleMonitor, IdleMonitor},
    store::{
        entities::SessionKind,
        file_store::FileStore,
        gateway::{SessionStore, UserStore},
    },
    utils::clock::{Clock, DefaultClock},
};

use args::TrackerTuning;
use idle::IdleEvaluator;
use lifecycle::{SessionEvent, SessionLifecycle};
use poller::IdlePollModule;
use scoring::ScoreParams;

pub mod args;
pub mod idle;
pub mod lifecycle;
pub mod poller;
pub mod power;
pub mod scoring;

const EVENT_QUEUE_CAPACITY: usize = 16;

/// Runtime knobs of the tracker, normally derived from [TrackerTuning].
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub idle_threshold_s: u32,
    pub poll_interval: Duration,
    pub score: ScoreParams,
}

impl From<TrackerTuning> for TrackerConfig {
    fn from(tuning: TrackerTuning) -> Self {
        Self {
            idle_threshold_s: tuning.idle_threshold_s,
            poll_interval: Duration::from_secs(tuning.poll_interval_s),
            score: ScoreParams {
                increment: tuning.multiplier_increment,
                max: tuning.multiplier_max,
            },
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerTuning::default().into()
    }
}

/// Represents the starting point for the daemon.
pub async fn start_daemon(dir: PathBuf, username: &str, config: TrackerConfig) -> Result<()> {
    let store = Arc::new(FileStore::open(dir.join("store"))?);
    let user = store.create_or_get(username).await?;
    info!("Tracking presence for {} (user {})", user.username, user.id);

    let (sender, receiver) = mpsc::channel::<SessionEvent>(EVENT_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();

    let monitor = GenericIdleMonitor::new()?;
    let poller = create_poller(
        sender.clone(),
        Box::new(monitor),
        &shutdown,
        &config,
        DefaultClock,
    );
    let lifecycle = create_lifecycle(store.clone(), store, &config, DefaultClock);

    // The very first session opens immediately, mirroring app startup.
    sender
        .send(SessionEvent::Begin {
            user_id: user.id,
            kind: SessionKind::AppSession,
        })
        .await?;

    let (power_result, poll_result, lifecycle_result) = tokio::join!(
        power::watch_power_signals(sender, shutdown.clone()),
        poller.run(),
        lifecycle.run(receiver),
    );

    if let Err(e) = power_result {
        error!("Power signal watcher got an error {e:?}");
    }
    if let Err(e) = poll_result {
        error!("Idle poller got an error {e:?}");
    }
    if let Err(e) = lifecycle_result {
        error!("Session lifecycle got an error {e:?}");
    }

    Ok(())
}

fn create_poller(
    events: mpsc::Sender<SessionEvent>,
    monitor: Box<dyn IdleMonitor>,
    shutdown: &CancellationToken,
    config: &TrackerConfig,
    clock: impl Clock,
) -> IdlePollModule {
    IdlePollModule::new(
        events,
        monitor,
        shutdown.clone(),
        config.poll_interval,
        Box::new(clock),
    )
}

fn create_lifecycle<S: SessionStore, U: UserStore>(
    sessions: S,
    users: U,
    config: &TrackerConfig,
    clock: impl Clock,
) -> SessionLifecycle<S, U> {
    SessionLifecycle::new(
        sessions,
        users,
        IdleEvaluator::from_seconds(config.idle_threshold_s),
        config.score,
        Box::new(clock),
    )
}

#[cfg(test)]
mod daemon_tests {
    use std::time::Duration;

    use anyhow::Result;
    use tokio::sync::{mpsc, oneshot};
    use tokio_util::sync::CancellationToken;

    use crate::{
        idle_api::MockIdleMonitor,
        store::{
            entities::{SessionEntity, SessionKind},
            gateway::{MockSessionStore, MockUserStore},
        },
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
    };

    use super::*;

    /// Wires the poller and the lifecycle together the way [start_daemon]
    /// does and drives them through a begin, a few heartbeats and a quit.
    #[tokio::test]
    async fn smoke_test_poller_and_lifecycle() -> Result<()> {
        *TEST_LOGGING;
        let mut monitor = MockIdleMonitor::new();
        monitor.expect_idle_seconds().returning(|| Ok(0));

        let mut sessions = MockSessionStore::new();
        sessions
            .expect_create()
            .times(1)
            .returning(|user_id, kind, start| {
                Ok(SessionEntity {
                    id: 1,
                    user_id,
                    kind,
                    start_time: start,
                    end_time: None,
                    duration_minutes: None,
                    multiplier: None,
                    score: None,
                })
            });
        sessions
            .expect_update()
            .withf(|_, patch| patch.end_time.is_some())
            .times(1)
            .returning(|_, _| Ok(()));
        sessions
            .expect_update()
            .withf(|_, patch| patch.end_time.is_none())
            .returning(|_, _| Ok(()));
        let mut users = MockUserStore::new();
        users.expect_set_online().returning(|_, _| Ok(()));

        let config = TrackerConfig {
            idle_threshold_s: 60,
            poll_interval: Duration::from_millis(20),
            ..TrackerConfig::default()
        };

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let poller = create_poller(
            sender.clone(),
            Box::new(monitor),
            &shutdown,
            &config,
            DefaultClock,
        );
        let lifecycle = create_lifecycle(sessions, users, &config, DefaultClock);

        sender
            .send(SessionEvent::Begin {
                user_id: 7,
                kind: SessionKind::AppSession,
            })
            .await?;

        let (_, poll_result, lifecycle_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(120)).await;
                let (done, ack) = oneshot::channel();
                sender
                    .send(SessionEvent::Quit { done })
                    .await
                    .expect("lifecycle should still be running");
                ack.await.expect("quit should be confirmed");
                shutdown.cancel();
            },
            poller.run(),
            lifecycle.run(receiver),
        );

        poll_result?;
        lifecycle_result?;
        Ok(())
    }
}
