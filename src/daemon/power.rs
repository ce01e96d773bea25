use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::lifecycle::SessionEvent;

/// Upper bound on how long process exit waits for the lifecycle to confirm
/// the final close. Longer than the lifecycle's own flush timeout so the
/// normal path always wins; if even this expires we force the shutdown
/// rather than hang.
const QUIT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Watches OS power/termination signals and translates them into lifecycle
/// events. Ctrl-C/SIGTERM requests a quit; on Unix, SIGUSR1 and SIGUSR2 stand
/// in for the lock and unlock notifications a desktop session agent would
/// deliver.
///
/// Cancels `shutdown` once the quit handshake finishes so the other modules
/// stop too.
pub async fn watch_power_signals(
    events: mpsc::Sender<SessionEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut lock_signal = signal(SignalKind::user_defined1())?;
        let mut unlock_signal = signal(SignalKind::user_defined2())?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = terminate.recv() => break,
                _ = lock_signal.recv() => {
                    info!("Received lock signal");
                    if events.send(SessionEvent::Lock).await.is_err() {
                        return Ok(());
                    }
                }
                _ = unlock_signal.recv() => {
                    info!("Received unlock signal");
                    if events.send(SessionEvent::Unlock).await.is_err() {
                        return Ok(());
                    }
                }
                _ = shutdown.cancelled() => return Ok(()),
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => (),
            _ = shutdown.cancelled() => return Ok(()),
        }
    }

    info!("Quit requested, flushing the current session");
    request_quit(&events, QUIT_ACK_TIMEOUT).await;
    shutdown.cancel();
    Ok(())
}

/// Asks the lifecycle to close whatever is open and waits for confirmation,
/// bounded by `ack_timeout`.
async fn request_quit(events: &mpsc::Sender<SessionEvent>, ack_timeout: Duration) {
    let (done, ack) = oneshot::channel();
    if events.send(SessionEvent::Quit { done }).await.is_err() {
        // Lifecycle already gone, nothing left to flush.
        return;
    }
    if tokio::time::timeout(ack_timeout, ack).await.is_err() {
        error!("Lifecycle did not confirm quit in time, forcing shutdown");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::utils::logging::TEST_LOGGING;

    use super::*;

    #[tokio::test]
    async fn quit_request_waits_for_the_ack() {
        *TEST_LOGGING;
        let (sender, mut receiver) = mpsc::channel(1);

        let responder = tokio::spawn(async move {
            match receiver.recv().await {
                Some(SessionEvent::Quit { done }) => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    done.send(()).unwrap();
                    true
                }
                _ => false,
            }
        });

        request_quit(&sender, Duration::from_secs(1)).await;
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn quit_request_gives_up_after_the_timeout() {
        *TEST_LOGGING;
        let (sender, mut receiver) = mpsc::channel(1);

        let holder = tokio::spawn(async move {
            // Take the event but never ack, like a hung store write would.
            let event = receiver.recv().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(event);
        });

        tokio::time::timeout(
            Duration::from_secs(1),
            request_quit(&sender, Duration::from_millis(30)),
        )
        .await
        .expect("request_quit must respect its timeout");
        holder.abort();
    }

    #[tokio::test]
    async fn quit_request_tolerates_a_missing_lifecycle() {
        *TEST_LOGGING;
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);

        request_quit(&sender, Duration::from_millis(10)).await;
    }
}
