use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    store::{
        entities::{SessionEntity, SessionKind, SessionPatch},
        error::StoreError,
        gateway::{SessionStore, UserStore},
    },
    utils::{clock::Clock, time::whole_minutes_between},
};

use super::{idle::IdleEvaluator, scoring::ScoreParams};

/// How long a quit is allowed to wait for the final close write before the
/// process gives up and exits anyway.
pub const QUIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything that can move the session state machine. The poller and the
/// power-signal watcher feed these into one queue; OS ordering between them
/// is not guaranteed, the no-op guards below are what keep racing
/// lock/tick/unlock deliveries harmless.
#[derive(Debug)]
pub enum SessionEvent {
    /// Open a session for an explicitly known user.
    Begin { user_id: u64, kind: SessionKind },
    /// Periodic idle sample.
    Tick { idle_seconds: u32 },
    Lock,
    Unlock,
    /// Close whatever is open, then confirm so the process may exit.
    Quit { done: oneshot::Sender<()> },
}

/// Owns the one open session of this process and serializes every mutation
/// against the store. All events arrive through [run]'s queue, so a second
/// transition can never start while a persistence call is still in flight.
pub struct SessionLifecycle<S, U> {
    sessions: S,
    users: U,
    idle: IdleEvaluator,
    score_params: ScoreParams,
    clock: Box<dyn Clock>,
    current: Option<SessionEntity>,
    last_user: Option<u64>,
    locked: bool,
}

impl<S: SessionStore, U: UserStore> SessionLifecycle<S, U> {
    pub fn new(
        sessions: S,
        users: U,
        idle: IdleEvaluator,
        score_params: ScoreParams,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            users,
            idle,
            score_params,
            clock,
            current: None,
            last_user: None,
            locked: false,
        }
    }

    /// Executes the lifecycle event loop until a quit event arrives or every
    /// sender is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> Result<()> {
        while let Some(event) = events.recv().await {
            debug!("Handling {event:?}");
            match event {
                SessionEvent::Quit { done } => {
                    self.flush_for_quit().await;
                    let _ = done.send(());
                    return Ok(());
                }
                event => self.handle_event(event).await,
            }
        }

        // All event sources dropped without a quit handshake. Close anything
        // still open so no session is left dangling.
        self.close_current().await;
        Ok(())
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Begin { user_id, kind } => {
                if let Err(e) = self.start_session(user_id, kind).await {
                    error!("Failed to start {kind} for user {user_id}: {e}");
                }
            }
            SessionEvent::Tick { idle_seconds } => self.handle_tick(idle_seconds).await,
            SessionEvent::Lock => {
                self.locked = true;
                if self.current.is_some() {
                    info!("Screen locked, ending current session");
                    self.close_current().await;
                } else {
                    debug!("Screen locked with no open session");
                }
            }
            SessionEvent::Unlock => {
                self.locked = false;
                if self.current.is_some() {
                    // Duplicate OS event, the open session keeps running.
                    debug!("Screen unlocked while a session is already open");
                } else {
                    self.restart_for_known_user(SessionKind::ScreenSession).await;
                }
            }
            SessionEvent::Quit { .. } => unreachable!("quit is handled by the run loop"),
        }
    }

    async fn handle_tick(&mut self, idle_seconds: u32) {
        if self.locked {
            // Idle only accrues from the last input, so a sub-threshold
            // sample behind a locked screen is not activity. The only write
            // allowed here is retrying a close that failed on lock.
            if self.current.is_some() {
                self.close_current().await;
            } else {
                debug!("Ignoring idle sample while the screen is locked");
            }
            return;
        }

        let is_idle = self.idle.is_idle(idle_seconds);
        match (self.current.is_some(), is_idle) {
            (true, true) => {
                info!("User went idle ({idle_seconds}s), ending current session");
                self.close_current().await;
            }
            (true, false) => self.refresh_current().await,
            (false, false) => self.restart_for_known_user(SessionKind::AppSession).await,
            (false, true) => {}
        }
    }

    /// Opens a session after idle/unlock for whichever user we last tracked.
    /// Without a remembered user there is nothing sensible to do but wait
    /// for an explicit begin.
    async fn restart_for_known_user(&mut self, kind: SessionKind) {
        let Some(user_id) = self.last_user else {
            warn!("Activity resumed but no user is known, staying closed");
            return;
        };
        if let Err(e) = self.start_session(user_id, kind).await {
            error!("Failed to restart {kind} for user {user_id}: {e}");
        }
    }

    async fn start_session(&mut self, user_id: u64, kind: SessionKind) -> Result<(), StoreError> {
        if self.current.is_some() {
            debug!("A session is already open, ignoring start request");
            return Ok(());
        }

        // A failed create must leave the state closed, so persist before
        // adopting anything locally.
        let session = self
            .sessions
            .create(user_id, kind, self.clock.time())
            .await?;
        info!("Started {kind} {} for user {user_id}", session.id);

        self.last_user = Some(user_id);
        self.current = Some(session);
        if let Err(e) = self.users.set_online(user_id, true).await {
            warn!("Failed to mark user {user_id} online: {e}");
        }
        Ok(())
    }

    /// Ends the current session. A benign no-op when nothing is open, which
    /// is exactly what duplicate close deliveries (lock racing an idle tick)
    /// should hit.
    async fn close_current(&mut self) {
        let Some(session) = self.current.as_ref() else {
            debug!("No open session to close");
            return;
        };

        let now = self.clock.time();
        let minutes = whole_minutes_between(session.start_time, now);
        let multiplier = self.score_params.multiplier(minutes);
        let score = self.score_params.score(minutes, multiplier);
        let patch = SessionPatch::close(now, minutes, multiplier, score);

        match self.sessions.update(session.id, patch).await {
            Ok(()) => {
                info!(
                    "Closed session {} after {minutes}m with score {score:.2}",
                    session.id
                );
                let user_id = session.user_id;
                self.current = None;
                if let Err(e) = self.users.set_online(user_id, false).await {
                    warn!("Failed to mark user {user_id} offline: {e}");
                }
            }
            Err(e) => {
                // Keep the session as current so the next tick retries the
                // close instead of losing it.
                error!("Failed to close session {}: {e}", session.id);
            }
        }
    }

    /// Heartbeat write refreshing the running totals of the open session.
    async fn refresh_current(&mut self) {
        let Some(session) = self.current.as_ref() else {
            return;
        };

        let minutes = whole_minutes_between(session.start_time, self.clock.time());
        let multiplier = self.score_params.multiplier(minutes);
        let score = self.score_params.score(minutes, multiplier);
        let patch = SessionPatch::heartbeat(minutes, multiplier, score);

        if let Err(e) = self.sessions.update(session.id, patch).await {
            warn!("Failed to refresh session {}: {e}", session.id);
        }
    }

    async fn flush_for_quit(&mut self) {
        if self.current.is_none() {
            return;
        }
        if tokio::time::timeout(QUIT_FLUSH_TIMEOUT, self.close_current())
            .await
            .is_err()
        {
            error!("Timed out closing the session on quit, exiting anyway");
        }
    }
}
