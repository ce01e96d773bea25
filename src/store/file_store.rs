use std::{
    io::{BufRead, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::warn;

use super::{
    entities::{SessionEntity, SessionKind, SessionPatch, UserEntity},
    error::{StoreError, StoreResult},
    file_io::seek_to_last_line,
    gateway::{SessionStore, UserStore},
};

/// File-backed session and user store.
///
/// Sessions live in `sessions.jsonl`, one document per line. Because the
/// daemon keeps at most one session open at a time, the open session is
/// always the last line; heartbeats and closes rewrite that line in place
/// instead of appending duplicates. Users live in a small `users.json`
/// array rewritten whole on every change.
pub struct FileStore {
    sessions_path: PathBuf,
    users_path: PathBuf,
    next_session_id: AtomicU64,
    next_user_id: AtomicU64,
}

impl FileStore {
    pub fn open(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;
        let sessions_path = dir.join("sessions.jsonl");
        let users_path = dir.join("users.json");

        let next_session_id = next_session_id(&sessions_path)?;
        let next_user_id = next_user_id(&users_path)?;

        Ok(Self {
            sessions_path,
            users_path,
            next_session_id: AtomicU64::new(next_session_id),
            next_user_id: AtomicU64::new(next_user_id),
        })
    }

    async fn open_rw(path: &Path) -> Result<File, std::io::Error> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
    }

    async fn append_session(file: &mut File, session: &SessionEntity) -> StoreResult<()> {
        file.seek(SeekFrom::End(0)).await?;
        let mut line = serde_json::to_vec(session)?;
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Rewrites the last line with the patched session. Refuses when the last
    /// line is not the requested session, a stale id is how duplicate closes
    /// and crashed writers show up.
    async fn rewrite_last_session(
        file: &mut File,
        session_id: u64,
        patch: SessionPatch,
    ) -> StoreResult<()> {
        let line_start = seek_to_last_line(file).await?;
        let mut last_line = String::new();
        file.read_to_string(&mut last_line).await?;
        if last_line.trim().is_empty() {
            return Err(StoreError::UnknownSession(session_id));
        }

        let mut session: SessionEntity = serde_json::from_str(last_line.trim_end())?;
        if session.id != session_id {
            return Err(StoreError::UnknownSession(session_id));
        }
        patch.apply_to(&mut session);

        let mut line = serde_json::to_vec(&session)?;
        line.push(b'\n');
        file.seek(SeekFrom::Start(line_start)).await?;
        file.write_all(&line).await?;
        file.set_len(line_start + line.len() as u64).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_users(file: &mut File) -> StoreResult<Vec<UserEntity>> {
        let mut content = String::new();
        file.read_to_string(&mut content).await?;
        if content.trim().is_empty() {
            return Ok(vec![]);
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_users(file: &mut File, users: &[UserEntity]) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(users)?;
        file.seek(SeekFrom::Start(0)).await?;
        file.write_all(&bytes).await?;
        file.set_len(bytes.len() as u64).await?;
        file.flush().await?;
        Ok(())
    }
}

fn next_session_id(path: &Path) -> Result<u64, std::io::Error> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(e),
    };

    let mut max_id = 0;
    for line in std::io::BufReader::new(file).lines() {
        match serde_json::from_str::<SessionEntity>(&line?) {
            Ok(session) => max_id = max_id.max(session.id),
            // A write cut off by shutdown can leave a broken trailing line.
            Err(e) => warn!("Skipping malformed session line while scanning ids: {e}"),
        }
    }
    Ok(max_id + 1)
}

fn next_user_id(path: &Path) -> Result<u64, std::io::Error> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(e),
    };
    if content.trim().is_empty() {
        return Ok(1);
    }

    let max_id = match serde_json::from_str::<Vec<UserEntity>>(&content) {
        Ok(users) => users.iter().map(|u| u.id).max().unwrap_or(0),
        Err(e) => {
            warn!("User table is malformed, starting ids over: {e}");
            0
        }
    };
    Ok(max_id + 1)
}

#[async_trait]
impl SessionStore for FileStore {
    async fn create(
        &self,
        user_id: u64,
        kind: SessionKind,
        start_time: DateTime<Utc>,
    ) -> StoreResult<SessionEntity> {
        let session = SessionEntity {
            id: self.next_session_id.fetch_add(1, Ordering::Relaxed),
            user_id,
            kind,
            start_time,
            end_time: None,
            duration_minutes: None,
            multiplier: None,
            score: None,
        };

        let mut file = Self::open_rw(&self.sessions_path).await?;
        file.lock_exclusive()?;
        let result = Self::append_session(&mut file, &session).await;
        file.unlock_async().await?;
        result?;
        Ok(session)
    }

    async fn update(&self, session_id: u64, patch: SessionPatch) -> StoreResult<()> {
        let mut file = Self::open_rw(&self.sessions_path).await?;
        file.lock_exclusive()?;
        let result = Self::rewrite_last_session(&mut file, session_id, patch).await;
        file.unlock_async().await?;
        result
    }

    async fn sessions_since(
        &self,
        user_id: u64,
        from: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionEntity>> {
        let file = match File::open(&self.sessions_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;

        let mut lines = BufReader::new(file).lines();
        let mut sessions = vec![];
        let read_result = loop {
            match lines.next_line().await {
                Ok(Some(line)) => match serde_json::from_str::<SessionEntity>(&line) {
                    Ok(session) if session.user_id == user_id && session.start_time >= from => {
                        sessions.push(session)
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Skipping malformed session line: {e}")
                    }
                },
                Ok(None) => break Ok(()),
                // Partial data must not pass as a complete read.
                Err(e) => break Err(e),
            }
        };

        lines.into_inner().into_inner().unlock_async().await?;
        read_result?;
        Ok(sessions)
    }
}

#[async_trait]
impl UserStore for FileStore {
    async fn create_or_get(&self, username: &str) -> StoreResult<UserEntity> {
        let mut file = Self::open_rw(&self.users_path).await?;
        file.lock_exclusive()?;

        let result = async {
            let mut users = Self::load_users(&mut file).await?;
            if let Some(user) = users.iter().find(|u| &*u.username == username) {
                return Ok(user.clone());
            }

            let user = UserEntity {
                id: self.next_user_id.fetch_add(1, Ordering::Relaxed),
                username: username.into(),
                is_online: false,
            };
            users.push(user.clone());
            Self::save_users(&mut file, &users).await?;
            Ok(user)
        }
        .await;

        file.unlock_async().await?;
        result
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserEntity>> {
        let mut file = match Self::open_rw(&self.users_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let result = Self::load_users(&mut file).await;
        file.unlock_async().await?;

        Ok(result?.into_iter().find(|u| &*u.username == username))
    }

    async fn set_online(&self, user_id: u64, online: bool) -> StoreResult<()> {
        let mut file = Self::open_rw(&self.users_path).await?;
        file.lock_exclusive()?;

        let result = async {
            let mut users = Self::load_users(&mut file).await?;
            let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
                return Err(StoreError::UnknownUser(user_id));
            };
            user.is_online = online;
            Self::save_users(&mut file, &users).await
        }
        .await;

        file.unlock_async().await?;
        result
    }

    async fn online_users(&self) -> StoreResult<Vec<UserEntity>> {
        let mut file = match Self::open_rw(&self.users_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let result = Self::load_users(&mut file).await;
        file.unlock_async().await?;

        Ok(result?.into_iter().filter(|u| u.is_online).collect())
    }
}
