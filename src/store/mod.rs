//! Persistence for sessions and users, behind the [gateway::SessionStore] and
//! [gateway::UserStore] traits so the lifecycle manager never talks to files
//! directly.
//!
//! The bundled implementation keeps an append-only `sessions.jsonl` (one json
//! document per line; the open session is always the last line and is
//! rewritten in place on heartbeat/close) and a small `users.json` table.

pub mod entities;
pub mod error;
pub mod file_io;
pub mod file_store;
pub mod gateway;
