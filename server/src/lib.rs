//! # Risk Session Server Library
//!
//! Authoritative server for multiplayer Risk. It owns every session's
//! canonical game state, validates each client intent against the rules,
//! and tells the affected players what changed.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rules
//! Clients only ever send intents ("deploy 3 armies on alaska"). The
//! server decides whether the intent is legal, applies it, and publishes
//! the resulting state. A rejected intent is answered to its sender only
//! and never mutates anything.
//!
//! ### Session Lifecycle
//! Players create lobbies addressed by short shareable codes, join, ready
//! up and start. A player who drops mid-game keeps their seat and resumes
//! under the same identifier.
//!
//! ### Durability
//! Every accepted change is queued for the persistence worker, which
//! writes one JSON record per session. Unfinished sessions are restored
//! when the process starts.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! One loop processes one inbound message at a time. Together with the
//! rules engine's turn check this gives at most one accepted mutation per
//! turn window, without locks around game state.
//!
//! ### Explicit Publish Lists
//! The [`dispatch::Dispatcher`] returns who must be told what; the
//! [`network::Server`] resolves recipients to addresses and sends. Game
//! logic never touches a socket.
//!
//! ## Module Organization
//!
//! - `rules`, `turn`, `dice`: the game rules engine and phase machine
//! - `session`, `code`: session store and shareable codes
//! - `dispatch`: intent routing and notification fan-out
//! - `conflict`: reconciliation of client-held state copies
//! - `persistence`: JSON repository and background worker
//! - `client_manager`, `network`: UDP transport and connection tracking
//! - `config`, `error`, `utils`: ambient pieces
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{Args, ServerConfig};
//! use server::dispatch::Dispatcher;
//! use server::network::Server;
//! use server::session::SessionStore;
//! use clap::Parser;
//! use shared::MapTopology;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from(Args::parse());
//!     let store = SessionStore::new(Arc::new(MapTopology::classic()), config.rules.clone());
//!     let (persist_tx, _persist_rx) = mpsc::unbounded_channel();
//!
//!     let mut server = Server::new(&config, Dispatcher::new(store), persist_tx).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod code;
pub mod config;
pub mod conflict;
pub mod dice;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod persistence;
pub mod rules;
pub mod session;
pub mod turn;
pub mod utils;

pub use dispatch::{Dispatcher, Outcome};
pub use error::{GameError, GameResult};
pub use rules::{ActionOutcome, GameAction, RulesEngine};
pub use session::{Delivery, Session, SessionStore};
