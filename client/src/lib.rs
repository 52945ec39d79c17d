//! # Risk Command Client Library
//!
//! A line-oriented client for the Risk session server. The player types
//! commands, the client turns them into intents and sends them, and every
//! notification the server publishes is printed.
//!
//! ## Architecture Overview
//!
//! The client holds no authority. It never predicts or applies game rules
//! locally; the server validates every intent and publishes the outcome.
//! The client only caches the last published state so it can show the
//! board and offer that copy back on `sync`.
//!
//! ## Module Organization
//!
//! - `input`: parses typed lines into intents; bad input is reported
//!   locally and never sent
//! - `game`: the cached session snapshot and game state
//! - `rendering`: plain-text output for notifications and the board
//! - `network`: UDP socket, heartbeats and the main select loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", "alice").await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
