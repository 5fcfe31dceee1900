//! # Relay Library
//!
//! A dumb UDP forwarder for tower defense sessions. Every peer sends its
//! datagrams to the relay, which hands each one unchanged to every other
//! registered peer. The relay holds no game state and never decodes a payload
//! beyond peeking at its header for logs; all gameplay authority lives with
//! the clients.
//!
//! ## Module Organization
//!
//! ### Peer Manager Module (`peer_manager`)
//! - Registration on first datagram, bounded by a peer limit
//! - Liveness tracking and timeout cleanup
//! - Forward target selection (everyone but the sender)
//!
//! ### Network Module (`network`)
//! - UDP socket receive and send tasks
//! - Main select loop and periodic timeout checks
//! - `RELAY_HELLO` keepalives are consumed, never forwarded
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use relay::network::Relay;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut relay = Relay::new("0.0.0.0:7777", 4, Duration::from_secs(5)).await?;
//!     relay.run().await
//! }
//! ```

pub mod network;
pub mod peer_manager;
