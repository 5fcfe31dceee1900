//! # Game Client Library
//!
//! This library is the complete game node for a cooperative tower defense
//! session. Every player runs one; there is no server. Each client is the
//! authority for its own line of enemies and its own towers, and learns about
//! everyone else's through broadcast messages forwarded by the relay.
//!
//! ## Architecture Overview
//!
//! ### Split Authority
//! Damage, stuns, deaths and kill gold for an enemy are computed only on the
//! client that owns the enemy's line. Towers only fight on their owner's
//! client. Everything else a client sees of another player's line is a
//! replica that copies the owner's results, so no outcome is ever computed
//! twice.
//!
//! ### One Tick, One Thread
//! All simulation state lives in a [`session::Session`] and is advanced by a
//! single tick call. Network receive, network send, keepalive and console
//! input run in their own tasks and reach the session only through a channel
//! drained by the tick loop.
//!
//! ### Fire and Forget Replication
//! Messages are plain UDP datagrams without acknowledgement. Receivers are
//! idempotent where it matters: duplicate spawns and bases are dropped, hit
//! points are last-write-wins, lab levels only ratchet up, and messages for
//! unknown entities are ignored.
//!
//! ## Module Organization
//!
//! ### Simulation (`session`, `combat`, `replication`)
//! - `Session` owns every component and runs the per-tick pipeline
//! - Tower attacks, projectile hits, splash, stuns and silences
//! - Applying each of the twelve remote message kinds
//!
//! ### Entities (`enemy`, `tower`, `projectile`, `spawner`, `base`, `registry`)
//! - Enemy kinds with regen, invincibility cycles and the boss skill
//! - Five tower weapons with burst, beam and rocket attack patterns
//! - Keyed registries with deterministic iteration order
//!
//! ### Rules (`wave`, `economy`, `grid`, `route`, `config`)
//! - Wave rotation, rest and time limits, and per-line death count
//! - Gold, escalating build costs and lab levels
//! - Single-owner build/move cursor arbitration
//! - Balance tables loaded from JSON with built-in fallbacks
//!
//! ### Edges (`network`, `input`, `events`)
//! - UDP peer and tick loop
//! - Console commands mapped to player actions
//! - Presentation events for whatever front end drains them
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::SessionConfig;
//! use client::network::Peer;
//! use client::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::default();
//!     config.validate()?;
//!     let session = Session::new(config);
//!     let mut peer = Peer::new("0.0.0.0:0", "127.0.0.1:7777", session, 30).await?;
//!     peer.run().await
//! }
//! ```

pub mod base;
pub mod combat;
pub mod config;
pub mod economy;
pub mod enemy;
pub mod error;
pub mod events;
pub mod grid;
pub mod input;
pub mod network;
pub mod projectile;
pub mod registry;
pub mod replication;
pub mod route;
pub mod session;
pub mod spawner;
pub mod timer;
pub mod tower;
pub mod wave;
