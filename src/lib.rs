//! Rust client for Russound controllers speaking the RIO protocol
//!
//! This library provides an async API for controlling Russound
//! multi-zone audio controllers over a single TCP connection. It supports:
//!
//! - Reading and writing zone and source variables
//! - Watching zones and sources for pushed state changes
//! - A local state cache that serves reads for watched entities
//! - Per-entity and wildcard change observers, plus a broadcast stream
//! - Zone and source events (key presses and the like)
//! - Enumeration of the zones and sources a controller has
//!
//! # Quick Start
//!
//! ```no_run
//! use russound_rio::{ClientConfig, RussoundClient, ZoneId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RussoundClient::open(ClientConfig::new("192.168.1.50")).await?;
//!
//!     // Find the zones the controller has
//!     for zone in client.enumerate_zones().await? {
//!         println!("{}: {}", zone.id, zone.name);
//!     }
//!
//!     // Watched zones are served from the cache
//!     let kitchen = ZoneId::new(1);
//!     client.watch_zone(kitchen).await?;
//!     client.send_zone_event(kitchen, "KeyPress", ["Volume", "30"]).await?;
//!     println!("Volume: {:?}", client.get_zone_variable(kitchen, "volume").await?);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Observing changes
//!
//! ```no_run
//! use russound_rio::{ClientConfig, RussoundClient, ZoneId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RussoundClient::open(ClientConfig::new("192.168.1.50")).await?;
//!     client.add_zone_observer(None, |zone, variable, value| {
//!         println!("{} {} = {}", zone, variable, value);
//!     });
//!     client.watch_zone(ZoneId::new(1)).await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Client**: connection lifecycle and the get/set/watch/event API
//! - **Zone / Source**: handles bound to one entity
//! - **Discovery**: bounded probing for zones and sources
//! - **Connection**: the I/O task that serializes commands and matches
//!   responses by arrival order
//! - **Cache**: watched state and observer fan-out
//! - **Protocol**: line decoding and command encoding

mod cache;
mod client;
mod config;
mod connection;
mod discovery;
mod error;
mod protocol;
mod subscription;
mod types;
mod zone;

// Public exports
pub use cache::{ObserverId, SourceCallback, ZoneCallback};
pub use client::RussoundClient;
pub use config::{ClientConfig, DEFAULT_PORT};
pub use discovery::{DiscoveredSource, DiscoveredZone};
pub use error::{Result, RioError};
pub use protocol::{decode_line, Command, Response, VariableUpdate};
pub use subscription::{StateReceiver, StateUpdate};
pub use types::{ConnectionState, EntityId, SourceId, ZoneId, DEFAULT_CONTROLLER};
pub use zone::{Source, Zone};
