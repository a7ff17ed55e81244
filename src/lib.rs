//! # dlight_rs
//!
//! An async Rust client for dLight smart lamps on the local network.
//!
//! A dLight answers JSON requests over TCP, one connection per request. This
//! crate wraps that protocol in a **runtime-agnostic** API: a [`TcpTransport`]
//! that performs one exchange, and a [`Coordinator`] that keeps a cached
//! snapshot of the lamp's state fresh by polling and by refreshing after
//! every command.
//!
//! ## Quick Start
//!
//! ```ignore
//! use dlight_rs::{Coordinator, DeviceConfig, LightEntity};
//!
//! async fn control_light() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeviceConfig::new("192.168.1.40", "a1b2c3d4");
//!     let light = LightEntity::new(Coordinator::connect(&config).await?);
//!
//!     // Half brightness, 4000K.
//!     light.turn_on(Some(127), Some(250)).await?;
//!     println!("on: {:?}, brightness: {:?}", light.is_on(), light.brightness());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Deduplicated refreshes**: concurrent callers share one state query
//! - **Power, brightness and color temperature** via [`Command`]
//! - **Host scales**: [`LightEntity`] presents brightness as 0-255 and
//!   temperature in mireds
//! - **Diagnostics**: per-lamp [`MessageHistory`] and [`Coordinator::diagnostics`]
//!
//! ## Communication
//!
//! Requests are sent as plain JSON to TCP port 3333. Replies carry a 4-byte
//! header that is skipped before parsing. Every exchange is bounded by a
//! timeout (5 seconds by default) and replies are capped at 8 KiB.
//!
//! ## Runtime Selection
//!
//! Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! dlight-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! dlight-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! dlight-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```

mod command;
mod config;
mod coordinator;
mod errors;
mod history;
mod light;
mod request;
pub mod runtime;
mod state;
mod transport;
mod types;

#[cfg(test)]
mod testing;

// Re-export public API
pub use command::{ColorCommand, Command};
pub use config::{DeviceConfig, DeviceInfo, Framing, TransportOptions};
pub use coordinator::{Coordinator, ListenerId, Phase, probe};
pub use errors::{Error, ProtocolError};
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use light::{LightEntity, LightMetadata};
pub use request::{CommandType, DeviceAddress, Request};
pub use state::{ColorState, DeviceState};
pub use transport::{TcpTransport, Transport, decode_reply};
pub use types::{Brightness, Kelvin, PowerMode};
