//! IRC client engine: wire tokenizer, network state store, event
//! classifier, registration state machine, and a plugin dispatch layer,
//! driven over TCP/TLS by an async connection task.
//!
//! The protocol core ([`Session`]) is synchronous and side-effect free at
//! the socket boundary: it consumes raw byte chunks and queues outbound
//! lines, which makes every protocol behavior testable without a network.
//! [`client::connect`] wires it to a real connection.

mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod plugin;
pub mod registration;
pub mod session;
pub mod state;
pub mod wire;

pub use client::{Command, SessionHandle, connect};
pub use config::SessionConfig;
pub use error::ConfigError;
pub use event::{Event, MessageKind};
pub use plugin::{Plugin, PluginRegistry};
pub use registration::Phase;
pub use session::Session;
pub use state::{Channel, ChannelId, Entity, Store, User, UserId};
pub use wire::Message;
