//! Levante GATT - Sessions, queries and commands over a fan's GATT link
//!
//! This crate sits between the pure codec and whatever radio stack the
//! host provides. It owns the connection lifetime, the typed reads and the
//! authenticated write sequences, plus an in-memory fan for tests and
//! bench runs.

pub mod command;
pub mod emulator;
pub mod error;
pub mod query;
pub mod session;
pub mod transport;

pub use command::{authenticate, set_boost, set_fan_speed_targets};
pub use emulator::{EmulatedFan, EmulatorConfig, EmulatorStats, Faults, Operation};
pub use error::{AuthError, GattError};
pub use session::{Session, SessionFactory, DEFAULT_SESSION_TIMEOUT};
pub use transport::{Link, Transport, TransportError};
