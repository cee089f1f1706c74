mod config;
mod message;
mod primitives;

pub use config::{ConfigError, SimConfig};
pub use message::{Grant, Message};
pub use primitives::*;
