//! Data models for AlertRelay

mod alert;
mod channel;

pub use alert::*;
pub use channel::*;
