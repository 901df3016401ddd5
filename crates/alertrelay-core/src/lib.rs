//! # AlertRelay
//!
//! Alert notification dispatch for chat, paging and webhook channels.
//!
//! AlertRelay takes a group of evaluated alerts, works out whether the group
//! is firing or resolved, renders a message from templates and delivers it to
//! every configured notification channel.
//!
//! ## Architecture
//!
//! - **Classifier**: aggregate status and firing/resolved partitions
//! - **Templates**: handlebars renderer with built-in title and message
//! - **Channels**: one validated notifier per channel type
//! - **Dispatch**: cancellable HTTP delivery through a pluggable sender
//!
//! ## Quick Start
//!
//! ```bash
//! # Check every configured channel
//! alertrelay --config alertrelay.toml validate
//!
//! # Send an alert group to all channels
//! alertrelay --config alertrelay.toml send --alerts group.json
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{
        ChannelNotifier, Decrypter, DispatchGateway, Dispatcher, HttpWebhookSender, Notifier,
        NotifierDeps, NotificationResult, Outcome, TemplateRenderer,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
