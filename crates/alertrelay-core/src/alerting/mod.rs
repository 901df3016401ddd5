//! Alert notification for AlertRelay
//!
//! Classifies alert groups, renders messages and delivers them to the
//! configured notification channels.

pub mod channels;
pub mod classifier;
pub mod dispatch;
pub mod secrets;
pub mod template;

mod dispatcher;

#[cfg(test)]
mod testing;

pub use channels::{ChannelNotifier, Notifier, NotifierBase, NotifierDeps};
pub use classifier::Classification;
pub use dispatch::{DispatchGateway, DispatchRequest, HttpWebhookSender, WebhookSender};
pub use dispatcher::{Dispatcher, NotificationResult, Outcome, Rejection};
pub use secrets::{Decrypter, PlainSettings, Secret, SecureSettings};
pub use template::{RenderSession, TemplateData, TemplateRenderer};
