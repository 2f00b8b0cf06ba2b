//! Background services.

pub mod webhook_sender;

pub use webhook_sender::{WebhookSender, WebhookSenderConfig};
