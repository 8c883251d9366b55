//! Notification rule engine.
//!
//! This crate provides:
//! - Delivery channels (Telegram, incoming webhook, SMTP email)
//! - The cooldown-deduplicated [`Notifier`]
//! - Threshold rule resolution and evaluators
//! - Digest message builders

pub mod channel;
pub mod digest;
pub mod email;
pub mod evaluators;
pub mod notifier;
pub mod rules;
pub mod telegram;
pub mod webhook;

pub use channel::{build_channels, Channel, ChannelError, ChannelKind, OutboundMessage};
pub use evaluators::{
    evaluate_high_profit, evaluate_low_cex_volume, evaluate_low_gas, evaluate_low_profit,
    EvaluationOrigin,
};
pub use notifier::{
    ChannelResult, DeliveryStatus, NotificationPayload, Notifier, NotifierError, NotifyOutcome,
    SkipReason,
};
