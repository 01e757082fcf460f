//! vigil-core
//!
//! Core building blocks for the vigil notification engine: watch long-running
//! management server tasks on behalf of chat subscribers and tell each of
//! them, once per subscription, how their task ended.
//!
//! # Module map
//! - **domain**: ids, task/alarm snapshots, subscriptions, commands, errors
//! - **ports**: seams to the outside world (SubscriptionStore, TaskSource, Notifier)
//! - **store**: SubscriptionStore implementations (sqlite for production, in-memory for tests)
//! - **reconciler**: the periodic poll-and-notify loop
//! - **handlers**: the command surface, composed over the ports
//! - **access**: allow-list gate in front of the handlers
//! - **render**: plain-text message rendering

pub mod access;
pub mod domain;
pub mod handlers;
pub mod ports;
pub mod reconciler;
pub mod render;
pub mod store;
