//! Ports: the seams between the core and its collaborators.
//!
//! Each trait hides one external system: the subscription store (sqlite in
//! production), the management server (a remote query API), and the chat
//! transport (message delivery). Implementations are passed in explicitly;
//! there are no ambient globals.

pub mod notifier;
pub mod subscription_store;
pub mod task_source;

pub use self::notifier::Notifier;
pub use self::subscription_store::SubscriptionStore;
pub use self::task_source::TaskSource;
