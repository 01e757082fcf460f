//! Domain model (ids, snapshots, subscriptions, commands, errors).

pub mod alarm;
pub mod command;
pub mod error;
pub mod ids;
pub mod subscription;
pub mod task;

pub use alarm::{AlarmSeverity, AlarmSnapshot};
pub use command::Command;
pub use error::VigilError;
pub use ids::{SubscriberId, TaskKey};
pub use subscription::Subscription;
pub use task::{TaskSnapshot, TaskState};
