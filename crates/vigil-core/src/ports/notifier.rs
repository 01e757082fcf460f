//! Notifier port: delivers one rendered message to one subscriber.

use async_trait::async_trait;

use crate::domain::{SubscriberId, VigilError};

/// Push delivery to a chat identity.
///
/// Failures are transient (network) and must be observable to the caller:
/// the reconciler keeps the subscription and retries next tick, so a
/// swallowed error here would silently break at-least-once delivery.
/// Failures are logged, not retried, within a tick.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: SubscriberId, text: &str) -> Result<(), VigilError>;
}
