//! Access control: an allow-list gate composed in front of the handlers.
//!
//! This is explicit composition rather than ambient middleware: the front
//! end calls `guarded`, and `guarded` decides whether `handle_command` runs
//! at all.

use std::collections::HashSet;

use crate::domain::{Command, SubscriberId};
use crate::handlers::{self, Context};

/// Fixed refusal for identities not on the list.
pub const REFUSAL: &str = "Sorry, you are not authorized for this kind of request.";

/// Subscriber identities allowed to talk to the engine.
///
/// An empty list means open access: the gate then never refuses, which is
/// what demo and test runs want.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: HashSet<SubscriberId>,
}

impl AllowList {
    pub fn new(allowed: impl IntoIterator<Item = SubscriberId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Open access.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn permits(&self, subscriber: SubscriberId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&subscriber)
    }
}

/// Run `command` for `subscriber` if the allow-list permits, else refuse
/// with a fixed line. The handler is never invoked for refused callers.
pub async fn guarded(
    allow: &AllowList,
    ctx: &Context,
    subscriber: SubscriberId,
    command: Command,
) -> String {
    if !allow.permits(subscriber) {
        return REFUSAL.to_string();
    }
    handlers::handle_command(ctx, subscriber, command).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::TaskKey;
    use crate::ports::SubscriptionStore;
    use crate::store::InMemoryStore;

    fn context_with_store() -> (Context, Arc<InMemoryStore>) {
        // A panicking source would also do: refused commands and the
        // store-only commands used here must never reach it.
        struct NoSource;

        #[async_trait::async_trait]
        impl crate::ports::TaskSource for NoSource {
            async fn list_running_tasks(
                &self,
            ) -> Result<Vec<crate::domain::TaskSnapshot>, crate::domain::VigilError> {
                panic!("remote source must not be consulted");
            }

            async fn get_task(
                &self,
                _task: &TaskKey,
            ) -> Result<Option<crate::domain::TaskSnapshot>, crate::domain::VigilError> {
                panic!("remote source must not be consulted");
            }

            async fn list_active_alarms(
                &self,
            ) -> Result<Vec<crate::domain::AlarmSnapshot>, crate::domain::VigilError> {
                panic!("remote source must not be consulted");
            }
        }

        let store = Arc::new(InMemoryStore::new());
        let ctx = Context {
            store: Arc::clone(&store) as Arc<dyn SubscriptionStore>,
            source: Arc::new(NoSource),
        };
        (ctx, store)
    }

    #[tokio::test]
    async fn empty_list_permits_everyone() {
        let allow = AllowList::open();
        assert!(allow.permits(SubscriberId::new(1)));
        assert!(allow.permits(SubscriberId::new(-7)));
    }

    #[tokio::test]
    async fn unlisted_subscriber_is_refused_before_the_handler_runs() {
        let allow = AllowList::new([SubscriberId::new(1)]);
        let (ctx, store) = context_with_store();
        let outsider = SubscriberId::new(99);

        // Unsubscribe would hit the store if the gate let it through; the
        // panicking source guards the rest.
        let reply = guarded(&allow, &ctx, outsider, Command::UnsubscribeAll).await;

        assert_eq!(reply, REFUSAL);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listed_subscriber_passes_through() {
        let allow = AllowList::new([SubscriberId::new(1)]);
        let (ctx, _store) = context_with_store();

        let reply = guarded(&allow, &ctx, SubscriberId::new(1), Command::Help).await;

        assert!(reply.contains("/tasks"));
    }
}
