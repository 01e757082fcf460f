//! Command handlers: the request/response surface over the ports.
//!
//! Handlers are pass-through compositions of the store and the task source
//! with no state of their own. Every command produces a terminal reply:
//! confirmation, "not found", "not subscribed", or a generic failure line.
//! Errors never escape to the front end.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{Command, SubscriberId, TaskKey, VigilError};
use crate::ports::{SubscriptionStore, TaskSource};
use crate::render;

/// Dependencies a handler needs, passed explicitly.
///
/// One instance is built at startup and cloned per command; cloning is two
/// `Arc` bumps.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn SubscriptionStore>,
    pub source: Arc<dyn TaskSource>,
}

/// Reply when a store or source operation failed out from under a command.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again later.";

pub const HELP_TEXT: &str = "Commands:\n\
    /tasks - list running tasks\n\
    /alarms - list active alarms\n\
    /sub <task-id> - subscribe to one task's completion\n\
    /suball - subscribe to every running task\n\
    /unsub <task-id> - drop one subscription\n\
    /unsuball - drop all subscriptions\n\
    /subs - list your subscriptions";

/// Handle one normalized command on behalf of one subscriber.
pub async fn handle_command(ctx: &Context, subscriber: SubscriberId, command: Command) -> String {
    let result = match command {
        Command::Start => Ok("Welcome. Send /help for the command list.".to_string()),
        Command::Help => Ok(HELP_TEXT.to_string()),
        Command::ListTasks => list_tasks(ctx).await,
        Command::ListAlarms => list_alarms(ctx).await,
        Command::Subscribe(task) => subscribe(ctx, subscriber, task).await,
        Command::SubscribeAll => subscribe_all(ctx, subscriber).await,
        Command::Unsubscribe(task) => unsubscribe(ctx, subscriber, task).await,
        Command::UnsubscribeAll => unsubscribe_all(ctx, subscriber).await,
        Command::ListSubscriptions => list_subscriptions(ctx, subscriber).await,
        Command::Unknown => Ok("Sorry, I do not support that kind of request.".to_string()),
    };

    match result {
        Ok(reply) => reply,
        Err(err) => {
            warn!(subscriber = %subscriber, %err, "command failed");
            GENERIC_FAILURE.to_string()
        }
    }
}

async fn list_tasks(ctx: &Context) -> Result<String, VigilError> {
    let tasks = ctx.source.list_running_tasks().await?;
    if tasks.is_empty() {
        return Ok("No running tasks.".to_string());
    }
    Ok(tasks
        .iter()
        .map(render::task_block)
        .collect::<Vec<_>>()
        .join("\n\n"))
}

async fn list_alarms(ctx: &Context) -> Result<String, VigilError> {
    let mut alarms = ctx.source.list_active_alarms().await?;
    if alarms.is_empty() {
        return Ok("No active alarms.".to_string());
    }
    // newest first
    alarms.sort_by(|a, b| b.raised_at.cmp(&a.raised_at));
    Ok(alarms
        .iter()
        .map(render::alarm_block)
        .collect::<Vec<_>>()
        .join("\n\n"))
}

async fn subscribe(
    ctx: &Context,
    subscriber: SubscriberId,
    task: TaskKey,
) -> Result<String, VigilError> {
    // A subscription is only accepted for a task the server currently
    // reports as live; anything else would sit in the store unresolvable.
    let live = ctx
        .source
        .get_task(&task)
        .await?
        .is_some_and(|t| !t.state.is_terminal());
    if !live {
        return Ok(format!("No running task with id {task}."));
    }
    ctx.store.add(subscriber, &task).await?;
    Ok(format!("Subscribed to completion of task {task}."))
}

async fn subscribe_all(ctx: &Context, subscriber: SubscriberId) -> Result<String, VigilError> {
    let tasks = ctx.source.list_running_tasks().await?;
    if tasks.is_empty() {
        return Ok("No running tasks to subscribe to.".to_string());
    }

    let mut added = Vec::new();
    for task in &tasks {
        if ctx.store.exists(subscriber, &task.key).await? {
            continue;
        }
        ctx.store.add(subscriber, &task.key).await?;
        added.push(task.key.as_str().to_owned());
    }

    if added.is_empty() {
        return Ok("Already subscribed to every running task.".to_string());
    }
    Ok(format!("Subscribed to completion of: {}.", added.join(", ")))
}

async fn unsubscribe(
    ctx: &Context,
    subscriber: SubscriberId,
    task: TaskKey,
) -> Result<String, VigilError> {
    if !ctx.store.exists(subscriber, &task).await? {
        return Ok(format!("Not subscribed to task {task}."));
    }
    ctx.store.remove(subscriber, &task).await?;
    Ok(format!("Subscription to task {task} cancelled."))
}

async fn unsubscribe_all(ctx: &Context, subscriber: SubscriberId) -> Result<String, VigilError> {
    if ctx.store.list_for(subscriber).await?.is_empty() {
        return Ok("No subscriptions to cancel.".to_string());
    }
    ctx.store.remove_all(subscriber).await?;
    Ok("All task subscriptions cancelled.".to_string())
}

async fn list_subscriptions(
    ctx: &Context,
    subscriber: SubscriberId,
) -> Result<String, VigilError> {
    let keys = ctx.store.list_for(subscriber).await?;
    if keys.is_empty() {
        return Ok("No active subscriptions.".to_string());
    }

    let mut blocks = Vec::with_capacity(keys.len());
    for key in keys {
        match ctx.source.get_task(&key).await? {
            Some(task) => blocks.push(render::task_block(&task)),
            // Surfaced as a gap; the record stays, same policy as the loop.
            None => blocks.push(format!("ID: {key}\nNo longer reported by the server.")),
        }
    }
    Ok(blocks.join("\n\n"))
}
