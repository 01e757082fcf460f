//! Normalized inbound commands.
//!
//! The chat front end reduces raw user input to this set; the core never
//! sees transport-specific update objects. Each command is already scoped
//! to one subscriber identity (the invoking chat) by the caller.

use super::TaskKey;

/// One user request, parsed and validated for shape (not for content: an
/// unknown task id is still a `Subscribe`, and rejection happens in the
/// handler where the remote source can be consulted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    ListTasks,
    ListAlarms,
    Subscribe(TaskKey),
    SubscribeAll,
    Unsubscribe(TaskKey),
    UnsubscribeAll,
    ListSubscriptions,

    /// Fallback for anything unrecognized, including commands with missing
    /// or surplus arguments. Every input gets a reply, so this is a variant
    /// rather than a parse error.
    Unknown,
}

impl Command {
    /// Parse one line of user input in the slash form used by the console
    /// front end.
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Command::Unknown;
        };
        let arg = parts.next();
        if parts.next().is_some() {
            return Command::Unknown;
        }

        match (head, arg) {
            ("/start", None) => Command::Start,
            ("/help", None) => Command::Help,
            ("/tasks", None) => Command::ListTasks,
            ("/alarms", None) => Command::ListAlarms,
            ("/sub", Some(id)) => Command::Subscribe(TaskKey::new(id)),
            ("/suball", None) => Command::SubscribeAll,
            ("/unsub", Some(id)) => Command::Unsubscribe(TaskKey::new(id)),
            ("/unsuball", None) => Command::UnsubscribeAll,
            ("/subs", None) => Command::ListSubscriptions,
            _ => Command::Unknown,
        }
    }
}
