//! Plain-text rendering of tasks, alarms, and completion notices.
//!
//! Pure functions of the snapshot: the reconciler's retry path depends on a
//! resend producing byte-identical content.

use chrono::{DateTime, Utc};

use crate::domain::{AlarmSnapshot, TaskKey, TaskSnapshot, TaskState};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

fn fmt_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn state_label(state: TaskState) -> &'static str {
    match state {
        TaskState::Queued => "queued",
        TaskState::Running => "running",
        TaskState::Success => "success",
        TaskState::Error => "error",
    }
}

/// One task block, as shown by `/tasks` and `/subs`.
pub fn task_block(task: &TaskSnapshot) -> String {
    let progress = task
        .progress
        .map(|p| format!("{p}%"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "ID: {}\nDescription: {}\nEntity: {}\nUser: {}\nState: {}\nProgress: {}\nStarted: {}",
        task.key,
        task.description,
        task.entity,
        task.user,
        state_label(task.state),
        progress,
        fmt_time(task.started_at),
    )
}

/// One alarm block with its severity marker. Ordering (newest first) is the
/// caller's job.
pub fn alarm_block(alarm: &AlarmSnapshot) -> String {
    format!(
        "Description: {}\nEntity: {}\nSeverity: {}\nRaised: {}",
        alarm.description,
        alarm.entity,
        alarm.severity.marker(),
        fmt_time(alarm.raised_at),
    )
}

/// Completion notice for a terminal task. Success and error share the
/// header layout; the error variant carries the server's error detail.
pub fn completion_notice(task: &TaskSnapshot) -> String {
    let completed = task
        .completed_at
        .map(fmt_time)
        .unwrap_or_else(|| "-".to_string());
    match task.state {
        TaskState::Error => format!(
            "Task finished with an error\nID: {}\nDescription: {}\nEntity: {}\nUser: {}\nError: {}\nStarted: {}\nCompleted: {}",
            task.key,
            task.description,
            task.entity,
            task.user,
            task.error.as_deref().unwrap_or("unknown"),
            fmt_time(task.started_at),
            completed,
        ),
        _ => format!(
            "Task completed successfully\nID: {}\nDescription: {}\nEntity: {}\nUser: {}\nStarted: {}\nCompleted: {}",
            task.key,
            task.description,
            task.entity,
            task.user,
            fmt_time(task.started_at),
            completed,
        ),
    }
}

/// Notice sent when a subscribed task fell out of the server's history
/// before a terminal state was observed.
pub fn unknown_outcome_notice(task: &TaskKey) -> String {
    format!(
        "Task {task} is no longer reported by the management server; its outcome could not be determined."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(state: TaskState) -> TaskSnapshot {
        TaskSnapshot {
            key: TaskKey::new("task-9"),
            description: "Reconfigure virtual machine".to_string(),
            entity: "vm-17".to_string(),
            user: "ops".to_string(),
            state,
            progress: Some(40),
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            completed_at: None,
            error: None,
        }
    }

    #[test]
    fn task_block_shows_progress_and_start_time() {
        let block = task_block(&snapshot(TaskState::Running));
        assert!(block.contains("ID: task-9"));
        assert!(block.contains("State: running"));
        assert!(block.contains("Progress: 40%"));
        assert!(block.contains("Started: 2024-03-01 09:30"));
    }

    #[test]
    fn task_block_dashes_missing_progress() {
        let mut task = snapshot(TaskState::Queued);
        task.progress = None;
        assert!(task_block(&task).contains("Progress: -"));
    }

    #[test]
    fn success_notice_has_completion_time() {
        let mut task = snapshot(TaskState::Success);
        task.completed_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        let notice = completion_notice(&task);
        assert!(notice.starts_with("Task completed successfully"));
        assert!(notice.contains("Completed: 2024-03-01 10:00"));
        assert!(!notice.contains("Error:"));
    }

    #[test]
    fn error_notice_carries_error_detail() {
        let mut task = snapshot(TaskState::Error);
        task.completed_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        task.error = Some("A general system error occurred".to_string());
        let notice = completion_notice(&task);
        assert!(notice.starts_with("Task finished with an error"));
        assert!(notice.contains("Error: A general system error occurred"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut task = snapshot(TaskState::Success);
        task.completed_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(completion_notice(&task), completion_notice(&task));
    }

    #[test]
    fn alarm_block_uses_severity_marker() {
        let alarm = AlarmSnapshot {
            description: "Datastore usage on disk".to_string(),
            entity: "datastore-3".to_string(),
            severity: crate::domain::AlarmSeverity::Yellow,
            raised_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        };
        let block = alarm_block(&alarm);
        assert!(block.contains("Severity: [yellow]"));
        assert!(block.contains("Raised: 2024-03-01 08:00"));
    }
}
