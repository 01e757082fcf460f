//! Simulated task source for local runs.
//!
//! Stands in for the management server client: a small world of tasks that
//! spawn on a schedule, run for a fixed duration, and finish (mostly)
//! successfully. `/tasks`, subscriptions, and the reconciler behave exactly
//! as they would against the real thing, including history rotation: a
//! finished task is forgotten after a while, which is what drives the
//! engine's stale-subscription handling.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use vigil_core::domain::{
    AlarmSeverity, AlarmSnapshot, TaskKey, TaskSnapshot, TaskState, VigilError,
};
use vigil_core::ports::TaskSource;

use crate::config::SimulatorConfig;

const DESCRIPTIONS: &[&str] = &[
    "Reconfigure virtual machine",
    "Clone virtual machine",
    "Migrate virtual machine",
    "Create virtual machine snapshot",
];

const USERS: &[&str] = &["ops", "backup-svc", "provisioner"];

struct SimTask {
    snapshot: TaskSnapshot,
    born: Instant,
    done_at: Option<Instant>,

    /// Decided at spawn so the outcome is stable however often the world
    /// is observed.
    will_fail: bool,
}

struct SimState {
    tasks: Vec<SimTask>,
    alarms: Vec<AlarmSnapshot>,
    last_spawn: Instant,
    spawned: u32,
    polls: u64,
}

/// Scripted `TaskSource`.
pub struct SimSource {
    cfg: SimulatorConfig,
    state: Mutex<SimState>,
}

impl SimSource {
    pub fn new(cfg: SimulatorConfig) -> Self {
        let now = Instant::now();
        let mut state = SimState {
            tasks: Vec::new(),
            alarms: vec![
                AlarmSnapshot {
                    description: "Datastore usage on disk".to_string(),
                    entity: "datastore-3".to_string(),
                    severity: AlarmSeverity::Yellow,
                    raised_at: Utc::now(),
                },
                AlarmSnapshot {
                    description: "Host connection lost".to_string(),
                    entity: "host-2".to_string(),
                    severity: AlarmSeverity::Red,
                    raised_at: Utc::now(),
                },
            ],
            last_spawn: now,
            spawned: 0,
            polls: 0,
        };
        // Seed a couple of tasks so the first /tasks is not empty.
        spawn_task(&mut state, &cfg);
        spawn_task(&mut state, &cfg);
        Self {
            cfg,
            state: Mutex::new(state),
        }
    }

    /// Advance the world to "now", then run `f` against it. Every trait
    /// method funnels through here so time moves whether or not anyone
    /// subscribes.
    fn observe<T>(&self, f: impl FnOnce(&SimState) -> T) -> Result<T, VigilError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| VigilError::RemoteUnavailable("simulator state poisoned".into()))?;

        state.polls += 1;
        if self.cfg.outage_every > 0 && state.polls % u64::from(self.cfg.outage_every) == 0 {
            return Err(VigilError::RemoteUnavailable("simulated outage".into()));
        }

        advance(&mut state, &self.cfg);
        Ok(f(&state))
    }
}

fn spawn_task(state: &mut SimState, cfg: &SimulatorConfig) {
    let n = state.spawned;
    state.spawned += 1;
    state.last_spawn = Instant::now();

    let key = TaskKey::new(format!("sim-{}", 100 + n));
    debug!(task = %key, "simulator spawned task");
    state.tasks.push(SimTask {
        snapshot: TaskSnapshot {
            key,
            description: DESCRIPTIONS[n as usize % DESCRIPTIONS.len()].to_string(),
            entity: format!("vm-{}", 10 + n),
            user: USERS[n as usize % USERS.len()].to_string(),
            state: TaskState::Running,
            progress: Some(0),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        },
        born: Instant::now(),
        done_at: None,
        will_fail: cfg.error_every > 0 && (n + 1) % cfg.error_every == 0,
    });
}

/// Move every task along: spawn when due, update progress, finish tasks
/// past their duration, forget terminal tasks past retention.
fn advance(state: &mut SimState, cfg: &SimulatorConfig) {
    if state.last_spawn.elapsed() >= Duration::from_secs(cfg.spawn_interval_secs) {
        spawn_task(state, cfg);
    }

    let duration = Duration::from_secs(cfg.task_duration_secs);
    let retention = Duration::from_secs(cfg.retention_secs);

    for task in &mut state.tasks {
        if task.snapshot.state.is_terminal() {
            continue;
        }
        let elapsed = task.born.elapsed();
        if elapsed < duration {
            let percent =
                (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0).min(99.0) as u8;
            task.snapshot.state = TaskState::Running;
            task.snapshot.progress = Some(percent);
            continue;
        }

        task.snapshot.state = if task.will_fail {
            TaskState::Error
        } else {
            TaskState::Success
        };
        task.snapshot.progress = Some(100);
        task.snapshot.completed_at = Some(Utc::now());
        task.snapshot.error = task
            .will_fail
            .then(|| "A general system error occurred".to_string());
        task.done_at = Some(Instant::now());
        debug!(task = %task.snapshot.key, state = ?task.snapshot.state, "simulator finished task");
    }

    // History rotation.
    state
        .tasks
        .retain(|t| t.done_at.is_none_or(|done| done.elapsed() < retention));
}

#[async_trait]
impl TaskSource for SimSource {
    async fn list_running_tasks(&self) -> Result<Vec<TaskSnapshot>, VigilError> {
        self.observe(|state| {
            state
                .tasks
                .iter()
                .filter(|t| !t.snapshot.state.is_terminal())
                .map(|t| t.snapshot.clone())
                .collect()
        })
    }

    async fn get_task(&self, task: &TaskKey) -> Result<Option<TaskSnapshot>, VigilError> {
        self.observe(|state| {
            state
                .tasks
                .iter()
                .find(|t| &t.snapshot.key == task)
                .map(|t| t.snapshot.clone())
        })
    }

    async fn list_active_alarms(&self) -> Result<Vec<AlarmSnapshot>, VigilError> {
        self.observe(|state| state.alarms.clone())
    }
}
