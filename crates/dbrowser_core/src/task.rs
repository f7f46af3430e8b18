use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ListTables,
    BuildPageMap,
    LoadPage,
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::ListTables => "List Tables",
            TaskKind::BuildPageMap => "Build Page Index",
            TaskKind::LoadPage => "Load Page",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Completed,
    Failed(String),
    /// Finished after a newer request of the same kind; its result was discarded.
    Superseded,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

struct Task {
    kind: TaskKind,
    description: String,
    status: TaskStatus,
    started_at: Instant,
    completed_at: Option<Instant>,
}

impl Task {
    fn elapsed(&self) -> Duration {
        match self.completed_at {
            Some(completed) => completed.duration_since(self.started_at),
            None => self.started_at.elapsed(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    pub status: TaskStatus,
    pub elapsed: Duration,
}

/// Bookkeeping for requests dispatched to a session's worker.
#[derive(Default)]
pub struct TaskManager {
    tasks: HashMap<TaskId, Task>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn start(&mut self, kind: TaskKind, description: impl Into<String>) -> TaskId {
        let id = TaskId::new_v4();

        self.tasks.insert(
            id,
            Task {
                kind,
                description: description.into(),
                status: TaskStatus::Running,
                started_at: Instant::now(),
                completed_at: None,
            },
        );

        id
    }

    pub fn complete(&mut self, id: TaskId) {
        self.finish(id, TaskStatus::Completed);
    }

    pub fn fail(&mut self, id: TaskId, error: impl Into<String>) {
        self.finish(id, TaskStatus::Failed(error.into()));
    }

    pub fn supersede(&mut self, id: TaskId) {
        self.finish(id, TaskStatus::Superseded);
    }

    fn finish(&mut self, id: TaskId, status: TaskStatus) {
        if let Some(task) = self.tasks.get_mut(&id)
            && task.status == TaskStatus::Running
        {
            task.status = status;
            task.completed_at = Some(Instant::now());
        }
    }

    pub fn get(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.tasks.get(&id).map(|task| snapshot(id, task))
    }

    pub fn recent_tasks(&self, limit: usize) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<_> = self.tasks.iter().collect();
        tasks.sort_by(|a, b| b.1.started_at.cmp(&a.1.started_at));
        tasks
            .into_iter()
            .take(limit)
            .map(|(id, task)| snapshot(*id, task))
            .collect()
    }

    pub fn has_running_tasks(&self) -> bool {
        self.tasks.values().any(|t| t.status == TaskStatus::Running)
    }

    pub fn cleanup_completed(&mut self, max_age: Duration) {
        let now = Instant::now();
        self.tasks.retain(|_, task| {
            if task.status.is_terminal()
                && let Some(completed) = task.completed_at
            {
                return now.duration_since(completed) < max_age;
            }
            true
        });
    }

    pub fn current_status_message(&self) -> Option<String> {
        let running: Vec<_> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .collect();

        match running.len() {
            0 => None,
            1 => Some(running[0].description.clone()),
            n => Some(format!("{} requests running...", n)),
        }
    }
}

fn snapshot(id: TaskId, task: &Task) -> TaskSnapshot {
    TaskSnapshot {
        id,
        kind: task.kind,
        description: task.description.clone(),
        status: task.status.clone(),
        elapsed: task.elapsed(),
    }
}
