//! Task manager: the priority queue and state machine that tracks every
//! submitted experiment from creation through a terminal status.

mod queue;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use labgrid_types::{ExperimentConfig, ExperimentResult, Task, TaskId, TaskStatus};
use tracing::error;

use queue::{PriorityQueue, QueueEntry};

/// Invoked from [`TaskManager::complete_task`]; exceptions (panics) are
/// caught and logged rather than allowed to take down the worker.
pub type CompletionCallback = Box<dyn Fn(&Task) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStats {
    pub created: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

/// A point-in-time snapshot returned by [`TaskManager::get_stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStatsSnapshot {
    pub created: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub queue_size: usize,
    pub running_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
}

struct Inner {
    tasks: HashMap<TaskId, Task>,
    callbacks: HashMap<TaskId, CompletionCallback>,
    queue: PriorityQueue,
    /// Task ids currently sitting in `queue`, so a pending-but-unqueued
    /// task (blocked on a dependency) is never pushed twice.
    queued: HashSet<TaskId>,
    next_counter: u64,
    stats: TaskStats,
}

/// Thread-safe task queue plus state machine, guarded by a single lock.
///
/// Mutating methods never call another mutating method on `self` while
/// holding the lock, so the lock never needs to be re-entrant.
pub struct TaskManager {
    inner: Mutex<Inner>,
    max_queue_size: usize,
}

impl TaskManager {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                callbacks: HashMap::new(),
                queue: PriorityQueue::new(),
                queued: HashSet::new(),
                next_counter: 0,
                stats: TaskStats::default(),
            }),
            max_queue_size,
        }
    }

    fn next_task_id(inner: &mut Inner) -> TaskId {
        let counter = inner.next_counter;
        inner.next_counter += 1;
        format!("task_{}_{}", Utc::now().timestamp_millis(), counter)
    }

    /// Creates a task in `pending` status. The task is not yet enqueued --
    /// call [`TaskManager::submit_task`] to make it eligible for dequeue.
    pub fn create_task(
        &self,
        config: ExperimentConfig,
        callback: Option<CompletionCallback>,
    ) -> TaskId {
        let mut inner = self.inner.lock().unwrap();
        let task_id = Self::next_task_id(&mut inner);
        let task = Task::new(task_id.clone(), config, Utc::now());
        inner.stats.created += 1;
        if let Some(cb) = callback {
            inner.callbacks.insert(task_id.clone(), cb);
        }
        inner.tasks.insert(task_id.clone(), task);
        task_id
    }

    /// Enqueues a previously created task. Returns `false` (without
    /// mutating anything) if it is already queued, a dependency has not
    /// completed yet, or the queue is full -- [`TaskManager::resubmit_ready_tasks`]
    /// is what actually retries a deferred submission later.
    pub fn submit_task(&self, task_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.get(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Pending {
            return false;
        }
        if inner.queued.contains(task_id) {
            return false;
        }
        let deps = task.dependencies.clone();
        if !Self::dependencies_satisfied(&inner, &deps) {
            return false;
        }
        if inner.queue.len() >= self.max_queue_size {
            return false;
        }
        let entry = QueueEntry {
            priority: task.priority,
            created_ms: task.created_at.timestamp_millis(),
            counter: Self::counter_for(&mut inner),
            task_id: task_id.to_string(),
        };
        inner.queue.push(entry);
        inner.queued.insert(task_id.to_string());
        true
    }

    /// Sweeps `pending` tasks that are not currently queued (newly created,
    /// or deferred earlier because a dependency had not finished yet) and
    /// enqueues any whose dependencies are now satisfied. Called from the
    /// worker loop so a dependent task becomes runnable within one tick of
    /// its dependency completing, instead of being abandoned after the
    /// initial submission attempt.
    pub fn resubmit_ready_tasks(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let candidates: Vec<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.task_id.clone())
            .filter(|id| !inner.queued.contains(id))
            .collect();

        let mut submitted = 0;
        for task_id in candidates {
            if inner.queue.len() >= self.max_queue_size {
                break;
            }
            let Some(task) = inner.tasks.get(&task_id) else { continue };
            let deps = task.dependencies.clone();
            if !Self::dependencies_satisfied(&inner, &deps) {
                continue;
            }
            let priority = task.priority;
            let created_ms = task.created_at.timestamp_millis();
            let counter = Self::counter_for(&mut inner);
            inner.queue.push(QueueEntry { priority, created_ms, counter, task_id: task_id.clone() });
            inner.queued.insert(task_id);
            submitted += 1;
        }
        submitted
    }

    fn counter_for(inner: &mut Inner) -> u64 {
        let c = inner.next_counter;
        inner.next_counter += 1;
        c
    }

    fn dependencies_satisfied(inner: &Inner, deps: &[TaskId]) -> bool {
        deps.iter().all(|dep| {
            inner.tasks.get(dep).map(|t| t.status == TaskStatus::Completed).unwrap_or(false)
        })
    }

    /// Non-blocking pop of the highest-priority eligible task.
    pub fn get_next_task(&self) -> Option<Task> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.queue.pop()?;
        inner.queued.remove(&entry.task_id);
        inner.tasks.get(&entry.task_id).cloned()
    }

    pub fn start_task(&self, task_id: &str, host: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Pending {
            return false;
        }
        task.status = TaskStatus::Running;
        task.start_time = Some(Utc::now());
        task.assigned_host = Some(host.to_string());
        true
    }

    pub fn complete_task(&self, task_id: &str, result: ExperimentResult) -> bool {
        let (ok, callback, task_snapshot) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(task) = inner.tasks.get_mut(task_id) else {
                return false;
            };
            if task.status != TaskStatus::Running {
                return false;
            }
            task.status = TaskStatus::Completed;
            task.end_time = Some(Utc::now());
            task.progress = 1.0;
            task.result = Some(result);
            let snapshot = task.clone();
            inner.stats.completed += 1;
            (true, inner.callbacks.get(task_id).map(|_| ()), snapshot)
        };
        if callback.is_some() {
            let inner = self.inner.lock().unwrap();
            if let Some(cb) = inner.callbacks.get(task_id) {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&task_snapshot)));
                if let Err(e) = result {
                    error!(task_id, ?e, "task completion callback panicked");
                }
            }
        }
        ok
    }

    /// On failure, retries the task (preserving its original creation
    /// time so it keeps its place in line) if retries remain, otherwise
    /// moves it to `failed`.
    pub fn fail_task(&self, task_id: &str, error_message: impl Into<String>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Running {
            return false;
        }
        if task.retry_count < task.max_retries {
            task.retry_count += 1;
            task.reset_for_retry();
            let priority = task.priority;
            let created_ms = task.created_at.timestamp_millis();
            inner.stats.retried += 1;
            let counter = Self::counter_for(&mut inner);
            inner.queue.push(QueueEntry {
                priority,
                created_ms,
                counter,
                task_id: task_id.to_string(),
            });
            inner.queued.insert(task_id.to_string());
        } else {
            task.status = TaskStatus::Failed;
            task.error_message = Some(error_message.into());
            task.end_time = Some(Utc::now());
            inner.stats.failed += 1;
        }
        true
    }

    pub fn cancel_task(&self, task_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Running) {
            return false;
        }
        task.status = TaskStatus::Cancelled;
        task.end_time = Some(Utc::now());
        true
    }

    pub fn update_progress(&self, task_id: &str, fraction: f64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        task.progress = fraction.clamp(0.0, 1.0);
        true
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.inner.lock().unwrap().tasks.get(task_id).cloned()
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.inner.lock().unwrap().tasks.get(task_id).map(|t| t.status)
    }

    pub fn get_all_tasks(&self) -> HashMap<TaskStatus, Vec<Task>> {
        let inner = self.inner.lock().unwrap();
        let mut grouped: HashMap<TaskStatus, Vec<Task>> = HashMap::new();
        for task in inner.tasks.values() {
            grouped.entry(task.status).or_default().push(task.clone());
        }
        grouped
    }

    pub fn get_tasks_by_host(&self, host: &str) -> Vec<Task> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running && t.assigned_host.as_deref() == Some(host))
            .cloned()
            .collect()
    }

    pub fn get_queue_size(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_queue_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    pub fn is_queue_full(&self) -> bool {
        self.inner.lock().unwrap().queue.len() >= self.max_queue_size
    }

    pub fn get_stats(&self) -> TaskStatsSnapshot {
        let inner = self.inner.lock().unwrap();
        let running_count = inner.tasks.values().filter(|t| t.status == TaskStatus::Running).count();
        let completed_count = inner.tasks.values().filter(|t| t.status == TaskStatus::Completed).count();
        let failed_count = inner.tasks.values().filter(|t| t.status == TaskStatus::Failed).count();
        TaskStatsSnapshot {
            created: inner.stats.created,
            completed: inner.stats.completed,
            failed: inner.stats.failed,
            retried: inner.stats.retried,
            queue_size: inner.queue.len(),
            running_count,
            completed_count,
            failed_count,
        }
    }

    pub fn clear_completed_tasks(&self, max_age_hours: i64) {
        self.clear_terminal(TaskStatus::Completed, max_age_hours);
    }

    pub fn clear_failed_tasks(&self, max_age_hours: i64) {
        self.clear_terminal(TaskStatus::Failed, max_age_hours);
    }

    fn clear_terminal(&self, status: TaskStatus, max_age_hours: i64) {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.retain(|_, task| {
            !(task.status == status && task.end_time.map(|t| t < cutoff).unwrap_or(false))
        });
    }

    /// Polls (at ~100ms intervals) until the task reaches a terminal
    /// status or `timeout` elapses. Returns whether it became terminal.
    pub async fn wait_for_task_completion(&self, task_id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.get_task_status(task_id) {
                Some(status) if status.is_terminal() => return true,
                None => return false,
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return self.get_task_status(task_id).map(|s| s.is_terminal()).unwrap_or(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(priority: u32) -> ExperimentConfig {
        let mut c = ExperimentConfig::new("noop", "out");
        c.priority = priority;
        c
    }

    #[test]
    fn create_then_submit_round_trip() {
        let tm = TaskManager::new(10);
        let id = tm.create_task(cfg(0), None);
        assert_eq!(tm.get_task_status(&id), Some(TaskStatus::Pending));
        assert!(tm.is_queue_empty());
        assert!(tm.submit_task(&id));
        assert_eq!(tm.get_queue_size(), 1);
    }

    #[test]
    fn submit_respects_queue_capacity() {
        let tm = TaskManager::new(1);
        let a = tm.create_task(cfg(0), None);
        let b = tm.create_task(cfg(0), None);
        assert!(tm.submit_task(&a));
        assert!(!tm.submit_task(&b));
        assert_eq!(tm.get_queue_size(), 1);
    }

    #[test]
    fn submit_blocks_on_unmet_dependency() {
        let tm = TaskManager::new(10);
        let parent = tm.create_task(cfg(0), None);
        let mut child_cfg = cfg(0);
        child_cfg.dependencies = vec![parent.clone()];
        let child = tm.create_task(child_cfg, None);

        assert!(!tm.submit_task(&child));
        assert!(tm.submit_task(&parent));
        tm.start_task(&parent, "h1");
        let result = ExperimentResult::new("exp_1", "out");
        tm.complete_task(&parent, result);

        assert!(tm.submit_task(&child));
    }

    #[test]
    fn resubmit_ready_tasks_enqueues_child_once_dependency_completes() {
        let tm = TaskManager::new(10);
        let parent = tm.create_task(cfg(0), None);
        let mut child_cfg = cfg(0);
        child_cfg.dependencies = vec![parent.clone()];
        let child = tm.create_task(child_cfg, None);

        // The initial submission attempt (as run_experiment makes) is
        // deferred, not abandoned: the child stays pending and unqueued.
        assert!(!tm.submit_task(&child));
        assert_eq!(tm.resubmit_ready_tasks(), 0);
        assert!(tm.is_queue_empty());

        tm.submit_task(&parent);
        tm.start_task(&parent, "h1");
        tm.complete_task(&parent, ExperimentResult::new("exp_1", "out"));

        assert_eq!(tm.resubmit_ready_tasks(), 1);
        assert_eq!(tm.get_next_task().unwrap().task_id, child);
    }

    #[test]
    fn submit_task_does_not_double_queue() {
        let tm = TaskManager::new(10);
        let id = tm.create_task(cfg(0), None);
        assert!(tm.submit_task(&id));
        assert!(!tm.submit_task(&id));
        assert_eq!(tm.get_queue_size(), 1);
    }

    #[test]
    fn priority_ordering_on_dequeue() {
        let tm = TaskManager::new(10);
        let a = tm.create_task(cfg(0), None);
        let b = tm.create_task(cfg(5), None);
        let c = tm.create_task(cfg(0), None);
        tm.submit_task(&a);
        tm.submit_task(&b);
        tm.submit_task(&c);

        assert_eq!(tm.get_next_task().unwrap().task_id, b);
        assert_eq!(tm.get_next_task().unwrap().task_id, a);
        assert_eq!(tm.get_next_task().unwrap().task_id, c);
    }

    #[test]
    fn retry_then_exhaustion() {
        let tm = TaskManager::new(10);
        let mut config = cfg(0);
        config.retry_count = 1;
        let id = tm.create_task(config, None);
        tm.submit_task(&id);
        tm.get_next_task();
        tm.start_task(&id, "h1");

        assert!(tm.fail_task(&id, "boom"));
        assert_eq!(tm.get_task_status(&id), Some(TaskStatus::Pending));
        assert_eq!(tm.get_stats().retried, 1);

        tm.get_next_task();
        tm.start_task(&id, "h1");
        assert!(tm.fail_task(&id, "boom again"));
        assert_eq!(tm.get_task_status(&id), Some(TaskStatus::Failed));
        assert_eq!(tm.get_stats().failed, 1);
    }

    #[test]
    fn cancel_from_pending_and_running() {
        let tm = TaskManager::new(10);
        let id = tm.create_task(cfg(0), None);
        assert!(tm.cancel_task(&id));
        assert_eq!(tm.get_task_status(&id), Some(TaskStatus::Cancelled));

        let id2 = tm.create_task(cfg(0), None);
        tm.submit_task(&id2);
        tm.get_next_task();
        tm.start_task(&id2, "h1");
        assert!(tm.cancel_task(&id2));
    }

    #[test]
    fn progress_is_clamped() {
        let tm = TaskManager::new(10);
        let id = tm.create_task(cfg(0), None);
        tm.update_progress(&id, 5.0);
        assert_eq!(tm.get_task(&id).unwrap().progress, 1.0);
        tm.update_progress(&id, -5.0);
        assert_eq!(tm.get_task(&id).unwrap().progress, 0.0);
    }

    #[tokio::test]
    async fn wait_for_completion_returns_once_terminal() {
        let tm = TaskManager::new(10);
        let id = tm.create_task(cfg(0), None);
        tm.cancel_task(&id);
        assert!(tm.wait_for_task_completion(&id, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn wait_for_completion_times_out_on_pending_task() {
        let tm = TaskManager::new(10);
        let id = tm.create_task(cfg(0), None);
        assert!(!tm.wait_for_task_completion(&id, Duration::from_millis(150)).await);
    }
}
