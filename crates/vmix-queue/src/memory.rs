//! In-process backend for tests and single-node runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use vmix_models::TaskId;

use crate::backend::{FanIn, FanInProgress, JobBackend};
use crate::error::{QueueError, QueueResult};
use crate::job::{CleanupJob, QueueClass, QueueJob};

#[derive(Debug)]
struct Barrier {
    total: usize,
    done: HashSet<usize>,
    cleanup: CleanupJob,
    released: bool,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<QueueClass, VecDeque<QueueJob>>,
    barriers: HashMap<TaskId, Barrier>,
    next_id: u64,
}

/// [`JobBackend`] holding everything in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    fail_after: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            fail_after: AtomicUsize::new(usize::MAX),
        }
    }

    /// Make every enqueue after the first `n` fail.
    pub fn fail_enqueues_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Snapshot of jobs waiting on a class.
    pub fn pending(&self, class: QueueClass) -> Vec<QueueJob> {
        let state = self.lock();
        state
            .queues
            .get(&class)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Take the oldest job from the first non-empty class in `classes`.
    pub fn pop_any(&self, classes: &[QueueClass]) -> Option<QueueJob> {
        let mut state = self.lock();
        classes
            .iter()
            .find_map(|class| state.queues.get_mut(class).and_then(VecDeque::pop_front))
    }

    /// Whether a barrier (open or released) still exists for the task.
    pub fn has_barrier(&self, task_id: &TaskId) -> bool {
        self.lock().barriers.contains_key(task_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobBackend for MemoryBackend {
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let remaining = self.fail_after.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(QueueError::enqueue_failed("memory backend rejecting enqueues"));
        }
        if remaining != usize::MAX {
            self.fail_after.store(remaining - 1, Ordering::SeqCst);
        }

        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        state.queues.entry(job.class()).or_default().push_back(job);
        Ok(id)
    }

    async fn open_fan_in(&self, fan_in: &FanIn) -> QueueResult<()> {
        let mut state = self.lock();
        if state.barriers.contains_key(&fan_in.task_id) {
            return Err(QueueError::fan_in(format!(
                "barrier already open for {}",
                fan_in.task_id
            )));
        }
        state.barriers.insert(
            fan_in.task_id.clone(),
            Barrier {
                total: fan_in.total,
                done: HashSet::new(),
                cleanup: fan_in.cleanup.clone(),
                released: false,
            },
        );
        Ok(())
    }

    async fn chain_terminal(&self, task_id: &TaskId, index: usize) -> QueueResult<FanInProgress> {
        let mut state = self.lock();
        let Some(barrier) = state.barriers.get_mut(task_id) else {
            return Ok(FanInProgress::Closed);
        };

        if barrier.released {
            return Ok(FanInProgress::Released {
                cleanup: barrier.cleanup.clone(),
            });
        }

        if !barrier.done.insert(index) {
            return Ok(FanInProgress::AlreadyCounted);
        }

        if barrier.done.len() >= barrier.total {
            barrier.released = true;
            return Ok(FanInProgress::Released {
                cleanup: barrier.cleanup.clone(),
            });
        }

        Ok(FanInProgress::Pending {
            remaining: barrier.total - barrier.done.len(),
        })
    }

    async fn close_fan_in(&self, task_id: &TaskId) -> QueueResult<()> {
        self.lock().barriers.remove(task_id);
        Ok(())
    }
}
