//! Cancelable registry of delayed tasks
//!
//! Used for staggered spawns. A level change must `cancel_all` before
//! scheduling the new level's tasks, so nothing queued for the old level can
//! fire into the new one.

/// Handle to a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: u64,
    generation: u64,
}

#[derive(Debug, Clone)]
struct Scheduled<T> {
    handle: TaskHandle,
    due: f64,
    task: T,
}

/// Tasks keyed by due time (ms)
#[derive(Debug, Clone)]
pub struct TaskRegistry<T> {
    tasks: Vec<Scheduled<T>>,
    generation: u64,
    next_id: u64,
}

impl<T> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskRegistry<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            generation: 0,
            next_id: 1,
        }
    }

    pub fn schedule(&mut self, due: f64, task: T) -> TaskHandle {
        let handle = TaskHandle {
            id: self.next_id,
            generation: self.generation,
        };
        self.next_id += 1;
        self.tasks.push(Scheduled { handle, due, task });
        handle
    }

    /// Cancel one task; false if it already ran or was cancelled
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        if handle.generation != self.generation {
            return false;
        }
        let before = self.tasks.len();
        self.tasks.retain(|t| t.handle != handle);
        self.tasks.len() != before
    }

    /// Drop every pending task and invalidate all outstanding handles
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.tasks.len();
        self.tasks.clear();
        self.generation += 1;
        if dropped > 0 {
            log::debug!("Cancelled {} pending tasks", dropped);
        }
        dropped
    }

    /// Remove and return tasks due at or before `now`, earliest first
    pub fn drain_due(&mut self, now: f64) -> Vec<T> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|t| t.due <= now);
        self.tasks = pending;
        // Stable sort: ties keep scheduling order
        due.sort_by(|a, b| a.due.total_cmp(&b.due));
        due.into_iter().map(|t| t.task).collect()
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Earliest due time, if anything is pending
    pub fn next_due(&self) -> Option<f64> {
        self.tasks.iter().map(|t| t.due).min_by(f64::total_cmp)
    }
}
