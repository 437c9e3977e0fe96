use std::{
    any::Any,
    fmt,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use picker_core::TaskId;
use tracing::warn;

/// Type-erased task result as it travels from the worker to the dispatcher.
pub(crate) type Payload = Box<dyn Any + Send>;
pub(crate) type Callback = Box<dyn FnOnce(Payload)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    // The completion arrived and the callback is running.
    Finished,
}

/// Bookkeeping for one submitted task, from `post` until its callback
/// returns.
pub struct TaskRecord {
    pub id: TaskId,
    pub state: TaskState,
    pub submitted_at: Instant,
    worker: Option<JoinHandle<()>>,
    callback: Option<Callback>,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, worker: Option<JoinHandle<()>>, callback: Callback) -> Self {
        Self {
            id,
            state: TaskState::Running,
            submitted_at: Instant::now(),
            worker,
            callback: Some(callback),
        }
    }

    /// Marks the task finished and hands out its callback. Only the first
    /// call gets it.
    pub(crate) fn finish(&mut self) -> Option<Callback> {
        self.state = TaskState::Finished;
        self.callback.take()
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Joins the worker thread. It has already sent its completion, so this
    /// only waits for the thread to unwind its last frame.
    pub(crate) fn reap(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Worker thread for {} panicked outside its task", self.id);
            }
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("elapsed", &self.elapsed())
            .field("has_worker", &self.worker.is_some())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc, thread};

    #[test]
    fn test_finish_hands_out_callback_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut record = TaskRecord::new(
            TaskId::next(),
            None,
            Box::new(move |_| counter.set(counter.get() + 1)),
        );
        assert_eq!(record.state, TaskState::Running);

        let callback = record.finish().expect("first finish has the callback");
        assert_eq!(record.state, TaskState::Finished);
        assert!(record.finish().is_none());

        callback(Box::new(()));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_reap_joins_worker() {
        let worker = thread::spawn(|| {});
        let record = TaskRecord::new(TaskId::next(), Some(worker), Box::new(|_| {}));
        record.reap();
    }
}
