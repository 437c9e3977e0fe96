use std::{
  fmt::{self, Debug, Display},
  sync::atomic::{AtomicU64, Ordering},
};

pub mod error;
pub mod progress;

pub use error::{BoxError, FailureCause, TaskError, TaskResult};
pub use progress::{ProgressEvent, ProgressReporter, PumpWaker};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one submitted background task.
///
/// Ids come from a process-wide counter, so two dispatchers (or two threads
/// asking at the same instant) never see the same value.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
  pub fn next() -> Self {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl Debug for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "task-{}", self.0)
  }
}

impl Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    Debug::fmt(self, f)
  }
}
