use std::{any::Any, error::Error};

use thiserror::Error;

use crate::TaskId;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// What a task's callback receives: the task's value, or the reason it did
/// not complete.
pub type TaskResult<T> = Result<T, TaskError>;

/// A background task that did not complete normally.
///
/// There is only one failure kind at the dispatcher level. The cause keeps
/// whatever the task itself reported so callers can inspect it.
#[derive(Debug, Error)]
#[error("{task} did not complete: {cause}")]
pub struct TaskError {
  pub task: TaskId,
  #[source]
  pub cause: FailureCause,
}

#[derive(Debug, Error)]
pub enum FailureCause {
  // The task returned an error value.
  #[error("{0}")]
  Failed(#[source] BoxError),
  // The task panicked; the payload is kept as text.
  #[error("panicked: {0}")]
  Panicked(String),
}

impl TaskError {
  pub fn failed(task: TaskId, error: impl Into<BoxError>) -> Self {
    Self {
      task,
      cause: FailureCause::Failed(error.into()),
    }
  }

  pub fn panicked(task: TaskId, message: impl Into<String>) -> Self {
    Self {
      task,
      cause: FailureCause::Panicked(message.into()),
    }
  }

  pub fn is_panic(&self) -> bool {
    matches!(self.cause, FailureCause::Panicked(_))
  }

  /// The task's own error, if it returned one of type `E`.
  pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
    match &self.cause {
      FailureCause::Failed(error) => error.downcast_ref::<E>(),
      FailureCause::Panicked(_) => None,
    }
  }
}

/// Renders a `catch_unwind` payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
