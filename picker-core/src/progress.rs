//! Worker-side half of progress reporting.
//!
//! A task running on a worker thread never touches UI state. It pushes
//! [`ProgressEvent`]s into a channel and wakes the coordinating thread's pump,
//! which applies them to whatever indicator is listening.

use std::sync::Arc;

use tokio::sync::{
  mpsc::{self, UnboundedReceiver, UnboundedSender},
  Notify,
};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
  // `maximum <= 0` means the amount of work is unknown.
  Progress { current: i64, maximum: i64 },
  Text(String),
}

/// Wakes a pump that may be idling, from any thread.
///
/// A wake with nobody waiting is remembered, so the next idle wait returns
/// immediately instead of missing the event.
#[derive(Debug, Clone, Default)]
pub struct PumpWaker(Arc<Notify>);

impl PumpWaker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn wake(&self) {
    self.0.notify_one();
  }

  pub async fn woken(&self) {
    self.0.notified().await
  }
}

/// Handed to a task so it can publish progress and status text.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
  sender: UnboundedSender<ProgressEvent>,
  waker: PumpWaker,
}

impl ProgressReporter {
  pub fn channel(waker: PumpWaker) -> (Self, UnboundedReceiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender, waker }, receiver)
  }

  /// A reporter nobody listens to, for running a task outside a progress
  /// display.
  pub fn detached() -> Self {
    let (reporter, _) = Self::channel(PumpWaker::new());
    reporter
  }

  pub fn progress(&self, current: i64, maximum: i64) {
    self.emit(ProgressEvent::Progress { current, maximum });
  }

  pub fn text(&self, label: impl Into<String>) {
    self.emit(ProgressEvent::Text(label.into()));
  }

  /// The progress half as a plain callback, for code that only knows how to
  /// call `fn(current, maximum)`.
  pub fn progress_sink(&self) -> impl Fn(i64, i64) + Send + Sync + 'static {
    let reporter = self.clone();
    move |current, maximum| reporter.progress(current, maximum)
  }

  fn emit(&self, event: ProgressEvent) {
    match self.sender.send(event) {
      Ok(()) => self.waker.wake(),
      Err(rejected) => trace!("No progress listener, dropping {:?}", rejected.0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{thread, time::Duration};

  #[test]
  fn test_reporter_delivers_in_order() {
    let (reporter, mut events) = ProgressReporter::channel(PumpWaker::new());

    reporter.text("Decoding File");
    reporter.progress(1, 10);
    let sink = reporter.progress_sink();
    sink(10, 10);

    assert_eq!(
      events.try_recv().ok(),
      Some(ProgressEvent::Text("Decoding File".to_string()))
    );
    assert_eq!(
      events.try_recv().ok(),
      Some(ProgressEvent::Progress {
        current: 1,
        maximum: 10
      })
    );
    assert_eq!(
      events.try_recv().ok(),
      Some(ProgressEvent::Progress {
        current: 10,
        maximum: 10
      })
    );
    assert!(events.try_recv().is_err());
  }

  #[test]
  fn test_detached_reporter_does_not_fail() {
    let reporter = ProgressReporter::detached();
    reporter.text("nobody is listening");
    reporter.progress(3, 0);
  }

  #[test]
  fn test_wake_before_wait_is_not_lost() {
    let waker = PumpWaker::new();
    let remote = waker.clone();
    thread::spawn(move || remote.wake())
      .join()
      .expect("wake thread panicked");

    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .build()
      .expect("runtime");
    let woken = runtime.block_on(async {
      tokio::time::timeout(Duration::from_secs(1), waker.woken()).await
    });
    assert!(woken.is_ok());
  }
}
