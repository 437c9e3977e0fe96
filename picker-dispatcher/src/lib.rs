//! Background-task coordination for a single-threaded front end.
//!
//! A [`Dispatcher`] runs blocking work on worker threads and hands results to
//! callbacks on the coordinating thread. A [`BlockingProgress`] builds on it
//! to let the caller wait for a result, with a progress display, without
//! stopping the event pump.

pub mod config;
pub mod dispatcher;
pub mod progress;
pub mod pump;
pub mod state;
pub mod task;

pub use config::{DispatcherConfig, EventLoopConfig};
pub use dispatcher::Dispatcher;
pub use progress::{BlockingProgress, ProgressIndicator};
pub use pump::{EventLoop, EventLoopHandle, EventSource, Pump};
pub use state::{AdapterState, ProgressState};
pub use task::{TaskRecord, TaskState};
