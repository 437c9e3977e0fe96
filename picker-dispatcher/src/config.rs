use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    // Longest time one pump iteration sleeps when nothing is pending.
    pub idle_wait: Duration,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    // Worker threads are named `<prefix>-<task number>`.
    pub thread_name_prefix: String,
    // Stack size for worker threads. The platform default is used when unset.
    pub stack_size: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "picker-task".to_string(),
            stack_size: None,
        }
    }
}
