use picker_core::TaskResult;

/// Where one synchronous progress call is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    // Created, nothing submitted yet.
    Idle,
    // Task submitted; the caller is pumping.
    AwaitingCompletion,
    // The task's callback stored the result. Terminal.
    Done,
}

/// What a progress indicator shows for one synchronous call, plus the slot
/// the result lands in.
#[derive(Debug)]
pub struct ProgressState<T> {
    pub current: i64,
    // `<= 0` means indeterminate.
    pub maximum: i64,
    pub label: String,
    pub finished: bool,
    pub result: Option<TaskResult<T>>,
    pub phase: AdapterState,
}

impl<T> ProgressState<T> {
    pub fn new() -> Self {
        Self {
            current: 0,
            maximum: 0,
            label: String::new(),
            finished: false,
            result: None,
            phase: AdapterState::Idle,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.maximum <= 0
    }

    /// The status line: the last label, with `(current / maximum)` when the
    /// amount of work is known.
    pub fn display_label(&self) -> String {
        if self.is_indeterminate() {
            self.label.clone()
        } else {
            format!("{} ({} / {})", self.label, self.current, self.maximum)
        }
    }

    pub(crate) fn submitted(&mut self) {
        if self.phase == AdapterState::Idle {
            self.phase = AdapterState::AwaitingCompletion;
        }
    }

    /// Stores the result. Only the first completion counts.
    pub(crate) fn complete(&mut self, result: TaskResult<T>) -> bool {
        if self.phase == AdapterState::Done {
            return false;
        }
        self.finished = true;
        self.result = Some(result);
        self.phase = AdapterState::Done;
        true
    }
}

impl<T> Default for ProgressState<T> {
    fn default() -> Self {
        Self::new()
    }
}
