use std::{
    cell::RefCell,
    rc::Rc,
    sync::Arc,
};

use picker_core::{BoxError, ProgressEvent, ProgressReporter, TaskResult};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::{
    dispatcher::Dispatcher,
    pump::EventSource,
    state::ProgressState,
};

pub trait ProgressIndicator {
    /// A range with `maximum <= minimum` is shown as indeterminate.
    fn set_range(&mut self, minimum: i64, maximum: i64);
    fn set_value(&mut self, value: i64);
    fn set_label(&mut self, text: &str);
    fn open(&mut self);
    fn close(&mut self);
}

struct ProgressFeed<T, I> {
    events: RefCell<UnboundedReceiver<ProgressEvent>>,
    state: Rc<RefCell<ProgressState<T>>>,
    indicator: Rc<RefCell<I>>,
}

impl<T, I: ProgressIndicator> ProgressFeed<T, I> {
    fn apply(&self, event: ProgressEvent) {
        let mut state = self.state.borrow_mut();
        let mut indicator = self.indicator.borrow_mut();
        match event {
            ProgressEvent::Progress { current, maximum } => {
                state.current = current;
                state.maximum = maximum;
                if state.is_indeterminate() {
                    indicator.set_range(0, 0);
                } else {
                    indicator.set_range(0, maximum);
                    indicator.set_value(current);
                }
                indicator.set_label(&state.display_label());
            }
            ProgressEvent::Text(label) => {
                state.label = label;
                indicator.set_label(&state.label);
            }
        }
    }
}

impl<T, I: ProgressIndicator> EventSource for ProgressFeed<T, I> {
    fn dispatch(&self) -> usize {
        let mut applied = 0;
        loop {
            let next = self.events.borrow_mut().try_recv();
            match next {
                Ok(event) => {
                    self.apply(event);
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        applied
    }
}

/// Runs functions on the [`Dispatcher`] while the caller waits, with a fresh
/// indicator per call.
pub struct BlockingProgress<M> {
    dispatcher: Dispatcher,
    make_indicator: M,
}

impl<M, I> BlockingProgress<M>
where
    M: Fn() -> I,
    I: ProgressIndicator + 'static,
{
    pub fn new(dispatcher: Dispatcher, make_indicator: M) -> Self {
        Self {
            dispatcher,
            make_indicator,
        }
    }

    /// Runs `task` on a worker and returns its result once it is done. May be
    /// called from inside a callback or another `call`.
    pub fn call<T, E, F>(&self, task: F) -> TaskResult<T>
    where
        F: FnOnce(ProgressReporter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let pump = self.dispatcher.pump();
        let (reporter, events) = ProgressReporter::channel(pump.waker());
        let state = Rc::new(RefCell::new(ProgressState::new()));
        let indicator = Rc::new(RefCell::new((self.make_indicator)()));

        {
            let mut indicator = indicator.borrow_mut();
            indicator.set_range(0, 0);
            indicator.set_value(0);
            indicator.open();
        }

        let feed = Rc::new(ProgressFeed {
            events: RefCell::new(events),
            state: state.clone(),
            indicator: indicator.clone(),
        });
        let source: Rc<dyn EventSource> = feed.clone();
        pump.add_source(Rc::downgrade(&source));

        let done = state.clone();
        let id = self.dispatcher.post(
            move || task(reporter),
            move |result| {
                done.borrow_mut().complete(result);
            },
        );
        state.borrow_mut().submitted();
        debug!("Waiting on {} with progress", id);

        pump.pump_until(&|| state.borrow().finished);

        // Progress sent just before the task returned may still be queued.
        feed.dispatch();
        indicator.borrow_mut().close();
        drop(source);
        drop(feed);

        let result = state.borrow_mut().result.take();
        result.expect("finished progress state always holds a result")
    }

    pub fn wrap<A, T, E, F>(self, task: F) -> impl Fn(A) -> TaskResult<T>
    where
        F: Fn(A, ProgressReporter) -> Result<T, E> + Send + Sync + 'static,
        A: Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let task = Arc::new(task);
        move |args| {
            let task = task.clone();
            self.call(move |reporter| (*task)(args, reporter))
        }
    }
}
