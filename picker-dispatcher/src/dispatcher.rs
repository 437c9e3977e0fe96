use std::{
    cell::RefCell,
    collections::HashMap,
    io,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
    thread::{self, JoinHandle, ThreadId},
};

use picker_core::{error::panic_message, BoxError, TaskError, TaskId, TaskResult};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::{
    config::DispatcherConfig,
    pump::{EventSource, Pump},
    task::{Callback, Payload, TaskRecord, TaskState},
};

struct Completion {
    id: TaskId,
    payload: Payload,
}

struct Registry {
    config: DispatcherConfig,
    pump: Rc<dyn Pump>,
    coordinator: ThreadId,
    records: RefCell<HashMap<TaskId, TaskRecord>>,
    sender: UnboundedSender<Completion>,
    completions: RefCell<UnboundedReceiver<Completion>>,
}

/// Runs closures on worker threads and hands their results to callbacks on
/// the thread that created it. Clones share one registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Rc<Registry>,
}

impl Dispatcher {
    pub fn new(pump: Rc<dyn Pump>, config: DispatcherConfig) -> Self {
        let (sender, completions) = mpsc::unbounded_channel();
        let registry = Rc::new(Registry {
            config,
            pump: pump.clone(),
            coordinator: thread::current().id(),
            records: RefCell::new(HashMap::new()),
            sender,
            completions: RefCell::new(completions),
        });

        let source: Rc<dyn EventSource> = registry.clone();
        pump.add_source(Rc::downgrade(&source));

        Self { registry }
    }

    pub fn pump(&self) -> Rc<dyn Pump> {
        self.registry.pump.clone()
    }

    /// `callback` runs exactly once, from inside the pump, with the task's
    /// value or the reason it failed.
    pub fn post<T, E, F, C>(&self, task: F, callback: C) -> TaskId
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        C: FnOnce(TaskResult<T>) + 'static,
    {
        let id = TaskId::next();
        let callback: Callback = Box::new(move |payload: Payload| {
            match payload.downcast::<TaskResult<T>>() {
                Ok(result) => callback(*result),
                Err(_) => error!("Completion for {} carried an unexpected result type", id),
            }
        });

        let worker = match self.spawn_worker(id, task) {
            Ok(worker) => Some(worker),
            Err(spawn_error) => {
                error!("Failed to start worker for {}: {}", id, spawn_error);
                // Deliver the failure through the normal path so the callback
                // still fires from the pump.
                let result: TaskResult<T> = Err(TaskError::failed(id, spawn_error));
                self.registry.deliver(Completion {
                    id,
                    payload: Box::new(result),
                });
                None
            }
        };

        self.registry.insert(TaskRecord::new(id, worker, callback));
        info!("Posted {}", id);
        id
    }

    pub fn spawn<T, E, F>(&self, task: F) -> TaskId
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.post(task, |result: TaskResult<T>| {
            if let Err(task_error) = result {
                warn!("Detached task failed: {}", task_error);
            }
        })
    }

    // Unknown ids count as finished.
    pub fn is_finished(&self, id: TaskId) -> bool {
        !self.registry.records.borrow().contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.registry.records.borrow().len()
    }

    /// Pumps until the task is finished. Safe from inside another callback.
    pub fn join(&self, id: TaskId) {
        let state = self
            .registry
            .records
            .borrow()
            .get(&id)
            .map(|record| record.state);
        match state {
            None => return,
            Some(TaskState::Finished) => {
                // Only reachable from the task's own callback, which cannot
                // return while we wait for it.
                warn!("join({}) called from its own callback, not waiting", id);
                return;
            }
            Some(TaskState::Running) => {}
        }

        debug!("Joining {}", id);
        self.registry.pump.pump_until(&|| self.is_finished(id));
        debug!("Joined {}", id);
    }

    fn spawn_worker<T, E, F>(&self, id: TaskId, task: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let config = &self.registry.config;
        let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id.0));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let sender = self.registry.sender.clone();
        let waker = self.registry.pump.waker();
        builder.spawn(move || {
            debug!("Worker started for {}", id);
            let result = run_task(id, task);
            let payload: Payload = Box::new(result);
            if sender.send(Completion { id, payload }).is_err() {
                warn!("Dispatcher dropped before {} completed", id);
                return;
            }
            waker.wake();
        })
    }
}

// Outermost frame of every worker.
fn run_task<T, E, F>(id: TaskId, task: F) -> TaskResult<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<BoxError>,
{
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(task_error)) => {
            let task_error: BoxError = task_error.into();
            debug!("{} returned an error: {:?}", id, task_error);
            Err(TaskError::failed(id, task_error))
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            error!("{} panicked: {}", id, message);
            Err(TaskError::panicked(id, message))
        }
    }
}

impl Registry {
    fn insert(&self, record: TaskRecord) {
        debug_assert_eq!(thread::current().id(), self.coordinator);
        self.records.borrow_mut().insert(record.id, record);
    }

    fn deliver(&self, completion: Completion) {
        if self.sender.send(completion).is_ok() {
            self.pump.waker().wake();
        }
    }

    fn complete(&self, completion: Completion) -> bool {
        debug_assert_eq!(thread::current().id(), self.coordinator);
        let Completion { id, payload } = completion;

        let callback = match self.records.borrow_mut().get_mut(&id) {
            Some(record) => record.finish(),
            None => {
                debug!("Ignoring completion for unknown {}", id);
                return false;
            }
        };

        // No registry borrow is held here; the callback may post or join.
        if let Some(callback) = callback {
            callback(payload);
        }

        let record = self.records.borrow_mut().remove(&id);
        if let Some(record) = record {
            info!("Completed {} after {:?}", id, record.elapsed());
            record.reap();
        }
        true
    }
}

impl EventSource for Registry {
    fn dispatch(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.completions.borrow_mut().try_recv();
            match next {
                Ok(completion) => {
                    if self.complete(completion) {
                        delivered += 1;
                    }
                }
                Err(_) => break,
            }
        }
        delivered
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let outstanding = self.records.get_mut().len();
        if outstanding > 0 {
            warn!("Dispatcher dropped with {} task(s) still running", outstanding);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.registry.config)
            .field("records", &self.registry.records.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EventLoopConfig, pump::EventLoop};
    use std::{
        cell::Cell,
        collections::HashSet,
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };

    fn dispatcher() -> (Rc<EventLoop>, Dispatcher) {
        let event_loop = Rc::new(
            EventLoop::new(EventLoopConfig {
                idle_wait: Duration::from_millis(2),
            })
            .expect("event loop"),
        );
        let dispatcher = Dispatcher::new(event_loop.clone(), DispatcherConfig::default());
        (event_loop, dispatcher)
    }

    #[test]
    fn test_post_then_join_delivers_value_once() {
        let (_event_loop, dispatcher) = dispatcher();
        let received = Rc::new(RefCell::new(Vec::new()));

        let sink = received.clone();
        let id = dispatcher.post(
            || {
                thread::sleep(Duration::from_millis(50));
                Ok::<_, io::Error>(42)
            },
            move |result| sink.borrow_mut().push(result.expect("task succeeds")),
        );

        assert!(!dispatcher.is_finished(id));
        assert_eq!(dispatcher.pending(), 1);

        dispatcher.join(id);

        assert!(dispatcher.is_finished(id));
        assert_eq!(*received.borrow(), vec![42]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_unknown_id_is_finished() {
        let (_event_loop, dispatcher) = dispatcher();
        let never_issued = TaskId(u64::MAX);
        assert!(dispatcher.is_finished(never_issued));
        dispatcher.join(never_issued);
    }

    #[test]
    fn test_callback_runs_on_coordinating_thread() {
        let (_event_loop, dispatcher) = dispatcher();
        let coordinator = thread::current().id();
        let worker_thread = Arc::new(std::sync::Mutex::new(None));
        let callback_thread = Rc::new(Cell::new(None));

        let worker_seen = worker_thread.clone();
        let callback_seen = callback_thread.clone();
        let id = dispatcher.post(
            move || {
                *worker_seen.lock().expect("worker mutex") = Some(thread::current().id());
                Ok::<_, io::Error>(())
            },
            move |_| callback_seen.set(Some(thread::current().id())),
        );
        dispatcher.join(id);

        assert_eq!(callback_thread.get(), Some(coordinator));
        let worker = *worker_thread.lock().expect("worker mutex");
        assert_ne!(worker.expect("worker ran"), coordinator);
    }

    #[test]
    fn test_callback_sees_task_unfinished_and_is_not_repeated() {
        let (_event_loop, dispatcher) = dispatcher();
        let calls = Rc::new(Cell::new(0));
        let seen_unfinished = Rc::new(Cell::new(false));

        let id_slot = Rc::new(Cell::new(None));
        let counter = calls.clone();
        let observer = dispatcher.clone();
        let slot = id_slot.clone();
        let unfinished = seen_unfinished.clone();
        let id = dispatcher.post(
            || Ok::<_, io::Error>(()),
            move |_| {
                counter.set(counter.get() + 1);
                if let Some(id) = slot.get() {
                    unfinished.set(!observer.is_finished(id));
                }
            },
        );
        id_slot.set(Some(id));

        dispatcher.join(id);
        assert!(dispatcher.is_finished(id));

        // More pumping must not deliver the same completion again.
        for _ in 0..5 {
            dispatcher.pump().process_events();
        }
        assert_eq!(calls.get(), 1);
        assert!(seen_unfinished.get());
    }

    #[test]
    fn test_error_is_delivered_as_result() {
        let (_event_loop, dispatcher) = dispatcher();
        let outcome = Rc::new(RefCell::new(None));

        let slot = outcome.clone();
        let id = dispatcher.post(
            || -> Result<(), io::Error> {
                Err(io::Error::new(io::ErrorKind::NotFound, "file not found"))
            },
            move |result| *slot.borrow_mut() = Some(result),
        );
        dispatcher.join(id);

        let outcome = outcome.borrow_mut().take().expect("callback fired");
        let task_error = outcome.expect_err("task failed");
        assert_eq!(task_error.task, id);
        assert_eq!(
            task_error.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_panic_is_delivered_as_result() {
        let (_event_loop, dispatcher) = dispatcher();
        let outcome = Rc::new(RefCell::new(None));

        let slot = outcome.clone();
        let id = dispatcher.post(
            || -> Result<u8, io::Error> { panic!("decoder exploded") },
            move |result| *slot.borrow_mut() = Some(result),
        );
        dispatcher.join(id);

        let task_error = outcome
            .borrow_mut()
            .take()
            .expect("callback fired")
            .expect_err("task panicked");
        assert!(task_error.is_panic());
        assert!(task_error.to_string().contains("decoder exploded"));
    }

    #[test]
    fn test_join_from_inside_another_callback() {
        let (_event_loop, dispatcher) = dispatcher();
        let inner_value = Rc::new(Cell::new(0));
        let outer_done = Rc::new(Cell::new(false));

        let nested = dispatcher.clone();
        let inner_slot = inner_value.clone();
        let outer_flag = outer_done.clone();
        let outer = dispatcher.post(
            || Ok::<_, io::Error>(()),
            move |_| {
                let slot = inner_slot.clone();
                let inner = nested.post(
                    || {
                        thread::sleep(Duration::from_millis(20));
                        Ok::<_, io::Error>(7)
                    },
                    move |result| slot.set(result.expect("inner succeeds")),
                );
                nested.join(inner);
                assert!(nested.is_finished(inner));
                assert_eq!(inner_slot.get(), 7);
                outer_flag.set(true);
            },
        );

        dispatcher.join(outer);
        assert!(outer_done.get());
        assert_eq!(inner_value.get(), 7);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_join_own_callback_does_not_hang() {
        let (_event_loop, dispatcher) = dispatcher();
        let own_id = Rc::new(Cell::new(None));
        let returned = Rc::new(Cell::new(false));

        let joiner = dispatcher.clone();
        let slot = own_id.clone();
        let flag = returned.clone();
        let id = dispatcher.post(
            || Ok::<_, io::Error>(()),
            move |_| {
                if let Some(id) = slot.get() {
                    joiner.join(id);
                }
                flag.set(true);
            },
        );
        own_id.set(Some(id));
        dispatcher.join(id);
        assert!(returned.get());
    }

    #[test]
    fn test_join_while_unrelated_tasks_complete() {
        let (_event_loop, dispatcher) = dispatcher();
        let background_done = Rc::new(Cell::new(0));

        for delay in [1, 5, 10, 15] {
            let counter = background_done.clone();
            dispatcher.post(
                move || {
                    thread::sleep(Duration::from_millis(delay));
                    Ok::<_, io::Error>(())
                },
                move |_| counter.set(counter.get() + 1),
            );
        }
        let slow = dispatcher.post(
            || {
                thread::sleep(Duration::from_millis(40));
                Ok::<_, io::Error>(())
            },
            |_| {},
        );

        dispatcher.join(slow);
        assert!(dispatcher.is_finished(slow));
        assert_eq!(background_done.get(), 4);
    }

    #[test]
    fn test_many_submissions_get_distinct_ids() {
        let (_event_loop, dispatcher) = dispatcher();
        let total = 1000;
        let ran = Arc::new(AtomicUsize::new(0));
        let callbacks = Rc::new(Cell::new(0));

        let mut ids = HashSet::new();
        for n in 0..total {
            let ran = ran.clone();
            let callbacks = callbacks.clone();
            let id = dispatcher.post(
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, io::Error>(n)
                },
                move |_| callbacks.set(callbacks.get() + 1),
            );
            assert!(ids.insert(id), "duplicate id {id}");
        }

        let deadline = Instant::now() + Duration::from_secs(30);
        while dispatcher.pending() > 0 && Instant::now() < deadline {
            dispatcher.pump().process_events();
        }

        assert_eq!(ids.len(), total);
        assert_eq!(ran.load(Ordering::SeqCst), total);
        assert_eq!(callbacks.get(), total);
    }

    #[test]
    fn test_spawn_without_callback_is_reaped() {
        let (_event_loop, dispatcher) = dispatcher();
        let id = dispatcher.spawn(|| Err::<(), _>("nobody is listening"));
        dispatcher.join(id);
        assert!(dispatcher.is_finished(id));
    }

    #[test]
    fn test_unknown_completion_is_ignored() {
        let (_event_loop, dispatcher) = dispatcher();
        let handled = dispatcher.registry.complete(Completion {
            id: TaskId::next(),
            payload: Box::new(()),
        });
        assert!(!handled);
    }

    #[test]
    fn test_worker_threads_are_named() {
        let (_event_loop, dispatcher) = dispatcher();
        let name = Rc::new(RefCell::new(None));

        let slot = name.clone();
        let id = dispatcher.post(
            || Ok::<_, io::Error>(thread::current().name().map(str::to_string)),
            move |result| *slot.borrow_mut() = result.expect("task succeeds"),
        );
        dispatcher.join(id);

        let expected = format!("picker-task-{}", id.0);
        assert_eq!(name.borrow().as_deref(), Some(expected.as_str()));
    }
}
