use std::{
    cell::{Cell, RefCell},
    io,
    rc::{Rc, Weak},
    time::{Duration, Instant},
};

use picker_core::PumpWaker;
use tokio::{
    runtime::{Builder, Runtime},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tracing::{debug, trace};

use crate::config::EventLoopConfig;

pub trait EventSource {
    /// Drains pending events and returns how many were handled.
    fn dispatch(&self) -> usize;
}

pub trait Pump {
    /// One batch of pending events, or a bounded wait when there are none.
    fn process_events(&self);

    fn waker(&self) -> PumpWaker;

    fn add_source(&self, source: Weak<dyn EventSource>);

    fn pump_until(&self, done: &dyn Fn() -> bool) {
        while !done() {
            self.process_events();
        }
    }
}

type Call = Box<dyn FnOnce() + Send>;

struct Timer {
    due: Instant,
    call: Box<dyn FnOnce()>,
}

/// Single-threaded, re-entrant event loop.
///
/// The idle wait blocks on a private runtime, so the loop's thread must not be
/// a tokio runtime worker (no `process_events` from inside `#[tokio::main]`).
pub struct EventLoop {
    config: EventLoopConfig,
    runtime: Runtime,
    waker: PumpWaker,
    sender: UnboundedSender<Call>,
    calls: RefCell<UnboundedReceiver<Call>>,
    timers: RefCell<Vec<Timer>>,
    sources: RefCell<Vec<Weak<dyn EventSource>>>,
    depth: Cell<usize>,
}

#[derive(Clone)]
pub struct EventLoopHandle {
    sender: UnboundedSender<Call>,
    waker: PumpWaker,
}

impl EventLoopHandle {
    // False once the loop is gone.
    pub fn post<F>(&self, call: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(call)).is_err() {
            return false;
        }
        self.waker.wake();
        true
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl EventLoop {
    pub fn new(config: EventLoopConfig) -> io::Result<Self> {
        // Only used to sleep on the waker with a timeout while idle.
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let (sender, calls) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            runtime,
            waker: PumpWaker::new(),
            sender,
            calls: RefCell::new(calls),
            timers: RefCell::new(Vec::new()),
            sources: RefCell::new(Vec::new()),
            depth: Cell::new(0),
        })
    }

    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle {
            sender: self.sender.clone(),
            waker: self.waker.clone(),
        }
    }

    pub fn post_delayed<F>(&self, delay: Duration, call: F)
    where
        F: FnOnce() + 'static,
    {
        self.timers.borrow_mut().push(Timer {
            due: Instant::now() + delay,
            call: Box::new(call),
        });
    }

    /// How many `process_events` calls are currently on the stack.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    fn run_due_timers(&self) -> usize {
        let now = Instant::now();
        let mut ran = 0;
        loop {
            let timer = {
                let mut timers = self.timers.borrow_mut();
                let next = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= now)
                    .min_by_key(|(_, timer)| timer.due)
                    .map(|(index, _)| index);
                match next {
                    Some(index) => timers.swap_remove(index),
                    None => break,
                }
            };
            (timer.call)();
            ran += 1;
        }
        ran
    }

    fn run_posted_calls(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must end before the call runs; it may pump again.
            let next = self.calls.borrow_mut().try_recv();
            match next {
                Ok(call) => {
                    call();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    fn dispatch_sources(&self) -> usize {
        let sources = {
            let mut sources = self.sources.borrow_mut();
            sources.retain(|source| source.strong_count() > 0);
            sources.iter().filter_map(Weak::upgrade).collect::<Vec<_>>()
        };
        sources.iter().map(|source| source.dispatch()).sum()
    }

    fn next_timer_in(&self) -> Option<Duration> {
        let now = Instant::now();
        self.timers
            .borrow()
            .iter()
            .map(|timer| timer.due.saturating_duration_since(now))
            .min()
    }

    fn idle(&self) {
        let wait = match self.next_timer_in() {
            Some(until_timer) => until_timer.min(self.config.idle_wait),
            None => self.config.idle_wait,
        };
        if wait.is_zero() {
            return;
        }

        let waker = self.waker.clone();
        let woken = self
            .runtime
            .block_on(async move { tokio::time::timeout(wait, waker.woken()).await });
        trace!("Pump idle for up to {:?}, woken: {}", wait, woken.is_ok());
    }
}

impl Pump for EventLoop {
    fn process_events(&self) {
        self.depth.set(self.depth.get() + 1);
        let _depth = DepthGuard(&self.depth);

        let handled = self.run_due_timers() + self.run_posted_calls() + self.dispatch_sources();
        if handled == 0 {
            self.idle();
        }
    }

    fn waker(&self) -> PumpWaker {
        self.waker.clone()
    }

    fn add_source(&self, source: Weak<dyn EventSource>) {
        let mut sources = self.sources.borrow_mut();
        sources.push(source);
        debug!("Event source registered, {} active", sources.len());
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.config)
            .field("timers", &self.timers.borrow().len())
            .field("sources", &self.sources.borrow().len())
            .field("depth", &self.depth.get())
            .finish()
    }
}

pub fn shared_event_loop(config: EventLoopConfig) -> io::Result<Rc<EventLoop>> {
    EventLoop::new(config).map(Rc::new)
}
