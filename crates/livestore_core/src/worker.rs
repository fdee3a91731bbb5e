//! Dedicated worker thread that owns the store handle.
//!
//! # Responsibility
//! - Run submitted jobs one at a time, in submission order, on one thread.
//! - Open the handle lazily on first use and route open failures to the
//!   fatal handler.
//! - Pump store change notifications into registered observers after every
//!   job, and poll for commits from other connections at a fixed cadence,
//!   busy or idle.
//!
//! # Invariants
//! - Jobs never run on the submitting thread.
//! - `WorkerContext` and everything reachable from it stay on the worker thread.
//! - After a fatal open error the loop stops; queued jobs are dropped, which
//!   callers observe as `RepoError::WorkerUnavailable`.

use crate::db::DbError;
use crate::store::handle::{Handle, HandleProvider};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

const DEFAULT_THREAD_NAME: &str = "livestore-worker";
const DEFAULT_CHANGE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const MIN_CHANGE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Unit of work executed on the worker thread.
pub type Job = Box<dyn FnOnce(&mut WorkerContext) + Send + 'static>;

/// Receives unrecoverable errors. The default aborts the process.
pub type FatalHandler = Arc<dyn Fn(&FatalError) + Send + Sync + 'static>;

/// Errors after which the repository cannot continue.
#[derive(Debug)]
pub enum FatalError {
    /// The handle provider could not open the store.
    StoreOpen(DbError),
    /// Work was submitted to a worker whose loop has stopped.
    WorkerGone { thread: String },
}

impl Display for FatalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreOpen(err) => write!(f, "store could not be opened: {err}"),
            Self::WorkerGone { thread } => write!(f, "worker `{thread}` is no longer running"),
        }
    }
}

impl Error for FatalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreOpen(err) => Some(err),
            Self::WorkerGone { .. } => None,
        }
    }
}

/// Returned by `Worker::schedule` when the job could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerUnavailable;

impl Display for WorkerUnavailable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker is not running")
    }
}

impl Error for WorkerUnavailable {}

/// Default fatal policy: log, flush and abort.
pub fn abort_on_fatal() -> FatalHandler {
    Arc::new(|err: &FatalError| {
        error!("event=fatal module=worker status=abort error={err}");
        log::logger().flush();
        std::process::abort();
    })
}

#[derive(Clone)]
pub struct WorkerOptions {
    pub thread_name: String,
    /// How often the worker checks for commits made by other connections.
    pub change_poll_interval: Duration,
    pub fatal_handler: FatalHandler,
}

impl WorkerOptions {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            ..Self::default()
        }
    }

    pub fn change_poll_interval(mut self, interval: Duration) -> Self {
        self.change_poll_interval = interval;
        self
    }

    pub fn fatal_handler(mut self, handler: FatalHandler) -> Self {
        self.fatal_handler = handler;
        self
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            change_poll_interval: DEFAULT_CHANGE_POLL_INTERVAL,
            fatal_handler: abort_on_fatal(),
        }
    }
}

/// Worker-side consumer of change notifications.
pub(crate) trait Observer {
    fn id(&self) -> u64;

    /// Table whose commits require a refresh.
    fn table(&self) -> &str;

    /// Re-evaluates and delivers a snapshot if needed. Returns `false` once
    /// the observer is finished and should be dropped.
    fn deliver(&mut self, handle: &Handle) -> bool;
}

/// State owned by the worker thread and lent to each job.
pub struct WorkerContext {
    provider: Box<dyn HandleProvider>,
    fatal: FatalHandler,
    handle: Option<Handle>,
    poisoned: bool,
    observers: Vec<Box<dyn Observer>>,
    _confined: PhantomData<*const ()>,
}

impl WorkerContext {
    fn new(provider: Box<dyn HandleProvider>, fatal: FatalHandler) -> Self {
        Self {
            provider,
            fatal,
            handle: None,
            poisoned: false,
            observers: Vec::new(),
            _confined: PhantomData,
        }
    }

    /// Returns this thread's handle, opening it on first use.
    ///
    /// Returns `None` after a fatal open error.
    pub fn current_handle(&mut self) -> Option<&mut Handle> {
        if self.handle.is_none() && !self.poisoned {
            let started_at = Instant::now();
            match self.provider.open().and_then(Handle::attach) {
                Ok(handle) => {
                    info!(
                        "event=handle_open module=worker status=ok location={} duration_ms={}",
                        self.provider.describe(),
                        started_at.elapsed().as_millis()
                    );
                    self.handle = Some(handle);
                }
                Err(err) => {
                    error!(
                        "event=handle_open module=worker status=error location={} error={}",
                        self.provider.describe(),
                        err
                    );
                    self.poisoned = true;
                    (self.fatal)(&FatalError::StoreOpen(err));
                }
            }
        }
        self.handle.as_mut()
    }

    pub(crate) fn register(&mut self, observer: Box<dyn Observer>) {
        debug!(
            "event=observer_register module=worker subscription_id={} table={}",
            observer.id(),
            observer.table()
        );
        self.observers.push(observer);
    }

    pub(crate) fn unregister(&mut self, id: u64) {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.id() != id);
        if self.observers.len() != before {
            debug!("event=observer_unregister module=worker subscription_id={id}");
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Delivers committed changes to the observers of the touched tables.
    fn pump(&mut self) {
        let Some(handle) = self.handle.as_ref() else {
            return;
        };
        let changed = handle.take_changes();
        if changed.is_empty() {
            return;
        }
        self.observers
            .retain_mut(|observer| !changed.contains(observer.table()) || observer.deliver(handle));
    }

    /// Refreshes every observer when another connection has committed.
    fn poll_external(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match handle.poll_external_commit() {
            Ok(false) => {}
            Ok(true) => {
                let handle = &*handle;
                self.observers.retain_mut(|observer| observer.deliver(handle));
            }
            Err(err) => {
                warn!("event=change_poll module=worker status=error error={err}");
            }
        }
    }
}

/// Cloneable sender side of a running worker thread.
#[derive(Clone)]
pub struct Worker {
    tx: mpsc::UnboundedSender<Job>,
    name: Arc<str>,
    fatal: FatalHandler,
}

impl Worker {
    /// Starts the worker thread. The handle is not opened until the first job.
    pub fn spawn(provider: impl HandleProvider, options: WorkerOptions) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let provider: Box<dyn HandleProvider> = Box::new(provider);
        let fatal = Arc::clone(&options.fatal_handler);
        let poll_interval = options.change_poll_interval;
        let thread_name = options.thread_name.clone();

        std::thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || {
                runtime.block_on(run_loop(provider, rx, poll_interval, fatal, thread_name));
            })?;

        Ok(Self {
            tx,
            name: Arc::from(options.thread_name),
            fatal: options.fatal_handler,
        })
    }

    /// Queues `job` behind every job already submitted.
    ///
    /// A stopped worker is a fatal condition: the fatal handler runs before
    /// the error is returned.
    pub fn schedule(
        &self,
        job: impl FnOnce(&mut WorkerContext) + Send + 'static,
    ) -> Result<(), WorkerUnavailable> {
        self.schedule_quiet(job).map_err(|err| {
            (self.fatal)(&FatalError::WorkerGone {
                thread: self.name.to_string(),
            });
            err
        })
    }

    /// Like `schedule`, without invoking the fatal handler.
    pub(crate) fn schedule_quiet(
        &self,
        job: impl FnOnce(&mut WorkerContext) + Send + 'static,
    ) -> Result<(), WorkerUnavailable> {
        self.tx.send(Box::new(job)).map_err(|_| WorkerUnavailable)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

async fn run_loop(
    provider: Box<dyn HandleProvider>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    poll_interval: Duration,
    fatal: FatalHandler,
    thread_name: String,
) {
    info!("event=worker_start module=worker status=ok thread={thread_name}");
    let mut ctx = WorkerContext::new(provider, fatal);
    let mut jobs = 0u64;

    let mut external = tokio::time::interval(poll_interval.max(MIN_CHANGE_POLL_INTERVAL));
    external.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = external.tick() => ctx.poll_external(),
            received = rx.recv() => match received {
                Some(job) => {
                    job(&mut ctx);
                    jobs += 1;
                    ctx.pump();
                }
                None => break,
            },
        }
        if ctx.poisoned {
            break;
        }
    }

    let status = if ctx.poisoned { "error" } else { "ok" };
    info!(
        "event=worker_stop module=worker status={status} thread={thread_name} jobs={jobs} observers={}",
        ctx.observers.len()
    );
}
