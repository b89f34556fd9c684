//! Live worker.
//!
//! A [`LiveWorker`] owns one execution context and one output sink on a
//! dedicated thread, drives the generate→push loop, and reconciles code
//! edits submitted from the controller thread with in-flight execution.
//! Failures are translated into [`WorkerEvent`]s; nothing that user code
//! does can tear down the host process.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use crate::code::CodeUnit;
use crate::config::WorkerConfig;
use crate::context::{Artifact, ExecutionContext, ExecutionOutcome};
use crate::diagnostics::Diagnostic;
use crate::messages::{WorkerEvent, WorkerIdentity};
use crate::sink::OutputSink;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of one worker. Exactly one state at a time; `Finished` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Initializing = 1,
    Running = 2,
    Terminating = 3,
    Finished = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Initializing,
            2 => WorkerState::Running,
            3 => WorkerState::Terminating,
            _ => WorkerState::Finished,
        }
    }
}

/// Command issued against the wrong lifecycle state.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("`{operation}` is not valid in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: WorkerState,
    },
    #[error("worker was not given code before start")]
    NotInitialized,
    #[error("failed to spawn worker thread: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
}

/// Delivery accounting. Rejected writes are retried; a buffer is only ever
/// `dropped` when termination preempted its delivery, so nothing vanishes
/// without trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub buffers_delivered: u64,
    pub rejected_writes: u64,
    pub dropped_buffers: u64,
    pub invoke_failures: u64,
}

#[derive(Default)]
struct StatCells {
    delivered: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
}

/// State shared between the controller-facing handle and the worker loop.
struct Shared {
    state: AtomicU8,
    terminate: AtomicBool,
    /// Latest-wins slot: a newer submission replaces an unconsumed one.
    pending: Mutex<Option<CodeUnit>>,
    stats: StatCells,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Idle as u8),
            terminate: AtomicBool::new(false),
            pending: Mutex::new(None),
            stats: StatCells::default(),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn terminated(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    fn take_pending(&self) -> Option<CodeUnit> {
        self.pending.lock().take()
    }

    fn stats(&self) -> WorkerStats {
        WorkerStats {
            buffers_delivered: self.stats.delivered.load(Ordering::Relaxed),
            rejected_writes: self.stats.rejected.load(Ordering::Relaxed),
            dropped_buffers: self.stats.dropped.load(Ordering::Relaxed),
            invoke_failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }
}

/// Everything the worker thread needs at spawn; consumed by `start`.
struct Boot<C, S> {
    factory: Box<dyn FnOnce(&CodeUnit) -> Result<C, Diagnostic> + Send>,
    sink: S,
    unit: Option<CodeUnit>,
}

/// Controller-side handle to one live worker.
///
/// All commands are safe to call from a thread other than the worker's
/// loop. `terminate` is asynchronous: it requests a stop that takes effect
/// at the next invoke/write boundary, never mid-call.
pub struct LiveWorker<C, S> {
    identity: WorkerIdentity,
    config: WorkerConfig,
    shared: Arc<Shared>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    boot: Option<Boot<C, S>>,
    join: Option<JoinHandle<()>>,
}

impl<C, S> LiveWorker<C, S>
where
    C: ExecutionContext + 'static,
    S: OutputSink + Send + 'static,
{
    /// Create a worker around a context factory and a sink.
    ///
    /// The factory runs on the worker thread (contexts need not be `Send`,
    /// which matters for GL-backed ones); it receives the boot [`CodeUnit`]
    /// and performs the variant's `open`.
    pub fn new<F>(factory: F, sink: S) -> Self
    where
        F: FnOnce(&CodeUnit) -> Result<C, Diagnostic> + Send + 'static,
    {
        let (events_tx, events_rx) = unbounded();
        Self {
            identity: WorkerIdentity {
                id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
                name: String::new(),
            },
            config: WorkerConfig::default(),
            shared: Arc::new(Shared::new()),
            events_tx,
            events_rx,
            boot: Some(Boot {
                factory: Box::new(factory),
                sink,
                unit: None,
            }),
            join: None,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn stats(&self) -> WorkerStats {
        self.shared.stats()
    }

    /// Event stream for this worker. May be drained from any thread.
    pub fn events(&self) -> Receiver<WorkerEvent> {
        self.events_rx.clone()
    }

    /// Bind the worker's name and boot code. `Idle → Initializing`.
    pub fn initialize(&mut self, name: &str, code: &str) -> Result<(), WorkerError> {
        let state = self.state();
        if state != WorkerState::Idle {
            return Err(WorkerError::InvalidState {
                operation: "initialize",
                state,
            });
        }
        let Some(boot) = self.boot.as_mut() else {
            return Err(WorkerError::InvalidState {
                operation: "initialize",
                state,
            });
        };
        boot.unit = Some(CodeUnit::new(name, code));
        self.identity.name = name.to_string();
        self.shared.set_state(WorkerState::Initializing);
        Ok(())
    }

    /// Spawn the worker thread and start the loop.
    ///
    /// The context is opened on the worker thread; open failure emits one
    /// error event and lands in `Finished` without a single invoke.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        let state = self.state();
        if state != WorkerState::Initializing {
            return Err(WorkerError::InvalidState {
                operation: "start",
                state,
            });
        }
        let Some(mut boot) = self.boot.take() else {
            return Err(WorkerError::NotInitialized);
        };
        let Some(unit) = boot.unit.take() else {
            return Err(WorkerError::NotInitialized);
        };

        let identity = self.identity.clone();
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();
        let factory = boot.factory;
        let sink = boot.sink;

        let handle = thread::Builder::new()
            .name(format!("live-worker-{}", identity.id))
            .spawn(move || run_worker(identity, config, shared, events, factory, sink, unit))
            .map_err(|source| WorkerError::Spawn { source })?;
        self.join = Some(handle);
        Ok(())
    }

    /// Queue a new code revision; takes effect at the next loop iteration
    /// boundary, never interrupting a half-produced buffer. Latest wins.
    pub fn submit_code(&self, code: &str) -> Result<(), WorkerError> {
        let state = self.state();
        if state == WorkerState::Finished {
            return Err(WorkerError::InvalidState {
                operation: "submit_code",
                state,
            });
        }
        *self.shared.pending.lock() = Some(CodeUnit::new(&self.identity.name, code));
        Ok(())
    }

    /// Request an asynchronous stop. The loop observes it at the next safe
    /// point; the worker may stay alive briefly after this returns.
    pub fn terminate(&self) {
        self.shared.terminate.store(true, Ordering::Release);
        // Visible as Terminating while the loop winds down.
        let _ = self
            .shared
            .transition(WorkerState::Initializing, WorkerState::Terminating)
            || self
                .shared
                .transition(WorkerState::Running, WorkerState::Terminating);
    }

    /// Wait for the worker thread to exit. Blocks until the in-flight
    /// invoke (if any) returns; user code has no preemption point.
    pub fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl<C, S> Drop for LiveWorker<C, S> {
    fn drop(&mut self) {
        // Signal, don't wait: a stuck invoke would otherwise hang drop.
        self.shared.terminate.store(true, Ordering::Release);
    }
}

enum Exit {
    /// User-requested stop, or the session ended on its own.
    Stopped { last_output: String },
    /// An error event was already emitted; no done signal follows.
    Errored,
}

enum Delivery {
    Delivered,
    DroppedByTermination,
    DeviceLost { rejects: u32 },
}

fn run_worker<C, S>(
    identity: WorkerIdentity,
    config: WorkerConfig,
    shared: Arc<Shared>,
    events: Sender<WorkerEvent>,
    factory: Box<dyn FnOnce(&CodeUnit) -> Result<C, Diagnostic> + Send>,
    mut sink: S,
    unit: CodeUnit,
) where
    C: ExecutionContext,
    S: OutputSink,
{
    let span = tracing::info_span!("live_worker", id = identity.id, name = %identity.name);
    let _guard = span.enter();

    let mut ctx = match factory(&unit) {
        Ok(ctx) => ctx,
        Err(diagnostic) => {
            tracing::warn!(%diagnostic, "open failed");
            let _ = events.send(WorkerEvent::Error {
                worker: identity.clone(),
                diagnostic,
            });
            shared.set_state(WorkerState::Finished);
            return;
        }
    };

    // Skipped when terminate arrived during open; the loop then exits on
    // its first iteration.
    shared.transition(WorkerState::Initializing, WorkerState::Running);
    tracing::info!("worker running");

    let exit = run_loop(&identity, &config, &shared, &events, &mut ctx, &mut sink);

    ctx.close();

    if let Exit::Stopped { last_output } = exit {
        let _ = events.send(WorkerEvent::Done {
            worker: identity.clone(),
            last_output,
        });
    }
    shared.set_state(WorkerState::Finished);
    tracing::info!("worker finished");
}

fn run_loop<C, S>(
    identity: &WorkerIdentity,
    config: &WorkerConfig,
    shared: &Shared,
    events: &Sender<WorkerEvent>,
    ctx: &mut C,
    sink: &mut S,
) -> Exit
where
    C: ExecutionContext,
    S: OutputSink,
{
    loop {
        if shared.terminated() {
            return Exit::Stopped {
                last_output: Diagnostic::user_terminated().message,
            };
        }

        // Pending code takes effect only at this iteration boundary.
        if let Some(unit) = shared.take_pending() {
            tracing::debug!("hot-swapping code");
            if let Err(diagnostic) = ctx.reload(unit.source_text()) {
                tracing::warn!(%diagnostic, "reload failed");
                let _ = events.send(WorkerEvent::Error {
                    worker: identity.clone(),
                    diagnostic,
                });
                return Exit::Errored;
            }
        }

        match ctx.invoke() {
            ExecutionOutcome::Produced(Artifact::Buffer(buffer)) => {
                match deliver(config, shared, sink, &buffer) {
                    Delivery::Delivered => {
                        shared.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Delivery::DroppedByTermination => {
                        shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        return Exit::Stopped {
                            last_output: Diagnostic::user_terminated().message,
                        };
                    }
                    Delivery::DeviceLost { rejects } => {
                        let diagnostic = Diagnostic::device_lost(rejects);
                        tracing::warn!(%diagnostic, "output device lost");
                        let _ = events.send(WorkerEvent::Error {
                            worker: identity.clone(),
                            diagnostic,
                        });
                        return Exit::Errored;
                    }
                }
            }
            ExecutionOutcome::Produced(Artifact::Program(_)) => {
                // Nothing to push; the presenter draws with the program.
                thread::sleep(config.frame_interval);
            }
            ExecutionOutcome::Failed(diagnostic) => {
                // Isolation: the session stays usable, the worker stays
                // Running, the user fixes the code and resubmits.
                shared.stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%diagnostic, "invoke failed");
                let _ = events.send(WorkerEvent::Error {
                    worker: identity.clone(),
                    diagnostic,
                });
                thread::sleep(config.failure_backoff);
            }
            ExecutionOutcome::Aborted => {
                return Exit::Stopped {
                    last_output: String::new(),
                };
            }
        }
    }
}

/// Push one buffer, honoring backpressure.
///
/// A rejected write is retried after a short pause; after the configured
/// bound of consecutive rejections the device is declared lost. A buffer
/// abandoned because termination arrived first is reported as dropped.
fn deliver<S: OutputSink>(
    config: &WorkerConfig,
    shared: &Shared,
    sink: &mut S,
    buffer: &crate::buffer::OutputBuffer,
) -> Delivery {
    let mut rejects = 0u32;
    loop {
        if shared.terminated() {
            return Delivery::DroppedByTermination;
        }
        if sink.write(buffer) {
            return Delivery::Delivered;
        }
        rejects += 1;
        shared.stats.rejected.fetch_add(1, Ordering::Relaxed);
        if rejects >= config.max_consecutive_rejects {
            return Delivery::DeviceLost { rejects };
        }
        thread::sleep(config.reject_backoff);
    }
}
