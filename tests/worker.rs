//! Worker lifecycle, hot-swap ordering, and failure-path tests over
//! scripted contexts and sinks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use liveloop::{
    Artifact, Diagnostic, DiagnosticKind, ExecutionContext, ExecutionOutcome, LiveWorker,
    OutputBuffer, OutputSink, ProgramHandle, WorkerConfig, WorkerEvent, WorkerState,
};

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        max_consecutive_rejects: 3,
        reject_backoff: Duration::from_millis(1),
        failure_backoff: Duration::from_millis(1),
        frame_interval: Duration::from_millis(1),
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

const WAIT: Duration = Duration::from_secs(5);

/// Observation shared between a test and its scripted context.
#[derive(Default)]
struct Probe {
    active_code: Mutex<String>,
    reloads: Mutex<Vec<String>>,
    /// Active code at the time of each successful invoke.
    executed: Mutex<Vec<String>>,
    invokes: AtomicU64,
}

/// Context whose behavior is scripted by the test.
struct ScriptedContext {
    probe: Arc<Probe>,
    /// Signals the test that an invoke has started.
    entered: Option<Sender<()>>,
    /// Invoke blocks here until the test releases it (or drops the sender).
    gate: Option<Receiver<()>>,
    failed_invokes: VecDeque<Diagnostic>,
    fail_reload: bool,
    produce_program: bool,
}

impl ScriptedContext {
    fn factory(
        probe: Arc<Probe>,
    ) -> impl FnOnce(&liveloop::CodeUnit) -> Result<Self, Diagnostic> + Send + 'static {
        move |unit: &liveloop::CodeUnit| {
            *probe.active_code.lock() = unit.source_text().to_string();
            Ok(Self {
                probe,
                entered: None,
                gate: None,
                failed_invokes: VecDeque::new(),
                fail_reload: false,
                produce_program: false,
            })
        }
    }
}

impl ExecutionContext for ScriptedContext {
    fn name(&self) -> &str {
        "scripted"
    }

    fn invoke(&mut self) -> ExecutionOutcome {
        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        self.probe.invokes.fetch_add(1, Ordering::Relaxed);
        if let Some(diag) = self.failed_invokes.pop_front() {
            return ExecutionOutcome::Failed(diag);
        }
        if self.produce_program {
            return ExecutionOutcome::Produced(Artifact::Program(ProgramHandle(1)));
        }
        self.probe
            .executed
            .lock()
            .push(self.probe.active_code.lock().clone());
        ExecutionOutcome::Produced(Artifact::Buffer(OutputBuffer::from_bytes(vec![0u8; 4])))
    }

    fn reload(&mut self, code: &str) -> Result<(), Diagnostic> {
        if self.fail_reload {
            return Err(Diagnostic::load_failure("scripted reload failure", Some(2)));
        }
        self.probe.reloads.lock().push(code.to_string());
        *self.probe.active_code.lock() = code.to_string();
        Ok(())
    }
}

#[derive(Clone, Default)]
struct AcceptSink {
    writes: Arc<AtomicU64>,
}

impl OutputSink for AcceptSink {
    fn write(&mut self, _buffer: &OutputBuffer) -> bool {
        self.writes.fetch_add(1, Ordering::Relaxed);
        true
    }
}

struct RejectSink;

impl OutputSink for RejectSink {
    fn write(&mut self, _buffer: &OutputBuffer) -> bool {
        false
    }
}

#[test]
fn open_failure_finishes_without_invoking() {
    let probe = Arc::new(Probe::default());
    let mut worker = LiveWorker::new(
        |_unit: &liveloop::CodeUnit| -> Result<ScriptedContext, Diagnostic> {
            Err(Diagnostic::empty_source())
        },
        AcceptSink::default(),
    );
    let events = worker.events();

    worker.initialize("t", "").unwrap();
    worker.start().unwrap();

    assert!(wait_until(WAIT, || worker.state() == WorkerState::Finished));
    assert_eq!(probe.invokes.load(Ordering::Relaxed), 0);

    match events.recv_timeout(WAIT).unwrap() {
        WorkerEvent::Error { diagnostic, .. } => {
            assert_eq!(diagnostic.kind, DiagnosticKind::EmptySource);
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[test]
fn command_ordering_is_enforced() {
    let probe = Arc::new(Probe::default());
    let mut worker = LiveWorker::new(ScriptedContext::factory(probe), AcceptSink::default());

    assert!(worker.start().is_err(), "start before initialize");
    worker.initialize("t", "boot").unwrap();
    assert!(worker.initialize("t", "boot").is_err(), "double initialize");

    worker.start().unwrap();
    worker.terminate();
    worker.join();
    assert_eq!(worker.state(), WorkerState::Finished);
    assert!(worker.submit_code("late").is_err(), "submit after finish");
}

#[test]
fn terminate_stops_writes_and_emits_one_done() {
    let probe = Arc::new(Probe::default());
    let sink = AcceptSink::default();
    let writes = Arc::clone(&sink.writes);
    let mut worker =
        LiveWorker::new(ScriptedContext::factory(probe), sink).with_config(fast_config());
    let events = worker.events();

    worker.initialize("t", "boot").unwrap();
    worker.start().unwrap();
    assert!(wait_until(WAIT, || worker.stats().buffers_delivered >= 3));
    assert_eq!(worker.state(), WorkerState::Running);

    worker.terminate();
    let at_terminate = writes.load(Ordering::Relaxed);
    worker.join();
    assert_eq!(worker.state(), WorkerState::Finished);

    // At most the one write already in flight lands after terminate.
    let after = writes.load(Ordering::Relaxed);
    assert!(after <= at_terminate + 1, "{after} > {at_terminate} + 1");

    let mut done = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::Done { last_output, .. } => {
                done += 1;
                assert_eq!(last_output, "User terminated.");
            }
            WorkerEvent::Error { diagnostic, .. } => {
                panic!("unexpected error event: {diagnostic}")
            }
        }
    }
    assert_eq!(done, 1);
}

#[test]
fn submitted_code_applies_at_iteration_boundary_latest_wins() {
    let probe = Arc::new(Probe::default());
    let (entered_tx, entered_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();

    let factory = {
        let probe = Arc::clone(&probe);
        move |unit: &liveloop::CodeUnit| {
            *probe.active_code.lock() = unit.source_text().to_string();
            Ok(ScriptedContext {
                probe,
                entered: Some(entered_tx),
                gate: Some(gate_rx),
                failed_invokes: VecDeque::new(),
                fail_reload: false,
                produce_program: false,
            })
        }
    };

    let mut worker =
        LiveWorker::new(factory, AcceptSink::default()).with_config(fast_config());
    worker.initialize("t", "boot").unwrap();
    worker.start().unwrap();

    // First invoke is in flight and blocked on the gate.
    entered_rx.recv_timeout(WAIT).unwrap();
    worker.submit_code("revision A").unwrap();
    worker.submit_code("revision B").unwrap();

    // Release it; the swap may only happen at the next iteration boundary.
    gate_tx.send(()).unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    let reloads = probe.reloads.lock().clone();
    assert_eq!(reloads, vec!["revision B".to_string()], "latest wins, once");
    let executed = probe.executed.lock().clone();
    assert_eq!(executed, vec!["boot".to_string()], "in-flight invoke kept old code");

    // Free-run the gate and let the second invoke finish under revision B.
    drop(gate_tx);
    assert!(wait_until(WAIT, || {
        probe.executed.lock().iter().any(|c| c == "revision B")
    }));
    assert!(!probe.executed.lock().iter().any(|c| c == "revision A"));

    worker.terminate();
    worker.join();
}

#[test]
fn persistent_write_rejection_is_device_lost() {
    let probe = Arc::new(Probe::default());
    let mut worker =
        LiveWorker::new(ScriptedContext::factory(probe), RejectSink).with_config(fast_config());
    let events = worker.events();

    worker.initialize("t", "boot").unwrap();
    worker.start().unwrap();
    worker.join();
    assert_eq!(worker.state(), WorkerState::Finished);

    match events.recv_timeout(WAIT).unwrap() {
        WorkerEvent::Error { diagnostic, .. } => {
            assert_eq!(diagnostic.kind, DiagnosticKind::DeviceLost);
        }
        other => panic!("expected device-lost, got {other:?}"),
    }
    // Every rejected write is accounted for.
    assert_eq!(worker.stats().rejected_writes, 3);
    assert_eq!(worker.stats().buffers_delivered, 0);
}

#[test]
fn reload_failure_finishes_with_error() {
    let probe = Arc::new(Probe::default());
    let factory = {
        let probe = Arc::clone(&probe);
        move |unit: &liveloop::CodeUnit| {
            *probe.active_code.lock() = unit.source_text().to_string();
            Ok(ScriptedContext {
                probe,
                entered: None,
                gate: None,
                failed_invokes: VecDeque::new(),
                fail_reload: true,
                produce_program: false,
            })
        }
    };
    let mut worker =
        LiveWorker::new(factory, AcceptSink::default()).with_config(fast_config());
    let events = worker.events();

    worker.initialize("t", "boot").unwrap();
    worker.start().unwrap();
    assert!(wait_until(WAIT, || worker.stats().buffers_delivered >= 1));

    worker.submit_code("broken").unwrap();
    worker.join();
    assert_eq!(worker.state(), WorkerState::Finished);

    let mut saw_reload_error = false;
    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::Error { diagnostic, .. } => {
                assert_eq!(diagnostic.kind, DiagnosticKind::LoadFailure);
                assert_eq!(diagnostic.line, Some(2));
                saw_reload_error = true;
            }
            WorkerEvent::Done { .. } => panic!("error exit must not emit done"),
        }
    }
    assert!(saw_reload_error);
}

#[test]
fn invoke_failure_keeps_the_worker_running() {
    let probe = Arc::new(Probe::default());
    let factory = {
        let probe = Arc::clone(&probe);
        move |unit: &liveloop::CodeUnit| {
            *probe.active_code.lock() = unit.source_text().to_string();
            Ok(ScriptedContext {
                probe,
                entered: None,
                gate: None,
                failed_invokes: VecDeque::from([
                    Diagnostic::runtime_failure("scripted fault"),
                    Diagnostic::runtime_failure("scripted fault"),
                ]),
                fail_reload: false,
                produce_program: false,
            })
        }
    };
    let mut worker =
        LiveWorker::new(factory, AcceptSink::default()).with_config(fast_config());
    let events = worker.events();

    worker.initialize("t", "boot").unwrap();
    worker.start().unwrap();

    // Production resumes after the faults; the worker never left Running.
    assert!(wait_until(WAIT, || worker.stats().buffers_delivered >= 1));
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(worker.stats().invoke_failures, 2);

    let mut errors = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::Error { diagnostic, .. } => {
                assert_eq!(diagnostic.kind, DiagnosticKind::RuntimeFailure);
                errors += 1;
            }
            WorkerEvent::Done { .. } => panic!("done before terminate"),
        }
    }
    assert_eq!(errors, 2);

    worker.terminate();
    worker.join();
}

#[test]
fn program_artifacts_pace_without_touching_the_sink() {
    let probe = Arc::new(Probe::default());
    let factory = {
        let probe = Arc::clone(&probe);
        move |unit: &liveloop::CodeUnit| {
            *probe.active_code.lock() = unit.source_text().to_string();
            Ok(ScriptedContext {
                probe,
                entered: None,
                gate: None,
                failed_invokes: VecDeque::new(),
                fail_reload: false,
                produce_program: true,
            })
        }
    };
    let sink = AcceptSink::default();
    let writes = Arc::clone(&sink.writes);
    let mut worker = LiveWorker::new(factory, sink).with_config(fast_config());

    worker.initialize("t", "void main() {}").unwrap();
    worker.start().unwrap();
    assert!(wait_until(WAIT, || probe.invokes.load(Ordering::Relaxed) >= 3));
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(writes.load(Ordering::Relaxed), 0);

    worker.terminate();
    worker.join();
    assert_eq!(worker.state(), WorkerState::Finished);
}
