//! Watchdog and duplex-guard integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cadence_voice::supervisor::{
    DiagnosticsSink, Heartbeats, RecoveryActions, Severity, SignalKind, Supervisor,
    SupervisorConfig, SupervisorSignal,
};
use cadence_voice::turn::{SpeechState, TurnStateMachine};

struct CollectingSink(std::sync::Mutex<Vec<SupervisorSignal>>);

impl DiagnosticsSink for CollectingSink {
    fn emit(&self, signal: SupervisorSignal) {
        self.0.lock().unwrap().push(signal);
    }
}

fn tight_config() -> SupervisorConfig {
    SupervisorConfig {
        hang_min: Duration::from_millis(10),
        hang_warn: Duration::from_millis(20),
        hang_error: Duration::from_millis(60),
        silence_min: Duration::from_millis(10),
        silence_warn: Duration::from_millis(20),
        silence_error: Duration::from_millis(60),
        cooldown: Duration::from_millis(120),
        ..SupervisorConfig::default()
    }
}

#[test]
fn repeated_hang_triggers_recover_once_per_cooldown_window() {
    let heartbeats = Arc::new(Heartbeats::new());
    let cancels = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&cancels);
    let supervisor = Supervisor::new(
        tight_config(),
        Arc::clone(&heartbeats),
        RecoveryActions {
            cancel_synthesis: Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
            restart_recognition: Box::new(|| {}),
        },
        Arc::new(CollectingSink(std::sync::Mutex::new(Vec::new()))),
        None,
    );

    heartbeats.set_synthesis_busy(true);
    std::thread::sleep(Duration::from_millis(30));

    // A storm of anomaly triggers inside one cooldown window
    for _ in 0..8 {
        supervisor.poll_once();
    }
    assert_eq!(cancels.load(Ordering::Relaxed), 1);

    // After the window the action may fire again
    std::thread::sleep(Duration::from_millis(130));
    supervisor.poll_once();
    assert_eq!(cancels.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn supervisor_forwards_tiered_signals_to_the_sink() {
    let heartbeats = Arc::new(Heartbeats::new());
    let sink = Arc::new(CollectingSink(std::sync::Mutex::new(Vec::new())));

    let supervisor = Supervisor::new(
        tight_config(),
        Arc::clone(&heartbeats),
        RecoveryActions {
            cancel_synthesis: Box::new(|| {}),
            restart_recognition: Box::new(|| {}),
        },
        Arc::clone(&sink) as Arc<dyn DiagnosticsSink>,
        None,
    );

    heartbeats.set_synthesis_busy(true);
    tokio::time::sleep(Duration::from_millis(80)).await;
    supervisor.poll_once();

    // Drive the forwarder briefly, then stop it
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let run = tokio::spawn(async move { supervisor.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    run.await.unwrap();

    let signals = sink.0.lock().unwrap();
    let hang = signals
        .iter()
        .find(|s| s.kind == SignalKind::Hang)
        .expect("hang signal should reach the sink");
    assert_eq!(hang.subsystem, "synthesis");
    assert_eq!(hang.severity, Severity::Error);

    assert!(
        signals.iter().any(|s| s.kind == SignalKind::Recovery),
        "recovery should be reported alongside the anomaly"
    );
}

#[test]
fn cancellation_clears_state_and_busy_flag_together() {
    let heartbeats = Arc::new(Heartbeats::new());
    let turn = Arc::new(TurnStateMachine::new(Arc::clone(&heartbeats)));

    turn.begin_speaking("the forecast is rain");
    assert_eq!(turn.state(), SpeechState::Speaking);
    assert!(heartbeats.synthesis_busy_for().is_some());

    // The supervisor's hang recovery path
    turn.cancel_speaking();

    // No observable window where the state is idle but synthesis still busy
    assert_eq!(turn.state(), SpeechState::Idle);
    assert_eq!(heartbeats.synthesis_busy_for(), None);
}

#[test]
fn guard_rejects_while_speaking_and_echoes_after() {
    let heartbeats = Arc::new(Heartbeats::new());
    let turn = TurnStateMachine::new(heartbeats);

    turn.begin_speaking("it is nine in the morning");
    assert!(!turn.guard_incoming("set an alarm"));
    assert!(!turn.guard_incoming("it is nine in the morning"));

    turn.end_speaking();
    assert!(!turn.guard_incoming("it is nine in the morning"));
    assert!(turn.guard_incoming("set an alarm"));
}
