//! Watchdog supervision and auto-heal
//!
//! The supervisor is the only component in the pipeline allowed to retry
//! anything. It polls heartbeat state published by the other subsystems
//! (single writer per field; the supervisor only reads), classifies
//! anomalies into info/warn/error tiers, and fires recovery actions through
//! a per-action cooldown so a persistently broken subsystem cannot cause a
//! restart storm. Every anomaly and recovery is forwarded to a diagnostics
//! sink over an unbounded channel; the supervisor never blocks on the sink.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

/// Severity tier of an anomaly or recovery signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Worth noting, no action taken
    Info,
    /// Degraded; recovery fires at this tier
    Warn,
    /// Badly stalled
    Error,
}

/// What kind of condition a signal reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Recognition is active but hears nothing
    Silence,
    /// Synthesis has been busy too long
    Hang,
    /// Reachability probe failing
    Degraded,
    /// A corrective action was taken (not an error)
    Recovery,
}

/// One diagnostics event from the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorSignal {
    /// Subsystem the signal concerns
    pub subsystem: &'static str,
    /// Condition kind
    pub kind: SignalKind,
    /// Severity tier
    pub severity: Severity,
    /// How long the condition has been measured
    pub measured: Duration,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl SupervisorSignal {
    fn new(
        subsystem: &'static str,
        kind: SignalKind,
        severity: Severity,
        measured: Duration,
    ) -> Self {
        Self {
            subsystem,
            kind,
            severity,
            measured,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Receives supervisor signals; must not block
pub trait DiagnosticsSink: Send + Sync {
    /// Accept one signal, fire-and-forget
    fn emit(&self, signal: SupervisorSignal);
}

/// Default sink: signals become tracing events at their severity
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn emit(&self, signal: SupervisorSignal) {
        match signal.severity {
            Severity::Info => tracing::info!(
                subsystem = signal.subsystem,
                kind = ?signal.kind,
                measured_ms = signal.measured.as_millis(),
                "supervisor signal"
            ),
            Severity::Warn => tracing::warn!(
                subsystem = signal.subsystem,
                kind = ?signal.kind,
                measured_ms = signal.measured.as_millis(),
                "supervisor signal"
            ),
            Severity::Error => tracing::error!(
                subsystem = signal.subsystem,
                kind = ?signal.kind,
                measured_ms = signal.measured.as_millis(),
                "supervisor signal"
            ),
        }
    }
}

/// Network reachability check polled by the supervisor
pub trait ReachabilityProbe: Send + Sync {
    /// True when the target is reachable
    fn probe(&self) -> bool;
}

/// TCP connect probe with a short timeout
pub struct TcpProbe {
    addr: std::net::SocketAddr,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe the given address with the given connect timeout
    #[must_use]
    pub const fn new(addr: std::net::SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }
}

impl ReachabilityProbe for TcpProbe {
    fn probe(&self) -> bool {
        std::net::TcpStream::connect_timeout(&self.addr, self.timeout).is_ok()
    }
}

/// Heartbeat state shared between the pipeline and the supervisor
///
/// Single-writer discipline: each field is written only by the subsystem
/// that owns it. Timestamps are milliseconds since the process-local origin
/// so they fit in an atomic.
pub struct Heartbeats {
    origin: Instant,
    recognition_active: AtomicBool,
    recognition_heard_ms: AtomicU64,
    synthesis_busy: AtomicBool,
    synthesis_since_ms: AtomicU64,
}

impl Default for Heartbeats {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeats {
    /// Create a fresh heartbeat registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            recognition_active: AtomicBool::new(false),
            recognition_heard_ms: AtomicU64::new(0),
            synthesis_busy: AtomicBool::new(false),
            synthesis_since_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Recognition subsystem marks itself running or stopped
    pub fn set_recognition_active(&self, active: bool) {
        self.recognition_heard_ms.store(self.now_ms(), Ordering::Release);
        self.recognition_active.store(active, Ordering::Release);
    }

    /// Recognition subsystem reports it received input
    pub fn recognition_heard(&self) {
        self.recognition_heard_ms.store(self.now_ms(), Ordering::Release);
    }

    /// How long recognition has been silent, if it is marked active
    #[must_use]
    pub fn recognition_silence(&self) -> Option<Duration> {
        if !self.recognition_active.load(Ordering::Acquire) {
            return None;
        }
        let heard = self.recognition_heard_ms.load(Ordering::Acquire);
        Some(Duration::from_millis(self.now_ms().saturating_sub(heard)))
    }

    /// Synthesis subsystem flips its busy flag
    pub fn set_synthesis_busy(&self, busy: bool) {
        if busy {
            self.synthesis_since_ms.store(self.now_ms(), Ordering::Release);
        }
        self.synthesis_busy.store(busy, Ordering::Release);
    }

    /// How long synthesis has been continuously busy
    #[must_use]
    pub fn synthesis_busy_for(&self) -> Option<Duration> {
        if !self.synthesis_busy.load(Ordering::Acquire) {
            return None;
        }
        let since = self.synthesis_since_ms.load(Ordering::Acquire);
        Some(Duration::from_millis(self.now_ms().saturating_sub(since)))
    }
}

/// Per-action cooldown limiter
///
/// Repeated triggers of the same recovery inside the window are suppressed,
/// which is what stands between a persistently broken subsystem and a
/// restart storm.
pub struct RecoveryLimiter {
    cooldown: Duration,
    last_fired: Mutex<HashMap<&'static str, Instant>>,
}

impl RecoveryLimiter {
    /// Create a limiter with the given cooldown window
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Check if `action` may fire now; records the firing when allowed
    pub fn check(&self, action: &'static str) -> bool {
        self.check_with(action, self.cooldown)
    }

    /// Like [`Self::check`], but with a widened window (used when restart
    /// backoff stretches the spacing beyond the base cooldown)
    pub fn check_with(&self, action: &'static str, window: Duration) -> bool {
        let mut map = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some(last) = map.get(action) {
            if now.duration_since(*last) < window {
                return false;
            }
        }

        map.insert(action, now);
        true
    }
}

/// Bounded exponential backoff for supervised restarts
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// First delay; doubles each attempt
    pub base: Duration,
    /// Delay cap
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given restart attempt (0-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.cap)
    }
}

/// Supervisor thresholds and cadences
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Anomaly detection cadence
    pub poll_interval: Duration,
    /// Reachability probe cadence
    pub probe_interval: Duration,
    /// Recovery cooldown per action kind
    pub cooldown: Duration,
    /// Silence below this is normal quiet, not an anomaly
    pub silence_min: Duration,
    /// Silence beyond this is warn tier (and triggers restart)
    pub silence_warn: Duration,
    /// Silence beyond this is error tier
    pub silence_error: Duration,
    /// Busy time below this is a normal utterance
    pub hang_min: Duration,
    /// Busy time beyond this is warn tier (and triggers cancel)
    pub hang_warn: Duration,
    /// Busy time beyond this is error tier
    pub hang_error: Duration,
    /// Restart backoff policy
    pub backoff: BackoffPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            probe_interval: Duration::from_secs(5),
            cooldown: Duration::from_secs(5),
            silence_min: Duration::from_secs(3),
            silence_warn: Duration::from_secs(6),
            silence_error: Duration::from_secs(12),
            hang_min: Duration::from_secs(2),
            hang_warn: Duration::from_secs(4),
            hang_error: Duration::from_secs(8),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Tier a measured duration against warn/error thresholds
const fn classify(measured: Duration, warn: Duration, error: Duration) -> Severity {
    if measured.as_millis() > error.as_millis() {
        Severity::Error
    } else if measured.as_millis() > warn.as_millis() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Recovery hooks the supervisor drives
///
/// The supervisor owns *when* to recover; these closures own *how*.
pub struct RecoveryActions {
    /// Force-cancel in-flight synthesis
    pub cancel_synthesis: Box<dyn Fn() + Send + Sync>,
    /// Restart the recognition subsystem
    pub restart_recognition: Box<dyn Fn() + Send + Sync>,
}

/// The watchdog itself
pub struct Supervisor {
    config: SupervisorConfig,
    heartbeats: std::sync::Arc<Heartbeats>,
    limiter: RecoveryLimiter,
    actions: RecoveryActions,
    probe: Option<Box<dyn ReachabilityProbe>>,
    unreachable_since: Mutex<Option<Instant>>,
    restart_attempts: AtomicU32,
    signal_tx: mpsc::UnboundedSender<SupervisorSignal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<SupervisorSignal>>>,
    sink: std::sync::Arc<dyn DiagnosticsSink>,
}

impl Supervisor {
    /// Create a supervisor over the shared heartbeat registry
    #[must_use]
    pub fn new(
        config: SupervisorConfig,
        heartbeats: std::sync::Arc<Heartbeats>,
        actions: RecoveryActions,
        sink: std::sync::Arc<dyn DiagnosticsSink>,
        probe: Option<Box<dyn ReachabilityProbe>>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            limiter: RecoveryLimiter::new(config.cooldown),
            config,
            heartbeats,
            actions,
            probe,
            unreachable_since: Mutex::new(None),
            restart_attempts: AtomicU32::new(0),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            sink,
        }
    }

    fn forward(&self, signal: SupervisorSignal) {
        // Unbounded send never blocks; the forwarder task drains into the sink
        let _ = self.signal_tx.send(signal);
    }

    /// One detection pass over recognition silence and synthesis hang
    ///
    /// Exposed so tests can drive the watchdog without a timer.
    pub fn poll_once(&self) {
        if let Some(silence) = self.heartbeats.recognition_silence() {
            if silence > self.config.silence_min {
                let severity =
                    classify(silence, self.config.silence_warn, self.config.silence_error);
                self.forward(SupervisorSignal::new(
                    "recognition",
                    SignalKind::Silence,
                    severity,
                    silence,
                ));

                if severity >= Severity::Warn {
                    // Backoff widens the spacing between consecutive restarts
                    let attempt = self.restart_attempts.load(Ordering::Acquire);
                    let window = self
                        .config
                        .cooldown
                        .max(self.config.backoff.delay_for_attempt(attempt));

                    if self.limiter.check_with("restart_recognition", window) {
                        self.restart_attempts.store(attempt + 1, Ordering::Release);
                        tracing::info!(attempt, ?window, "restarting recognition");

                        self.forward(SupervisorSignal::new(
                            "recognition",
                            SignalKind::Recovery,
                            Severity::Warn,
                            silence,
                        ));
                        (self.actions.restart_recognition)();
                    }
                }
            } else {
                // Heard recently: the subsystem is healthy again
                self.restart_attempts.store(0, Ordering::Release);
            }
        }

        if let Some(busy) = self.heartbeats.synthesis_busy_for() {
            if busy > self.config.hang_min {
                let severity = classify(busy, self.config.hang_warn, self.config.hang_error);
                self.forward(SupervisorSignal::new(
                    "synthesis",
                    SignalKind::Hang,
                    severity,
                    busy,
                ));

                if severity >= Severity::Warn && self.limiter.check("cancel_synthesis") {
                    tracing::warn!(busy_ms = busy.as_millis(), "force-cancelling synthesis");
                    self.forward(SupervisorSignal::new(
                        "synthesis",
                        SignalKind::Recovery,
                        Severity::Warn,
                        busy,
                    ));
                    (self.actions.cancel_synthesis)();
                }
            }
        }
    }

    /// One reachability probe pass
    pub fn probe_once(&self) {
        let Some(probe) = self.probe.as_deref() else {
            return;
        };

        let mut since = self.unreachable_since.lock().unwrap_or_else(|e| e.into_inner());
        if probe.probe() {
            if since.take().is_some() {
                tracing::info!("network reachable again");
            }
            return;
        }

        let start = since.get_or_insert_with(Instant::now);
        let unreachable = start.elapsed();
        let severity = classify(unreachable, self.config.silence_warn, self.config.silence_error);

        self.forward(SupervisorSignal::new(
            "network",
            SignalKind::Degraded,
            severity,
            unreachable,
        ));
    }

    /// Run detection until `shutdown` flips true
    ///
    /// Spawns a forwarder task that drains signals into the sink so
    /// detection never blocks on diagnostics.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let rx = self
            .signal_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut rx) = rx {
            let sink = std::sync::Arc::clone(&self.sink);
            tokio::spawn(async move {
                while let Some(signal) = rx.recv().await {
                    sink.emit(signal);
                }
            });
        }

        let mut poll = tokio::time::interval(self.config.poll_interval);
        let mut probe = tokio::time::interval(self.config.probe_interval);
        tracing::info!(
            poll_ms = self.config.poll_interval.as_millis(),
            "supervisor running"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => self.poll_once(),
                _ = probe.tick() => self.probe_once(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("supervisor stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink(AtomicUsize);

    impl DiagnosticsSink for CountingSink {
        fn emit(&self, _signal: SupervisorSignal) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn counting_actions() -> (RecoveryActions, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let cancels = Arc::new(AtomicUsize::new(0));
        let restarts = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&cancels);
        let r = Arc::clone(&restarts);

        let actions = RecoveryActions {
            cancel_synthesis: Box::new(move || {
                c.fetch_add(1, Ordering::Relaxed);
            }),
            restart_recognition: Box::new(move || {
                r.fetch_add(1, Ordering::Relaxed);
            }),
        };
        (actions, cancels, restarts)
    }

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            silence_min: Duration::from_millis(10),
            silence_warn: Duration::from_millis(20),
            silence_error: Duration::from_millis(40),
            hang_min: Duration::from_millis(10),
            hang_warn: Duration::from_millis(20),
            hang_error: Duration::from_millis(40),
            cooldown: Duration::from_millis(100),
            ..SupervisorConfig::default()
        }
    }

    fn supervisor(
        config: SupervisorConfig,
        heartbeats: Arc<Heartbeats>,
        actions: RecoveryActions,
    ) -> Supervisor {
        Supervisor::new(
            config,
            heartbeats,
            actions,
            Arc::new(CountingSink(AtomicUsize::new(0))),
            None,
        )
    }

    // -- classification -------------------------------------------------------

    #[test]
    fn tiers_follow_thresholds() {
        let warn = Duration::from_secs(6);
        let error = Duration::from_secs(12);

        assert_eq!(classify(Duration::from_secs(4), warn, error), Severity::Info);
        assert_eq!(classify(Duration::from_secs(8), warn, error), Severity::Warn);
        assert_eq!(classify(Duration::from_secs(20), warn, error), Severity::Error);
    }

    // -- heartbeats -----------------------------------------------------------

    #[test]
    fn inactive_recognition_reports_no_silence() {
        let hb = Heartbeats::new();
        assert_eq!(hb.recognition_silence(), None);

        hb.set_recognition_active(true);
        assert!(hb.recognition_silence().is_some());

        hb.set_recognition_active(false);
        assert_eq!(hb.recognition_silence(), None);
    }

    #[test]
    fn synthesis_busy_tracks_duration() {
        let hb = Heartbeats::new();
        assert_eq!(hb.synthesis_busy_for(), None);

        hb.set_synthesis_busy(true);
        std::thread::sleep(Duration::from_millis(20));
        let busy = hb.synthesis_busy_for().expect("busy");
        assert!(busy >= Duration::from_millis(15));

        hb.set_synthesis_busy(false);
        assert_eq!(hb.synthesis_busy_for(), None);
    }

    // -- cooldown -------------------------------------------------------------

    #[test]
    fn limiter_fires_once_per_window() {
        let limiter = RecoveryLimiter::new(Duration::from_millis(50));

        assert!(limiter.check("restart"));
        assert!(!limiter.check("restart"));
        assert!(!limiter.check("restart"));

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check("restart"));
    }

    #[test]
    fn limiter_windows_are_per_action() {
        let limiter = RecoveryLimiter::new(Duration::from_secs(5));

        assert!(limiter.check("restart"));
        assert!(limiter.check("cancel"));
        assert!(!limiter.check("restart"));
    }

    // -- backoff --------------------------------------------------------------

    #[test]
    fn backoff_doubles_to_cap() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(8));
    }

    // -- detection ------------------------------------------------------------

    #[test]
    fn hang_triggers_one_cancel_under_repeated_polls() {
        let hb = Arc::new(Heartbeats::new());
        let (actions, cancels, _) = counting_actions();
        let sup = supervisor(fast_config(), Arc::clone(&hb), actions);

        hb.set_synthesis_busy(true);
        std::thread::sleep(Duration::from_millis(30));

        // Repeated triggers inside the cooldown window: exactly one cancel
        for _ in 0..5 {
            sup.poll_once();
        }
        assert_eq!(cancels.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancel_fires_again_after_cooldown() {
        let hb = Arc::new(Heartbeats::new());
        let (actions, cancels, _) = counting_actions();
        let sup = supervisor(fast_config(), Arc::clone(&hb), actions);

        hb.set_synthesis_busy(true);
        std::thread::sleep(Duration::from_millis(30));
        sup.poll_once();
        assert_eq!(cancels.load(Ordering::Relaxed), 1);

        std::thread::sleep(Duration::from_millis(110));
        sup.poll_once();
        assert_eq!(cancels.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn silence_triggers_restart_only_when_active() {
        let hb = Arc::new(Heartbeats::new());
        let (actions, _, restarts) = counting_actions();
        let sup = supervisor(fast_config(), Arc::clone(&hb), actions);

        // Not active: silence never accumulates
        std::thread::sleep(Duration::from_millis(30));
        sup.poll_once();
        assert_eq!(restarts.load(Ordering::Relaxed), 0);

        hb.set_recognition_active(true);
        std::thread::sleep(Duration::from_millis(30));
        sup.poll_once();
        assert_eq!(restarts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn short_hang_is_info_only() {
        let config = SupervisorConfig {
            hang_min: Duration::from_millis(1),
            hang_warn: Duration::from_secs(60),
            hang_error: Duration::from_secs(120),
            ..fast_config()
        };
        let hb = Arc::new(Heartbeats::new());
        let (actions, cancels, _) = counting_actions();
        let sup = supervisor(config, Arc::clone(&hb), actions);

        hb.set_synthesis_busy(true);
        std::thread::sleep(Duration::from_millis(10));
        sup.poll_once();

        // Info tier: signal forwarded but no recovery
        assert_eq!(cancels.load(Ordering::Relaxed), 0);
    }

    // -- probe ----------------------------------------------------------------

    #[test]
    fn failing_probe_reports_degraded() {
        struct DeadProbe;
        impl ReachabilityProbe for DeadProbe {
            fn probe(&self) -> bool {
                false
            }
        }

        let hb = Arc::new(Heartbeats::new());
        let (actions, _, _) = counting_actions();
        let sup = Supervisor::new(
            fast_config(),
            hb,
            actions,
            Arc::new(TracingDiagnostics),
            Some(Box::new(DeadProbe)),
        );

        sup.probe_once();
        let since = sup.unreachable_since.lock().unwrap();
        assert!(since.is_some());
    }
}
