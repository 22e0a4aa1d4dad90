//! Frame scheduler: drives the simulation once per display refresh.
//!
//! The scheduler thread is the only writer. It owns the [`Simulation`],
//! receives control input over a channel, and applies that input between
//! frames. Each frame is published as an immutable [`Snapshot`] that readers
//! clone out of a shared cell, so nobody ever observes a half-updated frame.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use color_eyre::eyre::{self, eyre, OptionExt, WrapErr};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{
    conjunction::ConjunctionEvent,
    control::CheatSequence,
    simulation::{Simulation, Snapshot},
};

/// How often a blocked [`RefreshSignal`] rechecks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(5);

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Source of refresh ticks.
pub trait RefreshSignal: Send {
    /// Block until the next refresh and return its timestamp. Returns `None`
    /// once the signal is closed or `cancel` has been raised.
    fn wait(&mut self, cancel: &CancelToken) -> Option<Instant>;
}

/// Ticks at a fixed rate. A tick that arrives late is not made up for; the
/// schedule restarts from the late tick.
#[derive(Clone, Debug)]
pub struct FixedRate {
    period: Duration,
    next: Option<Instant>,
}

impl FixedRate {
    pub fn new(hz: f64) -> eyre::Result<Self> {
        let period = Duration::try_from_secs_f64(hz.recip())
            .wrap_err_with(|| format!("invalid refresh rate {hz}"))?;
        Ok(Self { period, next: None })
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl RefreshSignal for FixedRate {
    fn wait(&mut self, cancel: &CancelToken) -> Option<Instant> {
        let due = self.next.unwrap_or_else(Instant::now);
        // sleep in slices so a slow rate cannot hold up cancellation
        let tick = loop {
            if cancel.is_cancelled() {
                return None;
            }
            let now = Instant::now();
            if now >= due {
                break now;
            }
            thread::sleep((due - now).min(CANCEL_POLL));
        };
        let next = due + self.period;
        self.next = Some(if tick >= next { tick + self.period } else { next });
        Some(tick)
    }
}

/// Ticks delivered by whoever owns the real display refresh.
impl RefreshSignal for Receiver<Instant> {
    fn wait(&mut self, cancel: &CancelToken) -> Option<Instant> {
        loop {
            match self.recv_timeout(CANCEL_POLL) {
                Ok(tick) => return Some(tick),
                Err(RecvTimeoutError::Timeout) if !cancel.is_cancelled() => {}
                Err(_) => return None,
            }
        }
    }
}

/// Receives what the scheduler publishes. All methods run on the scheduler
/// thread, after the frame's snapshot has been published.
pub trait Observer: Send {
    fn frame(&mut self, _snapshot: &Arc<Snapshot>) {}
    fn conjunction(&mut self, _event: &ConjunctionEvent) {}
    fn override_engaged(&mut self, _time_scale: f64) {}
}

#[derive(Clone, Debug)]
pub enum SimEvent {
    Frame(Arc<Snapshot>),
    Conjunction(ConjunctionEvent),
    OverrideEngaged(f64),
}

/// Forward everything into a channel. A hung-up receiver is ignored.
impl Observer for Sender<SimEvent> {
    fn frame(&mut self, snapshot: &Arc<Snapshot>) {
        let _ = self.send(SimEvent::Frame(snapshot.clone()));
    }

    fn conjunction(&mut self, event: &ConjunctionEvent) {
        let _ = self.send(SimEvent::Conjunction(event.clone()));
    }

    fn override_engaged(&mut self, time_scale: f64) {
        let _ = self.send(SimEvent::OverrideEngaged(time_scale));
    }
}

/// Run a closure for every new conjunction.
pub struct OnConjunction<F>(pub F);

impl<F: FnMut(&ConjunctionEvent) + Send> Observer for OnConjunction<F> {
    fn conjunction(&mut self, event: &ConjunctionEvent) {
        (self.0)(event);
    }
}

enum Control {
    SetTimeScale(f64),
    TogglePause,
    Unlock,
    EngageOverride,
    Key(String),
}

/// Read access to the latest published frame.
#[derive(Clone, Debug)]
pub struct SnapshotReader(Arc<RwLock<Arc<Snapshot>>>);

impl SnapshotReader {
    pub fn latest(&self) -> Arc<Snapshot> {
        self.0.read().clone()
    }
}

pub struct FrameScheduler {
    sim: Simulation,
    observers: Vec<Box<dyn Observer>>,
}

impl FrameScheduler {
    pub fn new(sim: Simulation) -> Self {
        Self {
            sim,
            observers: Vec::new(),
        }
    }

    #[must_use]
    pub fn observe(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Spawn the scheduler thread. Frames run until the handle is cancelled
    /// or dropped, or the signal closes.
    pub fn start(self, signal: impl RefreshSignal + 'static) -> eyre::Result<SchedulerHandle> {
        let (tx, rx) = mpsc::channel();
        let published = Arc::new(RwLock::new(Arc::new(self.sim.snapshot())));
        let cancel = CancelToken::default();
        let thread = {
            let published = published.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("frame-scheduler".into())
                .spawn(move || self.run(signal, &rx, &published, &cancel))
                .wrap_err("failed to spawn frame scheduler")?
        };
        Ok(SchedulerHandle {
            tx,
            published: SnapshotReader(published),
            cancel,
            thread: Some(thread),
        })
    }

    fn run(
        mut self,
        mut signal: impl RefreshSignal,
        rx: &Receiver<Control>,
        published: &RwLock<Arc<Snapshot>>,
        cancel: &CancelToken,
    ) -> Simulation {
        let mut cheat = CheatSequence::konami();
        let mut last: Option<Instant> = None;
        info!(bodies = self.sim.registry().len(), "frame scheduler started");

        while let Some(tick) = signal.wait(cancel) {
            // a tick that raced with cancellation must not touch the state
            if cancel.is_cancelled() {
                break;
            }

            let mut overrides = Vec::new();
            for msg in rx.try_iter() {
                let control = self.sim.control_mut();
                match msg {
                    Control::SetTimeScale(v) => {
                        let applied = control.set_time_scale(v);
                        debug!(applied, "time scale set");
                    }
                    Control::TogglePause => {
                        let applied = control.toggle_pause();
                        debug!(applied, "pause toggled");
                    }
                    Control::Unlock => control.unlock(),
                    Control::EngageOverride => overrides.push(control.engage_override()),
                    Control::Key(key) => {
                        if cheat.press(&key) {
                            info!("override sequence entered");
                            overrides.push(control.engage_override());
                        }
                    }
                }
            }

            let wall_delta = match last {
                Some(prev) if tick >= prev => (tick - prev).as_secs_f64(),
                Some(prev) => -(prev - tick).as_secs_f64(),
                None => 0.0,
            };
            last = Some(last.map_or(tick, |prev| prev.max(tick)));

            let events = self.sim.step(wall_delta);
            let snapshot = Arc::new(self.sim.snapshot());
            *published.write() = snapshot.clone();

            for observer in &mut self.observers {
                for &time_scale in &overrides {
                    observer.override_engaged(time_scale);
                }
                for event in &events {
                    observer.conjunction(event);
                }
                observer.frame(&snapshot);
            }
        }

        info!(
            frames = self.sim.frame(),
            elapsed = %self.sim.elapsed(),
            conjunctions = self.sim.detector().count(),
            "frame scheduler stopped"
        );
        self.sim
    }
}

/// Control side of a running scheduler. Dropping it cancels the scheduler.
pub struct SchedulerHandle {
    tx: Sender<Control>,
    published: SnapshotReader,
    cancel: CancelToken,
    thread: Option<JoinHandle<Simulation>>,
}

impl SchedulerHandle {
    fn send(&self, control: Control) -> eyre::Result<()> {
        self.tx
            .send(control)
            .map_err(|_| eyre!("frame scheduler is not running"))
    }

    /// Takes effect on the next frame.
    pub fn set_time_scale(&self, value: f64) -> eyre::Result<()> {
        self.send(Control::SetTimeScale(value))
    }

    pub fn toggle_pause(&self) -> eyre::Result<()> {
        self.send(Control::TogglePause)
    }

    pub fn unlock(&self) -> eyre::Result<()> {
        self.send(Control::Unlock)
    }

    pub fn engage_override(&self) -> eyre::Result<()> {
        self.send(Control::EngageOverride)
    }

    /// Feed a key press to the override sequence watcher.
    pub fn press_key(&self, key: &str) -> eyre::Result<()> {
        self.send(Control::Key(key.to_owned()))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published.latest()
    }

    pub fn reader(&self) -> SnapshotReader {
        self.published.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the scheduler and wait for it. No frame runs after this returns.
    /// Hands back the final simulation.
    pub fn cancel(mut self) -> eyre::Result<Simulation> {
        self.cancel.cancel();
        self.thread
            .take()
            .ok_or_eyre("frame scheduler already stopped")?
            .join()
            .map_err(|_| eyre!("frame scheduler panicked"))
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
use crate::{
    bodies::{Body, BodyRegistry},
    config::SimulationConfig,
};

#[cfg(test)]
fn sim() -> Simulation {
    let reg = BodyRegistry::new(vec![
        Body::new("a", 1.0, 30.0, 10.0),
        Body::new("b", 2.0, 45.0, -15.0),
    ])
    .unwrap();
    Simulation::new(SimulationConfig::default(), reg)
}

#[cfg(test)]
fn next_frame(events: &Receiver<SimEvent>) -> Arc<Snapshot> {
    loop {
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            SimEvent::Frame(s) => return s,
            _ => continue,
        }
    }
}

#[test]
fn measured_delta_drives_the_clock() {
    let (tick_tx, tick_rx) = mpsc::channel();
    let (ev_tx, ev_rx) = mpsc::channel();
    let handle = FrameScheduler::new(sim())
        .observe(ev_tx)
        .start(tick_rx)
        .unwrap();
    let t0 = Instant::now();
    tick_tx.send(t0).unwrap();
    assert_eq!(next_frame(&ev_rx).elapsed().as_seconds(), 0.0);
    tick_tx.send(t0 + Duration::from_millis(100)).unwrap();
    let snap = next_frame(&ev_rx);
    assert!((snap.elapsed().as_seconds() - 0.1).abs() < 1e-9);
    assert_eq!(snap.frame, 2);
    assert_eq!(handle.snapshot().frame, 2);
    handle.cancel().unwrap();
}

#[test]
fn control_applies_on_the_next_frame() {
    let (tick_tx, tick_rx) = mpsc::channel();
    let (ev_tx, ev_rx) = mpsc::channel();
    let handle = FrameScheduler::new(sim())
        .observe(ev_tx)
        .start(tick_rx)
        .unwrap();
    let t0 = Instant::now();
    tick_tx.send(t0).unwrap();
    next_frame(&ev_rx);

    handle.set_time_scale(3.0).unwrap();
    tick_tx.send(t0 + Duration::from_millis(100)).unwrap();
    let snap = next_frame(&ev_rx);
    assert_eq!(snap.time_scale(), 3.0);
    assert!((snap.elapsed().as_seconds() - 0.3).abs() < 1e-9);

    handle.toggle_pause().unwrap();
    tick_tx.send(t0 + Duration::from_millis(200)).unwrap();
    let paused = next_frame(&ev_rx);
    assert_eq!(paused.time_scale(), 0.0);
    assert_eq!(paused.elapsed(), snap.elapsed());
    assert_eq!(paused.bodies, snap.bodies);
    handle.cancel().unwrap();
}

#[test]
fn clock_going_backwards_is_absorbed() {
    let (tick_tx, tick_rx) = mpsc::channel();
    let (ev_tx, ev_rx) = mpsc::channel();
    let handle = FrameScheduler::new(sim())
        .observe(ev_tx)
        .start(tick_rx)
        .unwrap();
    let t0 = Instant::now() + Duration::from_secs(1);
    tick_tx.send(t0).unwrap();
    next_frame(&ev_rx);
    tick_tx.send(t0 - Duration::from_millis(500)).unwrap();
    assert_eq!(next_frame(&ev_rx).elapsed().as_seconds(), 0.0);
    tick_tx.send(t0 + Duration::from_millis(50)).unwrap();
    let snap = next_frame(&ev_rx);
    assert!((snap.elapsed().as_seconds() - 0.05).abs() < 1e-9);
    handle.cancel().unwrap();
}

#[test]
fn key_sequence_engages_override() {
    let (tick_tx, tick_rx) = mpsc::channel();
    let (ev_tx, ev_rx) = mpsc::channel();
    let handle = FrameScheduler::new(sim())
        .observe(ev_tx)
        .start(tick_rx)
        .unwrap();
    for key in crate::control::KONAMI {
        handle.press_key(key).unwrap();
    }
    tick_tx.send(Instant::now()).unwrap();
    let mut engaged = None;
    let snap = loop {
        match ev_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            SimEvent::OverrideEngaged(s) => engaged = Some(s),
            SimEvent::Frame(s) => break s,
            SimEvent::Conjunction(_) => {}
        }
    };
    assert_eq!(engaged, Some(10.0));
    assert!(snap.unlocked);
    assert_eq!(snap.time_scale(), 10.0);
    handle.cancel().unwrap();
}

#[test]
fn nothing_runs_after_cancel() {
    let (tick_tx, tick_rx) = mpsc::channel();
    let (ev_tx, ev_rx) = mpsc::channel();
    let handle = FrameScheduler::new(sim())
        .observe(ev_tx)
        .start(tick_rx)
        .unwrap();
    let reader = handle.reader();
    tick_tx.send(Instant::now()).unwrap();
    next_frame(&ev_rx);
    assert!(handle.is_running());

    let sim = handle.cancel().unwrap();
    assert_eq!(reader.latest().frame, sim.frame());
    assert!(tick_tx.send(Instant::now()).is_err());
    while let Ok(ev) = ev_rx.try_recv() {
        if let SimEvent::Frame(s) = ev {
            assert!(s.frame <= sim.frame());
        }
    }
    assert!(ev_rx.recv().is_err());
}

#[test]
fn cancel_unblocks_an_idle_signal() {
    let (_tick_tx, tick_rx) = mpsc::channel::<Instant>();
    let handle = FrameScheduler::new(sim()).start(tick_rx).unwrap();
    let sim = handle.cancel().unwrap();
    assert_eq!(sim.frame(), 0);
}

#[test]
fn fixed_rate_runs_frames() {
    let hits = Arc::new(AtomicBool::new(false));
    let flag = hits.clone();
    let mut s = sim();
    s.control_mut().set_time_scale(5.0);
    let handle = FrameScheduler::new(s)
        .observe(OnConjunction(move |_: &ConjunctionEvent| {
            flag.store(true, Ordering::Relaxed);
        }))
        .start(FixedRate::new(240.0).unwrap())
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    let sim = handle.cancel().unwrap();
    assert!(sim.frame() > 1);
    assert!(sim.elapsed().as_seconds() > 0.0);
    assert_eq!(hits.load(Ordering::Relaxed), sim.detector().count() > 0);
}

#[test]
fn cancel_interrupts_a_slow_rate() {
    let mut rate = FixedRate::new(0.25).unwrap();
    let cancel = CancelToken::default();
    assert!(rate.wait(&cancel).is_some());
    let remote = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        remote.cancel();
    });
    let start = Instant::now();
    assert!(rate.wait(&cancel).is_none());
    assert!(start.elapsed() < Duration::from_secs(1));
    canceller.join().unwrap();

    let handle = FrameScheduler::new(sim())
        .start(FixedRate::new(0.25).unwrap())
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    let start = Instant::now();
    let sim = handle.cancel().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(sim.frame(), 1);
}

#[test]
fn rejects_bad_refresh_rate() {
    assert!(FixedRate::new(0.0).is_err());
    assert!(FixedRate::new(-60.0).is_err());
    assert_eq!(
        FixedRate::new(4.0).unwrap().period(),
        Duration::from_millis(250)
    );
}
