//! The playback state machine.
//!
//! One logical task drives a session: steps never execute concurrently, and
//! every wait is a scheduled resumption through the `Scheduler` capability.
//! Stopping aborts the session task, which cancels all pending resumptions
//! at once. A step that cannot be resolved is skipped or falls back to its
//! recorded rectangle; a single miss never halts the session.

pub mod events;
pub mod resolver;
pub mod session;

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::capability::{Gestures, Scheduler, ScreenCapture, UiTree};
use crate::matcher;
use crate::model::{ScenarioStore, Selector, Step};
use events::{ConsoleEventListener, EventEmitter, PlayerEvent};
use resolver::SelectorResolver;
use session::{PlaybackSession, PlayerState};

/// Fixed settle delay between discrete actions, letting the target UI
/// settle before the next resolution attempt. A correctness measure, not a
/// cosmetic pace.
pub const STEP_SETTLE_MS: u64 = 600;

/// Poll interval for text-presence waits.
pub const TEXT_POLL_MS: u64 = 200;

const TAP_GESTURE_MS: u64 = 50;

/// Playback preferences. Defaults mirror the recorded-preference defaults
/// of the reference host (repeat off, infinite count, 500 ms loop delay).
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub repeat_enabled: bool,
    /// Full passes to play when repeat is on; 0 means loop forever.
    pub repeat_count: u32,
    pub repeat_delay_ms: u64,
    /// Scroll-search budget: downward attempts, then upward attempts.
    pub max_scroll_down: u32,
    pub max_scroll_up: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            repeat_enabled: false,
            repeat_count: 0,
            repeat_delay_ms: 500,
            max_scroll_down: 3,
            max_scroll_up: 2,
        }
    }
}

struct PlayerInner {
    ui: Arc<dyn UiTree>,
    gestures: Arc<dyn Gestures>,
    capture: Arc<dyn ScreenCapture>,
    scheduler: Arc<dyn Scheduler>,
    resolver: SelectorResolver,
    store: Arc<Mutex<ScenarioStore>>,
    config: PlayerConfig,
    session: Mutex<PlaybackSession>,
    emitter: EventEmitter,
}

/// Drives playback of the scenario in its store against the host
/// capabilities.
pub struct Player {
    inner: Arc<PlayerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn new(
        ui: Arc<dyn UiTree>,
        gestures: Arc<dyn Gestures>,
        capture: Arc<dyn ScreenCapture>,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<Mutex<ScenarioStore>>,
        config: PlayerConfig,
    ) -> Self {
        let (emitter, receiver) = EventEmitter::new();
        tokio::spawn(ConsoleEventListener::listen(receiver));

        let resolver = SelectorResolver::new(ui.clone(), gestures.clone(), scheduler.clone());
        Self {
            inner: Arc::new(PlayerInner {
                ui,
                gestures,
                capture,
                scheduler,
                resolver,
                store,
                config,
                session: Mutex::new(PlaybackSession::new()),
                emitter,
            }),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to playback status events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PlayerEvent> {
        self.inner.emitter.subscribe()
    }

    /// Start playback from step 0. Idempotent: a second call while a
    /// session is running is a no-op and leaves the session untouched.
    pub async fn play(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        let (target, step_count) = {
            let store = self.inner.store.lock().await;
            (
                store.scenario().target().to_string(),
                store.scenario().len(),
            )
        };
        {
            let mut session = self.inner.session.lock().await;
            session.begin(
                self.inner.config.repeat_enabled,
                self.inner.config.repeat_count,
            );
        }
        self.inner
            .emitter
            .emit(PlayerEvent::PlaybackStarted { target, step_count });

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move { inner.run().await }));
    }

    /// Stop playback, cancelling every pending scheduled resumption.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        let mut session = self.inner.session.lock().await;
        if session.is_running() {
            let at_index = session.index;
            session.state = PlayerState::Idle;
            drop(session);
            self.inner
                .emitter
                .emit(PlayerEvent::PlaybackStopped { at_index });
        }
    }

    /// Execute exactly one step and return to Idle. Never enters repeat
    /// logic; a no-op while a session is running. Past the last step, the
    /// cursor wraps to 0 without executing.
    pub async fn step(&self) {
        if let Some(handle) = self.task.lock().await.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        {
            let mut session = self.inner.session.lock().await;
            if session.state != PlayerState::Idle {
                return;
            }
            session.state = PlayerState::Stepping;
        }

        let (index, step) = {
            let store = self.inner.store.lock().await;
            let session = self.inner.session.lock().await;
            (
                session.index,
                store.scenario().steps().get(session.index).cloned(),
            )
        };

        let mut advance = false;
        if let Some(step) = &step {
            self.inner.execute_step(index, step).await;
            advance = true;
        }

        let mut session = self.inner.session.lock().await;
        if advance {
            session.index += 1;
        } else {
            session.index = 0;
        }
        session.state = PlayerState::Idle;
    }

    /// Clear all steps and persist immediately. Force-stops a running
    /// session first: replaying against a cleared list is never allowed.
    pub async fn clear(&self) {
        self.stop().await;
        self.inner.store.lock().await.clear().await;
    }

    pub async fn is_running(&self) -> bool {
        self.inner.session.lock().await.is_running()
    }
}

impl PlayerInner {
    async fn run(self: Arc<Self>) {
        loop {
            let (index, step) = {
                let store = self.store.lock().await;
                let session = self.session.lock().await;
                (
                    session.index,
                    store.scenario().steps().get(session.index).cloned(),
                )
            };

            match step {
                Some(step) => {
                    self.execute_step(index, &step).await;
                    self.session.lock().await.index += 1;
                    self.suspend(STEP_SETTLE_MS).await;
                }
                None => {
                    if self.finish_pass().await {
                        break;
                    }
                }
            }
        }
    }

    /// End-of-list handling. Returns true when the session is done.
    async fn finish_pass(self: &Arc<Self>) -> bool {
        let len = self.store.lock().await.scenario().len();
        let mut session = self.session.lock().await;

        let loop_again = len > 0
            && self.config.repeat_enabled
            && match session.loops_remaining {
                None => true,
                Some(n) => {
                    session.loops_remaining = Some(n - 1);
                    n - 1 > 0
                }
            };

        if loop_again {
            let remaining = session.loops_remaining;
            session.index = 0;
            drop(session);
            self.emitter.emit(PlayerEvent::LoopFinished { remaining });
            if self.config.repeat_delay_ms > 0 {
                self.suspend(self.config.repeat_delay_ms).await;
            }
            false
        } else {
            session.state = PlayerState::Idle;
            drop(session);
            let target = self.store.lock().await.scenario().target().to_string();
            self.emitter.emit(PlayerEvent::PlaybackFinished { target });
            true
        }
    }

    /// Suspend via the scheduler, surfacing the WaitingAsync state while
    /// parked.
    async fn suspend(&self, ms: u64) {
        let prev = {
            let mut session = self.session.lock().await;
            let prev = session.state;
            session.state = PlayerState::WaitingAsync;
            prev
        };
        self.scheduler.after(ms).await;
        self.session.lock().await.state = prev;
    }

    fn completed(&self, index: usize) {
        self.emitter.emit(PlayerEvent::StepCompleted { index });
    }

    fn skipped(&self, index: usize, reason: &str) {
        self.emitter.emit(PlayerEvent::StepSkipped {
            index,
            reason: reason.to_string(),
        });
    }

    /// Execute one step. The step always "finishes": resolution misses end
    /// in a fallback or a skip, and the caller advances the index
    /// regardless.
    async fn execute_step(&self, index: usize, step: &Step) {
        self.emitter.emit(PlayerEvent::StepStarted {
            index,
            summary: step.summary(),
        });

        match step {
            Step::Tap { selector, rect } => match selector {
                Some(selector) => {
                    if let Some(handle) = self.resolver.resolve(selector).await {
                        self.click(&handle).await;
                        self.completed(index);
                        return;
                    }
                    self.suspend_marker().await;
                    let found = self
                        .resolver
                        .resolve_with_scroll(
                            selector,
                            self.config.max_scroll_down,
                            self.config.max_scroll_up,
                        )
                        .await;
                    self.resume_marker().await;
                    if let Some(handle) = found {
                        self.click(&handle).await;
                        self.completed(index);
                    } else if let Some(rect) = rect {
                        self.gesture_tap(rect.center()).await;
                        self.emitter.emit(PlayerEvent::StepFellBack { index });
                    } else {
                        self.skipped(index, "target not found");
                    }
                }
                None => {
                    // Pure-coordinate step: resolution is skipped entirely.
                    if let Some(rect) = rect {
                        self.gesture_tap(rect.center()).await;
                        self.completed(index);
                    } else {
                        self.skipped(index, "empty tap step");
                    }
                }
            },

            Step::Sleep { ms } => {
                self.suspend(*ms).await;
                self.completed(index);
            }

            Step::WaitText { text, timeout_ms } => {
                let found = self.poll_for_text(text, *timeout_ms).await;
                if found {
                    self.completed(index);
                } else {
                    // A timeout is a continuation signal, not a failure.
                    self.skipped(index, "text not seen before timeout");
                }
            }

            Step::InputText { text } => {
                match self.ui.find_focused_input().await {
                    Some(handle) => {
                        if let Err(err) = self.ui.set_text(&handle, text).await {
                            log::warn!("set_text failed: {}", err);
                        }
                        self.completed(index);
                    }
                    // Absence of a focused field is silently ignored.
                    None => self.skipped(index, "no focused input"),
                }
            }

            Step::Swipe {
                x1,
                y1,
                x2,
                y2,
                dur_ms,
            } => {
                let from = crate::capability::Point { x: *x1, y: *y1 };
                let to = crate::capability::Point { x: *x2, y: *y2 };
                if let Err(err) = self.gestures.swipe(from, to, *dur_ms).await {
                    log::warn!("swipe gesture failed: {}", err);
                }
                self.completed(index);
            }

            Step::ScrollUntilText {
                text,
                max_attempts,
                down,
            } => {
                let mut found = !self.ui.find_by_text(text).await.is_empty();
                let mut attempts = 0;
                while !found && attempts < *max_attempts {
                    self.resolver.scroll_once(*down).await;
                    self.suspend(resolver::SCROLL_SETTLE_MS).await;
                    found = !self.ui.find_by_text(text).await.is_empty();
                    attempts += 1;
                }
                if found {
                    self.completed(index);
                } else {
                    self.skipped(index, "text not found after scrolling");
                }
            }

            Step::FindImageLabel { label } => {
                let selector = Selector::Text(label.clone());
                let handle = match self.resolver.resolve(&selector).await {
                    Some(h) => Some(h),
                    None => {
                        self.suspend_marker().await;
                        let found = self
                            .resolver
                            .resolve_with_scroll(
                                &selector,
                                self.config.max_scroll_down,
                                self.config.max_scroll_up,
                            )
                            .await;
                        self.resume_marker().await;
                        found
                    }
                };
                match handle {
                    Some(h) => {
                        self.click(&h).await;
                        self.completed(index);
                    }
                    None => self.skipped(index, "label not found"),
                }
            }

            Step::Template { image, threshold } => {
                let Some(screen) = self.capture.capture_latest().await else {
                    // No capture session: skip-with-advance, consistent
                    // with the rest of the step taxonomy.
                    self.skipped(index, "no screen capture source");
                    return;
                };
                let Some(template) = matcher::decode_image(image) else {
                    self.skipped(index, "template image undecodable");
                    return;
                };
                match matcher::find_template(&screen, &template, *threshold) {
                    Some(rect) => {
                        self.gesture_tap(rect.center()).await;
                        self.completed(index);
                    }
                    None => self.skipped(index, "template not matched"),
                }
            }
        }
    }

    /// Poll for text presence at a fixed interval until found or the
    /// timeout budget is spent.
    async fn poll_for_text(&self, text: &str, timeout_ms: u64) -> bool {
        if !self.ui.find_by_text(text).await.is_empty() {
            return true;
        }
        let attempts = timeout_ms.div_ceil(TEXT_POLL_MS);
        for _ in 0..attempts {
            self.suspend(TEXT_POLL_MS).await;
            if !self.ui.find_by_text(text).await.is_empty() {
                return true;
            }
        }
        false
    }

    async fn click(&self, handle: &crate::capability::ElementHandle) {
        if let Err(err) = self.ui.click(handle).await {
            log::warn!("click failed: {}", err);
        }
    }

    async fn gesture_tap(&self, at: crate::capability::Point) {
        if let Err(err) = self.gestures.tap(at, TAP_GESTURE_MS).await {
            log::warn!("tap gesture failed: {}", err);
        }
    }

    async fn suspend_marker(&self) {
        self.session.lock().await.state = PlayerState::WaitingAsync;
    }

    async fn resume_marker(&self) {
        self.session.lock().await.state = PlayerState::Running;
    }
}
