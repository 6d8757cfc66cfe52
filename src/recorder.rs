//! Tap-stream recorder.
//!
//! Subscribes to the host's tap notifications and appends a `tap` step for
//! each one while recording is armed. The recording flag is a plain toggle;
//! taps observed while it is off are discarded without side effects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::capability::{TapEvent, UiTree};
use crate::model::{ScenarioStore, Selector, Step};

pub struct Recorder {
    recording: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Recorder {
    /// Attach to the host's tap stream. Recording starts disarmed.
    pub fn start(ui: &dyn UiTree, store: Arc<Mutex<ScenarioStore>>) -> Self {
        let recording = Arc::new(AtomicBool::new(false));
        let flag = recording.clone();
        let mut taps = ui.subscribe_taps();

        let task = tokio::spawn(async move {
            loop {
                match taps.recv().await {
                    Ok(event) => {
                        if !flag.load(Ordering::SeqCst) {
                            continue;
                        }
                        let step = tap_step(&event);
                        log::debug!("recorded {}", step.summary());
                        store.lock().await.push(step).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("tap stream lagged, {} taps dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            recording,
            task: Some(task),
        }
    }

    pub fn set_recording(&self, on: bool) {
        self.recording.store(on, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Build the step for an observed tap. A stable identifier beats visible
/// text as the selector; the bounds are always captured as the coordinate
/// fallback.
fn tap_step(event: &TapEvent) -> Step {
    let source = &event.source;
    let selector = source
        .element_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| Selector::Id(id.to_string()))
        .or_else(|| {
            source
                .text
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| Selector::Text(t.to_string()))
        });
    Step::Tap {
        selector,
        rect: Some(source.bounds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::mock::{element, MockHost};
    use crate::capability::MemoryPersistence;
    use crate::model::Rect;
    use std::time::Duration;

    async fn store_for(target: &str) -> Arc<Mutex<ScenarioStore>> {
        let persistence = Arc::new(MemoryPersistence::default());
        Arc::new(Mutex::new(ScenarioStore::open(persistence, target).await))
    }

    async fn wait_for_len(store: &Arc<Mutex<ScenarioStore>>, len: usize) {
        for _ in 0..100 {
            if store.lock().await.scenario().len() == len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("store never reached {} steps", len);
    }

    #[tokio::test]
    async fn armed_recorder_appends_tap_steps() {
        let host = Arc::new(MockHost::default());
        let store = store_for("com.example.app").await;
        let recorder = Recorder::start(host.as_ref(), store.clone());
        recorder.set_recording(true);

        host.emit_tap(element(Some("btn_ok"), Some("OK"), Rect::new(10, 20, 100, 40)));
        wait_for_len(&store, 1).await;

        let guard = store.lock().await;
        match &guard.scenario().steps()[0] {
            Step::Tap { selector, rect } => {
                assert_eq!(selector, &Some(Selector::Id("btn_ok".to_string())));
                assert_eq!(rect, &Some(Rect::new(10, 20, 100, 40)));
            }
            other => panic!("expected a tap step, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn disarmed_recorder_discards_taps() {
        let host = Arc::new(MockHost::default());
        let store = store_for("com.example.app").await;
        let recorder = Recorder::start(host.as_ref(), store.clone());
        assert!(!recorder.is_recording());

        host.emit_tap(element(Some("ignored"), None, Rect::new(0, 0, 10, 10)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.lock().await.scenario().is_empty());

        recorder.set_recording(true);
        host.emit_tap(element(Some("kept"), None, Rect::new(0, 0, 10, 10)));
        wait_for_len(&store, 1).await;
    }

    #[tokio::test]
    async fn text_selector_when_no_id_is_available() {
        let host = Arc::new(MockHost::default());
        let store = store_for("com.example.app").await;
        let recorder = Recorder::start(host.as_ref(), store.clone());
        recorder.set_recording(true);

        host.emit_tap(element(None, Some("Submit"), Rect::new(5, 5, 50, 20)));
        host.emit_tap(element(Some(""), None, Rect::new(1, 2, 3, 4)));
        wait_for_len(&store, 2).await;

        let guard = store.lock().await;
        match &guard.scenario().steps()[0] {
            Step::Tap { selector, .. } => {
                assert_eq!(selector, &Some(Selector::Text("Submit".to_string())));
            }
            other => panic!("expected a tap step, got {:?}", other),
        }
        // Empty identifier and no text leaves a coordinate-only step.
        match &guard.scenario().steps()[1] {
            Step::Tap { selector, rect } => {
                assert_eq!(selector, &None);
                assert_eq!(rect, &Some(Rect::new(1, 2, 3, 4)));
            }
            other => panic!("expected a tap step, got {:?}", other),
        }
    }
}
