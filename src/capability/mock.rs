//! Scriptable in-memory host used by the player, resolver, and recorder
//! tests. One `MockHost` plays all three interactive capabilities so a test
//! can couple them (e.g. an element that only becomes visible after a number
//! of scroll gestures).

use anyhow::Result;
use async_trait::async_trait;
use image::RgbaImage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{ElementHandle, Gestures, Point, ScreenCapture, TapEvent, UiTree};
use crate::model::Rect;

#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Tap { at: Point, duration_ms: u64 },
    Swipe { from: Point, to: Point, duration_ms: u64 },
}

pub struct MockHost {
    visible: Mutex<Vec<ElementHandle>>,
    /// Elements that appear once enough scroll-down gestures have happened.
    below_fold: Mutex<Vec<(u32, ElementHandle)>>,
    scroll_downs: AtomicU32,
    focused: Mutex<Option<ElementHandle>>,
    screen: Mutex<Option<RgbaImage>>,
    pub clicks: Mutex<Vec<ElementHandle>>,
    pub set_texts: Mutex<Vec<(ElementHandle, String)>>,
    pub gestures: Mutex<Vec<Gesture>>,
    taps_tx: broadcast::Sender<TapEvent>,
}

impl Default for MockHost {
    fn default() -> Self {
        let (taps_tx, _) = broadcast::channel(16);
        Self {
            visible: Mutex::new(Vec::new()),
            below_fold: Mutex::new(Vec::new()),
            scroll_downs: AtomicU32::new(0),
            focused: Mutex::new(None),
            screen: Mutex::new(None),
            clicks: Mutex::new(Vec::new()),
            set_texts: Mutex::new(Vec::new()),
            gestures: Mutex::new(Vec::new()),
            taps_tx,
        }
    }
}

pub fn element(id: Option<&str>, text: Option<&str>, bounds: Rect) -> ElementHandle {
    ElementHandle {
        element_id: id.map(str::to_string),
        text: text.map(str::to_string),
        bounds,
    }
}

impl MockHost {
    pub fn add_element(&self, handle: ElementHandle) {
        self.visible.lock().unwrap().push(handle);
    }

    /// Element that only resolves after `scrolls` scroll-down gestures.
    pub fn add_below_fold(&self, scrolls: u32, handle: ElementHandle) {
        self.below_fold.lock().unwrap().push((scrolls, handle));
    }

    pub fn set_focused(&self, handle: Option<ElementHandle>) {
        *self.focused.lock().unwrap() = handle;
    }

    pub fn set_screen(&self, screen: Option<RgbaImage>) {
        *self.screen.lock().unwrap() = screen;
    }

    pub fn emit_tap(&self, source: ElementHandle) {
        let _ = self.taps_tx.send(TapEvent { source });
    }

    pub fn scroll_down_count(&self) -> u32 {
        self.scroll_downs.load(Ordering::SeqCst)
    }

    fn reveal_scrolled(&self) {
        let count = self.scroll_downs.load(Ordering::SeqCst);
        let mut below = self.below_fold.lock().unwrap();
        let mut visible = self.visible.lock().unwrap();
        below.retain(|(needed, handle)| {
            if *needed <= count {
                visible.push(handle.clone());
                false
            } else {
                true
            }
        });
    }

    fn matching<F: Fn(&ElementHandle) -> bool>(&self, pred: F) -> Vec<ElementHandle> {
        self.visible
            .lock()
            .unwrap()
            .iter()
            .filter(|h| pred(h))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UiTree for MockHost {
    async fn find_by_id(&self, id: &str) -> Vec<ElementHandle> {
        self.matching(|h| h.element_id.as_deref() == Some(id))
    }

    async fn find_by_text(&self, text: &str) -> Vec<ElementHandle> {
        self.matching(|h| h.text.as_deref() == Some(text))
    }

    async fn find_focused_input(&self) -> Option<ElementHandle> {
        self.focused.lock().unwrap().clone()
    }

    async fn click(&self, handle: &ElementHandle) -> Result<()> {
        self.clicks.lock().unwrap().push(handle.clone());
        Ok(())
    }

    async fn set_text(&self, handle: &ElementHandle, text: &str) -> Result<()> {
        self.set_texts
            .lock()
            .unwrap()
            .push((handle.clone(), text.to_string()));
        Ok(())
    }

    fn subscribe_taps(&self) -> broadcast::Receiver<TapEvent> {
        self.taps_tx.subscribe()
    }
}

#[async_trait]
impl Gestures for MockHost {
    async fn tap(&self, at: Point, duration_ms: u64) -> Result<()> {
        self.gestures
            .lock()
            .unwrap()
            .push(Gesture::Tap { at, duration_ms });
        Ok(())
    }

    async fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        self.gestures.lock().unwrap().push(Gesture::Swipe {
            from,
            to,
            duration_ms,
        });
        // An upward stroke scrolls the content down.
        if from.y > to.y {
            self.scroll_downs.fetch_add(1, Ordering::SeqCst);
            self.reveal_scrolled();
        }
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        (720, 1280)
    }
}

#[async_trait]
impl ScreenCapture for MockHost {
    async fn capture_latest(&self) -> Option<RgbaImage> {
        self.screen.lock().unwrap().clone()
    }
}
