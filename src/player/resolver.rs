//! Selector resolution: direct lookup first, then a bounded directional
//! scroll-search. A miss is a valid terminal value, never an error; the
//! player decides whether to fall back or skip.

use std::sync::Arc;

use crate::capability::{ElementHandle, Gestures, Point, Scheduler, UiTree};
use crate::model::Selector;

/// Settle delay after each scroll gesture before re-attempting lookup.
pub const SCROLL_SETTLE_MS: u64 = 400;

const SCROLL_GESTURE_MS: u64 = 300;

pub struct SelectorResolver {
    ui: Arc<dyn UiTree>,
    gestures: Arc<dyn Gestures>,
    scheduler: Arc<dyn Scheduler>,
}

impl SelectorResolver {
    pub fn new(
        ui: Arc<dyn UiTree>,
        gestures: Arc<dyn Gestures>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            ui,
            gestures,
            scheduler,
        }
    }

    /// Direct lookup by the selector's declared strategy. Takes the first
    /// match when several elements qualify.
    pub async fn resolve(&self, selector: &Selector) -> Option<ElementHandle> {
        let matches = match selector {
            Selector::Id(id) => self.ui.find_by_id(id).await,
            Selector::Text(text) => self.ui.find_by_text(text).await,
        };
        matches.into_iter().next()
    }

    /// Bounded retry: up to `max_down` scroll-down gestures re-attempting
    /// lookup after each, then up to `max_up` scroll-up gestures the same
    /// way. None when the budget is exhausted.
    pub async fn resolve_with_scroll(
        &self,
        selector: &Selector,
        max_down: u32,
        max_up: u32,
    ) -> Option<ElementHandle> {
        for _ in 0..max_down {
            self.scroll_once(true).await;
            self.scheduler.after(SCROLL_SETTLE_MS).await;
            if let Some(handle) = self.resolve(selector).await {
                return Some(handle);
            }
        }
        for _ in 0..max_up {
            self.scroll_once(false).await;
            self.scheduler.after(SCROLL_SETTLE_MS).await;
            if let Some(handle) = self.resolve(selector).await {
                return Some(handle);
            }
        }
        None
    }

    /// One vertical scroll gesture through the screen midline. Scrolling
    /// down strokes upward, revealing content below.
    pub async fn scroll_once(&self, down: bool) {
        let (w, h) = self.gestures.screen_size();
        let x = (w / 2) as i32;
        let near = (h * 3 / 10) as i32;
        let far = (h * 7 / 10) as i32;
        let (from, to) = if down {
            (Point { x, y: far }, Point { x, y: near })
        } else {
            (Point { x, y: near }, Point { x, y: far })
        };
        if let Err(err) = self.gestures.swipe(from, to, SCROLL_GESTURE_MS).await {
            log::warn!("scroll gesture failed: {}", err);
        }
    }
}
