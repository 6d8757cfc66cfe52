//! Host capability interfaces.
//!
//! The engine never performs platform I/O itself. A host (an accessibility
//! service, a browser DOM bridge, a desktop automation API) implements these
//! traits and the engine stays portable across them. All capabilities are
//! assumed synchronous-returning even when the host backs them with
//! asynchronous primitives.

use anyhow::Result;
use async_trait::async_trait;
use image::RgbaImage;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

use crate::model::Rect;

#[cfg(test)]
pub mod mock;

/// Screen coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Opaque reference to a resolved UI element.
///
/// Valid only for the current UI-tree snapshot; holding one across tree
/// changes is undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementHandle {
    pub element_id: Option<String>,
    pub text: Option<String>,
    pub bounds: Rect,
}

/// Notification of a user tap observed by the host, delivered to the
/// recorder.
#[derive(Debug, Clone)]
pub struct TapEvent {
    pub source: ElementHandle,
}

/// Query and act on the host's UI tree.
#[async_trait]
pub trait UiTree: Send + Sync {
    /// All elements whose stable identifier matches exactly.
    async fn find_by_id(&self, id: &str) -> Vec<ElementHandle>;

    /// All elements whose visible text matches exactly.
    async fn find_by_text(&self, text: &str) -> Vec<ElementHandle>;

    /// The currently focused input element, if any.
    async fn find_focused_input(&self) -> Option<ElementHandle>;

    /// Perform a click action on a resolved element.
    async fn click(&self, handle: &ElementHandle) -> Result<()>;

    /// Set the text content of a resolved element.
    async fn set_text(&self, handle: &ElementHandle, text: &str) -> Result<()>;

    /// Stream of tap notifications for recording.
    fn subscribe_taps(&self) -> broadcast::Receiver<TapEvent>;
}

/// Dispatch raw gestures at screen coordinates.
#[async_trait]
pub trait Gestures: Send + Sync {
    /// Tap at a point, holding for `duration_ms`.
    async fn tap(&self, at: Point, duration_ms: u64) -> Result<()>;

    /// Single-stroke swipe between two points.
    async fn swipe(&self, from: Point, to: Point, duration_ms: u64) -> Result<()>;

    /// Screen dimensions in pixels.
    fn screen_size(&self) -> (u32, u32);
}

/// Access to the latest screen bitmap.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// The most recent frame, or None when no capture session exists.
    async fn capture_latest(&self) -> Option<RgbaImage>;
}

/// Key-value persistence keyed by target identifier. Last write wins.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, target_id: &str, bytes: &[u8]) -> Result<()>;

    async fn load(&self, target_id: &str) -> Result<Option<Vec<u8>>>;
}

/// The sole suspension primitive: resume after an interval.
///
/// Every wait in the engine (sleeps, poll loops, settle delays) goes through
/// this trait, so a host can substitute virtual time and a stopped session
/// can cancel all pending resumptions by dropping its task.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn after(&self, ms: u64);
}

/// Production scheduler backed by the Tokio timer.
#[derive(Debug, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn after(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

/// In-memory persistence, used by tests and as a reference implementation.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn save(&self, target_id: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(target_id.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, target_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(target_id).cloned())
    }
}
