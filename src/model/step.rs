use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::capability::Point;

/// Errors raised when a step is constructed with invalid data.
///
/// These indicate programming or data errors and fail fast; runtime
/// resolution misses are not errors (see the player).
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("invalid selector '{0}': expected 'id:<value>' or 'text:<value>'")]
    InvalidSelector(String),
    #[error("threshold {0} outside [0.0, 1.0]")]
    InvalidThreshold(f32),
}

/// Symbolic reference to a UI element.
///
/// The prefix decides the lookup strategy: `id:` matches the stable element
/// identifier, `text:` matches visible text. The two are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(String),
    Text(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        if let Some(v) = raw.strip_prefix("id:") {
            Ok(Selector::Id(v.to_string()))
        } else if let Some(v) = raw.strip_prefix("text:") {
            Ok(Selector::Text(v.to_string()))
        } else {
            Err(ModelError::InvalidSelector(raw.to_string()))
        }
    }
}

impl FromStr for Selector {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Id(v) => write!(f, "id:{}", v),
            Selector::Text(v) => write!(f, "text:{}", v),
        }
    }
}

impl Serialize for Selector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Selector::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Bounding rectangle captured at record time, used as the positional
/// fallback when a selector no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + (self.w / 2) as i32,
            y: self.y + (self.h / 2) as i32,
        }
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw).map_err(serde::de::Error::custom)
    }
}

/// One recorded or authored playback action.
///
/// The wire tag and field names are the canonical scenario JSON form and
/// must stay stable across versions; unknown tags are skipped on load so
/// older engines can play newer scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Click a symbolic target, with an optional positional fallback.
    Tap {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<Selector>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rect: Option<Rect>,
    },
    /// Pure timed delay.
    Sleep { ms: u64 },
    /// Block advance until the text appears or the timeout elapses.
    WaitText {
        text: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    /// Set text into the currently focused input.
    InputText { text: String },
    /// Single-stroke gesture from point to point.
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        #[serde(rename = "dur")]
        dur_ms: u64,
    },
    /// Repeated scroll gesture until the text is found or attempts run out.
    ScrollUntilText {
        text: String,
        #[serde(rename = "max")]
        max_attempts: u32,
        down: bool,
    },
    /// Text-based visual search with the same scroll fallback as Tap.
    FindImageLabel { label: String },
    /// Locate a captured sub-image on the current screen and tap its center.
    Template {
        #[serde(rename = "img", with = "b64")]
        image: Vec<u8>,
        #[serde(rename = "th")]
        threshold: f32,
    },
}

impl Step {
    /// Build a Template step, rejecting thresholds outside [0, 1].
    pub fn template(image: Vec<u8>, threshold: f32) -> Result<Self, ModelError> {
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(ModelError::InvalidThreshold(threshold));
        }
        Ok(Step::Template { image, threshold })
    }

    /// Re-check invariants on a step decoded from untrusted bytes.
    pub fn validate(&self) -> Result<(), ModelError> {
        if let Step::Template { threshold, .. } = self {
            if !(0.0..=1.0).contains(threshold) || threshold.is_nan() {
                return Err(ModelError::InvalidThreshold(*threshold));
            }
        }
        Ok(())
    }

    /// Short human-readable description, used by listings and events.
    pub fn summary(&self) -> String {
        match self {
            Step::Tap {
                selector: Some(s), ..
            } => format!("tap {}", s),
            Step::Tap { rect: Some(r), .. } => format!("tap at ({}, {})", r.x, r.y),
            Step::Tap { .. } => "tap (empty)".to_string(),
            Step::Sleep { ms } => format!("sleep {}ms", ms),
            Step::WaitText { text, timeout_ms } => {
                format!("wait for '{}' ({}ms)", text, timeout_ms)
            }
            Step::InputText { text } => format!("input '{}'", text),
            Step::Swipe {
                x1,
                y1,
                x2,
                y2,
                dur_ms,
            } => format!("swipe {},{} -> {},{} ({}ms)", x1, y1, x2, y2, dur_ms),
            Step::ScrollUntilText {
                text,
                max_attempts,
                down,
            } => format!(
                "scroll {} until '{}' (max {})",
                if *down { "down" } else { "up" },
                text,
                max_attempts
            ),
            Step::FindImageLabel { label } => format!("find label '{}'", label),
            Step::Template { threshold, .. } => format!("match template (th {:.2})", threshold),
        }
    }
}
