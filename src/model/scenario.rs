//! Scenario storage: the ordered step list for one target application and
//! its canonical JSON round-trip through the persistence capability.
//!
//! Loading is deliberately lenient. Unknown step tags are dropped so that
//! older engines can still play newer, partially-understood scenarios, and a
//! corrupt document yields an empty scenario instead of an error; corruption
//! is logged here at the boundary and never surfaced to the player.

use serde::Serialize;
use std::sync::Arc;

use super::step::Step;
use crate::capability::Persistence;

/// Ordered list of steps scoped to one target application identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    target: String,
    steps: Vec<Step>,
}

#[derive(Serialize)]
struct Wire<'a> {
    steps: &'a [Step],
}

impl Scenario {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            steps: Vec::new(),
        }
    }

    /// Target application identifier (package/bundle key).
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Remove the step at `index`, keeping the order of the rest.
    pub fn remove(&mut self, index: usize) -> Option<Step> {
        if index < self.steps.len() {
            Some(self.steps.remove(index))
        } else {
            None
        }
    }

    /// Move the step at `from` to position `to`. Returns false when either
    /// index is out of range.
    pub fn move_step(&mut self, from: usize, to: usize) -> bool {
        if from >= self.steps.len() || to >= self.steps.len() {
            return false;
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        true
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Serialize to the canonical `{"steps": [...]}` JSON document.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&Wire { steps: &self.steps })
            .expect("scenario serialization is infallible")
    }

    /// Deserialize from the canonical JSON document.
    ///
    /// Never fails: unknown step tags and malformed entries are skipped,
    /// and an unreadable document produces an empty scenario.
    pub fn from_json(target: impl Into<String>, raw: &str) -> Self {
        let mut scenario = Scenario::new(target);

        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(err) => {
                log::warn!(
                    "discarding corrupt scenario for '{}': {}",
                    scenario.target,
                    err
                );
                return scenario;
            }
        };

        let Some(items) = value.get("steps").and_then(|s| s.as_array()) else {
            log::warn!(
                "scenario document for '{}' has no steps array",
                scenario.target
            );
            return scenario;
        };

        for item in items {
            match serde_json::from_value::<Step>(item.clone()) {
                Ok(step) => match step.validate() {
                    Ok(()) => scenario.steps.push(step),
                    Err(err) => log::warn!("skipping invalid step: {}", err),
                },
                Err(err) => {
                    // Forward compatibility: a tag this engine does not know
                    // is dropped, not fatal.
                    log::warn!("skipping unrecognized step: {}", err);
                }
            }
        }

        scenario
    }
}

/// A scenario bound to the persistence capability.
///
/// Every mutation persists immediately; last write wins. One store instance
/// is shared by the recorder and the player for a given target.
pub struct ScenarioStore {
    persistence: Arc<dyn Persistence>,
    scenario: Scenario,
}

impl ScenarioStore {
    /// Load the scenario for `target` from persistence, creating an empty
    /// one on first reference.
    pub async fn open(persistence: Arc<dyn Persistence>, target: impl Into<String>) -> Self {
        let target = target.into();
        let scenario = match persistence.load(&target).await {
            Ok(Some(bytes)) => Scenario::from_json(&target, &String::from_utf8_lossy(&bytes)),
            Ok(None) => Scenario::new(&target),
            Err(err) => {
                log::warn!("failed to load scenario for '{}': {}", target, err);
                Scenario::new(&target)
            }
        };
        Self {
            persistence,
            scenario,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub async fn push(&mut self, step: Step) {
        self.scenario.push(step);
        self.persist().await;
    }

    pub async fn remove(&mut self, index: usize) -> Option<Step> {
        let removed = self.scenario.remove(index);
        if removed.is_some() {
            self.persist().await;
        }
        removed
    }

    pub async fn move_step(&mut self, from: usize, to: usize) -> bool {
        let moved = self.scenario.move_step(from, to);
        if moved {
            self.persist().await;
        }
        moved
    }

    pub async fn clear(&mut self) {
        self.scenario.clear();
        self.persist().await;
    }

    async fn persist(&self) {
        let bytes = self.scenario.to_json().into_bytes();
        if let Err(err) = self
            .persistence
            .save(self.scenario.target(), &bytes)
            .await
        {
            log::warn!(
                "failed to persist scenario for '{}': {}",
                self.scenario.target(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MemoryPersistence;
    use crate::model::step::{Rect, Selector};

    fn sample_scenario() -> Scenario {
        let mut s = Scenario::new("com.example.app");
        s.push(Step::Tap {
            selector: Some(Selector::Id("btn_ok".to_string())),
            rect: Some(Rect::new(10, 20, 100, 40)),
        });
        s.push(Step::Sleep { ms: 500 });
        s.push(Step::WaitText {
            text: "Welcome".to_string(),
            timeout_ms: 5000,
        });
        s.push(Step::InputText {
            text: "hello".to_string(),
        });
        s.push(Step::Swipe {
            x1: 100,
            y1: 800,
            x2: 100,
            y2: 200,
            dur_ms: 300,
        });
        s.push(Step::ScrollUntilText {
            text: "Settings".to_string(),
            max_attempts: 4,
            down: true,
        });
        s.push(Step::FindImageLabel {
            label: "Play".to_string(),
        });
        s.push(Step::template(vec![9, 8, 7], 0.85).unwrap());
        s
    }

    #[test]
    fn round_trip_preserves_every_step() {
        let scenario = sample_scenario();
        let json = scenario.to_json();
        let back = Scenario::from_json("com.example.app", &json);
        assert_eq!(back, scenario);
    }

    #[test]
    fn unknown_step_tags_are_skipped() {
        let raw = r#"{"steps":[
            {"type":"sleep","ms":100},
            {"type":"unknown_future_kind","foo":1}
        ]}"#;
        let scenario = Scenario::from_json("t", raw);
        assert_eq!(scenario.len(), 1);
        assert_eq!(scenario.steps()[0], Step::Sleep { ms: 100 });
    }

    #[test]
    fn corrupt_document_loads_empty() {
        assert!(Scenario::from_json("t", "{not json").is_empty());
        assert!(Scenario::from_json("t", "[1,2,3]").is_empty());
        assert!(Scenario::from_json("t", r#"{"other":true}"#).is_empty());
    }

    #[test]
    fn out_of_range_threshold_is_dropped_on_load() {
        let raw = r#"{"steps":[
            {"type":"template","img":"AQID","th":1.7},
            {"type":"sleep","ms":10}
        ]}"#;
        let scenario = Scenario::from_json("t", raw);
        assert_eq!(scenario.len(), 1);
    }

    #[test]
    fn move_and_remove_keep_order() {
        let mut s = Scenario::new("t");
        s.push(Step::Sleep { ms: 1 });
        s.push(Step::Sleep { ms: 2 });
        s.push(Step::Sleep { ms: 3 });

        assert!(s.move_step(2, 0));
        assert_eq!(s.steps()[0], Step::Sleep { ms: 3 });
        assert_eq!(s.steps()[1], Step::Sleep { ms: 1 });

        assert_eq!(s.remove(1), Some(Step::Sleep { ms: 1 }));
        assert_eq!(s.len(), 2);
        assert!(!s.move_step(0, 5));
        assert_eq!(s.remove(9), None);
    }

    #[tokio::test]
    async fn store_persists_after_every_mutation() {
        let persistence = Arc::new(MemoryPersistence::default());
        let mut store = ScenarioStore::open(persistence.clone(), "com.example.app").await;
        assert!(store.scenario().is_empty());

        store.push(Step::Sleep { ms: 42 }).await;
        let saved = persistence.load("com.example.app").await.unwrap().unwrap();
        let reloaded = Scenario::from_json("com.example.app", &String::from_utf8_lossy(&saved));
        assert_eq!(reloaded.len(), 1);

        store.clear().await;
        let saved = persistence.load("com.example.app").await.unwrap().unwrap();
        let reloaded = Scenario::from_json("com.example.app", &String::from_utf8_lossy(&saved));
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn switching_targets_swaps_the_active_scenario() {
        let persistence = Arc::new(MemoryPersistence::default());

        let mut a = ScenarioStore::open(persistence.clone(), "com.app.a").await;
        a.push(Step::Sleep { ms: 1 }).await;

        let b = ScenarioStore::open(persistence.clone(), "com.app.b").await;
        assert!(b.scenario().is_empty());

        let a_again = ScenarioStore::open(persistence, "com.app.a").await;
        assert_eq!(a_again.scenario().len(), 1);
    }
}
