pub mod capability;
pub mod matcher;
pub mod model;
pub mod player;
pub mod recorder;

// Re-export common items
pub use model::{Rect, Scenario, ScenarioStore, Selector, Step};
pub use player::{Player, PlayerConfig};
pub use recorder::Recorder;
