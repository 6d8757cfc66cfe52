pub mod scenario;
pub mod step;

pub use scenario::{Scenario, ScenarioStore};
pub use step::{ModelError, Rect, Selector, Step};
