//! The reactive automation core.
//!
//! A directed dependency graph of conditions is recomputed on device events
//! and clock ticks; rising edges fire actions, actions interpret rule
//! programs (waits, timeouts, branches, scenes) and mutate the graph while
//! serialized under a single turn lock.

pub mod clock;
pub mod condition;
pub mod error;
pub mod hub;
pub mod manager;
pub mod model;
pub mod process;
pub mod scene;
pub mod store;
pub mod timers;

pub use clock::ClockService;
pub use condition::{condition_for_model, ConditionNode};
pub use error::EngineError;
pub use hub::HubInterface;
pub use manager::RuleManager;
pub use process::{ConditionManager, RuleProcessManager};
pub use scene::SceneManager;
pub use timers::TimerService;
