// Public API for integration tests and potential library usage

pub mod api;
pub mod background;
pub mod challenge;
pub mod clock;
pub mod goal_pool;
pub mod graph;
pub mod protocol;
pub mod random;
pub mod state;
pub mod types;
