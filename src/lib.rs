pub mod classify;
pub mod config;
pub mod e2e;
pub mod errors;
pub mod grind;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod runner;
pub mod scratchpad;
pub mod tracker;
pub mod turn;
