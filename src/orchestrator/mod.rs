pub mod machine;
pub mod state;

pub use machine::{Orchestrator, OrchestratorSettings, reset_run};
pub use state::{RunState, StateStore, TurnLock};
