//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                          |
//! |----------|-------------------------------------------|
//! | `turn`   | `Orchestrate`, `Grind`                    |
//! | `phase`  | `Status`, `Plan`, `MarkDone`, `Reset`     |
//! | `config` | `Config`                                  |

pub mod config;
pub mod phase;
pub mod turn;

pub use config::cmd_config;
pub use phase::{cmd_mark_done, cmd_plan, cmd_reset, cmd_status};
pub use turn::{cmd_grind, cmd_orchestrate};
