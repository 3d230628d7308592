//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module       | Commands handled          |
//! |--------------|---------------------------|
//! | `run`        | `Run`, `Resume`           |
//! | `session`    | `Checkpoints`, `Review`   |
//! | `directives` | `Directives`              |
//! | `config`     | `Config`                  |

pub mod config;
pub mod directives;
pub mod run;
pub mod session;

pub use config::cmd_config;
pub use directives::cmd_directives;
pub use run::{cmd_resume, cmd_run};
pub use session::{cmd_checkpoints, cmd_review};
