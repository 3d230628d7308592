//! Plugin directives: third-party handlers for workflow steps.
//!
//! A `directive` step names a `(directive_type, name)` pair. The handler
//! registered for that pair is an external command declared in a manifest:
//!
//! ```yaml
//! version: 1
//! directives:
//!   check:
//!     lint:
//!       handler: ./scripts/lint.sh
//!       args: ["{value}"]
//!       timeout: 60
//!       requires: [read_files, run_commands]
//!       inject: true
//! ```
//!
//! The command runs through `sh -c` with a hard timeout. `{root}`,
//! `{workspace}`, `{value}` and `{directive}` are substituted first.
//! Handlers requiring `adapter_access` also receive the adapter session
//! name in `CONDUCTOR_ADAPTER_SESSION`.

pub mod executor;
pub mod manifest;
pub mod registry;
pub mod types;

pub use executor::DirectiveContext;
pub use registry::PluginDirectiveRegistry;
pub use types::{Capability, DirectiveHandler, DirectiveResult};
