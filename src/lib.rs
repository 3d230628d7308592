pub mod adapter;
pub mod checkpoint;
pub mod compaction;
pub mod config;
pub mod directives;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod lsp;
pub mod process;
pub mod session;
pub mod step;
pub mod tracker;
pub mod ui;
pub mod util;
pub mod verify;
