//! devdeck-app - Configuration, persistence and request execution for devdeck
//!
//! This crate owns the saved request book and run history, loads settings,
//! and implements the [`ExecutionEngine`]: a single-flight, FIFO-ordered
//! runner of request steps that reports progress as
//! [`ExecutionEvent`](devdeck_core::ExecutionEvent)s.

pub mod config;
pub mod engine;
pub mod gate;
pub mod picker;
pub mod store;

// Re-export primary types
pub use config::Settings;
pub use engine::{ExecutionEngine, RunCanceller, RunHandle, DEFAULT_EVENT_BUFFER};
pub use gate::{ExecutionGate, GatePermit, GateSnapshot, GateTicket};
pub use picker::{
    DirectoryPicker, FixedDirectory, LocalDirectoryPicker, NoDirectory, PickRequest,
    PromptDirectory,
};
pub use store::{CommandsFile, HistoryEntry, RequestBook, Store, HISTORY_LIMIT};
