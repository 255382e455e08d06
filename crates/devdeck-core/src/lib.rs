//! # devdeck-core - Core Domain Types
//!
//! Foundation crate for devdeck. Provides domain types, error handling,
//! event definitions, the step model and placeholder substitution.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Devices (`device`)
//! - [`Device`] - An attached device with probed root/overlay state
//! - [`ConnectionStatus`] - Normalized enumeration status
//! - [`DeviceStatus`] - Result of probing a single device
//!
//! ### Steps and Requests (`step`, `request`)
//! - [`Step`] - Closed sum type: shell command, device command, delay
//! - [`StepRecord`] - Persisted, loosely typed form of a step
//! - [`Request`] - A named, ordered list of step records
//! - [`render_command()`] - `{dev}` / `{local_dir}` substitution
//!
//! ### Events (`events`)
//! - [`ProcessEvent`] - Incremental subprocess output and exit
//! - [`ExecutionEvent`] - Structured event stream of one request run
//! - [`DeviceListChange`] - Published device list after a probe cycle
//!
//! ### Runs (`run`)
//! - [`ExecutionRun`] - Ephemeral run record folded from execution events
//! - [`RunStatus`] - Pending, Running, Succeeded, Failed, Cancelled
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `is_fatal()` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use devdeck_core::prelude::*;
//! ```

pub mod device;
pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod request;
pub mod run;
pub mod step;

// Re-export commonly used types at crate root for convenience
pub use device::{resolve_selection, ConnectionStatus, Device, DeviceStatus};
pub use error::{Error, Result, ResultExt};
pub use events::{DeviceListChange, ExecutionEvent, ProcessEvent, SkipReason};
pub use request::{find_request, Request};
pub use run::{ExecutionRun, OutputLine, RunStatus, StepOutput};
pub use step::{
    render_command, substitute_device, substitute_local_dir, Step, StepError, StepKind,
    StepRecord, DEVICE_PLACEHOLDER, LOCAL_DIR_PLACEHOLDER,
};
