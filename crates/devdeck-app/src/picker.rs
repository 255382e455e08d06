//! Directory pickers for `{local_dir}` steps
//!
//! Returning `None` means the operator declined; the engine then skips the
//! step and carries on with the rest of the request.

use std::io::Write;
use std::path::{Path, PathBuf};

use devdeck_core::prelude::*;

/// Context shown to the operator when a directory is needed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest {
    pub alias: String,
    pub step_index: usize,
    /// Command with `{dev}` already substituted
    pub command: String,
}

/// Directory selection
#[trait_variant::make(DirectoryPicker: Send)]
pub trait LocalDirectoryPicker {
    async fn pick_directory(&self, request: &PickRequest) -> Option<PathBuf>;
}

/// Always answers with the same directory (or always declines with `None`)
#[derive(Debug, Clone, Default)]
pub struct FixedDirectory(pub Option<PathBuf>);

impl FixedDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Some(path.into()))
    }
}

impl DirectoryPicker for FixedDirectory {
    async fn pick_directory(&self, request: &PickRequest) -> Option<PathBuf> {
        debug!(
            "Using fixed directory {:?} for '{}' step {}",
            self.0, request.alias, request.step_index
        );
        self.0.clone()
    }
}

/// Declines every request
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

impl DirectoryPicker for NoDirectory {
    async fn pick_directory(&self, _request: &PickRequest) -> Option<PathBuf> {
        None
    }
}

/// Asks on the terminal: prompt on stderr, answer on stdin
///
/// An empty answer (or EOF) declines. The answer must name an existing
/// directory.
#[derive(Debug, Clone, Default)]
pub struct PromptDirectory;

impl DirectoryPicker for PromptDirectory {
    async fn pick_directory(&self, request: &PickRequest) -> Option<PathBuf> {
        let prompt = format!(
            "[{}] step {} needs a local directory:\n  {}\nDirectory (empty to skip): ",
            request.alias,
            request.step_index + 1,
            request.command
        );

        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(prompt.as_bytes());
            let _ = stderr.flush();

            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => resolve_answer(&line),
            Ok(Err(e)) => {
                warn!("Failed to read directory from stdin: {}", e);
                None
            }
            Err(e) => {
                error!("Directory prompt task failed: {}", e);
                None
            }
        }
    }
}

/// Turn a typed answer into a canonical directory path
fn resolve_answer(answer: &str) -> Option<PathBuf> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }

    match dunce::canonicalize(Path::new(answer)) {
        Ok(path) if path.is_dir() => Some(path),
        Ok(path) => {
            warn!("{} is not a directory; skipping step", path.display());
            None
        }
        Err(e) => {
            warn!("Cannot use directory '{}': {}", answer, e);
            None
        }
    }
}
