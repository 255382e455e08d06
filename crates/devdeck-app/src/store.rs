//! JSON persistence for saved requests, the work directory and run history
//!
//! Files live in the config directory:
//! - `commands.json`: `{ "work_dir": "...", "requests": [...] }`
//! - `history.json`: most recent run first, at most [`HISTORY_LIMIT`] entries
//!
//! Writes are atomic (temp file + rename). A missing file loads as empty;
//! anything else that goes wrong is an [`Error::Persistence`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use devdeck_core::prelude::*;
use devdeck_core::{find_request, Request, StepRecord};

pub const COMMANDS_FILENAME: &str = "commands.json";
pub const HISTORY_FILENAME: &str = "history.json";

/// Maximum number of history entries kept
pub const HISTORY_LIMIT: usize = 50;

/// Contents of `commands.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommandsFile {
    /// Working directory for command steps; empty means the current dir
    #[serde(default, alias = "WorkDir")]
    pub work_dir: String,

    #[serde(default, alias = "Requests")]
    pub requests: Vec<Request>,
}

impl CommandsFile {
    pub fn work_dir_path(&self) -> Option<PathBuf> {
        let trimmed = self.work_dir.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }
}

/// One executed request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistoryEntry {
    #[serde(alias = "Alias")]
    pub alias: String,

    #[serde(default, alias = "Steps")]
    pub steps: Vec<StepRecord>,

    #[serde(alias = "ExecuteTime")]
    pub execute_time: DateTime<Local>,
}

impl HistoryEntry {
    pub fn for_request(request: &Request, execute_time: DateTime<Local>) -> Self {
        Self {
            alias: request.alias.clone(),
            steps: request.steps.clone(),
            execute_time,
        }
    }
}

/// Insert at the front and drop the oldest entries past [`HISTORY_LIMIT`]
pub fn push_history(history: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
    history.insert(0, entry);
    history.truncate(HISTORY_LIMIT);
}

/// File-level access to the persisted collections
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn commands_path(&self) -> PathBuf {
        self.dir.join(COMMANDS_FILENAME)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILENAME)
    }

    pub fn load_commands(&self) -> Result<CommandsFile> {
        load_json(&self.commands_path())
    }

    pub fn save_commands(&self, commands: &CommandsFile) -> Result<()> {
        save_json(&self.commands_path(), commands)
    }

    pub fn load_history(&self) -> Result<Vec<HistoryEntry>> {
        load_json(&self.history_path())
    }

    pub fn save_history(&self, history: &[HistoryEntry]) -> Result<()> {
        save_json(&self.history_path(), &history)
    }

    /// Record a run at the front of the history file
    pub fn add_history(&self, entry: HistoryEntry) -> Result<Vec<HistoryEntry>> {
        let mut history = self.load_history()?;
        push_history(&mut history, entry);
        self.save_history(&history)?;
        Ok(history)
    }

    pub fn clear_history(&self) -> Result<()> {
        self.save_history(&[])
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No file at {:?}, starting empty", path);
            return Ok(T::default());
        }
        Err(e) => return Err(Error::persistence(path, e.to_string())),
    };

    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content).map_err(|e| Error::persistence(path, e.to_string()))
}

fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::persistence(path, e.to_string()))?;
    }

    let content =
        serde_json::to_string_pretty(value).map_err(|e| Error::persistence(path, e.to_string()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    // Atomic write: write to temp, then rename
    std::fs::write(&temp_path, content).map_err(|e| Error::persistence(path, e.to_string()))?;
    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        Error::persistence(path, e.to_string())
    })?;

    debug!("Saved {:?}", path);
    Ok(())
}

/// In-memory working set of saved requests
///
/// Every mutation is saved before it becomes visible: on a failed save the
/// book keeps its previous contents.
#[derive(Debug)]
pub struct RequestBook {
    store: Store,
    commands: CommandsFile,
}

impl RequestBook {
    pub fn open(store: Store) -> Result<Self> {
        let commands = store.load_commands()?;
        info!(
            "Loaded {} request(s) from {:?}",
            commands.requests.len(),
            store.commands_path()
        );
        Ok(Self { store, commands })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn requests(&self) -> &[Request] {
        &self.commands.requests
    }

    pub fn find(&self, alias: &str) -> Option<&Request> {
        find_request(&self.commands.requests, alias)
    }

    pub fn get(&self, alias: &str) -> Result<&Request> {
        self.find(alias)
            .ok_or_else(|| Error::request_not_found(alias))
    }

    pub fn work_dir(&self) -> Option<PathBuf> {
        self.commands.work_dir_path()
    }

    /// Add a request; aliases must be unique
    pub fn add(&mut self, request: Request) -> Result<()> {
        if request.alias.trim().is_empty() {
            return Err(Error::invalid_request("alias must not be empty"));
        }
        if self.find(&request.alias).is_some() {
            return Err(Error::DuplicateRequest {
                alias: request.alias,
            });
        }
        self.commit(|commands| commands.requests.push(request))
    }

    pub fn remove(&mut self, alias: &str) -> Result<Request> {
        let index = self
            .commands
            .requests
            .iter()
            .position(|r| r.alias == alias)
            .ok_or_else(|| Error::request_not_found(alias))?;
        let removed = self.commands.requests[index].clone();
        self.commit(|commands| {
            commands.requests.remove(index);
        })?;
        Ok(removed)
    }

    pub fn set_work_dir(&mut self, dir: Option<&Path>) -> Result<()> {
        let value = dir
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.commit(|commands| commands.work_dir = value)
    }

    fn commit(&mut self, change: impl FnOnce(&mut CommandsFile)) -> Result<()> {
        let mut next = self.commands.clone();
        change(&mut next);
        self.store.save_commands(&next)?;
        self.commands = next;
        Ok(())
    }
}
