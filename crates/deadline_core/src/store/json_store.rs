use crate::error::AppError;
use crate::model::Task;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "tasks.json";
const STORE_ENV_VAR: &str = "DEADLINE_STORE_PATH";
const APP_DIR_NAME: &str = "deadline-tracker";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTasks {
    schema_version: u32,
    #[serde(default = "first_id")]
    next_id: u64,
    tasks: Vec<Task>,
}

fn first_id() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreState {
    pub next_id: u64,
    pub tasks: Vec<Task>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            tasks: Vec::new(),
        }
    }
}

impl StoreState {
    /// Hands out the next id; ids are never handed out twice.
    pub fn allocate_id(&mut self) -> Result<u64, AppError> {
        let id = self.next_id;
        self.next_id = successor(id)?;
        Ok(id)
    }

    /// Keeps the counter ahead of an id that entered the store from outside.
    pub fn reserve_id(&mut self, id: u64) -> Result<(), AppError> {
        if id >= self.next_id {
            self.next_id = successor(id)?;
        }
        Ok(())
    }

    /// Whether `id` was handed out before, whether or not it still exists.
    pub fn was_issued(&self, id: u64) -> bool {
        id < self.next_id
    }

    pub fn position(&self, id: u64) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }
}

fn successor(id: u64) -> Result<u64, AppError> {
    id.checked_add(1)
        .ok_or_else(|| AppError::validation([format!("id {id} is out of range")]))
}

/// Resolves the store file: `DEADLINE_STORE_PATH`, then the configured path,
/// then the per-user application directory.
pub fn store_path(configured: Option<&Path>) -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join(APP_DIR_NAME)
            .join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join(APP_DIR_NAME)
            .join(STORE_FILE_NAME))
    }
}

pub fn load_state(path: &Path) -> Result<StoreState, AppError> {
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let stored: StoredTasks = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid task store {}: {}", path.display(), err))
    })?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    let mut seen = HashSet::with_capacity(stored.tasks.len());
    for task in &stored.tasks {
        if !seen.insert(task.id) {
            return Err(AppError::invalid_data(format!(
                "duplicate task id {} in {}",
                task.id,
                path.display()
            )));
        }
    }

    let mut state = StoreState {
        next_id: stored.next_id.max(first_id()),
        tasks: stored.tasks,
    };
    if let Some(max_id) = state.tasks.iter().map(|task| task.id).max() {
        state.reserve_id(max_id).map_err(|err| {
            AppError::invalid_data(format!("{} in {}", err.message(), path.display()))
        })?;
    }

    Ok(state)
}

pub fn save_state(path: &Path, state: &StoreState) -> Result<(), AppError> {
    let stored = StoredTasks {
        schema_version: SCHEMA_VERSION,
        next_id: state.next_id,
        tasks: state.tasks.clone(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    write_atomic(path, content.as_bytes())
}

/// Writes `content` next to `path` and renames it into place, so readers
/// see either the old file or the new one and never a partial write.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| AppError::io(format!("{}: {}", parent.display(), err)))?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| AppError::io(format!("{} is not a file path", path.display())))?;
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let result = write_temp(&temp_path, content)
        .and_then(|_| std::fs::rename(&temp_path, path))
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)));

    if result.is_err() {
        std::fs::remove_file(&temp_path).ok();
    }
    result
}

fn write_temp(temp_path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
