//! Persisted task state: `<home>/.<task-id>/state` as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectTaskStatus {
    Pending,
    Sealed,
    Skipped,
    Failed,
}

/// Final state of one object in a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    pub object_name: String,
    pub status: ObjectTaskStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// Progress record of a multi-object task such as a migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub folder_name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub object_state: Vec<ObjectState>,
}

impl TaskState {
    pub fn new(task_id: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            folder_name: folder_name.into(),
            ..Default::default()
        }
    }

    /// Records (or replaces) the state of `object_name`.
    pub fn record(&mut self, object_name: &str, status: ObjectTaskStatus, comment: impl Into<String>) {
        let state = ObjectState {
            object_name: object_name.to_string(),
            status,
            comment: comment.into(),
        };
        match self
            .object_state
            .iter_mut()
            .find(|s| s.object_name == object_name)
        {
            Some(existing) => *existing = state,
            None => self.object_state.push(state),
        }
    }

    /// `<base>/.<task_id>/state`.
    pub fn path_in(base: &Path, task_id: &str) -> Result<PathBuf, PipelineError> {
        if task_id.is_empty() || task_id.contains(['/', '\\']) || task_id == "." || task_id == ".." {
            return Err(PipelineError::InvalidArgument(format!(
                "invalid task id {task_id:?}"
            )));
        }
        Ok(base.join(format!(".{task_id}")).join("state"))
    }

    /// Loads the state of `task_id` under the user's home directory.
    pub fn load(task_id: &str) -> Result<Self, PipelineError> {
        Self::load_in(&home_dir()?, task_id)
    }

    pub fn load_in(base: &Path, task_id: &str) -> Result<Self, PipelineError> {
        let path = Self::path_in(base, task_id)?;
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes this state under the user's home directory.
    pub fn save(&self) -> Result<PathBuf, PipelineError> {
        self.save_in(&home_dir()?)
    }

    pub fn save_in(&self, base: &Path) -> Result<PathBuf, PipelineError> {
        let path = Self::path_in(base, &self.task_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(task = %self.task_id, path = %path.display(), "task state saved");
        Ok(path)
    }

    /// Removes the task directory under `base`.
    pub fn remove_in(base: &Path, task_id: &str) -> Result<(), PipelineError> {
        let path = Self::path_in(base, task_id)?;
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

fn home_dir() -> Result<PathBuf, PipelineError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidArgument("cannot determine home directory".into()))
}
