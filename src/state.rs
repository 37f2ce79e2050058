//! Workspace state management - the record of what has been applied where
//!
//! State lives in `.recipes/state.json` under the workspace root:
//!
//! ```json
//! {
//!   "workspace": { "logging": true, "setup-logging.applied": true },
//!   "projects": { "apps/api": { "express": "true" } }
//! }
//! ```
//!
//! Loading validates the structure strictly and fails with a typed error
//! rather than defaulting to an empty state; silently discarding an
//! unreadable file would re-apply already-applied recipes. Every mutating
//! call runs a full load -> mutate -> write cycle with an atomic
//! temp-file + rename, so readers only ever see a complete file.
//!
//! There is no cross-process lock on the state file. Concurrent invocations
//! against the same workspace can race; for a single-operator CLI this is an
//! accepted limitation.

use crate::output;
use crate::recipe::Level;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Hidden per-workspace directory holding recipe bookkeeping.
pub const STATE_DIR: &str = ".recipes";
/// State file name inside [`STATE_DIR`].
pub const STATE_FILE: &str = "state.json";

type FactMap = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file {path} is not valid JSON: {reason}")]
    InvalidJson { path: PathBuf, reason: String },

    #[error("state file {path} has an invalid top-level structure: {reason}")]
    InvalidStateStructure { path: PathBuf, reason: String },

    #[error("state file {path}: 'workspace' must be an object")]
    InvalidWorkspaceStructure { path: PathBuf },

    #[error("state file {path}: {reason}")]
    InvalidProjectsStructure { path: PathBuf, reason: String },

    #[error("project path '{path}' resolves outside the workspace root")]
    InvalidProjectPath { path: String },

    #[error("recipe level '{level}' cannot be recorded at {requested} scope")]
    ScopeMismatch { level: &'static str, requested: &'static str },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StateError {
    /// Stable machine-readable code, used in logs and summaries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson { .. } => "INVALID_JSON",
            Self::InvalidStateStructure { .. } => "INVALID_STATE_STRUCTURE",
            Self::InvalidWorkspaceStructure { .. } => "INVALID_WORKSPACE_STRUCTURE",
            Self::InvalidProjectsStructure { .. } => "INVALID_PROJECTS_STRUCTURE",
            Self::InvalidProjectPath { .. } => "INVALID_PROJECT_PATH",
            Self::ScopeMismatch { .. } => "SCOPE_MISMATCH",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

/// Two-level fact store: workspace-wide facts plus per-project facts keyed by
/// workspace-relative path. Both levels are always objects after validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceState {
    pub workspace: FactMap,
    pub projects: BTreeMap<String, FactMap>,
}

/// Owner of the persisted state file for one workspace.
///
/// State is loaded lazily on first access and cached for the life of the
/// process; every mutating call flushes the whole state atomically.
pub struct StateManager {
    workspace_root: PathBuf,
    cached: Option<WorkspaceState>,
}

impl StateManager {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self { workspace_root: workspace_root.into(), cached: None }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn state_path(&self) -> PathBuf {
        self.workspace_root.join(STATE_DIR).join(STATE_FILE)
    }

    /// Current state, loading from disk on first access.
    pub fn workspace_state(&mut self) -> Result<&WorkspaceState, StateError> {
        let state = match self.cached.take() {
            Some(state) => state,
            None => self.load()?,
        };
        Ok(self.cached.insert(state))
    }

    /// Set a workspace-scoped fact and flush.
    pub fn set_workspace_value(&mut self, key: &str, value: Value) -> Result<(), StateError> {
        let mut state = self.workspace_state()?.clone();
        state.workspace.insert(key.to_string(), value);
        self.flush(state)
    }

    /// Set a project-scoped fact and flush. The project path is validated to
    /// resolve within the workspace root before any state is touched.
    pub fn set_project_value(
        &mut self,
        project_path: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StateError> {
        let project = self.normalize_project_path(project_path)?;
        let mut state = self.workspace_state()?.clone();
        state
            .projects
            .entry(project)
            .or_default()
            .insert(key.to_string(), value);
        self.flush(state)
    }

    /// Record that a recipe has been applied, at the scope its level selects.
    pub fn record_applied_recipe(
        &mut self,
        recipe_id: &str,
        level: Level,
        project_path: Option<&str>,
    ) -> Result<(), StateError> {
        let key = applied_key(recipe_id);
        match target_scope(level, project_path)? {
            None => self.set_workspace_value(&key, Value::Bool(true)),
            Some(project) => self.set_project_value(project, &key, Value::Bool(true)),
        }
    }

    /// Whether a recipe is already applied at the scope its level selects.
    ///
    /// A workspace-preferred recipe applied at workspace scope counts as
    /// applied for every project, so both scopes are consulted. A project
    /// path with a workspace-only level is the same [`ScopeMismatch`] that
    /// recording would raise; tolerating it here would green-light an apply
    /// whose recording must fail.
    ///
    /// [`ScopeMismatch`]: StateError::ScopeMismatch
    pub fn is_recipe_applied(
        &mut self,
        recipe_id: &str,
        level: Level,
        project_path: Option<&str>,
    ) -> Result<bool, StateError> {
        if level == Level::WorkspaceOnly && project_path.is_some() {
            return Err(StateError::ScopeMismatch {
                level: level.as_str(),
                requested: "project",
            });
        }
        let key = applied_key(recipe_id);
        let project = match project_path {
            Some(p) => Some(self.normalize_project_path(p)?),
            None => None,
        };
        let state = self.workspace_state()?;
        let applied = match (level, project) {
            (Level::ProjectOnly, Some(p)) => {
                state.projects.get(&p).is_some_and(|m| m.contains_key(&key))
            }
            (Level::ProjectOnly, None) => false,
            (_, Some(p)) => {
                state.workspace.contains_key(&key)
                    || state.projects.get(&p).is_some_and(|m| m.contains_key(&key))
            }
            (_, None) => state.workspace.contains_key(&key),
        };
        Ok(applied)
    }

    /// Normalize a project path to a workspace-relative key, rejecting any
    /// path that escapes the workspace root.
    ///
    /// The check is lexical (the project directory may not exist yet):
    /// absolute paths must start with the workspace root, and `..` components
    /// may never pop past it. Violations are logged as security events before
    /// the error is returned.
    pub fn normalize_project_path(&self, project_path: &str) -> Result<String, StateError> {
        let reject = |path: &str| {
            output::security_event(&format!(
                "rejected project path '{path}' outside workspace root {}",
                self.workspace_root.display()
            ));
            Err(StateError::InvalidProjectPath { path: path.to_string() })
        };

        let raw = Path::new(project_path);
        let relative = if raw.is_absolute() {
            match raw.strip_prefix(&self.workspace_root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => return reject(project_path),
            }
        } else {
            raw.to_path_buf()
        };

        let mut parts: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return reject(project_path);
                    }
                }
                Component::RootDir | Component::Prefix(_) => return reject(project_path),
            }
        }
        if parts.is_empty() {
            return reject(project_path);
        }
        Ok(parts.join("/"))
    }

    /// Load and strictly validate the persisted state. A missing file is an
    /// empty state; anything present but malformed is a typed error.
    fn load(&self) -> Result<WorkspaceState, StateError> {
        let path = self.state_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WorkspaceState::default());
            }
            Err(e) => return Err(log_state_error(StateError::Io { path, source: e })),
        };

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            log_state_error(StateError::InvalidJson { path: path.clone(), reason: e.to_string() })
        })?;
        validate_state_value(value, &path).map_err(log_state_error)
    }

    /// Replace the cached state and persist it atomically.
    fn flush(&mut self, state: WorkspaceState) -> Result<(), StateError> {
        let path = self.state_path();
        let dir = self.workspace_root.join(STATE_DIR);
        std::fs::create_dir_all(&dir)
            .map_err(|e| StateError::Io { path: dir.clone(), source: e })?;

        // Keys serialize sorted at every level: the maps are BTreeMaps, and
        // serde_json's default Map keeps nested object keys ordered too.
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| StateError::InvalidJson { path: path.clone(), reason: e.to_string() })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| StateError::Io { path: dir.clone(), source: e })?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .map_err(|e| StateError::Io { path: path.clone(), source: e })?;
        tmp.persist(&path)
            .map_err(|e| StateError::Io { path: path.clone(), source: e.error })?;

        self.cached = Some(state);
        Ok(())
    }
}

/// Synthetic applied-marker key for a recipe.
pub fn applied_key(recipe_id: &str) -> String {
    format!("{recipe_id}.applied")
}

/// Decide which scope a recording targets: `None` for workspace, `Some(path)`
/// for a project. Level constraints are enforced here.
fn target_scope<'a>(
    level: Level,
    project_path: Option<&'a str>,
) -> Result<Option<&'a str>, StateError> {
    match (level, project_path) {
        (Level::WorkspaceOnly, None) => Ok(None),
        (Level::WorkspaceOnly, Some(_)) => Err(StateError::ScopeMismatch {
            level: level.as_str(),
            requested: "project",
        }),
        (Level::ProjectOnly, Some(p)) => Ok(Some(p)),
        (Level::ProjectOnly, None) => Err(StateError::ScopeMismatch {
            level: level.as_str(),
            requested: "workspace",
        }),
        (Level::WorkspacePreferred, p) => Ok(p),
    }
}

fn log_state_error(err: StateError) -> StateError {
    output::error(&format!("state error [{}]: {err}", err.code()));
    err
}

/// Validate the raw JSON shape of a state file and build the typed state.
///
/// The top level must be an object containing at most `workspace` and
/// `projects`; absent fields fill with empty objects, everything else is
/// rejected rather than coerced.
fn validate_state_value(value: Value, path: &Path) -> Result<WorkspaceState, StateError> {
    let Value::Object(mut top) = value else {
        return Err(StateError::InvalidStateStructure {
            path: path.to_path_buf(),
            reason: "top level is not an object".to_string(),
        });
    };

    let workspace_raw = top.remove("workspace");
    let projects_raw = top.remove("projects");
    if let Some((unknown, _)) = top.into_iter().next() {
        return Err(StateError::InvalidStateStructure {
            path: path.to_path_buf(),
            reason: format!("unknown top-level field '{unknown}'"),
        });
    }

    let workspace = match workspace_raw {
        None => FactMap::new(),
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(_) => {
            return Err(StateError::InvalidWorkspaceStructure { path: path.to_path_buf() });
        }
    };

    let projects = match projects_raw {
        None => BTreeMap::new(),
        Some(Value::Object(map)) => {
            let mut projects = BTreeMap::new();
            for (project, facts) in map {
                let Value::Object(facts) = facts else {
                    return Err(StateError::InvalidProjectsStructure {
                        path: path.to_path_buf(),
                        reason: format!("project '{project}' entry is not an object"),
                    });
                };
                projects.insert(project, facts.into_iter().collect());
            }
            projects
        }
        Some(_) => {
            return Err(StateError::InvalidProjectsStructure {
                path: path.to_path_buf(),
                reason: "'projects' is not an object".to_string(),
            });
        }
    };

    Ok(WorkspaceState { workspace, projects })
}
