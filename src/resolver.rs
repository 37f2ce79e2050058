//! Reference resolution - from a user-supplied string to recipe sources
//!
//! A target string classifies into exactly one of four reference kinds:
//! a git URL, a recipe folder (existing directory with a manifest at its
//! root), a library (existing directory without one), or a bare recipe name.
//! URL markers are checked before path markers because a URL can look
//! path-like; tilde expansion happens before any filesystem check.

use crate::config::AppPaths;
use crate::git::{self, GitError};
use crate::library::LibraryManager;
use crate::output;
use crate::recipe::MANIFEST_FILE;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Classification of a target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeRef {
    /// Bare identifier, looked up in libraries and the local workspace.
    Name(String),
    /// Existing directory containing a manifest file.
    Folder(PathBuf),
    /// Existing directory without a manifest at its root.
    Library(PathBuf),
    /// Remote repository to mirror before use.
    GitUrl(String),
}

/// What a reference resolved to: one recipe directory or a library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Recipe(PathBuf),
    Library(PathBuf),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("target path does not exist: {0}")]
    TargetNotFound(PathBuf),

    #[error("target path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("no recipe named '{0}' found locally or in any configured library")]
    NoMatches(String),

    #[error("recipe name '{name}' is ambiguous; candidates:\n{}",
        candidates.iter().map(|p| format!("  {}", p.display())).collect::<Vec<_>>().join("\n"))]
    Ambiguous { name: String, candidates: Vec<PathBuf> },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("failed to prepare mirror directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Classify a target string without resolving it.
///
/// Pure apart from the existence/stat calls needed to tell a recipe folder
/// from a library. `home` feeds tilde expansion (injectable for tests).
pub fn classify(target: &str, home: Option<&Path>) -> Result<RecipeRef, ResolveError> {
    // URL markers first: "repo.git" would otherwise look like a file path.
    if target.starts_with("http://") || target.starts_with("https://") || target.contains(".git") {
        return Ok(RecipeRef::GitUrl(target.to_string()));
    }

    let path_like = target.starts_with("./")
        || target.starts_with("../")
        || target.starts_with('/')
        || target.starts_with("~/")
        || target.contains('/');
    if path_like {
        let path = expand_tilde(target, home);
        if !path.exists() {
            return Err(ResolveError::TargetNotFound(path));
        }
        if !path.is_dir() {
            return Err(ResolveError::NotADirectory(path));
        }
        if path.join(MANIFEST_FILE).is_file() {
            return Ok(RecipeRef::Folder(path));
        }
        return Ok(RecipeRef::Library(path));
    }

    Ok(RecipeRef::Name(target.to_string()))
}

/// Expand a leading `~/` against the home directory.
pub fn expand_tilde(target: &str, home: Option<&Path>) -> PathBuf {
    if let Some(rest) = target.strip_prefix("~/")
        && let Some(home) = home
    {
        return home.join(rest);
    }
    PathBuf::from(target)
}

/// Resolve a target string to exactly one recipe source.
///
/// Bare names search the workspace plus every mirrored library; on zero
/// matches the configured libraries are refreshed once and the search
/// retried. More than one match never guesses. Git URLs are mirrored under
/// the operator's library cache and re-classified by their content.
pub fn resolve(
    target: &str,
    manager: &LibraryManager,
    paths: &AppPaths,
) -> Result<Resolved, ResolveError> {
    match classify(target, dirs::home_dir().as_deref())? {
        RecipeRef::Folder(path) => Ok(Resolved::Recipe(path)),
        RecipeRef::Library(path) => Ok(Resolved::Library(path)),
        RecipeRef::Name(name) => resolve_name(&name, manager, paths),
        RecipeRef::GitUrl(url) => resolve_git_url(&url, paths),
    }
}

fn resolve_name(
    name: &str,
    manager: &LibraryManager,
    paths: &AppPaths,
) -> Result<Resolved, ResolveError> {
    let mut matches = manager.find_recipe_by_name(name, Some(&paths.workspace_root));
    if matches.is_empty() {
        output::info(&format!("'{name}' not found locally, refreshing libraries"));
        manager.refresh_all_libraries();
        matches = manager.find_recipe_by_name(name, Some(&paths.workspace_root));
    }
    match matches.len() {
        0 => Err(ResolveError::NoMatches(name.to_string())),
        1 => Ok(Resolved::Recipe(matches.remove(0))),
        _ => Err(ResolveError::Ambiguous { name: name.to_string(), candidates: matches }),
    }
}

fn resolve_git_url(url: &str, paths: &AppPaths) -> Result<Resolved, ResolveError> {
    let name = git::repo_name(url)?;
    // Ad-hoc URLs mirror next to the configured libraries, under a directory
    // that cannot collide with a configured library name.
    let dest = paths.libraries_dir.join(".direct").join(&name);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ResolveError::Io { path: parent.to_path_buf(), source: e })?;
    }
    git::clone_or_fetch(url, None, &dest)?;
    if dest.join(MANIFEST_FILE).is_file() {
        Ok(Resolved::Recipe(dest))
    } else {
        Ok(Resolved::Library(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn urls_classify_before_anything_else() {
        assert_eq!(
            classify("https://github.com/acme/recipes", None).unwrap(),
            RecipeRef::GitUrl("https://github.com/acme/recipes".into())
        );
        assert_eq!(
            classify("http://internal/recipes", None).unwrap(),
            RecipeRef::GitUrl("http://internal/recipes".into())
        );
        // A .git marker wins even when the string looks like a local path.
        assert_eq!(
            classify("./vendor/recipes.git", None).unwrap(),
            RecipeRef::GitUrl("./vendor/recipes.git".into())
        );
        assert_eq!(
            classify("git@github.com:acme/recipes.git", None).unwrap(),
            RecipeRef::GitUrl("git@github.com:acme/recipes.git".into())
        );
    }

    #[test]
    fn existing_dir_with_manifest_is_a_folder() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("my-recipe");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), "id: my-recipe\n").unwrap();

        let target = dir.to_string_lossy().to_string();
        assert_eq!(classify(&target, None).unwrap(), RecipeRef::Folder(dir));
    }

    #[test]
    fn existing_dir_without_manifest_is_a_library() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().to_string_lossy().to_string();
        assert_eq!(
            classify(&target, None).unwrap(),
            RecipeRef::Library(tmp.path().to_path_buf())
        );
    }

    #[test]
    fn tilde_expands_against_home_before_stat() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("my-recipes").join("test-recipe");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), "id: test-recipe\n").unwrap();

        let result = classify("~/my-recipes/test-recipe", Some(tmp.path())).unwrap();
        assert_eq!(result, RecipeRef::Folder(dir));
    }

    #[test]
    fn expand_tilde_resolves_home_relative_paths() {
        let home = Path::new("/home/u");
        assert_eq!(
            expand_tilde("~/my-recipes/test-recipe", Some(home)),
            PathBuf::from("/home/u/my-recipes/test-recipe")
        );
        assert_eq!(expand_tilde("./x", Some(home)), PathBuf::from("./x"));
    }

    #[test]
    fn missing_path_like_target_is_target_not_found() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("absent").to_string_lossy().to_string();
        assert!(matches!(
            classify(&target, None).unwrap_err(),
            ResolveError::TargetNotFound(_)
        ));
    }

    #[test]
    fn path_like_target_pointing_at_a_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("notes.md");
        std::fs::write(&file, "x").unwrap();
        let target = file.to_string_lossy().to_string();
        assert!(matches!(
            classify(&target, None).unwrap_err(),
            ResolveError::NotADirectory(_)
        ));
    }

    #[test]
    fn bare_identifier_is_a_name() {
        assert_eq!(
            classify("setup-logging", None).unwrap(),
            RecipeRef::Name("setup-logging".into())
        );
    }

    #[test]
    fn relative_path_without_prefix_is_still_path_like() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("lib");
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.to_string_lossy().to_string();
        assert_eq!(classify(&target, None).unwrap(), RecipeRef::Library(dir));
    }
}
