//! Library management - configured remote sources and bounded recipe search
//!
//! A library is a directory tree containing many recipes, either local or
//! mirrored from a configured remote under `~/.recipes/libraries/<name>`.
//! All directory walks here are bounded by [`MAX_SEARCH_DEPTH`] and
//! [`MAX_SEARCH_DIRS`] so lookup stays responsive against arbitrarily large
//! or deeply nested workspaces. The walk is an explicit work queue with a
//! visited counter, not recursion, so the termination guarantee is
//! structurally obvious.

use crate::config::{AppPaths, ConfigLibrary, GlobalConfig};
use crate::git::{self, GitError};
use crate::output;
use crate::parser::{self, ParseError};
use crate::recipe::{Recipe, MANIFEST_FILE};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum directory depth searched below a root.
pub const MAX_SEARCH_DEPTH: usize = 5;
/// Maximum total directories visited per search.
pub const MAX_SEARCH_DIRS: usize = 1000;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("no library named '{0}' is configured")]
    UnknownLibrary(String),

    #[error("library {path} contains {count} recipes and none of them parse")]
    AllRecipesFailed { path: PathBuf, count: usize },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a bounded directory search.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Recipe directories found (directories containing a manifest file).
    pub matches: Vec<PathBuf>,
    /// Directories actually visited.
    pub visited: usize,
    /// True when a limit cut the search short.
    pub truncated: bool,
}

/// Walk `root` for recipe directories, bounded by depth and visit count.
///
/// A directory counts as a recipe when it contains a manifest file; the walk
/// never descends into recipe directories. When `name` is given, only
/// recipes whose directory base name equals it are collected (the walk still
/// visits everything up to the limits).
pub fn bounded_recipe_search(root: &Path, name: Option<&str>) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
    queue.push_back((root.to_path_buf(), 0));

    while let Some((dir, depth)) = queue.pop_front() {
        if outcome.visited >= MAX_SEARCH_DIRS {
            outcome.truncated = true;
            break;
        }
        outcome.visited += 1;

        if dir.join(MANIFEST_FILE).is_file() {
            let matches_name = match name {
                Some(wanted) => dir.file_name().is_some_and(|n| n == wanted),
                None => true,
            };
            if matches_name {
                outcome.matches.push(dir);
            }
            continue;
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                // Hidden directories (.git, .recipes, ...) are never recipes.
                p.file_name().is_none_or(|n| !n.to_string_lossy().starts_with('.'))
            })
            .collect();
        if depth >= MAX_SEARCH_DEPTH {
            // Only a real cut counts as truncation; a leaf at the depth
            // limit skips nothing.
            if !children.is_empty() {
                outcome.truncated = true;
            }
            continue;
        }
        children.sort();
        for child in children {
            queue.push_back((child, depth + 1));
        }
    }

    outcome
}

/// A library parsed from disk, tolerant of individually broken recipes.
#[derive(Debug)]
pub struct RecipeLibrary {
    pub path: PathBuf,
    pub recipes: Vec<Recipe>,
    pub failures: Vec<(PathBuf, ParseError)>,
}

impl RecipeLibrary {
    /// Parse every recipe beneath `path`. One broken recipe does not abort
    /// the rest; a library where every recipe is broken is an error.
    pub fn parse(path: &Path) -> Result<Self, LibraryError> {
        let found = bounded_recipe_search(path, None);
        let mut recipes = Vec::new();
        let mut failures = Vec::new();
        for dir in found.matches {
            match parser::parse(&dir) {
                Ok(recipe) => recipes.push(recipe),
                Err(err) => failures.push((dir, err)),
            }
        }
        if recipes.is_empty() && !failures.is_empty() {
            return Err(LibraryError::AllRecipesFailed {
                path: path.to_path_buf(),
                count: failures.len(),
            });
        }
        Ok(Self { path: path.to_path_buf(), recipes, failures })
    }
}

/// Owner of the configured remote libraries and their local mirrors.
pub struct LibraryManager {
    libraries: BTreeMap<String, ConfigLibrary>,
    libraries_dir: PathBuf,
}

impl LibraryManager {
    pub fn new(config: &GlobalConfig, paths: &AppPaths) -> Self {
        Self {
            libraries: config.libraries.clone(),
            libraries_dir: paths.libraries_dir.clone(),
        }
    }

    /// Local mirror path for a configured library name.
    pub fn library_path(&self, name: &str) -> PathBuf {
        self.libraries_dir.join(name)
    }

    /// Configured libraries that already have a local mirror.
    pub fn mirrored_libraries(&self) -> Vec<(String, PathBuf)> {
        self.libraries
            .keys()
            .map(|name| (name.clone(), self.library_path(name)))
            .filter(|(_, path)| path.is_dir())
            .collect()
    }

    /// Find candidate directories for a bare recipe name across every
    /// mirrored library plus an optional local search root. Ambiguity is the
    /// caller's decision; all matches are returned.
    pub fn find_recipe_by_name(&self, name: &str, local_root: Option<&Path>) -> Vec<PathBuf> {
        let mut matches: Vec<PathBuf> = Vec::new();
        if let Some(root) = local_root {
            matches.extend(bounded_recipe_search(root, Some(name)).matches);
        }
        for (_, path) in self.mirrored_libraries() {
            matches.extend(bounded_recipe_search(&path, Some(name)).matches);
        }
        matches.sort();
        matches.dedup();
        matches
    }

    /// Clone or update one configured library's local mirror.
    pub fn refresh_library(&self, name: &str) -> Result<(), LibraryError> {
        let library = self
            .libraries
            .get(name)
            .ok_or_else(|| LibraryError::UnknownLibrary(name.to_string()))?;
        let dest = self.library_path(name);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LibraryError::Io { path: parent.to_path_buf(), source: e })?;
        }
        git::clone_or_fetch(&library.repo, Some(&library.reference), &dest)?;
        Ok(())
    }

    /// Refresh every configured library. One unreachable remote is a
    /// skip-with-warning, never fatal; both lists are reported.
    pub fn refresh_all_libraries(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        for name in self.libraries.keys() {
            match self.refresh_library(name) {
                Ok(()) => summary.refreshed.push(name.clone()),
                Err(err) => {
                    output::warning(&format!("skipping library '{name}': {err}"));
                    summary.skipped.push((name.clone(), err));
                }
            }
        }
        summary
    }

    /// If `path` lies inside a configured library's mirror, its name.
    pub fn is_remote_library(&self, path: &Path) -> Option<&str> {
        self.libraries
            .keys()
            .find(|name| path.starts_with(self.libraries_dir.join(name)))
            .map(String::as_str)
    }

    /// All distinct categories across mirrored libraries, sorted.
    pub fn all_categories(&self) -> Result<Vec<String>, LibraryError> {
        let mut categories = BTreeSet::new();
        for library in self.parse_mirrored()? {
            for recipe in library.recipes {
                categories.insert(recipe.category);
            }
        }
        Ok(categories.into_iter().collect())
    }

    /// All recipes in a category across mirrored libraries.
    pub fn recipes_by_category(&self, category: &str) -> Result<Vec<Recipe>, LibraryError> {
        let mut recipes = Vec::new();
        for library in self.parse_mirrored()? {
            recipes.extend(library.recipes.into_iter().filter(|r| r.category == category));
        }
        recipes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(recipes)
    }

    fn parse_mirrored(&self) -> Result<Vec<RecipeLibrary>, LibraryError> {
        let mut libraries = Vec::new();
        for (name, path) in self.mirrored_libraries() {
            match RecipeLibrary::parse(&path) {
                Ok(library) => libraries.push(library),
                Err(err) => {
                    output::warning(&format!("library '{name}': {err}"));
                }
            }
        }
        Ok(libraries)
    }
}

/// Outcome of [`LibraryManager::refresh_all_libraries`].
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub refreshed: Vec<String>,
    pub skipped: Vec<(String, LibraryError)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{FIX_FILE, PROMPT_FILE};
    use tempfile::TempDir;

    const PROMPT: &str =
        "## Goal\ng\n\n## Investigation\ni\n\n## Expected Output\no\n";

    fn write_recipe(root: &Path, id: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "id: {id}\ncategory: setup\nsummary: s\nlevel: workspace-only\n\
                 ecosystems: []\nprovides: []\nrequires: []\n"
            ),
        )
        .unwrap();
        std::fs::write(dir.join(PROMPT_FILE), PROMPT).unwrap();
        std::fs::write(dir.join(FIX_FILE), "fix").unwrap();
        dir
    }

    fn manager_with_mirror(tmp: &TempDir, name: &str) -> LibraryManager {
        let config_dir = tmp.path().join("config");
        let mut config = GlobalConfig::default();
        config.libraries.insert(
            name.to_string(),
            ConfigLibrary {
                repo: "https://example.com/lib.git".into(),
                reference: "main".into(),
            },
        );
        let paths = AppPaths {
            config_file: config_dir.join("config.yaml"),
            libraries_dir: config_dir.join("libraries"),
            config_dir,
            workspace_root: tmp.path().to_path_buf(),
        };
        LibraryManager::new(&config, &paths)
    }

    #[test]
    fn search_finds_nested_recipes_and_stops_at_recipe_dirs() {
        let tmp = TempDir::new().unwrap();
        write_recipe(&tmp.path().join("cat-a"), "one");
        write_recipe(&tmp.path().join("cat-b/nested"), "two");
        // A directory inside a recipe must not be reported separately.
        std::fs::create_dir_all(tmp.path().join("cat-a/one/variants")).unwrap();

        let outcome = bounded_recipe_search(tmp.path(), None);
        assert_eq!(outcome.matches.len(), 2);
        assert!(!outcome.truncated);
    }

    #[test]
    fn search_by_name_matches_directory_basename() {
        let tmp = TempDir::new().unwrap();
        write_recipe(tmp.path(), "setup-logging");
        write_recipe(tmp.path(), "setup-metrics");

        let outcome = bounded_recipe_search(tmp.path(), Some("setup-logging"));
        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.matches[0].ends_with("setup-logging"));
    }

    #[test]
    fn search_is_bounded_by_depth() {
        let tmp = TempDir::new().unwrap();
        let mut deep = tmp.path().to_path_buf();
        for i in 0..8 {
            deep = deep.join(format!("level{i}"));
        }
        write_recipe(&deep, "too-deep");

        let outcome = bounded_recipe_search(tmp.path(), Some("too-deep"));
        assert!(outcome.matches.is_empty());
        assert!(outcome.truncated);
    }

    #[test]
    fn leaf_directory_at_depth_limit_is_not_truncation() {
        let tmp = TempDir::new().unwrap();
        let mut leaf = tmp.path().to_path_buf();
        for i in 0..MAX_SEARCH_DEPTH {
            leaf = leaf.join(format!("level{i}"));
        }
        std::fs::create_dir_all(&leaf).unwrap();

        let outcome = bounded_recipe_search(tmp.path(), None);
        assert!(outcome.matches.is_empty());
        assert!(!outcome.truncated);
    }

    #[test]
    fn search_is_bounded_by_visited_directory_count() {
        let tmp = TempDir::new().unwrap();
        // Wide shallow tree with more directories than the visit ceiling.
        for i in 0..40 {
            for j in 0..30 {
                std::fs::create_dir_all(tmp.path().join(format!("dir{i:02}/sub{j:02}"))).unwrap();
            }
        }

        let outcome = bounded_recipe_search(tmp.path(), Some("absent"));
        assert_eq!(outcome.visited, MAX_SEARCH_DIRS);
        assert!(outcome.truncated);
    }

    #[test]
    fn hidden_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_recipe(&tmp.path().join(".git"), "sneaky");
        let outcome = bounded_recipe_search(tmp.path(), Some("sneaky"));
        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn library_parse_tolerates_individual_failures() {
        let tmp = TempDir::new().unwrap();
        write_recipe(tmp.path(), "good-one");
        write_recipe(tmp.path(), "good-two");
        let broken = write_recipe(tmp.path(), "broken");
        std::fs::remove_file(broken.join(FIX_FILE)).unwrap();

        let library = RecipeLibrary::parse(tmp.path()).unwrap();
        assert_eq!(library.recipes.len(), 2);
        assert_eq!(library.failures.len(), 1);
        assert!(library.failures[0].0.ends_with("broken"));
    }

    #[test]
    fn library_where_everything_fails_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let broken = write_recipe(tmp.path(), "broken");
        std::fs::remove_file(broken.join(PROMPT_FILE)).unwrap();

        match RecipeLibrary::parse(tmp.path()).unwrap_err() {
            LibraryError::AllRecipesFailed { count, .. } => assert_eq!(count, 1),
            other => panic!("expected AllRecipesFailed, got {other:?}"),
        }
    }

    #[test]
    fn find_recipe_by_name_searches_local_root_and_mirrors() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_with_mirror(&tmp, "team");
        let mirror = manager.library_path("team");
        write_recipe(&mirror, "setup-logging");
        let local = tmp.path().join("workspace");
        write_recipe(&local, "setup-logging");

        let matches = manager.find_recipe_by_name("setup-logging", Some(&local));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn is_remote_library_maps_mirror_paths_to_names() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_with_mirror(&tmp, "team");
        let inside = manager.library_path("team").join("cat/recipe");
        assert_eq!(manager.is_remote_library(&inside), Some("team"));
        assert_eq!(manager.is_remote_library(tmp.path()), None);
    }

    #[test]
    fn categories_and_category_listing() {
        let tmp = TempDir::new().unwrap();
        let manager = manager_with_mirror(&tmp, "team");
        let mirror = manager.library_path("team");
        write_recipe(&mirror, "a-recipe");
        write_recipe(&mirror, "b-recipe");

        assert_eq!(manager.all_categories().unwrap(), vec!["setup".to_string()]);
        let recipes = manager.recipes_by_category("setup").unwrap();
        assert_eq!(recipes.len(), 2);
        assert_eq!(recipes[0].id, "a-recipe");
        assert!(manager.recipes_by_category("absent").unwrap().is_empty());
    }
}
