//! Dependency validation - a recipe's `requires` against persisted state
//!
//! Pure functions over an already-loaded [`WorkspaceState`]; nothing here
//! touches the filesystem or mutates state. Missing keys and conflicting
//! values are distinct outcomes: a missing key means "apply a prerequisite
//! first", a conflict means "the workspace contradicts this recipe".

use crate::recipe::{Recipe, RecipeDependency};
use crate::state::WorkspaceState;
use serde_json::Value;

/// A required key that is present in state with the wrong value. Both sides
/// are reported so the caller can render an actionable diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub key: String,
    pub required: String,
    pub current: Value,
}

/// Result of checking a recipe's declared requirements.
#[derive(Debug, Clone, Default)]
pub struct DependencyCheck {
    pub satisfied: bool,
    pub missing: Vec<RecipeDependency>,
    pub conflicting: Vec<Conflict>,
}

/// Check every `{key, equals}` requirement of `recipe` against `state`.
///
/// Workspace-scoped facts are always consulted; when `project` names a
/// specific target, that project's facts are consulted as well and take
/// precedence on key collisions.
pub fn check_dependencies(
    recipe: &Recipe,
    state: &WorkspaceState,
    project: Option<&str>,
) -> DependencyCheck {
    let mut check = DependencyCheck::default();

    for dep in &recipe.requires {
        match lookup(state, project, &dep.key) {
            None => check.missing.push(dep.clone()),
            Some(current) if !value_matches(current, &dep.equals) => {
                check.conflicting.push(Conflict {
                    key: dep.key.clone(),
                    required: dep.equals.clone(),
                    current: current.clone(),
                });
            }
            Some(_) => {}
        }
    }

    check.satisfied = check.missing.is_empty() && check.conflicting.is_empty();
    check
}

fn lookup<'a>(state: &'a WorkspaceState, project: Option<&str>, key: &str) -> Option<&'a Value> {
    if let Some(project) = project
        && let Some(facts) = state.projects.get(project)
        && let Some(value) = facts.get(key)
    {
        return Some(value);
    }
    state.workspace.get(key)
}

/// Compare a state value against a required string: JSON strings compare
/// unquoted, everything else via its compact JSON encoding (so a recorded
/// `true` satisfies `equals: "true"`).
fn value_matches(current: &Value, required: &str) -> bool {
    match current {
        Value::String(s) => s == required,
        other => other.to_string() == required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{Level, PromptSections};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn recipe_requiring(requires: Vec<RecipeDependency>) -> Recipe {
        Recipe {
            id: "needs-things".into(),
            category: "setup".into(),
            summary: "Needs things".into(),
            level: Level::WorkspacePreferred,
            ecosystems: vec![],
            provides: vec![],
            requires,
            prompt: PromptSections::default(),
            fix_files: BTreeMap::new(),
            dir: PathBuf::from("/tmp/needs-things"),
        }
    }

    fn dep(key: &str, equals: &str) -> RecipeDependency {
        RecipeDependency { key: key.into(), equals: equals.into() }
    }

    fn state_with_workspace(facts: &[(&str, Value)]) -> WorkspaceState {
        let mut state = WorkspaceState::default();
        for (k, v) in facts {
            state.workspace.insert((*k).to_string(), v.clone());
        }
        state
    }

    #[test]
    fn absent_key_is_missing() {
        let recipe = recipe_requiring(vec![dep("express", "true")]);
        let state = WorkspaceState::default();
        let check = check_dependencies(&recipe, &state, None);
        assert!(!check.satisfied);
        assert_eq!(check.missing, vec![dep("express", "true")]);
        assert!(check.conflicting.is_empty());
    }

    #[test]
    fn wrong_value_is_conflicting_with_both_sides_reported() {
        let recipe = recipe_requiring(vec![dep("express", "true")]);
        let state = state_with_workspace(&[("express", json!("false"))]);
        let check = check_dependencies(&recipe, &state, None);
        assert!(!check.satisfied);
        assert!(check.missing.is_empty());
        assert_eq!(
            check.conflicting,
            vec![Conflict {
                key: "express".into(),
                required: "true".into(),
                current: json!("false"),
            }]
        );
    }

    #[test]
    fn matching_value_satisfies() {
        let recipe = recipe_requiring(vec![dep("express", "true")]);
        let state = state_with_workspace(&[("express", json!("true"))]);
        assert!(check_dependencies(&recipe, &state, None).satisfied);
    }

    #[test]
    fn boolean_true_satisfies_string_true() {
        let recipe = recipe_requiring(vec![dep("logging.applied", "true")]);
        let state = state_with_workspace(&[("logging.applied", json!(true))]);
        assert!(check_dependencies(&recipe, &state, None).satisfied);
    }

    #[test]
    fn project_scope_overrides_workspace_scope() {
        let recipe = recipe_requiring(vec![dep("express", "true")]);
        let mut state = state_with_workspace(&[("express", json!("false"))]);
        state
            .projects
            .entry("apps/api".to_string())
            .or_default()
            .insert("express".to_string(), json!("true"));

        assert!(check_dependencies(&recipe, &state, Some("apps/api")).satisfied);
        assert!(!check_dependencies(&recipe, &state, None).satisfied);
        assert!(!check_dependencies(&recipe, &state, Some("apps/web")).satisfied);
    }

    #[test]
    fn workspace_facts_apply_to_project_targets() {
        let recipe = recipe_requiring(vec![dep("monorepo", "true")]);
        let state = state_with_workspace(&[("monorepo", json!("true"))]);
        assert!(check_dependencies(&recipe, &state, Some("apps/api")).satisfied);
    }

    #[test]
    fn mixed_missing_and_conflicting_are_both_reported() {
        let recipe = recipe_requiring(vec![dep("a", "1"), dep("b", "2"), dep("c", "3")]);
        let state = state_with_workspace(&[("a", json!("1")), ("b", json!("wrong"))]);
        let check = check_dependencies(&recipe, &state, None);
        assert!(!check.satisfied);
        assert_eq!(check.missing, vec![dep("c", "3")]);
        assert_eq!(check.conflicting.len(), 1);
        assert_eq!(check.conflicting[0].key, "b");
    }

    #[test]
    fn no_requirements_is_trivially_satisfied() {
        let recipe = recipe_requiring(vec![]);
        let check = check_dependencies(&recipe, &WorkspaceState::default(), None);
        assert!(check.satisfied);
    }
}
