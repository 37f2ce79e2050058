//! Semantic recipe validation - errors that block usage, warnings that don't
//!
//! Runs after a successful parse and never throws; every finding is collected
//! in a single pass so one run surfaces every problem at once.

use crate::recipe::{Recipe, VARIANTS_DIR};

/// Reserved `provides` prefixes. These namespaces belong to the state
/// manager's own bookkeeping (workspace/project scoping); a recipe declaring
/// them could shadow state the manager wrote itself.
const RESERVED_PREFIXES: [&str; 2] = ["workspace.", "project."];

/// Reserved `provides` suffix. `<id>.applied` markers are written only by
/// the state manager; a recipe providing one could spoof another recipe's
/// applied status.
const RESERVED_SUFFIX: &str = ".applied";

/// Outcome of semantic validation. Errors block apply; warnings are printed
/// and otherwise ignored.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a parsed recipe.
pub fn validate(recipe: &Recipe) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_provides(recipe, &mut result);
    check_variants(recipe, &mut result);
    check_style(recipe, &mut result);

    result
}

fn check_provides(recipe: &Recipe, result: &mut ValidationResult) {
    for value in &recipe.provides {
        let Some(key) = value.as_str() else {
            result
                .errors
                .push(format!("provides entry is not a string: {value:?}"));
            continue;
        };
        if RESERVED_PREFIXES.iter().any(|p| key.starts_with(p)) || key.ends_with(RESERVED_SUFFIX) {
            result.errors.push(format!(
                "provides key '{key}' uses a reserved namespace \
                 (workspace.*, project.*, *.applied are state-manager bookkeeping)"
            ));
        }
    }
}

fn check_variants(recipe: &Recipe, result: &mut ValidationResult) {
    for eco in &recipe.ecosystems {
        if eco.variants.is_empty() {
            result
                .errors
                .push(format!("ecosystem '{}' declares no variants", eco.id));
            continue;
        }
        if !eco.variants.iter().any(|v| v.id == eco.default_variant) {
            result.errors.push(format!(
                "ecosystem '{}' default_variant '{}' is not among its variants",
                eco.id, eco.default_variant
            ));
        }
        for var in &eco.variants {
            if recipe.fix_files.contains_key(&var.fix) {
                continue;
            }
            let qualified = format!("{}/{}_{}.md", VARIANTS_DIR, eco.id, var.id);
            let generic = format!("{}/{}.md", VARIANTS_DIR, var.id);
            if recipe.fix_files.contains_key(&qualified) {
                continue;
            }
            if recipe.fix_files.contains_key(&generic) {
                // The generic file can stand in for the ecosystem-specific
                // one; usable, but the declaration is stale.
                result.warnings.push(format!(
                    "ecosystem '{}' variant '{}': fix file '{}' is missing; \
                     generic '{}' will be used",
                    eco.id, var.id, var.fix, generic
                ));
            } else {
                result.errors.push(format!(
                    "ecosystem '{}' variant '{}': fix file '{}' does not exist",
                    eco.id, var.id, var.fix
                ));
            }
        }
    }
}

fn check_style(recipe: &Recipe, result: &mut ValidationResult) {
    if !is_kebab_case(&recipe.id) {
        result
            .warnings
            .push(format!("id '{}' is not kebab-case", recipe.id));
    }
    if !is_kebab_case(&recipe.category) {
        result
            .warnings
            .push(format!("category '{}' is not kebab-case", recipe.category));
    }
}

/// Lowercase alphanumeric segments joined by single hyphens.
fn is_kebab_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{Ecosystem, Level, PromptSections, Variant};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn base_recipe() -> Recipe {
        let mut fix_files = BTreeMap::new();
        fix_files.insert("fix.md".to_string(), "fix".to_string());
        Recipe {
            id: "setup-logging".into(),
            category: "observability".into(),
            summary: "Set up logging".into(),
            level: Level::WorkspacePreferred,
            ecosystems: vec![],
            provides: vec![],
            requires: vec![],
            prompt: PromptSections::default(),
            fix_files,
            dir: PathBuf::from("/tmp/setup-logging"),
        }
    }

    #[test]
    fn clean_recipe_validates() {
        let recipe = base_recipe();
        let result = validate(&recipe);
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn reserved_provides_keys_are_errors() {
        let mut recipe = base_recipe();
        recipe.provides = vec![
            serde_yaml::Value::String("workspace.layout".into()),
            serde_yaml::Value::String("project.kind".into()),
            serde_yaml::Value::String("other-recipe.applied".into()),
            serde_yaml::Value::String("logging".into()),
        ];
        let result = validate(&recipe);
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors.iter().any(|e| e.contains("workspace.layout")));
        assert!(result.errors.iter().any(|e| e.contains("project.kind")));
        assert!(result.errors.iter().any(|e| e.contains("other-recipe.applied")));
    }

    #[test]
    fn non_string_provides_entry_is_error() {
        let mut recipe = base_recipe();
        recipe.provides = vec![serde_yaml::Value::Bool(true)];
        let result = validate(&recipe);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("not a string"));
    }

    #[test]
    fn missing_variant_fix_with_generic_fallback_is_warning() {
        let mut recipe = base_recipe();
        recipe
            .fix_files
            .insert("variants/ts.md".to_string(), "generic ts".to_string());
        recipe.ecosystems = vec![Ecosystem {
            id: "node".into(),
            default_variant: "ts".into(),
            variants: vec![Variant { id: "ts".into(), fix: "variants/node_ts.md".into() }],
        }];
        let result = validate(&recipe);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("variants/ts.md"));
    }

    #[test]
    fn missing_variant_fix_without_fallback_is_error() {
        let mut recipe = base_recipe();
        recipe.ecosystems = vec![Ecosystem {
            id: "node".into(),
            default_variant: "ts".into(),
            variants: vec![Variant { id: "ts".into(), fix: "variants/node_ts.md".into() }],
        }];
        let result = validate(&recipe);
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("does not exist"));
    }

    #[test]
    fn unknown_default_variant_is_error() {
        let mut recipe = base_recipe();
        recipe
            .fix_files
            .insert("variants/node_ts.md".to_string(), "ts".to_string());
        recipe.ecosystems = vec![Ecosystem {
            id: "node".into(),
            default_variant: "py".into(),
            variants: vec![Variant { id: "ts".into(), fix: "variants/node_ts.md".into() }],
        }];
        let result = validate(&recipe);
        assert!(result.errors.iter().any(|e| e.contains("default_variant")));
    }

    #[test]
    fn style_findings_are_warnings_not_errors() {
        let mut recipe = base_recipe();
        recipe.id = "SetupLogging".into();
        recipe.category = "Observability".into();
        let result = validate(&recipe);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn all_findings_are_collected_in_one_pass() {
        let mut recipe = base_recipe();
        recipe.id = "BadId".into();
        recipe.provides = vec![serde_yaml::Value::String("x.applied".into())];
        recipe.ecosystems = vec![Ecosystem {
            id: "node".into(),
            default_variant: "ts".into(),
            variants: vec![Variant { id: "ts".into(), fix: "variants/missing.md".into() }],
        }];
        let result = validate(&recipe);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.warnings.len(), 1);
    }
}
