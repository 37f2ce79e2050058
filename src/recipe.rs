//! Recipe data model - structured, validated automation units
//!
//! A recipe is a directory with a fixed layout:
//!
//! ```text
//! setup-logging/
//!   metadata.yaml     manifest (id, category, summary, level, ...)
//!   prompt.md         agent prompt with Goal/Investigation/Expected Output
//!   fix.md            base fix content (mandatory)
//!   variants/*.md     optional ecosystem/variant-specific fix content
//! ```
//!
//! Recipes are constructed once by [`crate::parser::parse`] and immutable
//! afterward; re-resolution means re-parsing, never mutation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Manifest file name inside a recipe directory.
pub const MANIFEST_FILE: &str = "metadata.yaml";
/// Agent prompt file name.
pub const PROMPT_FILE: &str = "prompt.md";
/// Base fix-content file name.
pub const FIX_FILE: &str = "fix.md";
/// Subdirectory holding variant fix-content files.
pub const VARIANTS_DIR: &str = "variants";

/// Scope at which a recipe may be recorded as applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    /// Applies to the workspace as a whole, never to a single project.
    WorkspaceOnly,
    /// Applies to one project inside the workspace.
    ProjectOnly,
    /// May target either; records at workspace scope unless a project is given.
    WorkspacePreferred,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkspaceOnly => "workspace-only",
            Self::ProjectOnly => "project-only",
            Self::WorkspacePreferred => "workspace-preferred",
        }
    }
}

/// One fix-content variation within an ecosystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    /// Path to the variant's fix-content file, relative to the recipe dir.
    pub fix: String,
}

/// A language/framework-specific group of fix variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ecosystem {
    pub id: String,
    pub default_variant: String,
    pub variants: Vec<Variant>,
}

/// A key the recipe requires to hold a specific value in persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDependency {
    pub key: String,
    pub equals: String,
}

/// The three mandatory `##` sections of prompt.md.
#[derive(Debug, Clone, Default)]
pub struct PromptSections {
    pub goal: String,
    pub investigation: String,
    pub expected_output: String,
}

/// A parsed, structurally valid recipe.
///
/// `provides` keeps the raw YAML values from the manifest; entries that are
/// not strings are flagged by [`crate::validate::validate`] rather than
/// rejected at parse time. Use [`Recipe::provided_facts`] for the string
/// subset consumers actually record.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: String,
    pub category: String,
    pub summary: String,
    pub level: Level,
    /// Empty means the recipe is ecosystem-agnostic.
    pub ecosystems: Vec<Ecosystem>,
    pub provides: Vec<serde_yaml::Value>,
    pub requires: Vec<RecipeDependency>,
    pub prompt: PromptSections,
    /// Fix-content files keyed by path relative to the recipe dir
    /// ("fix.md", "variants/node_ts.md", ...).
    pub fix_files: BTreeMap<String, String>,
    /// Source directory the recipe was parsed from.
    pub dir: PathBuf,
}

impl Recipe {
    /// Facts this recipe establishes, skipping any non-string manifest entries.
    pub fn provided_facts(&self) -> impl Iterator<Item = &str> {
        self.provides.iter().filter_map(|v| v.as_str())
    }

    /// True when the recipe declares no ecosystems.
    pub fn is_ecosystem_agnostic(&self) -> bool {
        self.ecosystems.is_empty()
    }

    /// The base fix content (always present after a successful parse).
    pub fn base_fix(&self) -> &str {
        self.fix_files.get(FIX_FILE).map(String::as_str).unwrap_or("")
    }

    /// Fix content for a requested variant id, searching every ecosystem.
    ///
    /// Resolution order per ecosystem: the variant's declared `fix` path,
    /// then the ecosystem-qualified `variants/<eco>_<id>.md`, then the
    /// generic `variants/<id>.md` fallback.
    pub fn variant_fix(&self, variant_id: &str) -> Option<&str> {
        for eco in &self.ecosystems {
            for var in &eco.variants {
                if var.id == variant_id {
                    let qualified = format!("{}/{}_{}.md", VARIANTS_DIR, eco.id, var.id);
                    let generic = format!("{}/{}.md", VARIANTS_DIR, var.id);
                    for key in [var.fix.as_str(), qualified.as_str(), generic.as_str()] {
                        if let Some(content) = self.fix_files.get(key) {
                            return Some(content);
                        }
                    }
                }
            }
        }
        None
    }
}
