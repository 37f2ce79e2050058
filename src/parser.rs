//! Recipe parsing - reads a recipe directory into a structured [`Recipe`]
//!
//! Parsing is a six-step pipeline, each step with its own typed failure mode:
//! directory existence, required files, manifest deserialization + shape,
//! id/directory agreement, prompt sections, and fix-content loading. Semantic
//! checks that should not block parsing (reserved keys, style) live in
//! [`crate::validate`] instead.

use crate::recipe::{
    Ecosystem, Level, PromptSections, Recipe, RecipeDependency, FIX_FILE, MANIFEST_FILE,
    PROMPT_FILE, VARIANTS_DIR,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The three mandatory `##` sections of prompt.md, in required order of checks.
pub const PROMPT_SECTIONS: [&str; 3] = ["Goal", "Investigation", "Expected Output"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("recipe directory not found: {0}")]
    RecipeNotFound(PathBuf),

    #[error("missing required file '{file}' in {dir}")]
    MissingRequiredFile { dir: PathBuf, file: &'static str },

    #[error("invalid metadata in {dir}: {reason}")]
    InvalidMetadata { dir: PathBuf, reason: String },

    #[error("manifest id '{manifest_id}' does not match directory name '{dir_name}'")]
    IdMismatch { manifest_id: String, dir_name: String },

    #[error("prompt.md is missing required section '## {0}'")]
    MissingPromptSection(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Stable machine-readable code, used in summaries and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RecipeNotFound(_) => "RECIPE_NOT_FOUND",
            Self::MissingRequiredFile { .. } => "MISSING_REQUIRED_FILE",
            Self::InvalidMetadata { .. } => "INVALID_METADATA",
            Self::IdMismatch { .. } => "ID_MISMATCH",
            Self::MissingPromptSection(_) => "MISSING_PROMPT_SECTION",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

/// Raw manifest shape as deserialized from metadata.yaml.
///
/// `provides` stays untyped so non-string entries surface as validation
/// findings rather than a blanket YAML error. `deny_unknown_fields` keeps
/// typos like `require:` from being silently dropped.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    id: String,
    category: String,
    summary: String,
    level: Level,
    ecosystems: Vec<Ecosystem>,
    provides: Vec<serde_yaml::Value>,
    requires: Vec<RecipeDependency>,
}

/// Parse a recipe directory into a [`Recipe`].
pub fn parse(dir: &Path) -> Result<Recipe, ParseError> {
    // Step 1: the directory itself.
    if !dir.is_dir() {
        return Err(ParseError::RecipeNotFound(dir.to_path_buf()));
    }

    // Step 2: required files before any content is touched, so the caller
    // sees MISSING_REQUIRED_FILE rather than a read error.
    for file in [MANIFEST_FILE, PROMPT_FILE, FIX_FILE] {
        if !dir.join(file).is_file() {
            return Err(ParseError::MissingRequiredFile { dir: dir.to_path_buf(), file });
        }
    }

    // Step 3: manifest deserialization and shape.
    let manifest_text = read(dir, MANIFEST_FILE)?;
    let manifest: Manifest =
        serde_yaml::from_str(&manifest_text).map_err(|e| ParseError::InvalidMetadata {
            dir: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

    // Step 4: the manifest id must agree with the directory's base name,
    // otherwise name-based lookup would resolve a different recipe than the
    // one the manifest claims to be.
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if manifest.id != dir_name {
        return Err(ParseError::IdMismatch { manifest_id: manifest.id, dir_name });
    }

    // Step 5: prompt sections.
    let prompt_text = read(dir, PROMPT_FILE)?;
    let prompt = parse_prompt(&prompt_text)?;

    // Step 6: fix content - base file plus everything under variants/.
    let mut fix_files = BTreeMap::new();
    fix_files.insert(FIX_FILE.to_string(), read(dir, FIX_FILE)?);
    let variants_dir = dir.join(VARIANTS_DIR);
    if variants_dir.is_dir() {
        let entries = std::fs::read_dir(&variants_dir).map_err(|e| ParseError::Io {
            path: variants_dir.clone(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| ParseError::Io {
                path: variants_dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| ParseError::Io { path: path.clone(), source: e })?;
                fix_files.insert(format!("{VARIANTS_DIR}/{name}"), content);
            }
        }
    }

    Ok(Recipe {
        id: manifest.id,
        category: manifest.category,
        summary: manifest.summary,
        level: manifest.level,
        ecosystems: manifest.ecosystems,
        provides: manifest.provides,
        requires: manifest.requires,
        prompt,
        fix_files,
        dir: dir.to_path_buf(),
    })
}

fn read(dir: &Path, file: &str) -> Result<String, ParseError> {
    let path = dir.join(file);
    std::fs::read_to_string(&path).map_err(|e| ParseError::Io { path, source: e })
}

/// Scan top-level `## ` headers and collect the text between them.
///
/// Section titles are case-sensitive and matched after trimming the header
/// line; `###` and deeper headers belong to the enclosing section's body.
fn parse_prompt(text: &str) -> Result<PromptSections, ParseError> {
    let mut sections: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(title) = line.strip_prefix("## ")
            && !line.starts_with("###")
        {
            if let Some((name, body)) = current.take() {
                sections.insert(name, body.join("\n").trim().to_string());
            }
            current = Some((title.trim().to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((name, body)) = current.take() {
        sections.insert(name, body.join("\n").trim().to_string());
    }

    for required in PROMPT_SECTIONS {
        if !sections.contains_key(required) {
            return Err(ParseError::MissingPromptSection(required));
        }
    }

    Ok(PromptSections {
        goal: sections.remove("Goal").unwrap_or_default(),
        investigation: sections.remove("Investigation").unwrap_or_default(),
        expected_output: sections.remove("Expected Output").unwrap_or_default(),
    })
}
