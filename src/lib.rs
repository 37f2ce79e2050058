//! Declarative workspace automation recipes with applied-state tracking
//!
//! A recipe is a directory describing one reusable automation unit: a YAML
//! manifest, an agent prompt, and one or more fix-content variants. This
//! crate resolves an ambiguous recipe reference (bare name, path, library
//! directory, or git URL) to exactly one source, parses and validates it,
//! checks its declared `provides`/`requires` contract against the
//! workspace's accumulated state, and records outcomes crash-safely.
//!
//! # Example recipe
//!
//! ```text
//! setup-logging/
//!   metadata.yaml
//!   prompt.md          ## Goal / ## Investigation / ## Expected Output
//!   fix.md
//!   variants/node_ts.md
//! ```
//!
//! ```yaml
//! id: setup-logging
//! category: observability
//! summary: Introduce structured logging
//! level: workspace-preferred
//! ecosystems:
//!   - id: node
//!     default_variant: ts
//!     variants:
//!       - id: ts
//!         fix: variants/node_ts.md
//! provides:
//!   - logging
//! requires:
//!   - key: package-manager
//!     equals: npm
//! ```
//!
//! Applying a recipe hands its prompt and fix content to an external AI
//! agent ([`agent`]) and, on success, records `"<id>.applied": true` plus
//! the recipe's provided facts in `.recipes/state.json` at workspace or
//! per-project scope ([`state`]).

pub mod agent;
pub mod config;
pub mod deps;
pub mod git;
pub mod library;
pub mod output;
pub mod parser;
pub mod recipe;
pub mod resolver;
pub mod state;
pub mod validate;

pub use recipe::{Level, Recipe};
pub use state::{StateManager, WorkspaceState};
