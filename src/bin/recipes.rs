//! Recipes CLI - apply declarative automation recipes to a workspace
//!
//! Usage:
//!   recipes validate <target>      Validate a recipe or a whole library
//!   recipes apply <target>         Apply a recipe via the external agent
//!   recipes show <target>          Show recipe metadata and applied status
//!   recipes refresh [name]         Refresh one or all configured libraries
//!   recipes list [--category c]    List categories or recipes in one
//!
//! A target may be a bare recipe name, a path to a recipe folder, a path to
//! a library directory, or a git URL.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use workbench_recipes::agent::{self, AgentInvocation, AgentRunner, SubprocessAgent};
use workbench_recipes::config::{AppPaths, GlobalConfig};
use workbench_recipes::deps;
use workbench_recipes::library::{LibraryManager, RecipeLibrary};
use workbench_recipes::output;
use workbench_recipes::parser;
use workbench_recipes::recipe::{Level, Recipe};
use workbench_recipes::resolver::{self, Resolved};
use workbench_recipes::state::StateManager;
use workbench_recipes::validate;

#[derive(Parser)]
#[command(name = "recipes")]
#[command(about = "Declarative workspace automation recipes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a recipe, or every recipe in a library
    Validate {
        /// Recipe name, recipe folder, library directory, or git URL
        target: String,
    },

    /// Apply a recipe to the workspace via the external agent
    Apply {
        /// Recipe name, recipe folder, library directory, or git URL
        target: String,

        /// Project path (relative to the workspace root) to target
        #[arg(short, long)]
        project: Option<String>,

        /// Fix variant to use instead of the base fix content
        #[arg(long)]
        variant: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// Agent binary invoked with the composed prompt on stdin
        #[arg(long, env = "RECIPES_AGENT", default_value = "claude")]
        agent: String,
    },

    /// Show recipe metadata and applied status
    Show {
        /// Recipe name, recipe folder, or git URL
        target: String,

        /// Project path to report applied status for
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Refresh one configured library, or all of them
    Refresh {
        /// Library name (all configured libraries if omitted)
        name: Option<String>,
    },

    /// List categories, or the recipes in one category
    List {
        /// Category to list recipes for
        #[arg(short, long)]
        category: Option<String>,
    },
}

/// Structured command surface shared by every subcommand: a context header,
/// messages and findings streamed as they happen, and a final pass/fail
/// summary driven by the error count.
#[derive(Debug, Default)]
struct CommandReport {
    warnings: usize,
    errors: usize,
}

impl CommandReport {
    fn start(context: &str) -> Self {
        output::action(context);
        Self::default()
    }

    fn message(&self, message: &str) {
        output::info(message);
    }

    fn warning(&mut self, warning: &str) {
        self.warnings += 1;
        output::finding(false, warning);
    }

    fn error(&mut self, error: &str) {
        self.errors += 1;
        output::finding(true, error);
    }

    fn ok(&self) -> bool {
        self.errors == 0
    }

    fn finish(&self, summary: &str) {
        if self.ok() {
            output::success(summary);
        } else {
            output::error(summary);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace_root = match cli.workspace {
        Some(root) => root,
        None => std::env::current_dir().context("failed to determine current directory")?,
    };
    let paths = AppPaths::discover(workspace_root)?;
    let config = GlobalConfig::load(&paths.config_file)?;
    let manager = LibraryManager::new(&config, &paths);

    match cli.command {
        Commands::Validate { target } => cmd_validate(&target, &manager, &paths),
        Commands::Apply { target, project, variant, yes, agent } => {
            cmd_apply(&target, project.as_deref(), variant.as_deref(), yes, &agent, &manager, &paths)
        }
        Commands::Show { target, project } => {
            cmd_show(&target, project.as_deref(), &manager, &paths)
        }
        Commands::Refresh { name } => cmd_refresh(name.as_deref(), &manager),
        Commands::List { category } => cmd_list(category.as_deref(), &manager),
    }
}

fn cmd_validate(target: &str, manager: &LibraryManager, paths: &AppPaths) -> Result<()> {
    match resolver::resolve(target, manager, paths)? {
        Resolved::Recipe(dir) => {
            let mut report = CommandReport::start(&format!("Validating recipe {}", dir.display()));
            let recipe = parser::parse(&dir)
                .with_context(|| format!("failed to parse recipe at {}", dir.display()))?;
            let result = validate::validate(&recipe);
            for warning in &result.warnings {
                report.warning(warning);
            }
            for error in &result.errors {
                report.error(error);
            }
            report.finish(&format!(
                "{}: {} error(s), {} warning(s)",
                recipe.id, report.errors, report.warnings
            ));
            if !report.ok() {
                bail!("recipe '{}' failed validation", recipe.id);
            }
            Ok(())
        }
        Resolved::Library(dir) => {
            let mut report = CommandReport::start(&format!("Validating library {}", dir.display()));
            let library = RecipeLibrary::parse(&dir)?;
            let mut failed = library.failures.len();

            for (path, err) in &library.failures {
                report.error(&format!("{} [{}]: {err}", path.display(), err.code()));
            }
            for recipe in &library.recipes {
                let result = validate::validate(recipe);
                for warning in &result.warnings {
                    report.warning(&format!("{}: {warning}", recipe.id));
                }
                if !result.errors.is_empty() {
                    failed += 1;
                }
                for error in &result.errors {
                    report.error(&format!("{}: {error}", recipe.id));
                }
            }

            let total = library.recipes.len() + library.failures.len();
            let passed = total - failed;
            report.finish(&format!("{passed} passed, {failed} failed of {total} recipes"));
            if failed > 0 {
                bail!("library validation failed for {failed} of {total} recipes");
            }
            Ok(())
        }
    }
}

fn cmd_apply(
    target: &str,
    project: Option<&str>,
    variant: Option<&str>,
    yes: bool,
    agent_bin: &str,
    manager: &LibraryManager,
    paths: &AppPaths,
) -> Result<()> {
    let dir = match resolver::resolve(target, manager, paths)? {
        Resolved::Recipe(dir) => dir,
        Resolved::Library(dir) => {
            bail!(
                "'{}' is a library, not a single recipe; pick one recipe under {}",
                target,
                dir.display()
            )
        }
    };

    let recipe = parser::parse(&dir)
        .with_context(|| format!("failed to parse recipe at {}", dir.display()))?;
    let mut report =
        CommandReport::start(&format!("Applying {} ({})", recipe.id, recipe.level.as_str()));

    output::sub_action("validating");
    let result = validate::validate(&recipe);
    for warning in &result.warnings {
        report.warning(warning);
    }
    for error in &result.errors {
        report.error(error);
    }
    if !report.ok() {
        report.finish(&format!("{} failed validation", recipe.id));
        bail!("recipe '{}' failed validation", recipe.id);
    }

    // Level/project mismatches must fail here, before the agent touches the
    // workspace; recording would reject them afterwards and leave the
    // agent's changes without an applied marker.
    match (recipe.level, project) {
        (Level::ProjectOnly, None) => {
            bail!("recipe '{}' is project-only; pass --project <path>", recipe.id)
        }
        (Level::WorkspaceOnly, Some(_)) => {
            bail!("recipe '{}' is workspace-only; drop --project", recipe.id)
        }
        _ => {}
    }

    let mut state = StateManager::new(&paths.workspace_root);
    // Normalize once; this also rejects traversal before anything runs.
    let project = match project {
        Some(p) => Some(state.normalize_project_path(p)?),
        None => None,
    };
    let project = project.as_deref();

    if state.is_recipe_applied(&recipe.id, recipe.level, project)? {
        output::skip(&format!("{} already applied, skipping", recipe.id));
        return Ok(());
    }

    output::sub_action("checking dependencies");
    let check = deps::check_dependencies(&recipe, state.workspace_state()?, project);
    if !check.satisfied {
        for dep in &check.missing {
            report.error(&format!("missing: '{}' must equal '{}'", dep.key, dep.equals));
        }
        for conflict in &check.conflicting {
            report.error(&format!(
                "conflict: '{}' must equal '{}' but is currently {}",
                conflict.key, conflict.required, conflict.current
            ));
        }
        report.finish(&format!("{} dependencies not satisfied", recipe.id));
        bail!(
            "dependencies not satisfied for '{}' ({} missing, {} conflicting)",
            recipe.id,
            check.missing.len(),
            check.conflicting.len()
        );
    }

    let fix_content = match variant {
        Some(id) => recipe
            .variant_fix(id)
            .with_context(|| format!("recipe '{}' has no variant '{id}'", recipe.id))?,
        None => recipe.base_fix(),
    };

    if !yes && !confirm(&format!("Apply recipe '{}'?", recipe.id))? {
        output::skip("aborted by user");
        return Ok(());
    }

    output::sub_action("running agent");
    let invocation =
        AgentInvocation::for_recipe(&recipe, fix_content, paths.workspace_root.clone(), project);
    let runner = SubprocessAgent::new(agent_bin);
    let (_cancel_handle, cancel) = agent::cancellation();
    let outcome = runner
        .run(&invocation, cancel)
        .with_context(|| format!("agent failed while applying '{}'", recipe.id))?;
    if !outcome.report.trim().is_empty() {
        report.message(outcome.report.trim());
    }

    output::sub_action("recording state");
    state.record_applied_recipe(&recipe.id, recipe.level, project)?;
    let project_scope = match (recipe.level, project) {
        (Level::WorkspaceOnly, _) => None,
        (_, p) => p,
    };
    for fact in recipe.provided_facts() {
        match project_scope {
            Some(p) => state.set_project_value(p, fact, serde_json::Value::Bool(true))?,
            None => state.set_workspace_value(fact, serde_json::Value::Bool(true))?,
        }
    }

    report.finish(&format!("{} applied", recipe.id));
    Ok(())
}

fn cmd_show(
    target: &str,
    project: Option<&str>,
    manager: &LibraryManager,
    paths: &AppPaths,
) -> Result<()> {
    let dir = match resolver::resolve(target, manager, paths)? {
        Resolved::Recipe(dir) => dir,
        Resolved::Library(dir) => bail!("'{}' is a library ({})", target, dir.display()),
    };
    let recipe = parser::parse(&dir)?;
    let report = CommandReport::start(&format!("{} ({})", recipe.id, recipe.category));
    print_recipe(&recipe, manager, &report);

    let mut state = StateManager::new(&paths.workspace_root);
    let applied = state.is_recipe_applied(&recipe.id, recipe.level, project)?;
    report.finish(&format!("applied: {applied}"));
    Ok(())
}

fn print_recipe(recipe: &Recipe, manager: &LibraryManager, report: &CommandReport) {
    report.message(&recipe.summary);
    report.message(&format!("level: {}", recipe.level.as_str()));
    if let Some(library) = manager.is_remote_library(&recipe.dir) {
        report.message(&format!("from library: {library}"));
    }
    if recipe.is_ecosystem_agnostic() {
        report.message("ecosystems: (agnostic)");
    }
    for eco in &recipe.ecosystems {
        let variants: Vec<&str> = eco.variants.iter().map(|v| v.id.as_str()).collect();
        report.message(&format!(
            "ecosystem {}: variants [{}], default {}",
            eco.id,
            variants.join(", "),
            eco.default_variant
        ));
    }
    for fact in recipe.provided_facts() {
        report.message(&format!("provides: {fact}"));
    }
    for dep in &recipe.requires {
        report.message(&format!("requires: {} == {}", dep.key, dep.equals));
    }
}

fn cmd_refresh(name: Option<&str>, manager: &LibraryManager) -> Result<()> {
    match name {
        Some(name) => {
            let report = CommandReport::start(&format!("Refreshing library '{name}'"));
            manager
                .refresh_library(name)
                .with_context(|| format!("failed to refresh library '{name}'"))?;
            report.finish(&format!("library '{name}' refreshed"));
            Ok(())
        }
        None => {
            // Per-library skip warnings are printed by the manager as they
            // happen; the report carries the context and the totals.
            let report = CommandReport::start("Refreshing configured libraries");
            let summary = manager.refresh_all_libraries();
            report.finish(&format!(
                "{} refreshed, {} skipped",
                summary.refreshed.len(),
                summary.skipped.len()
            ));
            Ok(())
        }
    }
}

fn cmd_list(category: Option<&str>, manager: &LibraryManager) -> Result<()> {
    match category {
        Some(category) => {
            let report = CommandReport::start(&format!("Recipes in category '{category}'"));
            let recipes = manager.recipes_by_category(category)?;
            for recipe in &recipes {
                report.message(&format!("{} - {}", recipe.id, recipe.summary));
            }
            report.finish(&format!("{} recipe(s)", recipes.len()));
            Ok(())
        }
        None => {
            let report = CommandReport::start("Categories across mirrored libraries");
            let categories = manager.all_categories()?;
            if categories.is_empty() {
                report.message("no mirrored libraries; run 'recipes refresh' first");
            }
            for category in &categories {
                report.message(category);
            }
            report.finish(&format!("{} categories", categories.len()));
            Ok(())
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_findings_and_fails_on_error() {
        let mut report = CommandReport::start("checking something");
        assert!(report.ok());
        report.warning("style nit");
        assert!(report.ok());
        report.error("broken");
        assert!(!report.ok());
        assert_eq!((report.warnings, report.errors), (1, 1));
    }
}
