use crate::output::{OutputMode, pretty_kv, render};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use stockroom_core::config::{self, ProjectConfig};
use stockroom_core::db::open_db;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force re-initialization even if `.stockroom/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "*.sqlite3\n*.sqlite3-wal\n*.sqlite3-shm\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    root: String,
    config: String,
    database: String,
}

/// Execute `sr init`. Creates the project skeleton:
///
/// ```text
/// .stockroom/
///   config.toml         (every key at its default)
///   .gitignore          (the database and its WAL files)
///   stockroom.sqlite3   (migrated to the latest schema)
/// ```
///
/// `--force` rewrites `config.toml` and `.gitignore`; an existing database is
/// kept and migrated.
///
/// # Errors
///
/// Returns an error if `.stockroom/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let dir = config::stockroom_dir(project_root);

    if dir.exists() && !args.force {
        anyhow::bail!(
            "{}/ already exists. Use `sr init --force` to reinitialize.",
            config::STOCKROOM_DIR
        );
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = dir.join("config.toml");
    std::fs::write(&config_path, config::render_default_config()?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let gitignore_path = dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write {}", gitignore_path.display()))?;

    let db_path = config::database_path(project_root, &ProjectConfig::default());
    open_db(&db_path)?;

    let result = InitOutput {
        root: project_root.display().to_string(),
        config: config_path.display().to_string(),
        database: db_path.display().to_string(),
    };
    render(output, &result, |r, w| {
        if output.is_pretty() {
            writeln!(w, "✓ Initialized stockroom project in {}", r.root)?;
            pretty_kv(w, "config", &r.config)?;
            pretty_kv(w, "database", &r.database)
        } else {
            writeln!(w, "initialized\t{}", r.root)
        }
    })
}
