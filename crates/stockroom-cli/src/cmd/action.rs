use super::Project;
use crate::output::{OutputMode, render, render_mode};
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::Path;
use stockroom_core::transition::actions::ActionRegistry;
use stockroom_core::transition::catalog::{create_action, list_actions};

#[derive(Subcommand, Debug)]
pub enum ActionCommand {
    /// Register an action name that transitions can reference.
    Add(AddArgs),
    /// List registered action names.
    List,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub name: String,
}

#[derive(Debug, Serialize)]
struct ActionRow {
    id: i64,
    name: String,
    /// Whether this binary ships a handler for the action.
    builtin: bool,
}

/// Dispatch `sr action ...`.
///
/// # Errors
///
/// Returns an error if the name is invalid or already taken, or on storage
/// failure.
pub fn run_action(command: &ActionCommand, cli_format: Option<&str>, cwd: &Path) -> Result<()> {
    let project = Project::open(cwd, cli_format)?;
    let output = OutputMode::from_resolved(&project.config.resolved_output);
    let registry = ActionRegistry::with_builtins();

    match command {
        ActionCommand::Add(args) => {
            let action = create_action(&project.conn, &args.name)?;
            let row = ActionRow {
                id: action.id.get(),
                builtin: registry.contains(&action.name),
                name: action.name,
            };
            render(output, &row, |r, w| {
                writeln!(w, "✓ Added action {} ({})", r.name, r.id)?;
                if !r.builtin {
                    writeln!(w, "warning: no handler named '{}' is built in", r.name)?;
                }
                Ok(())
            })
        }
        ActionCommand::List => {
            let rows: Vec<ActionRow> = list_actions(&project.conn)?
                .into_iter()
                .map(|action| ActionRow {
                    id: action.id.get(),
                    builtin: registry.contains(&action.name),
                    name: action.name,
                })
                .collect();
            render_mode(
                output,
                &rows,
                |rows, w| {
                    for row in rows {
                        writeln!(w, "{}\t{}", row.id, row.name)?;
                    }
                    Ok(())
                },
                |rows, w| {
                    if rows.is_empty() {
                        return writeln!(w, "No actions.");
                    }
                    for row in rows {
                        let marker = if row.builtin { "" } else { "  (no handler)" };
                        writeln!(w, "{:>4}  {}{marker}", row.id, row.name)?;
                    }
                    Ok(())
                },
            )
        }
    }
}
