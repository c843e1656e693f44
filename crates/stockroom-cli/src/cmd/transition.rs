use super::asset::status_label;
use super::{CodedError, Project, status_arg};
use crate::output::{OutputMode, pretty_kv, pretty_section, render, render_mode};
use anyhow::Result;
use clap::{Args, Subcommand};
use std::io::{self, Write};
use std::path::Path;
use stockroom_core::error::ErrorCode;
use stockroom_core::model::{AssetId, UserId};
use stockroom_core::transition::actions::ActionRegistry;
use stockroom_core::transition::catalog::{NewTransition, create_transition, list_transitions};
use stockroom_core::transition::{Transition, apply_transition, list_transitions_applicable};

#[derive(Subcommand, Debug)]
pub enum TransitionCommand {
    /// Define a transition.
    Add(AddArgs),
    /// List transitions, optionally only those applicable to a status.
    List(ListArgs),
    /// Apply a transition to one or more assets.
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub name: String,

    /// Target status code.
    #[arg(long)]
    pub to: u16,

    /// Required current status; omit to allow any.
    #[arg(long)]
    pub from: Option<u16>,

    /// Action to run after the status change, in order. Repeatable.
    #[arg(long = "action")]
    pub actions: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only transitions applicable to this status.
    #[arg(long)]
    pub status: Option<u16>,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    pub name: String,

    #[arg(required = true)]
    pub assets: Vec<AssetId>,

    /// User the actions act on; defaults to the acting user.
    #[arg(long = "for")]
    pub affected: Option<UserId>,
}

/// Dispatch `sr transition ...`.
///
/// # Errors
///
/// Returns an error for an invalid definition, an unknown transition or
/// asset, a status mismatch, or a failing action.
pub fn run_transition(
    command: &TransitionCommand,
    actor: Option<UserId>,
    cli_format: Option<&str>,
    cwd: &Path,
) -> Result<()> {
    let project = Project::open(cwd, cli_format)?;
    let output = OutputMode::from_resolved(&project.config.resolved_output);
    match command {
        TransitionCommand::Add(args) => run_add(&project, args, output),
        TransitionCommand::List(args) => run_list(&project, args, output),
        TransitionCommand::Apply(args) => run_apply(&project, args, actor, output),
    }
}

fn run_add(project: &Project, args: &AddArgs, output: OutputMode) -> Result<()> {
    let transition = create_transition(
        &project.conn,
        &NewTransition {
            name: args.name.clone(),
            from_status: args.from.map(status_arg).transpose()?,
            to_status: status_arg(args.to)?,
            actions: args.actions.clone(),
        },
    )?;
    render(output, &transition, |t, w| {
        writeln!(w, "✓ Added transition {} ({})", t.name, t.slug)?;
        write_transition_line(w, t)
    })
}

fn write_transition_line(w: &mut dyn Write, t: &Transition) -> io::Result<()> {
    let from = t.from_status.map_or_else(|| "*".to_string(), |s| s.to_string());
    let actions: Vec<&str> = t.actions.iter().map(|a| a.name.as_str()).collect();
    writeln!(w, "{}\t{from} -> {}\t{}", t.name, t.to_status, actions.join(","))
}

fn run_list(project: &Project, args: &ListArgs, output: OutputMode) -> Result<()> {
    let transitions = match args.status {
        Some(code) => list_transitions_applicable(&project.conn, status_arg(code)?)?,
        None => list_transitions(&project.conn)?,
    };
    render_mode(
        output,
        &transitions,
        |ts, w| {
            for t in ts {
                write_transition_line(w, t)?;
            }
            Ok(())
        },
        |ts, w| {
            if ts.is_empty() {
                return writeln!(w, "No transitions.");
            }
            for t in ts {
                pretty_section(w, &t.name)?;
                let from = t.from_status.map_or_else(|| "any".to_string(), status_label);
                pretty_kv(w, "from", from)?;
                pretty_kv(w, "to", status_label(t.to_status))?;
                if !t.actions.is_empty() {
                    let names: Vec<&str> = t.actions.iter().map(|a| a.name.as_str()).collect();
                    pretty_kv(w, "actions", names.join(", "))?;
                }
                writeln!(w)?;
            }
            Ok(())
        },
    )
}

fn run_apply(
    project: &Project,
    args: &ApplyArgs,
    actor: Option<UserId>,
    output: OutputMode,
) -> Result<()> {
    let logged = actor.ok_or_else(|| {
        CodedError::new(
            ErrorCode::MissingActor,
            "applying a transition needs an acting user; pass --user <id>",
        )
    })?;
    let affected = args.affected.unwrap_or(logged);
    let store = project.store();
    let registry = ActionRegistry::with_builtins();

    let execution = apply_transition(
        &project.conn,
        &store,
        &registry,
        &args.name,
        &args.assets,
        logged,
        affected,
    )?;
    render(output, &execution, |e, w| {
        let ids: Vec<String> = e.asset_ids.iter().map(ToString::to_string).collect();
        if output.is_pretty() {
            writeln!(w, "✓ Applied '{}' to {} asset(s)", args.name, ids.len())?;
            pretty_kv(w, "execution", e.id.to_string())?;
            pretty_kv(w, "assets", ids.join(", "))
        } else {
            writeln!(w, "applied\t{}\t{}", e.id, ids.join(","))
        }
    })
}
