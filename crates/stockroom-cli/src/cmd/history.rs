use super::Project;
use crate::output::{OutputMode, pretty_section, render_mode};
use anyhow::Result;
use chrono::SecondsFormat;
use clap::Args;
use std::path::Path;
use stockroom_core::history::{ChangeRecord, get_history_for_asset};
use stockroom_core::model::AssetId;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    pub asset: AssetId,

    /// Only status changes.
    #[arg(long)]
    pub status_only: bool,

    /// Page number starting at 1; 0 prints every record.
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Records per page; defaults to `history.page_size` from config.
    #[arg(long)]
    pub page_size: Option<u32>,
}

/// Execute `sr history`.
///
/// # Errors
///
/// Returns an error if the asset does not exist or the query fails.
pub fn run_history(args: &HistoryArgs, cli_format: Option<&str>, cwd: &Path) -> Result<()> {
    let project = Project::open(cwd, cli_format)?;
    let output = OutputMode::from_resolved(&project.config.resolved_output);
    let page_size = args
        .page_size
        .unwrap_or(project.config.project.history.page_size);

    let page = get_history_for_asset(
        &project.conn,
        args.asset,
        args.status_only,
        args.page,
        page_size,
    )?;

    render_mode(
        output,
        &page,
        |p, w| {
            for record in &p.records {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    record.id,
                    timestamp(record),
                    record.subject,
                    record.field_name,
                    record.old_value,
                    record.new_value
                )?;
            }
            Ok(())
        },
        |p, w| {
            let heading = p.page.map_or_else(
                || format!("History of asset {} ({} records)", args.asset, p.total),
                |n| {
                    format!(
                        "History of asset {} (page {n} of {}, {} records)",
                        args.asset, p.num_pages, p.total
                    )
                },
            );
            pretty_section(w, &heading)?;
            if p.records.is_empty() {
                return writeln!(w, "No changes.");
            }
            for record in &p.records {
                let actor = record
                    .actor_user_id
                    .map_or_else(|| "-".to_string(), |id| format!("user {id}"));
                writeln!(
                    w,
                    "{}  {:<8} {:<18} {:<20} {} → {}",
                    timestamp(record),
                    actor,
                    record.subject,
                    record.field_name,
                    dash(&record.old_value),
                    dash(&record.new_value)
                )?;
                if let Some(ref comment) = record.comment {
                    writeln!(w, "{:>22}{comment}", "")?;
                }
            }
            Ok(())
        },
    )
}

fn timestamp(record: &ChangeRecord) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
