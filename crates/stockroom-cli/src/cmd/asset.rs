use super::{CodedError, Project, status_arg};
use crate::output::{OutputMode, pretty_kv, pretty_section, render, render_mode};
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use stockroom_core::db::assets::{AssetStore, SaveContext, SqliteAssetStore};
use stockroom_core::error::ErrorCode;
use stockroom_core::history::ChangeRecord;
use stockroom_core::history::hooks::HookReport;
use stockroom_core::model::asset::{Asset, AssetKind, DeviceInfo, OfficeInfo, PartInfo};
use stockroom_core::model::{AssetId, Status, UserId};
use stockroom_core::transition::list_transitions_applicable;

#[derive(Subcommand, Debug)]
pub enum AssetCommand {
    /// Create an asset.
    Add(AddArgs),
    /// Show one asset with its sub-records.
    Show(ShowArgs),
    /// Edit fields of an asset and record the changes.
    Set(SetArgs),
    /// List every asset.
    List,
    /// Delete an asset; its history is kept.
    Rm(ShowArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long, default_value = "device")]
    pub kind: AssetKind,

    #[arg(long)]
    pub sn: Option<String>,

    #[arg(long)]
    pub barcode: Option<String>,

    #[arg(long, default_value = "")]
    pub model: String,

    /// Initial status code.
    #[arg(long, default_value_t = Status::NEW.0)]
    pub status: u16,

    #[arg(long, default_value = "")]
    pub remarks: String,

    /// Rack name; creates the device-info sub-record.
    #[arg(long)]
    pub rack: Option<String>,

    /// License key; creates the office-info sub-record.
    #[arg(long)]
    pub license_key: Option<String>,

    /// Comment stored on the creation history.
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub id: AssetId,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    pub id: AssetId,

    #[arg(long)]
    pub sn: Option<String>,

    #[arg(long)]
    pub barcode: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub status: Option<u16>,

    #[arg(long)]
    pub remarks: Option<String>,

    #[arg(long)]
    pub owner: Option<UserId>,

    #[arg(long)]
    pub user_id: Option<UserId>,

    #[arg(long)]
    pub warehouse: Option<String>,

    #[arg(long)]
    pub price: Option<f64>,

    /// Comment stored on every history record this edit writes.
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
struct SaveOutput {
    asset: Asset,
    changes: Vec<ChangeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_warning: Option<HistoryWarning>,
}

/// History entries that could not be written while the save itself went through.
#[derive(Debug, Serialize)]
struct HistoryWarning {
    error_code: &'static str,
    message: &'static str,
    suggestion: Option<&'static str>,
    failures: Vec<String>,
}

impl HistoryWarning {
    /// `None` when every report is clean.
    fn from_reports(reports: &[&HookReport]) -> Option<Self> {
        let failures: Vec<String> = reports
            .iter()
            .flat_map(|report| report.failures.iter().map(ToString::to_string))
            .collect();
        if failures.is_empty() {
            return None;
        }
        let code = ErrorCode::HistoryWriteFailed;
        Some(Self {
            error_code: code.code(),
            message: code.message(),
            suggestion: code.hint(),
            failures,
        })
    }
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    asset: Asset,
    device_info: Option<DeviceInfo>,
    part_info: Option<PartInfo>,
    office_info: Option<OfficeInfo>,
    applicable_transitions: Vec<String>,
}

/// Dispatch `sr asset ...`.
///
/// # Errors
///
/// Returns an error if the project cannot be opened, the asset is unknown,
/// or a save fails.
pub fn run_asset(
    command: &AssetCommand,
    actor: Option<UserId>,
    cli_format: Option<&str>,
    cwd: &Path,
) -> Result<()> {
    let project = Project::open(cwd, cli_format)?;
    let output = OutputMode::from_resolved(&project.config.resolved_output);
    let store = project.store();
    match command {
        AssetCommand::Add(args) => run_add(&store, args, actor, output),
        AssetCommand::Show(args) => run_show(&project, &store, args.id, output),
        AssetCommand::Set(args) => run_set(&store, args, actor, output),
        AssetCommand::List => run_list(&store, output),
        AssetCommand::Rm(args) => run_rm(&store, args.id, output),
    }
}

fn require(store: &SqliteAssetStore<'_>, id: AssetId) -> Result<Asset> {
    store.load_asset(id)?.ok_or_else(|| {
        CodedError::new(ErrorCode::AssetNotFound, format!("asset {id} not found")).into()
    })
}

fn run_add(
    store: &SqliteAssetStore<'_>,
    args: &AddArgs,
    actor: Option<UserId>,
    output: OutputMode,
) -> Result<()> {
    let mut ctx = SaveContext::by(actor);
    if let Some(ref comment) = args.comment {
        ctx = ctx.with_comment(comment.clone());
    }

    let mut asset = Asset {
        kind: args.kind,
        status: status_arg(args.status)?,
        sn: args.sn.clone(),
        barcode: args.barcode.clone(),
        model: args.model.clone(),
        remarks: args.remarks.clone(),
        ..Asset::default()
    };

    let mut sub_reports = Vec::new();
    if let Some(ref rack) = args.rack {
        let mut device = DeviceInfo {
            rack: Some(rack.clone()),
            ..DeviceInfo::default()
        };
        sub_reports.push(store.save_device_info(&mut device, &ctx)?);
        asset.device_info = device.id;
    }
    if let Some(ref key) = args.license_key {
        let mut office = OfficeInfo {
            license_key: Some(key.clone()),
            ..OfficeInfo::default()
        };
        sub_reports.push(store.save_office_info(&mut office, &ctx)?);
        asset.office_info = office.id;
    }

    let report = store.save_asset(&mut asset, &ctx)?;
    let mut reports: Vec<&HookReport> = sub_reports.iter().collect();
    reports.push(&report);
    let history_warning = HistoryWarning::from_reports(&reports);
    let result = SaveOutput {
        history_warning,
        changes: report.changes,
        asset,
    };
    render_save(output, &result, "Created")
}

fn run_set(
    store: &SqliteAssetStore<'_>,
    args: &SetArgs,
    actor: Option<UserId>,
    output: OutputMode,
) -> Result<()> {
    let mut asset = require(store, args.id)?;
    if let Some(ref sn) = args.sn {
        asset.sn = Some(sn.clone());
    }
    if let Some(ref barcode) = args.barcode {
        asset.barcode = Some(barcode.clone());
    }
    if let Some(ref model) = args.model {
        asset.model.clone_from(model);
    }
    if let Some(status) = args.status {
        asset.status = status_arg(status)?;
    }
    if let Some(ref remarks) = args.remarks {
        asset.remarks.clone_from(remarks);
    }
    if let Some(owner) = args.owner {
        asset.owner_id = Some(owner);
    }
    if let Some(user) = args.user_id {
        asset.user_id = Some(user);
    }
    if let Some(ref warehouse) = args.warehouse {
        asset.warehouse = Some(warehouse.clone());
    }
    if let Some(price) = args.price {
        asset.price = Some(price);
    }

    let mut ctx = SaveContext::by(actor);
    if let Some(ref comment) = args.comment {
        ctx = ctx.with_comment(comment.clone());
    }
    let report = store.save_asset(&mut asset, &ctx)?;
    let result = SaveOutput {
        history_warning: HistoryWarning::from_reports(&[&report]),
        changes: report.changes,
        asset,
    };
    render_save(output, &result, "Updated")
}

fn render_save(output: OutputMode, result: &SaveOutput, verb: &str) -> Result<()> {
    let id = result.asset.id.map_or_else(String::new, |id| id.to_string());
    render_mode(
        output,
        result,
        |r, w| {
            writeln!(w, "{}\t{id}\t{} changes", verb.to_lowercase(), r.changes.len())?;
            write_warning(w, r.history_warning.as_ref())
        },
        |r, w| {
            writeln!(w, "✓ {verb} asset {id}")?;
            for change in &r.changes {
                writeln!(
                    w,
                    "  {:<16} {} → {}",
                    change.field_name,
                    blank_dash(&change.old_value),
                    blank_dash(&change.new_value)
                )?;
            }
            write_warning(w, r.history_warning.as_ref())
        },
    )
}

fn write_warning(w: &mut dyn Write, warning: Option<&HistoryWarning>) -> io::Result<()> {
    let Some(warning) = warning else {
        return Ok(());
    };
    writeln!(w, "warning[{}]: {}", warning.error_code, warning.message)?;
    for failure in &warning.failures {
        writeln!(w, "  {failure}")?;
    }
    if let Some(suggestion) = warning.suggestion {
        writeln!(w, "  suggestion: {suggestion}")?;
    }
    Ok(())
}

fn blank_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn run_show(
    project: &Project,
    store: &SqliteAssetStore<'_>,
    id: AssetId,
    output: OutputMode,
) -> Result<()> {
    let asset = require(store, id)?;
    let device_info = asset
        .device_info
        .map(|id| store.load_device_info(id))
        .transpose()?
        .flatten();
    let part_info = asset
        .part_info
        .map(|id| store.load_part_info(id))
        .transpose()?
        .flatten();
    let office_info = asset
        .office_info
        .map(|id| store.load_office_info(id))
        .transpose()?
        .flatten();
    let applicable_transitions = list_transitions_applicable(&project.conn, asset.status)?
        .into_iter()
        .map(|t| t.name)
        .collect();

    let result = ShowOutput {
        asset,
        device_info,
        part_info,
        office_info,
        applicable_transitions,
    };
    render_mode(
        output,
        &result,
        |r, w| {
            writeln!(
                w,
                "{id}\t{}\t{}\t{}\t{}",
                r.asset.kind,
                r.asset.status,
                r.asset.sn.as_deref().unwrap_or("-"),
                blank_dash(&r.asset.model)
            )
        },
        |r, w| {
            pretty_section(w, &format!("Asset {id}"))?;
            pretty_kv(w, "kind", r.asset.kind.as_str())?;
            pretty_kv(w, "status", status_label(r.asset.status))?;
            pretty_kv(w, "sn", r.asset.sn.as_deref().unwrap_or("-"))?;
            pretty_kv(w, "barcode", r.asset.barcode.as_deref().unwrap_or("-"))?;
            pretty_kv(w, "model", blank_dash(&r.asset.model))?;
            if let Some(owner) = r.asset.owner_id {
                pretty_kv(w, "owner", owner.to_string())?;
            }
            if let Some(user) = r.asset.user_id {
                pretty_kv(w, "user", user.to_string())?;
            }
            if let Some(ref device) = r.device_info {
                pretty_kv(w, "rack", device.rack.as_deref().unwrap_or("-"))?;
            }
            if let Some(ref office) = r.office_info {
                pretty_kv(w, "license", office.license_key.as_deref().unwrap_or("-"))?;
            }
            if !r.applicable_transitions.is_empty() {
                pretty_kv(w, "transitions", r.applicable_transitions.join(", "))?;
            }
            Ok(())
        },
    )
}

pub fn status_label(status: Status) -> String {
    status
        .label()
        .map_or_else(|| status.to_string(), |label| format!("{status} ({label})"))
}

fn run_list(store: &SqliteAssetStore<'_>, output: OutputMode) -> Result<()> {
    let assets = store.list_assets()?;
    render(output, &assets, |assets, w| {
        if assets.is_empty() && output.is_pretty() {
            return writeln!(w, "No assets.");
        }
        for asset in assets {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                asset.id.map_or_else(String::new, |id| id.to_string()),
                asset.kind,
                asset.status,
                asset.sn.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    })
}

fn run_rm(store: &SqliteAssetStore<'_>, id: AssetId, output: OutputMode) -> Result<()> {
    if !store.delete_asset(id)? {
        return Err(CodedError::new(ErrorCode::AssetNotFound, format!("asset {id} not found")).into());
    }
    let result = serde_json::json!({ "deleted": id });
    render(output, &result, |_, w| writeln!(w, "✓ Deleted asset {id}; history kept"))
}
