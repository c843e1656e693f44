#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::action::ActionCommand;
use cmd::asset::AssetCommand;
use cmd::transition::TransitionCommand;
use output::{CliError, OutputMode};
use std::env;
use std::path::Path;
use stockroom_core::config;
use stockroom_core::model::UserId;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "sr",
    author,
    version,
    about = "stockroom: IT asset inventory with an audit trail",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (same as `--format json`).
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Acting user recorded on history and executions.
    #[arg(long, global = true)]
    user: Option<UserId>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// The format requested by flags, before env and config are consulted.
    fn format_flag(&self) -> Option<&'static str> {
        output::flag_format(self.format, self.json)
    }

    /// Output mode for messages printed before a project is opened.
    fn fallback_output_mode(&self, cwd: &Path) -> OutputMode {
        let resolved = config::find_project_root(cwd)
            .and_then(|root| config::resolve_config(&root, self.format_flag()).ok())
            .map_or_else(
                || config::resolve_output(self.format_flag(), None, env::var("FORMAT").ok()),
                |cfg| cfg.resolved_output,
            );
        OutputMode::from_resolved(&resolved)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a stockroom project",
        long_about = "Create .stockroom/ with a default config.toml and a migrated database.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    sr init\n\n    # Rewrite the config of an existing project\n    sr init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Inventory",
        about = "Create, inspect and edit assets",
        long_about = "Create, inspect and edit assets. Every save records its field changes.",
        after_help = "EXAMPLES:\n    # Add a rack server\n    sr asset add --kind device --sn SN-100 --model R640 --rack R-01\n\n    # Change its status with a comment\n    sr --user 1 asset set 1 --status 2 --comment \"unpacked\"\n\n    # Show it\n    sr asset show 1 --json"
    )]
    Asset {
        #[command(subcommand)]
        command: AssetCommand,
    },

    #[command(
        next_help_heading = "Workflow",
        about = "Manage transition actions",
        long_about = "Register action names that transitions run after changing status.",
        after_help = "EXAMPLES:\n    # Register an action\n    sr action add assign_user\n\n    # List actions\n    sr action list"
    )]
    Action {
        #[command(subcommand)]
        command: ActionCommand,
    },

    #[command(
        next_help_heading = "Workflow",
        about = "Define and apply status transitions",
        long_about = "Define status transitions and apply them to batches of assets.",
        after_help = "EXAMPLES:\n    # Define a transition from 2 to 3 that assigns an owner\n    sr transition add \"Send to release\" --from 2 --to 3 --action assign_owner\n\n    # Transitions applicable to status 2\n    sr transition list --status 2\n\n    # Apply to two assets on behalf of user 7\n    sr --user 1 transition apply \"Send to release\" 4 5 --for 7"
    )]
    Transition {
        #[command(subcommand)]
        command: TransitionCommand,
    },

    #[command(
        next_help_heading = "Audit",
        about = "Show an asset's change history",
        long_about = "Show the change history of an asset and the sub-records it links to, newest first.",
        after_help = "EXAMPLES:\n    # First page of history\n    sr history 4\n\n    # Every status change, unpaged\n    sr history 4 --status-only --page 0\n\n    # Emit machine-readable output\n    sr history 4 --json"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        long_about = "Write a shell completion script for sr to stdout.",
        after_help = "EXAMPLES:\n    # Bash\n    sr completions bash > ~/.local/share/bash-completion/completions/sr"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STOCKROOM_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "stockroom_core=debug,info"
        } else {
            "stockroom_core=info,warn"
        })
    });

    let format = env::var("STOCKROOM_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, cwd: &Path) -> anyhow::Result<()> {
    let format = cli.format_flag();
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, cli.fallback_output_mode(cwd), cwd),
        Commands::Asset { command } => cmd::asset::run_asset(command, cli.user, format, cwd),
        Commands::Action { command } => cmd::action::run_action(command, format, cwd),
        Commands::Transition { command } => {
            cmd::transition::run_transition(command, cli.user, format, cwd)
        }
        Commands::History(args) => cmd::history::run_history(args, format, cwd),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    stockroom_core::init();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let cwd = env::current_dir()?;
    if let Err(err) = run(&cli, &cwd) {
        let code = cmd::error_code(&err);
        let error = CliError::new(format!("{err:#}")).with_code(code);
        output::render_error(cli.fallback_output_mode(&cwd), &error)?;
        std::process::exit(1);
    }
    Ok(())
}
