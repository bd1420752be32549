#![forbid(unsafe_code)]

mod cmd;
mod output;
mod server;

use beacon_core::config;
use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "beacon: open-tracking pixel server and reports",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags, `FORMAT`, and user config.
    fn output_mode(&self) -> OutputMode {
        let user_output = config::load_user_config().ok().and_then(|cfg| cfg.output);
        output::resolve_output_mode(self.format, self.json, user_output.as_deref())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a beacon project",
        long_about = "Create .beacon/config.toml with defaults and an empty event store in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    bcn init\n\n    # Reset the config to defaults\n    bcn init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Tracking",
        about = "Serve the tracking pixel",
        long_about = "Run the HTTP server. GET /track/<identifier> records an open and always returns a 1x1 GIF.",
        after_help = "EXAMPLES:\n    # Listen on the default address\n    bcn serve\n\n    # Listen on all interfaces\n    bcn serve --bind 0.0.0.0:8080"
    )]
    Serve(cmd::serve::ServeArgs),

    #[command(
        next_help_heading = "Tracking",
        about = "Record one open by hand",
        long_about = "Record an open through the same dedup and retention path the server uses.",
        after_help = "EXAMPLES:\n    # Record an open now\n    bcn record camp1-alice@example.com --origin 203.0.113.7 --agent curl/8.4.0\n\n    # Record an open at a fixed time\n    bcn record camp1-alice@example.com --origin 203.0.113.7 --at 2025-01-02T03:04:05Z"
    )]
    Record(cmd::record::RecordArgs),

    #[command(
        next_help_heading = "Reports",
        about = "List tracked identifiers",
        long_about = "List every identifier with at least one recorded open.",
        after_help = "EXAMPLES:\n    # List identifiers\n    bcn list\n\n    # Emit machine-readable output\n    bcn list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Show every open of one identifier",
        long_about = "Show each open of an identifier in every configured display zone, with client and location.",
        after_help = "EXAMPLES:\n    # Show one identifier\n    bcn show camp1-alice@example.com\n\n    # Emit machine-readable output\n    bcn show camp1-alice@example.com --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Summarize opens by origin",
        long_about = "Group opens in a time range by origin with counts, first/last seen, client and location.",
        after_help = "EXAMPLES:\n    # Last 30 days (default)\n    bcn summary\n\n    # One campaign over the last week\n    bcn summary --range 7d --prefix camp1\n\n    # Explicit bounds\n    bcn summary --start 2025-01-01 --end 2025-01-31"
    )]
    Summary(cmd::summary::SummaryArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Campaign dashboard",
        long_about = "Opens per identifier, opens by hour of day, and the busiest origins for a time range.",
        after_help = "EXAMPLES:\n    # Dashboard for the last 90 days\n    bcn dashboard --range 90d\n\n    # Emit machine-readable output\n    bcn dashboard --json"
    )]
    Dashboard(cmd::dashboard::DashboardArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Delete expired opens",
        long_about = "Delete opens older than the retention horizon (retention.days, 100 by default).",
        after_help = "EXAMPLES:\n    # Apply configured retention\n    bcn sweep\n\n    # Keep only the last 30 days\n    bcn sweep --days 30"
    )]
    Sweep(cmd::sweep::SweepArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    bcn completions bash\n\n    # Generate zsh completions\n    bcn completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BEACON_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "beacon=debug,bcn=debug,info"
        } else {
            "beacon=info,bcn=info,warn"
        })
    });

    let format = env::var("BEACON_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Serve(ref args) => cmd::serve::run_serve(args, output, &project_root),
        Commands::Record(ref args) => cmd::record::run_record(args, output, &project_root),
        Commands::List(ref args) => cmd::list::run_list(args, output, &project_root),
        Commands::Show(ref args) => cmd::show::run_show(args, output, &project_root),
        Commands::Summary(ref args) => cmd::summary::run_summary(args, output, &project_root),
        Commands::Dashboard(ref args) => {
            cmd::dashboard::run_dashboard(args, output, &project_root)
        }
        Commands::Sweep(ref args) => cmd::sweep::run_sweep(args, output, &project_root),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
