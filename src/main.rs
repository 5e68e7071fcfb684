use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use folio::history::Window;
use folio::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Refresh prices once and display the portfolio valuation
    Summary,
    /// Refresh on a fixed interval and display each cycle
    Watch,
    /// Display the valuation history for a window
    Chart {
        /// History window: 24h, 30d, 1y or all
        #[arg(short, long, default_value = "30d")]
        window: Window,
    },
}

impl From<Commands> for folio::AppCommand {
    fn from(cmd: Commands) -> folio::AppCommand {
        match cmd {
            Commands::Summary => folio::AppCommand::Summary,
            Commands::Watch => folio::AppCommand::Watch,
            Commands::Chart { window } => folio::AppCommand::Chart(window),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => folio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = folio::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
currency: "EUR"

# Seconds between refresh cycles in watch mode
refresh_interval_secs: 300

holdings:
  - kind: cash
    label: "Checking"
    amount: 0.0
  # - kind: crypto
  #   id: "bitcoin"
  #   amount: 0.0
  # - kind: equity
  #   symbol: "AAPL"
  #   units: 0.0
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
