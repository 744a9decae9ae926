use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{AnalyticsArgs, GroupArgs, HistoryArgs, LinkArgs, TabArgs};

#[derive(Parser, Debug)]
#[command(
    name = "todlex",
    version,
    about = "Date-grouped link board with a soft-delete history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over TODLEX_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over TODLEX_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every tab with its links (default)
    Board,
    /// Create, select, list and delete date tabs
    Tab(TabArgs),
    /// Add, edit, reorder and delete links in the active tab
    Link(LinkArgs),
    /// Inspect and purge soft-deleted links
    History(HistoryArgs),
    /// Show or reset the activity log
    Analytics(AnalyticsArgs),
    /// Manage saved groups of links
    Group(GroupArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("TODLEX_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("TODLEX_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;

    let mut app = App::new(Arc::new(config), storage);
    app.init();
    match cli.command.unwrap_or(Commands::Board) {
        Commands::Board => commands::show_board(&mut app),
        Commands::Tab(args) => commands::handle_tab_command(&mut app, args),
        Commands::Link(args) => commands::handle_link_command(&mut app, args),
        Commands::History(args) => commands::handle_history_command(&mut app, args),
        Commands::Analytics(args) => commands::handle_analytics_command(&mut app, args),
        Commands::Group(args) => commands::handle_group_command(&mut app, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
