use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use roozane::{
    Config, Database, RunMode,
    cli::{Cli, Commands},
};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine run mode: --dev flag enables dev mode, otherwise use prod
    let mode = if cli.dev { RunMode::Dev } else { RunMode::Prod };

    // Load configuration with the determined mode
    // Note: --config option is parsed but not yet used to override config path
    let config = Config::load_with_mode(mode)?;

    // Initialize database
    let db_path = config.get_database_path();
    let mut db = Database::new(
        db_path
            .to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
    )?;

    // Dispatch to appropriate command handler
    match cli.command.unwrap_or(Commands::List { date: None }) {
        Commands::List { date } => {
            roozane::cli::handle_list(&mut db, date)?;
        }
        Commands::Add {
            title,
            date,
            time,
            description,
            priority,
            repeat,
        } => {
            roozane::cli::handle_add(&db, &config, title, date, time, description, priority, repeat)?;
        }
        Commands::Edit {
            id,
            title,
            date,
            time,
            description,
            priority,
            repeat,
        } => {
            roozane::cli::handle_edit(&db, id, title, date, time, description, priority, repeat)?;
        }
        Commands::Done { id } => {
            roozane::cli::handle_done(&db, id)?;
        }
        Commands::Rm { id } => {
            roozane::cli::handle_rm(&db, id)?;
        }
        Commands::Repeat { id } => {
            roozane::cli::handle_repeat(&db, id)?;
        }
        Commands::Check => {
            roozane::cli::handle_check(&mut db)?;
        }
        Commands::Cal { date, shift } => {
            roozane::cli::handle_cal(date, shift)?;
        }
        Commands::Profile {
            name,
            theme,
            email,
            age,
        } => {
            roozane::cli::handle_profile(&db, name, theme, email, age)?;
        }
    }

    Ok(())
}
