use clap::Parser;
use gridgate::cli::{self, Cli, Commands, LedgerCommands};
use gridgate::config::{AppConfig, LoggingConfig};
use gridgate::error::{GateError, Result};
use gridgate::services::start_proxy_server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    if let Err(errors) = config.validate() {
        init_logging_simple();
        for e in &errors {
            error!("config: {}", e);
        }
        return Err(GateError::Validation(errors.join("; ")));
    }

    match cli.command {
        Some(Commands::CheckKey { account_id }) => {
            init_logging_simple();
            cli::check_key(&config, &account_id).await?;
        }
        Some(Commands::Ledger(LedgerCommands::Show { store })) => {
            init_logging_simple();
            cli::show_ledger(&config, &store)?;
        }
        Some(Commands::Ledger(LedgerCommands::Cleanup { store })) => {
            init_logging_simple();
            cli::cleanup_ledger(&config, &store)?;
        }
        Some(Commands::Serve { port }) => run_serve(config, port).await?,
        None => run_serve(config, None).await?,
    }

    Ok(())
}

async fn run_serve(mut config: AppConfig, port: Option<u16>) -> Result<()> {
    init_logging(&config.logging);
    if let Some(port) = port {
        config.proxy.port = port;
    }
    info!("starting gridgate proxy");
    start_proxy_server(&config).await
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},gridgate=debug", logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
