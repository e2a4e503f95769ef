//! Chatlink
//!
//! Restores the session, connects to the gateway sidecar and keeps the
//! connection supervised until logout or Ctrl-C.

use anyhow::{bail, Context};
use chatlink::announce::PostConnectSetup;
use chatlink::config::{config_path, validate_config, Config};
use chatlink::credential::CredentialDecoder;
use chatlink::gateway::{BridgeGateway, ConnectOptions};
use chatlink::handlers::register_builtin;
use chatlink::router::EventRouter;
use chatlink::session::{bootstrap, Bootstrap, SessionStore};
use chatlink::status::{StatusComposer, StatusTask};
use chatlink::{ConnectionSupervisor, Error, SupervisorOutcome, VERSION};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chatlink",
    author = "Chatlink Contributors",
    version = VERSION,
    about = "Chatlink - supervised messaging gateway client",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run until logout or Ctrl-C (default)
    Run,

    /// Decode SESSION_ID without connecting
    Decode {
        /// Store the decoded credential in the session directory
        #[arg(long)]
        save: bool,
    },

    /// Validate the configuration and print any issues
    CheckConfig,

    /// Delete the stored session
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Decode { save } => decode(config, save).await,
        Commands::CheckConfig => check_config(&config),
        Commands::Purge => purge(&config).await,
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn session_id(config: &Config) -> Option<String> {
    config
        .session
        .session_id
        .as_ref()
        .map(|s| s.expose_secret().to_string())
}

async fn run(config: Config) -> anyhow::Result<ExitCode> {
    info!("Starting chatlink v{}", VERSION);

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("{}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("{}", issue);
        }
        bail!("Invalid configuration");
    }

    let store = SessionStore::new(config.session.resolve_dir());
    let decoder = CredentialDecoder::from_config(&config.session)?;
    let restored = bootstrap(&store, &decoder, session_id(&config).as_deref())
        .await
        .context("Failed to restore session")?;

    let options = ConnectOptions {
        client_name: config.gateway.client_name.clone(),
        interactive_pairing: restored == Bootstrap::PairingRequired,
        pairing_number: config.bot.owner_number.clone(),
    };

    let mut router = EventRouter::new();
    register_builtin(&mut router, &config);

    let shutdown = CancellationToken::new();
    let gateway = Arc::new(BridgeGateway::new(config.gateway.clone()));
    let mut supervisor = ConnectionSupervisor::new(
        gateway,
        store,
        router.into_lanes(),
        options,
        config.reconnect.clone(),
    )
    .with_setup(PostConnectSetup::new(config.bot.clone(), config.announce.clone()));

    if config.status.enabled {
        let composer = StatusComposer::new(config.bot.name.clone(), config.bot.tz()?);
        supervisor = supervisor.with_status_task(Arc::new(StatusTask::new(
            composer,
            config.status.interval,
            shutdown.clone(),
        )));
    }

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    match supervisor.run(shutdown).await? {
        SupervisorOutcome::LoggedOut => Err(Error::LoggedOut.into()),
        SupervisorOutcome::Shutdown => Ok(ExitCode::SUCCESS),
    }
}

async fn decode(config: Config, save: bool) -> anyhow::Result<ExitCode> {
    let decoder = CredentialDecoder::from_config(&config.session)?;
    let credential = decoder
        .decode(session_id(&config).as_deref().unwrap_or_default())
        .await
        .context("Failed to decode SESSION_ID")?;

    println!(
        "Scheme: {}\nBytes:  {}",
        credential.scheme,
        credential.payload.len()
    );

    if save {
        let store = SessionStore::new(config.session.resolve_dir());
        store.persist(&credential.payload).await?;
        println!("Saved:  {}", store.creds_path().display());
    }
    Ok(ExitCode::SUCCESS)
}

fn check_config(config: &Config) -> anyhow::Result<ExitCode> {
    let validation = validate_config(config);
    println!("Config file: {}", config_path().display());

    for issue in &validation.errors {
        println!("  ✗ {}", issue);
    }
    for issue in &validation.warnings {
        println!("  ⚠ {}", issue);
    }

    if validation.valid {
        println!("Configuration is valid");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

async fn purge(config: &Config) -> anyhow::Result<ExitCode> {
    let store = SessionStore::new(config.session.resolve_dir());
    store.purge().await?;
    println!("Removed {}", store.dir().display());
    Ok(ExitCode::SUCCESS)
}
