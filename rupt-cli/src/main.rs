//! Rupt CLI - terminal host for the Rupt device-session client
//!
//! Attaches this machine to an account, lists and detaches devices, and
//! listens for remote logout.

mod host;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use host::{ConsolePresenter, HostMetadataProvider};
use rupt_core::{
    init_logging, log_operation_error, ClientSettings, FileStore, KeyValueStore, Metadata,
    Outcome,
};
use rupt_session::{EventKind, SessionController, SessionEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rupt")]
#[command(about = "Attach devices to accounts and enforce device limits with Rupt")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach this device to an account
    Attach {
        /// Account (user) id
        #[arg(short, long)]
        account: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// Metadata entry in key=value form, repeatable
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Resolve the cross-install identity of this device
    Identify {
        /// Metadata entry in key=value form, repeatable
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// List devices attached to an account
    Devices {
        #[arg(short, long)]
        account: String,

        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Detach devices from an account
    Detach {
        #[arg(short, long)]
        account: String,

        /// Device ids to detach
        #[arg(required = true)]
        devices: Vec<String>,
    },

    /// Wait for a remote logout of this device
    Listen {
        /// Account to attach before listening
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Manage configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = ClientSettings::load(cli.config.as_deref())?;

    let mut logging_config = settings.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    init_logging(&logging_config).map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    info!("Starting Rupt CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config {
            init,
            show,
            validate,
        } => handle_config(&settings, cli.config, init, show, validate),
        command => {
            let controller = build_controller(&settings)?;
            run(command, &controller).await
        }
    }
}

fn build_controller(settings: &ClientSettings) -> anyhow::Result<SessionController> {
    let store_path = FileStore::default_path()
        .ok_or_else(|| anyhow!("could not determine a data directory for the identity store"))?;
    let store = FileStore::open(&store_path)
        .with_context(|| format!("failed to open identity store at {}", store_path.display()))?;
    info!(path = %store_path.display(), "Using identity store");
    let metadata = HostMetadataProvider::load(&store)
        .context("failed to load the vendor identifier")?;

    let controller = SessionController::from_settings(
        settings,
        Arc::new(store) as Arc<dyn KeyValueStore>,
        Arc::new(metadata),
        Arc::new(ConsolePresenter),
    )?;

    controller.subscribe(&[EventKind::LimitExceeded], |event| {
        if let SessionEvent::LimitExceeded { attached_count } = event {
            println!("⚠️  Device limit exceeded: {} devices attached", attached_count);
        }
    });
    controller.subscribe(&[EventKind::LogoutOtherDevice], |event| {
        if let SessionEvent::LogoutOtherDevice { device } = event {
            println!("👋 Logged out {}", device.id);
        }
    });
    Ok(controller)
}

async fn run(command: Commands, controller: &SessionController) -> anyhow::Result<()> {
    match command {
        Commands::Attach {
            account,
            email,
            phone,
            meta,
        } => {
            controller.set_account_id(Some(account)).await;
            controller.set_email(email).await;
            controller.set_phone(phone).await;

            let outcome = controller.attach(parse_metadata(&meta)?).await;
            let attached = applied_or_bail(outcome, "attach")?;
            println!(
                "✅ Attached as {} ({} devices on the account)",
                attached.device_id, attached.attached_device_count
            );
        }
        Commands::Identify { meta } => {
            let identity = controller.identify(parse_metadata(&meta)?).await?;
            println!(
                "🔎 Identity {} (confidence {:.2})",
                identity.identity, identity.confidence
            );
        }
        Commands::Devices { account, json } => {
            controller.set_account_id(Some(account)).await;
            let devices = applied_or_bail(
                controller.get_user_attached_devices().await,
                "list devices",
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            }
        }
        Commands::Detach { account, devices } => {
            controller.set_account_id(Some(account)).await;
            let known = controller.get_user_attached_devices().await.applied();

            for device_id in devices {
                let known_record = known
                    .as_ref()
                    .and_then(|list| list.iter().find(|d| d.id == device_id));
                let outcome = match known_record {
                    Some(record) => controller.detach(record).await,
                    None => controller.detach_device_id(&device_id).await,
                };
                match outcome {
                    Outcome::Applied(result) if result.success => {
                        println!(
                            "✅ Detached {} ({} devices remain)",
                            device_id, result.attached_device_count
                        );
                    }
                    Outcome::Applied(_) => println!("❌ Detach of {} was not accepted", device_id),
                    Outcome::Skipped(reason) => {
                        log_operation_error!("detach", reason.message(), device_id = %device_id);
                        println!("❌ Could not detach {}: {}", device_id, reason.message());
                    }
                }
            }
        }
        Commands::Listen { account } => handle_listen(controller, account).await?,
        Commands::Config { .. } => bail!("config is handled without a session"),
    }
    Ok(())
}

async fn handle_listen(
    controller: &SessionController,
    account: Option<String>,
) -> anyhow::Result<()> {
    if let Some(account) = account {
        controller.set_account_id(Some(account)).await;
        applied_or_bail(controller.attach(None).await, "attach")?;
    }
    if controller.device_id().is_none() {
        bail!("no device id yet; run `rupt attach` or pass --account first");
    }

    let mut events = controller.events().receiver();
    let handle = controller.enable_realtime_logout().await;
    println!(
        "👂 Listening for logout of {}. Press Ctrl-C to stop.",
        handle.device_id().unwrap_or_default()
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::LogoutCurrentDevice { device }) => {
                    let id = device.map(|d| d.id).or_else(|| controller.device_id());
                    println!(
                        "🚪 This device ({}) was logged out remotely",
                        id.unwrap_or_default()
                    );
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    info!(skipped, "Event receiver lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped");
                break;
            }
        }
    }

    handle.dispose();
    Ok(())
}

fn handle_config(
    settings: &ClientSettings,
    path: Option<PathBuf>,
    init: bool,
    show: bool,
    validate: bool,
) -> anyhow::Result<()> {
    if init {
        let path = match path {
            Some(path) => path,
            None => ClientSettings::default_paths()
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("could not determine a configuration directory"))?,
        };
        if path.exists() {
            bail!("configuration already exists at {}", path.display());
        }
        ClientSettings::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {}", path.display());
        println!("📝 Set client_id (or RUPT_CLIENT_ID) before running other commands.");
    }

    if show {
        let mut shown = settings.clone();
        if shown.secret.is_some() {
            shown.secret = Some("********".to_string());
        }
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(&shown)?);
    }

    if validate {
        match settings.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    if !(init || show || validate) {
        println!("Nothing to do. Use --init, --show or --validate.");
    }
    Ok(())
}

fn parse_metadata(entries: &[String]) -> anyhow::Result<Option<Metadata>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let mut metadata = Metadata::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("invalid metadata '{}', expected key=value", entry);
        };
        metadata.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(Some(metadata))
}

fn applied_or_bail<T>(outcome: Outcome<T>, operation: &str) -> anyhow::Result<T> {
    match outcome {
        Outcome::Applied(value) => Ok(value),
        Outcome::Skipped(reason) => bail!("{} did not complete: {}", operation, reason.message()),
    }
}
