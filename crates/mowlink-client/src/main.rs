// ============================================
// File: crates/mowlink-client/src/main.rs
// ============================================
//! # Mowlink Entry Point
//!
//! ## Creation Reason
//! Command-line front end for the mowlink client library.
//! Handles CLI parsing, logging setup and configuration loading.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Login, telemetry watching and manual driving
//!
//! ## Usage
//! ```bash
//! # Credentials come from flags or the environment
//! export MOWLINK_USERNAME=me@example.com
//! export MOWLINK_PASSWORD=secret
//!
//! mowlink login                       # Run the auth chain, list devices
//! mowlink watch                       # Print battery and position until Ctrl-C
//! mowlink drive --linear 20           # Move, then stop
//! mowlink validate                    # Validate config file
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `drive` always sends a stop after the duration, even on error
//! - A missing config file means defaults, not an error
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mowlink_client::{ClientConfig, Controller};

// ============================================
// CLI Definition
// ============================================

/// Mowlink robotic mower client
#[derive(Parser, Debug)]
#[command(name = "mowlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "mowlink.toml")]
    config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Account credentials.
#[derive(Args, Debug)]
struct Credentials {
    /// Account user name (email or phone)
    #[arg(short, long, env = "MOWLINK_USERNAME")]
    username: String,

    /// Account password
    #[arg(short, long, env = "MOWLINK_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and list bound devices
    Login {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Connect and print battery and position until interrupted
    Watch {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Drive the selected device for a short time, then stop
    Drive {
        #[command(flatten)]
        credentials: Credentials,

        /// Linear speed
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        linear: i32,

        /// Angular speed
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        angular: i32,

        /// How long to drive before stopping
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
    },

    /// Validate configuration file
    Validate,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging("info");

    let result = match cli.command {
        Commands::Login { credentials } => cmd_login(&cli.config, credentials).await,
        Commands::Watch { credentials } => cmd_watch(&cli.config, credentials).await,
        Commands::Drive {
            credentials,
            linear,
            angular,
            duration_ms,
        } => {
            cmd_drive(
                &cli.config,
                credentials,
                linear,
                angular,
                Duration::from_millis(duration_ms),
            )
            .await
        }
        Commands::Validate => cmd_validate(&cli.config).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Runs the auth chain and prints the bound devices.
async fn cmd_login(config_path: &Path, credentials: Credentials) -> anyhow::Result<()> {
    let controller = login(config_path, &credentials).await?;

    println!();
    println!("✅ Logged in");
    println!("════════════════════════════════════════");
    for device in controller.devices() {
        let marker = if device.iot_id == controller.device().iot_id {
            "*"
        } else {
            " "
        };
        println!(
            " {} {:<24} {:<16} {}",
            marker,
            device.display_name(),
            device.product_name,
            device.iot_id
        );
    }
    println!("════════════════════════════════════════");
    println!();

    Ok(())
}

/// Connects and prints telemetry until Ctrl-C.
async fn cmd_watch(config_path: &Path, credentials: Credentials) -> anyhow::Result<()> {
    let controller = login(config_path, &credentials).await?;

    controller.on_ready(|| info!("Device link ready"));
    controller.on_battery_changed(|iot_id, percent| {
        info!(iot_id = %iot_id, percent, "Battery");
    });
    controller.on_position_changed(|iot_id, position| {
        info!(
            iot_id = %iot_id,
            x = position.x,
            y = position.y,
            heading = position.heading,
            fix = %position.fix_quality,
            "Position"
        );
    });
    controller.on_error(|operation, message| {
        warn!(operation, message, "Background failure");
    });

    controller.connect().await?;
    info!(device = %controller.device().display_name(), "Watching, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    controller.disconnect().await?;

    Ok(())
}

/// Drives for `duration`, then stops.
async fn cmd_drive(
    config_path: &Path,
    credentials: Credentials,
    linear: i32,
    angular: i32,
    duration: Duration,
) -> anyhow::Result<()> {
    let controller = login(config_path, &credentials).await?;
    controller.connect().await?;

    let driven = async {
        controller.send_motion(linear, angular).await?;
        tokio::time::sleep(duration).await;
        anyhow::Ok(())
    }
    .await;

    if let Err(e) = controller.stop().await {
        warn!(error = %e, "Stop command failed");
    }
    controller.disconnect().await?;

    driven?;
    println!("✅ Drive complete");
    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Client will use default values.");
        return Ok(());
    }

    let config = ClientConfig::load(config_path).await?;

    println!("✅ Configuration is valid");
    println!();
    println!("Cloud:");
    println!("   Gateway:    {}", config.cloud.gateway_domain);
    println!("   Language:   {}", config.cloud.language);
    println!();
    println!("Broker:");
    println!("   Port:       {}", config.broker.port);
    println!("   TLS:        {}", config.broker.tls);
    println!();
    println!("Commands:");
    println!("   Deadline:   {}ms", config.commands.deadline_ms);
    println!("   Queue:      {}", config.commands.queue_capacity);
    println!();
    println!("Tasks:");
    println!("   Resync:     {}s", config.tasks.resync_interval_secs);
    println!(
        "   Refresh:    {}s ({})",
        config.tasks.refresh_interval_secs,
        if config.tasks.refresh_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads config or returns default.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ClientConfig> {
    if path.exists() {
        Ok(ClientConfig::load(path).await?)
    } else {
        info!("Config file not found, using defaults");
        Ok(ClientConfig::default())
    }
}

/// Loads config and runs the login chain.
async fn login(config_path: &Path, credentials: &Credentials) -> anyhow::Result<Controller> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);

    info!(user = %credentials.username, "Logging in...");
    let controller = Controller::login(config, &credentials.username, &credentials.password).await?;
    info!(device = %controller.device().display_name(), "Login complete");
    Ok(controller)
}
