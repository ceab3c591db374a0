use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use hydrobox::api::{HydroApi, Measurement};
use hydrobox::config::HydroConfig;
use hydrobox::crops::{Crop, CropCycle};
use hydrobox::mqtt::devices::DEFAULT_LABELS;
use hydrobox::mqtt::{
    encode, resolve, Command, ConnectionManager, ConnectionState, PublishResult, Publisher,
    RumqttTransport,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "hydrobox", version, about = "Monitor and control a HydroBox growing box")]
struct Cli {
    /// Config file (defaults to ~/.config/hydrobox/config.toml)
    #[arg(long, env = "HYDROBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Override the broker host
    #[arg(long)]
    host: Option<String>,

    /// Override the broker port
    #[arg(long)]
    port: Option<u16>,

    /// Override the backend base URL
    #[arg(long)]
    api_url: Option<String>,

    /// How long actuator commands wait for the broker connection
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the registered actuators and their device ids
    Devices,
    /// Switch an actuator on or off
    Switch {
        label: String,
        #[arg(value_enum)]
        state: SwitchState,
    },
    /// Dispense a volume with a peristaltic doser
    Dose {
        label: String,
        #[arg(allow_negative_numbers = true)]
        milliliters: i64,
    },
    /// Show the sensor catalogue
    Sensors,
    /// Show the measurement history
    Measurements {
        /// Only the most recent row
        #[arg(long)]
        latest: bool,
    },
    /// Crop selection
    Crop {
        #[command(subcommand)]
        action: CropAction,
    },
    /// Check administrator credentials against the backend
    Login {
        email: String,
        #[arg(long, env = "HYDROBOX_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand, Debug)]
enum CropAction {
    /// Crop currently growing according to the backend
    Current,
    /// Switch the active crop
    Set { id: i64 },
    /// Day and progress of a cycle started at the given RFC 3339 time
    Cycle { id: i64, started: DateTime<Utc> },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SwitchState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    let config = load_config(&cli).await?;

    match cli.command {
        Commands::Devices => {
            for label in DEFAULT_LABELS {
                println!("{:<32} {}", label, resolve(label));
            }
            Ok(())
        }
        Commands::Switch { label, state } => {
            let command = Command::switch(resolve(&label), matches!(state, SwitchState::On));
            send_actuator_command(&config, command, Duration::from_secs(cli.wait_secs)).await
        }
        Commands::Dose { label, milliliters } => {
            let command = Command::dose(resolve(&label), milliliters);
            send_actuator_command(&config, command, Duration::from_secs(cli.wait_secs)).await
        }
        Commands::Sensors => {
            let api = HydroApi::new(&config.api)?;
            for sensor in api.sensors().await? {
                println!(
                    "#{:<4} {:<24} {:<12} {}",
                    sensor.id,
                    sensor.name,
                    sensor.kind.as_deref().unwrap_or("-"),
                    sensor.unit.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Commands::Measurements { latest } => {
            let api = HydroApi::new(&config.api)?;
            let rows = if latest {
                api.latest_measurement().await?.into_iter().collect()
            } else {
                api.measurements().await?
            };
            if rows.is_empty() {
                println!("No measurements");
            }
            for row in &rows {
                println!("{}", format_measurement(row));
            }
            Ok(())
        }
        Commands::Crop { action } => run_crop_action(&config, action).await,
        Commands::Login { email, password } => {
            let api = HydroApi::new(&config.api)?;
            match api.login(email.trim(), password.trim()).await {
                Some(user) => {
                    println!("Logged in as {} <{}>", user.full_name(), user.email);
                    Ok(())
                }
                None => Err(eyre!("Login failed for {}", email)),
            }
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .pretty()
        .init();
}

async fn load_config(cli: &Cli) -> Result<HydroConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => HydroConfig::ensure_default_config(&HydroConfig::default_path()).await?,
    };
    let mut config = HydroConfig::load_from(&path).await?;

    if let Some(host) = &cli.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    Ok(config)
}

async fn send_actuator_command(
    config: &HydroConfig,
    command: Command,
    wait: Duration,
) -> Result<()> {
    // Rejected commands never open a connection
    encode(&command)?;

    let manager = ConnectionManager::new(RumqttTransport::new());
    let publisher = Publisher::new(manager.clone()).with_ack_timeout(config.broker.ack_timeout());

    manager.connect(config.broker.clone());
    let mut state = manager.subscribe();
    let connected = matches!(
        tokio::time::timeout(wait, state.wait_for(|s| *s == ConnectionState::Connected)).await,
        Ok(Ok(_))
    );
    if connected {
        info!("Broker {} ready", config.broker);
    } else {
        warn!("Broker {} not reachable within {:?}", config.broker, wait);
    }

    let result = publisher.send(&command).await;
    manager.disconnect().await;

    match result? {
        PublishResult::Delivered => {
            println!("{}: delivered", command);
            Ok(())
        }
        PublishResult::Failed(reason) => Err(eyre!("{} not delivered: {}", command, reason)),
    }
}

async fn run_crop_action(config: &HydroConfig, action: CropAction) -> Result<()> {
    match action {
        CropAction::Current => {
            let api = HydroApi::new(&config.api)?;
            match api.current_crop().await? {
                Some(remote) => {
                    let crop = Crop::from_remote_id(remote.id);
                    println!(
                        "{} (id {}, {} day cycle)",
                        remote.name,
                        remote.id,
                        crop.total_days()
                    );
                }
                None => println!("No active crop"),
            }
            Ok(())
        }
        CropAction::Set { id } => {
            let api = HydroApi::new(&config.api)?;
            if api.change_crop(id).await {
                println!("Active crop set to {}", Crop::from_remote_id(id));
                Ok(())
            } else {
                Err(eyre!("Backend did not accept crop {}", id))
            }
        }
        CropAction::Cycle { id, started } => {
            let cycle = CropCycle::new(Crop::from_remote_id(id), started);
            let now = Utc::now();
            println!(
                "{}: day {} of {} ({:.0}%), {} days left",
                cycle.crop,
                cycle.day_at(now),
                cycle.crop.total_days(),
                cycle.progress_at(now) * 100.0,
                cycle.remaining_days_at(now)
            );
            Ok(())
        }
    }
}

fn format_measurement(m: &Measurement) -> String {
    fn fmt(value: Option<f32>, precision: usize, suffix: &str) -> String {
        match value {
            Some(v) => format!("{:.*} {}", precision, v, suffix),
            None => format!("-- {}", suffix),
        }
    }

    format!(
        "{:<20} pH {:<6} ORP {:<8} water {:<9} air {:<9} hum {:<7} level {}",
        m.recorded_at.as_deref().unwrap_or("Sin datos"),
        fmt(m.ph, 2, "").trim(),
        fmt(m.orp, 0, "mV"),
        fmt(m.water_temp, 1, "°C"),
        fmt(m.air_temp, 1, "°C"),
        fmt(m.humidity, 1, "%"),
        fmt(m.level, 0, "%"),
    )
}
