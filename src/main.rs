use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use uuid::Uuid;

mod api;
mod config;
mod enforcement;
mod monitor;
mod platform;
mod schedule;
mod scheduler;

use api::{ControlPlaneClient, DeviceRegistration, HttpControlPlane};
use config::{AgentConfig, AgentSettings, DeviceConfig, LoggingConfig, ServerConfig};
use monitor::{Monitor, MonitorTask};
use platform::PlatformLock;
use scheduler::PollingScheduler;

/// Device-side schedule enforcement agent
///
/// Periodically fetches restriction schedules from the Knets control
/// plane, locks the device while a window is active, and reports status
/// and heartbeats upstream.
#[derive(Parser, Debug)]
#[command(name = "knets-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the agent configuration
    Setup {
        /// Control plane base URL (HTTPS)
        #[arg(long)]
        server_url: String,

        /// Device identifier, if this device is already enrolled
        #[arg(long)]
        device_id: Option<String>,

        /// Enforcement cycle interval in seconds
        #[arg(long, default_value = "30")]
        poll_interval: u64,
    },
    /// Enroll this device with the control plane
    Register {
        /// Device name shown in the parent dashboard
        #[arg(long)]
        device_name: String,

        /// Child this device belongs to
        #[arg(long)]
        child_name: String,

        /// Parent contact number
        #[arg(long)]
        parent_phone: String,
    },
    /// Start the monitor loop in the foreground
    Start,
    /// Run a single enforcement cycle and exit
    CheckNow,
    /// Show agent configuration and enforcement status
    Status,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, configured_log_level().as_deref());

    match args.command {
        Commands::Setup {
            server_url,
            device_id,
            poll_interval,
        } => cmd_setup(server_url, device_id, poll_interval),
        Commands::Register {
            device_name,
            child_name,
            parent_phone,
        } => cmd_register(device_name, child_name, parent_phone),
        Commands::Start => cmd_start(),
        Commands::CheckNow => cmd_check_now(),
        Commands::Status => cmd_status(),
    }
}

/// Initialize logging
fn init_logging(verbose: bool, config_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose {
        "debug".to_string()
    } else {
        config_level.unwrap_or("info").to_string()
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Log level from an existing config, if one is readable
fn configured_log_level() -> Option<String> {
    let path = config::get_agent_config_path().ok()?;
    let config = AgentConfig::load(&path).ok()?;
    Some(config.logging.level)
}

fn load_config() -> Result<AgentConfig> {
    let path = config::get_agent_config_path()?;
    AgentConfig::load(&path)
        .context("Failed to load agent configuration. Run 'knets-agent setup' first.")
}

fn http_client(config: &AgentConfig) -> Result<HttpControlPlane> {
    HttpControlPlane::new(
        &config.server.base_url,
        Duration::from_secs(config.agent.request_timeout),
    )
}

/// Write the agent configuration
fn cmd_setup(server_url: String, device_id: Option<String>, poll_interval: u64) -> Result<()> {
    println!("Knets Agent Setup");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = AgentConfig {
        server: ServerConfig {
            base_url: server_url,
        },
        device: DeviceConfig {
            id: device_id,
            name: None,
        },
        agent: AgentSettings {
            poll_interval,
            ..Default::default()
        },
        logging: LoggingConfig::default(),
    };

    config.validate().context("Invalid configuration")?;

    // If the device is already enrolled, verify the control plane knows it
    if let Some(id) = &config.device.id {
        println!("Testing connection to control plane...");

        let client = http_client(&config)?;
        let runtime = tokio::runtime::Runtime::new()?;
        let schedules = runtime
            .block_on(client.fetch_schedules(id))
            .context("Failed to fetch schedules from control plane")?;

        println!("✓ Control plane reachable ({} schedule(s))", schedules.len());
    }

    let config_path = config::get_agent_config_path()?;
    config.save(&config_path)?;
    println!("✓ Configuration saved to: {}", config_path.display());

    println!();
    println!("Next steps:");
    if config.device.id.is_none() {
        println!("  1. Enroll this device:");
        println!("     sudo knets-agent register --device-name ... --child-name ... --parent-phone ...");
        println!("  2. Start the agent:");
    } else {
        println!("  1. Start the agent:");
    }
    println!("     sudo knets-agent start");
    println!();
    println!("The agent will run an enforcement cycle every {} seconds.", poll_interval);

    Ok(())
}

/// Enroll this device with the control plane
fn cmd_register(device_name: String, child_name: String, parent_phone: String) -> Result<()> {
    let config_path = config::get_agent_config_path()?;
    let mut config = load_config()?;

    let device_id = config
        .device
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let registration = DeviceRegistration {
        device_id: device_id.clone(),
        device_name: device_name.clone(),
        child_name,
        parent_phone,
        device_model: std::env::consts::ARCH.to_string(),
        device_brand: std::env::consts::OS.to_string(),
        os_version: os_version(),
    };

    let client = http_client(&config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime
        .block_on(client.register_device(&registration))
        .context("Failed to register device with control plane")?;

    config.device.id = Some(device_id.clone());
    config.device.name = Some(device_name);
    config.save(&config_path)?;

    println!("✓ Device registered");
    println!("  Device ID: {}", device_id);
    println!();
    println!("Start enforcement with: sudo knets-agent start");

    Ok(())
}

/// Start the monitor loop in the foreground
fn cmd_start() -> Result<()> {
    let config = load_config()?;

    if config.device.id.is_none() {
        tracing::warn!(
            "No device identifier configured; cycles will no-op until registration"
        );
    }

    println!("Starting Knets agent...");
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let client = http_client(&config)?;
        let monitor = Monitor::new(config.device.id.clone(), client, PlatformLock);
        let scheduler =
            PollingScheduler::new(config.agent.poll_interval, config.agent.poll_jitter);

        let task = MonitorTask::spawn(monitor, scheduler);
        let status = task.status();

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;

        tracing::info!("Shutdown requested");
        task.stop().await;

        let snapshot = status.get().await;
        tracing::info!("Agent stopped (tracked lock state: {})", snapshot.is_locked);

        Ok(())
    })
}

/// Run a single enforcement cycle
fn cmd_check_now() -> Result<()> {
    let config = load_config()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let client = http_client(&config)?;
        let mut monitor = Monitor::new(config.device.id.clone(), client, PlatformLock);
        let status = monitor.status_handle();

        monitor.run_cycle().await;

        match status.get().await.last_cycle {
            Some(_) => {
                println!("✓ Cycle complete (locked: {})", status.get().await.is_locked)
            }
            None => println!("Cycle skipped (missing device id or enforcement capability)"),
        }

        Ok(())
    })
}

/// Show agent configuration and enforcement status
fn cmd_status() -> Result<()> {
    println!("Knets Agent Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = load_config()?;

    println!("Server:        {}", config.server.base_url);
    match &config.device.id {
        Some(id) => println!("Device ID:     {}", id),
        None => println!("Device ID:     (not registered)"),
    }
    if let Some(name) = &config.device.name {
        println!("Device name:   {}", name);
    }
    println!("Poll interval: {} seconds", config.agent.poll_interval);
    if config.agent.poll_jitter > 0 {
        println!("Poll jitter:   up to {} seconds", config.agent.poll_jitter);
    }

    println!();
    println!(
        "Lock capability: {}",
        if platform::lock_capability_available() {
            "available"
        } else {
            "NOT AVAILABLE"
        }
    );
    println!("Battery level:   {}%", platform::battery_level());

    let scheduler = PollingScheduler::new(config.agent.poll_interval, config.agent.poll_jitter);
    println!();
    println!(
        "Next cycle (if running): ~{}",
        scheduler.next_poll_time().format("%Y-%m-%d %H:%M:%S %Z")
    );

    Ok(())
}

/// Best-effort OS version string for the registration payload
fn os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| "linux".to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "macos".to_string())
    }

    #[cfg(target_os = "windows")]
    {
        "windows".to_string()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        std::env::consts::OS.to_string()
    }
}
