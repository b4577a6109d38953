use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use tms_core::portal::{PortalAgentConfig, PortalDevelopmentAgent, PortalManager};
use tms_core::website::{WebsiteAgentConfig, WebsiteDevelopmentAgent};
use tms_core::{
    AutonomousTmsController, HealthCheckRunner, InMemoryHealthStore, SimulatedMetricsSource,
};
use tms_kernel::{LogManager, TmsConfig};

#[derive(Parser)]
#[command(name = "autotms")]
#[command(about = "Autonomous TMS orchestration host", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file, overlaid by environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller until Ctrl-C or the circuit breaker opens
    Run,

    /// Initialize, run one monitoring pass and print the status
    Status {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Initialize, run one monitoring pass and write the log buffer
    ExportLogs {
        /// Output file (JSON lines)
        #[arg(short, long)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = TmsConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let log = LogManager::shared(config.log.capacity);
    let controller = Arc::new(AutonomousTmsController::from_config(&config, &log));

    match cli.command {
        Commands::Run => run(&config, &log, controller).await,
        Commands::Status { json } => status(&controller, json).await,
        Commands::ExportLogs { path } => export_logs(&log, &controller, path).await,
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .init();
}

async fn run(
    config: &TmsConfig,
    log: &Arc<LogManager>,
    controller: Arc<AutonomousTmsController>,
) -> Result<()> {
    controller
        .initialize()
        .await
        .context("initializing controller")?;

    let portals = PortalManager::new(Arc::clone(&controller.parts().database), log);
    portals.initialize().await.context("registering portals")?;

    let portal_agent = Arc::new(PortalDevelopmentAgent::new(
        log,
        PortalAgentConfig::from_settings(&config.portals),
    ));
    let website_agent = Arc::new(WebsiteDevelopmentAgent::new(
        log,
        WebsiteAgentConfig::from_settings(&config.portals),
    ));

    let health_checks = Arc::new(HealthCheckRunner::new(
        Arc::new(SimulatedMetricsSource::new(
            &config.health,
            config.simulation.seed.map(|s| s.wrapping_add(4)),
        )),
        Arc::new(InMemoryHealthStore::with_capacity(config.health.history_capacity)),
        log,
    ));
    let agent_types: Vec<String> = controller
        .parts()
        .agents
        .agents()
        .iter()
        .map(|a| a.kind.as_str().to_string())
        .collect();

    controller.start().await.context("starting controller")?;
    portal_agent.start();
    website_agent.start();
    let health_cycle = config
        .health
        .check_interval()
        .map(|period| health_checks.spawn_cycle(agent_types, period));
    info!("autotms running; press Ctrl-C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("Shutdown signal received");
        }
        () = controller.wait() => {
            warn!("Controller stopped after exhausting its restart budget");
        }
    }

    if let Some(cycle) = health_cycle {
        if let Err(e) = cycle.cancel().await {
            warn!("Health check cycle ended abnormally: {e}");
        }
    }
    website_agent.stop().await;
    portal_agent.stop().await;
    controller.stop().await.context("stopping controller")?;
    Ok(())
}

async fn status(controller: &Arc<AutonomousTmsController>, json: bool) -> Result<()> {
    controller
        .initialize()
        .await
        .context("initializing controller")?;
    let report = controller
        .monitor_once()
        .await
        .context("running monitoring pass")?;
    let status = controller.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("state:          {}", status.state);
    println!(
        "restarts:       {}/{} (circuit {:?})",
        status.restart_count, status.max_restarts, status.circuit
    );
    let database = if status.database_connected {
        "connected"
    } else {
        "disconnected"
    };
    println!("database:       {database}");
    println!(
        "agents:         {}/{} running",
        status.agents.running_agents.len(),
        status.agents.total_agents
    );
    println!(
        "workflows:      {} total, {} failed",
        status.workflows.total_workflows,
        status.workflows.failed_workflows.len()
    );
    let health = if report.health.is_healthy {
        "healthy".to_string()
    } else {
        report
            .health
            .issues
            .iter()
            .map(|i| i.code().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("health:         {health}");
    println!("notifications:  {}", status.notifications_sent);
    Ok(())
}

async fn export_logs(
    log: &Arc<LogManager>,
    controller: &Arc<AutonomousTmsController>,
    path: PathBuf,
) -> Result<()> {
    controller
        .initialize()
        .await
        .context("initializing controller")?;
    if let Err(e) = controller.monitor_once().await {
        warn!("Monitoring pass failed: {e}");
    }
    let written = log
        .export_to_file(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Exported {written} log entries to {}", path.display());
    Ok(())
}
