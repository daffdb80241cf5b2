use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use otc_modules::config::CloudConfig;
use otc_modules::css::{self, ClusterInfoParams};
use otc_modules::deh::{self, HostInfoParams};
use otc_modules::otc::client::OtcClient;
use otc_modules::vpc::{DesiredState, PeeringReconciler, PeeringRequest};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

/// Open Telekom Cloud automation modules
#[derive(Parser, Debug)]
#[command(name = "otc-modules", version = otc_modules::VERSION, about, long_about = None)]
struct Args {
    /// Cloud entry of clouds.yaml to use
    #[arg(long, global = true)]
    cloud: Option<String>,

    /// Path to clouds.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Region, overrides the cloud's region_name
    #[arg(long, global = true)]
    region: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Log file, defaults to the user config directory
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, rename or delete a VPC peering connection
    VpcPeering(PeeringArgs),
    /// Show Cloud Search Service clusters
    CssClusterInfo(ClusterInfoParams),
    /// Show Dedicated Hosts
    DehHostInfo(HostInfoParams),
}

#[derive(clap::Args, Debug)]
struct PeeringArgs {
    /// Peering name
    #[arg(long)]
    name: Option<String>,

    /// Peering id, takes precedence over the name for lookup
    #[arg(long)]
    id: Option<String>,

    #[arg(long, value_enum, default_value = "present")]
    state: DesiredState,

    /// Name or id of the local router
    #[arg(long)]
    local_router: Option<String>,

    #[arg(long)]
    local_project: Option<String>,

    /// Id of the remote router
    #[arg(long)]
    remote_router: Option<String>,

    #[arg(long)]
    remote_project: Option<String>,

    /// Report what would change without changing it
    #[arg(long)]
    check: bool,
}

impl From<PeeringArgs> for PeeringRequest {
    fn from(args: PeeringArgs) -> Self {
        PeeringRequest {
            name: args.name,
            id: args.id,
            state: args.state,
            local_router: args.local_router,
            local_project: args.local_project,
            remote_router: args.remote_router,
            remote_project: args.remote_project,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(filter) = level.as_filter() else {
        return Ok(None);
    };

    let log_path = log_file.unwrap_or_else(get_log_path);

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("otc-modules started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("otc-modules").join("otc-modules.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".otc-modules").join("otc-modules.log");
    }
    PathBuf::from("otc-modules.log")
}

fn connect(args: &Args) -> Result<OtcClient> {
    let mut config = CloudConfig::load(args.config.as_deref(), args.cloud.as_deref())?;
    if let Some(region) = &args.region {
        config.region_name = Some(region.clone());
    }
    OtcClient::new(&config)
}

async fn run(args: Args) -> Result<Value> {
    let client = connect(&args)?;

    let result = match args.command {
        Command::VpcPeering(peering) => {
            let check_mode = peering.check;
            let request = PeeringRequest::from(peering);
            let outcome = PeeringReconciler::new(&client)
                .check_mode(check_mode)
                .reconcile(&request)
                .await?;
            serde_json::to_value(outcome)?
        }
        Command::CssClusterInfo(params) => {
            serde_json::to_value(css::cluster_info(&client, &params).await?)?
        }
        Command::DehHostInfo(params) => {
            serde_json::to_value(deh::host_info(&client, &params).await?)?
        }
    };

    Ok(result)
}

fn failure(err: &anyhow::Error) -> Value {
    json!({
        "failed": true,
        "changed": false,
        "msg": format!("{:#}", err),
    })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = match setup_logging(args.log_level, args.log_file.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("{}", failure(&e));
            std::process::exit(1);
        }
    };

    let span = tracing::info_span!("invocation", id = %uuid::Uuid::new_v4());
    let result = run(args).instrument(span).await;

    match result {
        Ok(value) => println!("{}", value),
        Err(e) => {
            tracing::error!("Module failed: {:#}", e);
            println!("{}", failure(&e));
            drop(log_guard);
            std::process::exit(1);
        }
    }
}
