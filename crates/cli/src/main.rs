//! corrflow CLI - observation control and queue inspection
//!
//! The control plane is the shared Redis store itself: commands talk to it
//! directly, the way the operators' screens session does.

mod remote;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tabled::{Table, Tabled};

use corrflow_core::application::observation::{StartOptions, XengineLayout};
use corrflow_core::application::{MappingService, ObservationService};
use corrflow_core::domain::{ObservationSpec, QueueKey, Stage};
use corrflow_core::error::AppError;
use corrflow_core::port::time_provider::SystemTimeProvider;
use corrflow_core::port::{ControlBus, FileQueue, TelescopeState};
use corrflow_infra_redis::RedisStore;

use remote::{cmdline, run_on_hosts};

const DEFAULT_REDIS_URL: &str = "redis://redishost/";

#[derive(Parser)]
#[command(name = "corrflow")]
#[command(about = "Correlator observation control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Redis URL of the shared store
    #[arg(long, env = "CORRFLOW_REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    redis_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Observation control
    Obs {
        #[command(subcommand)]
        command: ObsCommands,
    },
    /// Correlator-input map management
    Map {
        #[command(subcommand)]
        command: MapCommands,
    },
    /// BDA tier table management
    Bda {
        #[command(subcommand)]
        command: BdaCommands,
    },
    /// Catcher host management
    Catcher {
        #[command(subcommand)]
        command: CatcherCommands,
    },
    /// X-engine host management
    Xengine {
        #[command(subcommand)]
        command: XengineCommands,
    },
    /// Pipeline queue inspection
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum ObsCommands {
    /// Compute and store the observation timing keys
    Set {
        /// Observation length in hours
        #[arg(long)]
        length_hours: f64,

        /// Seconds before the earliest possible start
        #[arg(long, default_value = "60")]
        start_delay: f64,

        /// Accumulated spectra per integration (default: production value)
        #[arg(long)]
        acc_len: Option<u32>,
    },

    /// Plan, synchronize the X-engines and trigger the catcher
    Start {
        /// Observation length in hours
        #[arg(long, default_value = "1")]
        length_hours: f64,

        /// A descriptive tag to go into data files
        #[arg(long, default_value = "delete")]
        tag: String,

        #[arg(long, default_value = "hera-sn1")]
        catcher_host: String,

        /// Antennas reporting data
        #[arg(long, default_value = "192")]
        nants_data: u32,

        /// Total antennas in the array
        #[arg(long, default_value = "352")]
        nants: u32,

        /// X-engine hosts per time slice
        #[arg(long, default_value = "8")]
        xeng_hosts: u32,

        /// Independent time-slice correlators
        #[arg(long, default_value = "2")]
        slices: u32,

        /// Partition slices by host instead of by instance
        #[arg(long)]
        slice_by_host: bool,
    },

    /// Stop the catcher and the X-engines
    Stop {
        #[arg(long, default_value = "hera-sn1")]
        catcher_host: String,
    },
}

#[derive(Subcommand)]
enum MapCommands {
    /// Rebuild the correlator-input map and integration bins from the SNAP
    /// tables
    Init {
        #[arg(long, default_value = "192")]
        nants_data: u32,

        #[arg(long, default_value = "352")]
        nants: u32,

        #[arg(long, default_value = "hera-sn1")]
        catcher_host: String,
    },
}

#[derive(Subcommand)]
enum BdaCommands {
    /// Build a fresh BDA tier table from the SNAP connectivity
    Init {
        #[arg(long, default_value = "352")]
        nants: u32,
    },
}

#[derive(Subcommand)]
enum CatcherCommands {
    /// Start the catcher and its Redis gateway
    Up {
        #[arg(long)]
        host: String,

        /// SSH user for the remote commands (tweaks always run as root)
        #[arg(long)]
        user: Option<String>,

        /// Run tweak-perf-sn.sh on the host prior to start
        #[arg(long)]
        runtweak: bool,

        /// Directory the catcher writes into
        #[arg(long, default_value = "/data")]
        data_dir: String,
    },
}

#[derive(Subcommand)]
enum XengineCommands {
    /// Start the X-engine pipelines and their Redis gateways
    Up {
        /// Hosts to initialize
        hosts: Vec<String>,

        /// Pipeline instances per host
        #[arg(long, default_value = "2")]
        instances: u32,

        /// Run tweak-perf.sh on the hosts prior to start
        #[arg(long)]
        runtweak: bool,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Show queue depths, in-flight entries and day counters
    Status,
}

#[derive(Tabled)]
struct QueueRow {
    queue: &'static str,
    depth: usize,
}

#[derive(Tabled)]
struct DayRow {
    day: String,
    counter: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .init();
    }

    let cli = Cli::parse();

    let store = Arc::new(RedisStore::new(
        corrflow_infra_redis::connect(&cli.redis_url)
            .await
            .context("redis connection failed")?,
    ));
    let state: Arc<dyn TelescopeState> = store.clone();
    let bus: Arc<dyn ControlBus> = store.clone();
    let queue: Arc<dyn FileQueue> = store.clone();

    let observation =
        ObservationService::new(state.clone(), bus.clone(), Arc::new(SystemTimeProvider));
    let mapping = MappingService::new(state.clone(), bus.clone());

    match cli.command {
        Commands::Obs { command } => match command {
            ObsCommands::Set {
                length_hours,
                start_delay,
                acc_len,
            } => {
                let plan = plan(&observation, &state, length_hours, start_delay, acc_len).await?;
                print_plan(&plan);
            }
            ObsCommands::Start {
                length_hours,
                tag,
                catcher_host,
                nants_data,
                nants,
                xeng_hosts,
                slices,
                slice_by_host,
            } => {
                let plan = plan(&observation, &state, length_hours, 60.0, None).await?;
                print_plan(&plan);

                let layout = XengineLayout {
                    n_hosts: xeng_hosts,
                    slices,
                    slice_by_host,
                    ..XengineLayout::default()
                };
                observation.sync_xengines(&plan, &layout).await?;

                let opts = StartOptions {
                    catcher_host,
                    nants_data,
                    nants,
                };
                observation
                    .start_observing(&tag, &plan, &mapping, &opts)
                    .await?;
                println!("{}", "Observation triggered.".green());
            }
            ObsCommands::Stop { catcher_host } => {
                observation.stop_observing(&catcher_host).await?;
                println!("{}", "Observation stopped.".yellow());
            }
        },

        Commands::Map { command } => match command {
            MapCommands::Init {
                nants_data,
                nants,
                catcher_host,
            } => {
                let map = mapping.refresh_corr_map(nants_data, nants).await?;
                let config = match mapping.stored_bda_config().await {
                    Ok(config) => config,
                    Err(AppError::NotFound(_)) => {
                        anyhow::bail!("no BDA tier table in the store; run `corrflow bda init` first")
                    }
                    Err(e) => return Err(e.into()),
                };
                mapping
                    .refresh_integration_bins(&config, &catcher_host)
                    .await?;
                println!("Mapped {} correlator inputs.", map.len());
            }
        },

        Commands::Bda { command } => match command {
            BdaCommands::Init { nants } => {
                let config = mapping.init_bda(nants).await?;
                let written = config.iter().filter(|t| t.tier != 0).count();
                println!(
                    "Stored {} baseline pairs ({} written by the catcher).",
                    config.len(),
                    written
                );
            }
        },

        Commands::Catcher { command } => match command {
            CatcherCommands::Up {
                host,
                user,
                runtweak,
                data_dir,
            } => {
                let hosts = vec![host.clone()];
                if runtweak {
                    run_on_hosts(&hosts, &cmdline(&["tweak-perf-sn.sh"]), Some("root"), true)
                        .await?;
                }

                // start the catcher in its data directory
                run_on_hosts(
                    &hosts,
                    &cmdline(&["cd", &format!("{data_dir};"), "hera_catcher_init.sh", "0"]),
                    user.as_deref(),
                    true,
                )
                .await?;

                // hashpipe<->redis gateway, pinned off the catcher's CPUs
                run_on_hosts(
                    &hosts,
                    &cmdline(&[
                        "taskset",
                        "0x0004",
                        "hashpipe_redis_gateway.rb",
                        "-g",
                        &host,
                        "-i",
                        "0",
                    ]),
                    user.as_deref(),
                    false,
                )
                .await?;

                // wait for the gateway to come up, then reset the counters
                tokio::time::sleep(Duration::from_secs(2)).await;
                observation.clear_catcher_keys(&host).await?;
                println!("{}", format!("Catcher up on {host}.").green());
            }
        },

        Commands::Xengine { command } => match command {
            XengineCommands::Up {
                hosts,
                instances,
                runtweak,
            } => {
                anyhow::ensure!(!hosts.is_empty(), "no hosts given");
                anyhow::ensure!(
                    instances as usize <= GATEWAY_CPU_MASKS.len(),
                    "at most {} instances per host",
                    GATEWAY_CPU_MASKS.len()
                );

                if runtweak {
                    run_on_hosts(&hosts, &cmdline(&["tweak-perf.sh"]), Some("root"), true).await?;
                }

                let instance_args: Vec<String> =
                    (0..instances).map(|i| i.to_string()).collect();
                let mut init = cmdline(&["paper_init.sh"]);
                init.extend(instance_args);
                run_on_hosts(&hosts, &init, None, true).await?;

                for host in &hosts {
                    for instance in 0..instances {
                        run_on_hosts(
                            &[host.clone()],
                            &cmdline(&[
                                "taskset",
                                GATEWAY_CPU_MASKS[instance as usize],
                                "hashpipe_redis_gateway.rb",
                                "-g",
                                host,
                                "-i",
                                &instance.to_string(),
                            ]),
                            None,
                            false,
                        )
                        .await?;
                    }
                }

                // wait for the gateways to come up
                tokio::time::sleep(Duration::from_secs(3)).await;
                println!("{}", format!("{} X-engine hosts up.", hosts.len()).green());
            }
        },

        Commands::Queue { command } => match command {
            QueueCommands::Status => {
                print_status(queue.as_ref()).await?;
            }
        },
    }

    Ok(())
}

/// Per-instance CPU masks for the gateway processes
const GATEWAY_CPU_MASKS: [&str; 2] = ["0x0080", "0x8000"];

async fn plan(
    observation: &ObservationService,
    state: &Arc<dyn TelescopeState>,
    length_hours: f64,
    start_delay: f64,
    acc_len: Option<u32>,
) -> Result<corrflow_core::domain::ObservationPlan> {
    let sync = state
        .feng_sync_time_ms()
        .await
        .context("no F-engine sync time in the store; is the correlator initialized?")?;

    let mut spec = ObservationSpec::new(length_hours, sync);
    spec.start_delay_s = start_delay;
    if let Some(acc_len) = acc_len {
        spec.acc_len = acc_len;
    }
    Ok(observation.plan_and_store(&spec).await?)
}

fn print_plan(plan: &corrflow_core::domain::ObservationPlan) {
    println!("{}", "Observation plan".bold());
    println!("  start time (ms):  {}", plan.start_time_ms);
    println!("  trigger MCNT:     {}", plan.trig_mcnt);
    println!("  file duration:    {} ms", plan.file_duration_ms);
    println!("  files:            {}", plan.nfiles);
    println!("  integration time: {:.3} s", plan.int_time_s);
}

async fn print_status(queue: &dyn FileQueue) -> Result<()> {
    let keys = [
        QueueKey::Raw,
        QueueKey::Converted,
        QueueKey::ConvertFailed,
        QueueKey::UploadFailed,
        QueueKey::Uploaded,
    ];
    let mut rows = Vec::new();
    for key in keys {
        rows.push(QueueRow {
            queue: key.key(),
            depth: queue.depth(key).await?,
        });
    }
    println!("{}", "Queues".bold());
    println!("{}", Table::new(rows));

    for stage in [Stage::Convert, Stage::Upload] {
        let entries = queue.purgatory_entries(stage).await?;
        println!(
            "\n{} {}",
            format!("In flight ({stage}):").bold(),
            entries.len()
        );
        for entry in entries {
            println!("  {}", entry.yellow());
        }
    }

    let days: Vec<DayRow> = queue
        .day_counters()
        .await?
        .into_iter()
        .map(|(day, counter)| DayRow { day, counter })
        .collect();
    if !days.is_empty() {
        println!("\n{}", "Day counters".bold());
        println!("{}", Table::new(days));
    }
    Ok(())
}
