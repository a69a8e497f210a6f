//! Cluster manager CLI - RunPod GPU pod lifecycle tool for Vital LLM clusters.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cluster_mgr::config::DEFAULT_CONFIG_PATH;
use cluster_mgr::{
    Catalog, ClusterMgrConfig, FleetView, LifecycleController, PodHandle, PodSnapshot, PodSpec,
    Transport,
};

/// Cluster manager CLI - Provision and manage RunPod GPU pods.
#[derive(Parser)]
#[command(name = "cluster-mgr")]
#[command(about = "Provision and manage RunPod GPU pods for Vital LLM clusters")]
struct Cli {
    /// Path to the cluster manager YAML config.
    #[arg(long, env = "VITAL_LLM_CLUSTER_MGR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// RunPod API key (or set `RUNPOD_API_KEY` env var). Overrides the config file.
    #[arg(long, env = "RUNPOD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List GPU types with hourly prices.
    Gpus,

    /// List your pod templates.
    Templates,

    /// List all pods.
    List,

    /// Show one pod's runtime status.
    Status {
        /// Pod ID.
        #[arg(long)]
        id: String,
    },

    /// Create a new pod.
    Create {
        /// Template ID (from `templates` command).
        #[arg(long)]
        template: String,

        /// GPU type ID (from `gpus` command), e.g. "NVIDIA A40".
        #[arg(long)]
        gpu: String,

        /// Number of GPUs.
        #[arg(long, default_value = "1")]
        gpu_count: u32,

        /// Rent an interruptible spot pod instead of an on-demand one.
        #[arg(long, default_value = "false")]
        spot: bool,

        /// Spot bid per GPU in USD/hr.
        #[arg(long, requires = "spot")]
        bid: Option<f64>,
    },

    /// Wait for a pod to be running.
    Wait {
        /// Pod ID.
        #[arg(long)]
        id: String,

        /// Timeout in seconds (defaults to `running_timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Stop a pod.
    Stop {
        /// Pod ID.
        #[arg(long)]
        id: String,
    },

    /// Terminate a pod.
    Terminate {
        /// Pod ID.
        #[arg(long)]
        id: String,

        /// Skip confirmation prompt.
        #[arg(long, short = 'y', default_value = "false")]
        yes: bool,

        /// Wait until the pod is gone from the pod list.
        #[arg(long, default_value = "false")]
        wait: bool,
    },

    /// Create a pod, wait for it, then stop and terminate it.
    Cycle {
        /// Template ID.
        #[arg(long)]
        template: String,

        /// GPU type ID.
        #[arg(long)]
        gpu: String,

        /// Rent an interruptible spot pod.
        #[arg(long, default_value = "false")]
        spot: bool,

        /// Seconds to hold the pod after it runs and after it stops.
        #[arg(long, default_value = "10")]
        hold_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let config = ClusterMgrConfig::load(&cli.config).with_api_key(cli.api_key.as_deref());
    if !config.has_credential() {
        anyhow::bail!(
            "RunPod API key is missing. Set runpod_key in {} or provide --api-key/RUNPOD_API_KEY.",
            cli.config.display()
        );
    }

    let transport: Arc<dyn Transport> =
        Arc::new(config.transport().context("Failed to create RunPod transport")?);

    // Ctrl-C cancels poll loops at the next boundary
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });

    let catalog = Catalog::new(Arc::clone(&transport));
    let fleet = FleetView::new(Arc::clone(&transport));
    let controller = LifecycleController::new(transport)
        .with_cancellation(cancel.clone())
        .with_max_transient_failures(config.max_transient_failures);

    match cli.command {
        Commands::Gpus => {
            let gpus = catalog
                .list_gpu_types()
                .await
                .context("Failed to list GPU types")?;

            println!("\n🎮 GPU Types");
            println!(
                "\n{:<28} {:<22} {:>6} {:>10} {:>10} {:>12} {:>12}",
                "ID", "NAME", "MEM", "SECURE", "COMMUNITY", "SECURE SPOT", "COMM. SPOT"
            );
            println!("{}", "-".repeat(106));

            for gpu in gpus {
                println!(
                    "{:<28} {:<22} {:>4}GB {:>10} {:>10} {:>12} {:>12}",
                    gpu.id,
                    gpu.display_name,
                    gpu.memory_gb,
                    price(gpu.secure_price_per_hr),
                    price(gpu.community_price_per_hr),
                    price(gpu.secure_spot_price_per_hr),
                    price(gpu.community_spot_price_per_hr)
                );
            }
            println!();
        }

        Commands::Templates => {
            let templates = catalog
                .list_templates()
                .await
                .context("Failed to list templates")?;

            println!("\n{:<14} {:<32} {:<8} {:<40}", "ID", "NAME", "PUBLIC", "IMAGE");
            println!("{}", "-".repeat(96));
            for template in templates {
                println!(
                    "{:<14} {:<32} {:<8} {:<40}",
                    template.id,
                    template.name,
                    if template.is_public { "yes" } else { "no" },
                    template.image_name
                );
            }
            println!();
        }

        Commands::List => {
            let pods = fleet.list_running().await.context("Failed to list pods")?;

            println!("\n{:<16} {:<32} {:<14} {:<10}", "ID", "NAME", "STATUS", "UPTIME");
            println!("{}", "-".repeat(76));

            for pod in pods {
                println!(
                    "{:<16} {:<32} {} {:<11} {:<10}",
                    pod.handle,
                    pod.name,
                    status_emoji(&pod),
                    pod.desired_status
                        .map_or_else(|| "unknown".to_string(), |s| s.to_string()),
                    uptime(pod.uptime_secs)
                );
            }
            println!();
        }

        Commands::Status { id } => {
            let snapshot = controller
                .status(&PodHandle::new(id))
                .await
                .context("Failed to read pod status")?;
            print_snapshot(&snapshot);
        }

        Commands::Create {
            template,
            gpu,
            gpu_count,
            spot,
            bid,
        } => {
            let spec = pod_spec(&template, &gpu, gpu_count, spot, bid)?;
            info!(template = %template, gpu = %gpu, spot, "Creating pod");

            let handle = controller.create(&spec).await.context("Failed to create pod")?;

            println!("\n✅ Pod created successfully!");
            println!("   ID:       {handle}");
            println!("   Template: {template}");
            println!("   GPU:      {gpu} x{gpu_count}");
            println!(
                "\n💡 Run `cluster-mgr wait --id {handle}` to wait for it to be running"
            );
        }

        Commands::Wait { id, timeout } => {
            let handle = PodHandle::new(id);
            let timeout = timeout.map_or_else(|| config.running_timeout(), Duration::from_secs);

            println!("⏳ Waiting for pod {handle} to be running...");
            let snapshot = controller
                .await_running(&handle, timeout, config.poll_interval())
                .await?;
            println!("\n✅ Pod is running!");
            print_snapshot(&snapshot);
        }

        Commands::Stop { id } => {
            let handle = PodHandle::new(id);
            controller.stop(&handle).await.context("Failed to stop pod")?;
            println!("\n✅ Stop requested for pod {handle}");
        }

        Commands::Terminate { id, yes, wait } => {
            let handle = PodHandle::new(id);
            if !yes {
                println!("⚠️  Are you sure you want to terminate pod {handle}?");
                println!("   This action cannot be undone.");
                println!("   Use --yes to skip this prompt.");
                return Ok(());
            }

            controller
                .terminate(&handle)
                .await
                .context("Failed to terminate pod")?;
            println!("\n✅ Termination requested for pod {handle}");

            if wait {
                confirm_terminated(&controller, &config, &handle).await?;
            }
        }

        Commands::Cycle {
            template,
            gpu,
            spot,
            hold_secs,
        } => {
            let spec = pod_spec(&template, &gpu, 1, spot, None)?;
            let handle = controller.create(&spec).await.context("Failed to create pod")?;
            println!("\n✅ Pod {handle} created");

            let outcome = run_cycle(&controller, &config, &cancel, &handle, hold_secs).await;
            if let Err(e) = &outcome {
                warn!(pod_id = %handle, error = %e, "Cycle failed, terminating pod");
                let cleanup = controller
                    .teardown(
                        &handle,
                        config.terminate_timeout(),
                        config.poll_interval(),
                        config.terminate_attempts,
                    )
                    .await;
                match cleanup {
                    Ok(true) => println!("✅ Pod {handle} terminated"),
                    Ok(false) => {
                        println!("⚠️  Pod {handle} may not have terminated properly");
                    }
                    Err(cleanup) => {
                        warn!(pod_id = %handle, error = %cleanup, "Cleanup terminate failed");
                        println!("❌ Pod {handle} may still be running; terminate it manually");
                    }
                }
            }
            outcome?;

            let drift = controller
                .reconcile()
                .await
                .context("Failed to read pods after cycle")?;
            if !drift.untracked.is_empty() {
                println!("\nℹ️  {} other pod(s) still listed", drift.untracked.len());
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn pod_spec(
    template: &str,
    gpu: &str,
    gpu_count: u32,
    spot: bool,
    bid: Option<f64>,
) -> Result<PodSpec> {
    let builder = PodSpec::builder(template, gpu).gpu_count(gpu_count);
    let builder = if spot { builder.spot(bid) } else { builder };
    builder.build().context("Invalid pod parameters")
}

/// Walk a freshly created pod through running, stopped and terminated.
async fn run_cycle(
    controller: &LifecycleController,
    config: &ClusterMgrConfig,
    cancel: &CancellationToken,
    handle: &PodHandle,
    hold_secs: u64,
) -> Result<()> {
    println!("⏳ Waiting for pod {handle} to be running...");
    let snapshot = controller
        .await_running(handle, config.running_timeout(), config.poll_interval())
        .await?;
    println!("✅ Pod is running");
    print_snapshot(&snapshot);

    hold(cancel, hold_secs).await?;
    controller.stop(handle).await.context("Failed to stop pod")?;
    println!("\n🛑 Stop requested for pod {handle}");

    hold(cancel, hold_secs).await?;
    controller
        .terminate(handle)
        .await
        .context("Failed to terminate pod")?;
    println!("🗑️  Termination requested for pod {handle}");

    confirm_terminated(controller, config, handle).await
}

async fn confirm_terminated(
    controller: &LifecycleController,
    config: &ClusterMgrConfig,
    handle: &PodHandle,
) -> Result<()> {
    println!("⏳ Waiting for pod {handle} to leave the pod list...");
    let gone = controller
        .await_terminated(
            handle,
            config.terminate_timeout(),
            config.poll_interval(),
            config.terminate_attempts,
        )
        .await?;

    if gone {
        println!("✅ Pod {handle} terminated");
    } else {
        println!("⚠️  Pod {handle} may not have terminated properly");
    }
    Ok(())
}

async fn hold(cancel: &CancellationToken, secs: u64) -> Result<()> {
    if secs == 0 {
        return Ok(());
    }
    info!(secs, "Holding");
    tokio::select! {
        () = cancel.cancelled() => anyhow::bail!("Interrupted"),
        () = tokio::time::sleep(Duration::from_secs(secs)) => Ok(()),
    }
}

fn print_snapshot(snapshot: &PodSnapshot) {
    println!("\n🖥️  Pod: {}", snapshot.name);
    println!("   ID:      {}", snapshot.handle);
    println!(
        "   Status:  {} {}",
        status_emoji(snapshot),
        snapshot
            .desired_status
            .map_or_else(|| "unknown".to_string(), |s| s.to_string())
    );
    println!("   Uptime:  {}", uptime(snapshot.uptime_secs));

    for gpu in &snapshot.gpus {
        println!(
            "   GPU:     {} util {} mem {}",
            gpu.id,
            percent(gpu.gpu_util_percent),
            percent(gpu.memory_util_percent)
        );
    }
    if let Some(container) = &snapshot.container {
        println!(
            "   CPU:     {} | RAM: {}",
            percent(container.cpu_percent),
            percent(container.memory_percent)
        );
    }
    for endpoint in snapshot.public_endpoints() {
        println!("   📡 {endpoint}");
    }
    println!(
        "   Observed: {}",
        snapshot.observed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn status_emoji(snapshot: &PodSnapshot) -> &'static str {
    use cluster_mgr::DesiredStatus;

    match snapshot.desired_status {
        Some(DesiredStatus::Dead) => "🔴",
        _ if snapshot.is_running() => "🟢",
        Some(DesiredStatus::Running | DesiredStatus::Created | DesiredStatus::Restarting) => "🟡",
        Some(DesiredStatus::Exited | DesiredStatus::Paused) => "⏸️ ",
        _ => "⚪",
    }
}

fn price(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("${v:.2}"))
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.0}%"))
}

fn uptime(secs: Option<u64>) -> String {
    secs.map_or_else(
        || "-".to_string(),
        |s| format!("{}h{:02}m{:02}s", s / 3600, (s % 3600) / 60, s % 60),
    )
}
