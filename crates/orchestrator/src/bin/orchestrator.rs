//! Orchestrator CLI - cluster lifecycle operations against the cloud driver.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cluster_orchestrator::{
    AutoscaleSizeRequest, ClusterCreateRequest, ClusterManager, ConfigFile, CreateOption,
    FileStore, HttpDriverGateway, ListFilter, NodeGroupAddRequest, OrchestratorConfig,
    UpgradeRequest,
};

/// Orchestrator CLI - multi-cloud Kubernetes cluster lifecycle.
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Create, inspect, and manage Kubernetes clusters through the cloud driver")]
struct Cli {
    /// Capability, connection, and resource configuration (YAML).
    #[arg(long, env = "ORCHESTRATOR_CONFIG", default_value = "orchestrator.yaml")]
    config: PathBuf,

    /// Namespace the cluster belongs to.
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a new cluster from a request file (YAML or JSON).
    Create {
        /// Cluster request file.
        #[arg(long)]
        file: PathBuf,
    },

    /// Adopt a cluster that already exists at the provider.
    Register {
        /// Cluster request file; `cspResourceId` names the provider cluster.
        #[arg(long)]
        file: PathBuf,
    },

    /// Fetch live state and check it against the stored record.
    Get {
        /// Cluster ID.
        #[arg(long)]
        cluster: String,
    },

    /// List stored clusters.
    List {
        /// Record field to filter on (e.g., connectionName).
        #[arg(long, requires = "filter_value")]
        filter_key: Option<String>,

        /// Case-insensitive substring the field must contain.
        #[arg(long, requires = "filter_key")]
        filter_value: Option<String>,
    },

    /// List stored cluster IDs.
    ListIds {
        /// Record field to filter on.
        #[arg(long, requires = "filter_value")]
        filter_key: Option<String>,

        /// Case-insensitive substring the field must contain.
        #[arg(long, requires = "filter_key")]
        filter_value: Option<String>,
    },

    /// Delete a cluster.
    Delete {
        /// Cluster ID.
        #[arg(long)]
        cluster: String,

        /// Drop the stored record even if the provider call fails.
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Delete every cluster whose ID contains a substring.
    DeleteAll {
        /// Substring to match (empty matches all).
        #[arg(long = "match", default_value = "")]
        pattern: String,

        /// Drop stored records even if provider calls fail.
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Add a node group from a request file.
    AddNodeGroup {
        /// Cluster ID.
        #[arg(long)]
        cluster: String,

        /// Node group request file.
        #[arg(long)]
        file: PathBuf,
    },

    /// Remove a node group.
    RemoveNodeGroup {
        /// Cluster ID.
        #[arg(long)]
        cluster: String,

        /// Node group name.
        #[arg(long)]
        node_group: String,

        /// Ask the provider to force removal.
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Turn node group autoscaling on or off.
    SetAutoscaling {
        /// Cluster ID.
        #[arg(long)]
        cluster: String,

        /// Node group name.
        #[arg(long)]
        node_group: String,

        /// Desired state (true/false).
        #[arg(long, action = ArgAction::Set)]
        on: bool,
    },

    /// Change node group autoscale bounds.
    ChangeAutoscaleSize {
        /// Cluster ID.
        #[arg(long)]
        cluster: String,

        /// Node group name.
        #[arg(long)]
        node_group: String,

        /// Desired node count.
        #[arg(long)]
        desired: u32,

        /// Minimum node count.
        #[arg(long)]
        min: u32,

        /// Maximum node count.
        #[arg(long)]
        max: u32,
    },

    /// Upgrade the control-plane version.
    Upgrade {
        /// Cluster ID.
        #[arg(long)]
        cluster: String,

        /// Target Kubernetes version (e.g., 1.30).
        #[arg(long)]
        target_version: String,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Read a request file. YAML parsing also accepts JSON.
fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse request file {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode output")?
    );
    Ok(())
}

fn list_filter(key: Option<String>, value: Option<String>) -> Option<ListFilter> {
    key.zip(value).map(|(k, v)| ListFilter::new(k, v))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let settings = OrchestratorConfig::from_env();
    let config_file = ConfigFile::load(&cli.config)?;
    debug!(
        driver = %settings.driver_base_url,
        state_dir = %settings.state_dir.display(),
        "Loaded configuration"
    );

    let driver = HttpDriverGateway::new(&settings.driver_base_url, settings.timeouts)
        .context("Failed to create driver gateway")?;
    let manager = ClusterManager::new(
        Arc::new(driver),
        Arc::new(FileStore::new(&settings.state_dir)),
        Arc::new(config_file.resolver()),
        Arc::new(config_file.connection_catalog()),
        config_file.capability_table(),
    );
    let ns = cli.namespace.as_str();

    match cli.command {
        Commands::Create { file } => {
            let req: ClusterCreateRequest = read_request(&file)?;
            let record = manager
                .create_cluster(ns, &req, CreateOption::Create)
                .await
                .context("Failed to create cluster")?;
            info!(cluster = %record.id, status = %record.status, "Cluster created");
            print_json(&record)?;
        }
        Commands::Register { file } => {
            let req: ClusterCreateRequest = read_request(&file)?;
            let record = manager
                .create_cluster(ns, &req, CreateOption::Register)
                .await
                .context("Failed to register cluster")?;
            info!(cluster = %record.id, "Cluster registered");
            print_json(&record)?;
        }
        Commands::Get { cluster } => {
            let record = manager
                .get_cluster(ns, &cluster)
                .await
                .with_context(|| format!("Failed to get cluster {cluster}"))?;
            print_json(&record)?;
        }
        Commands::List {
            filter_key,
            filter_value,
        } => {
            let filter = list_filter(filter_key, filter_value);
            let records = manager.list_cluster(ns, filter.as_ref()).await?;
            print_json(&records)?;
        }
        Commands::ListIds {
            filter_key,
            filter_value,
        } => {
            let filter = list_filter(filter_key, filter_value);
            let ids = manager.list_cluster_id(ns, filter.as_ref()).await?;
            print_json(&ids)?;
        }
        Commands::Delete { cluster, force } => {
            let deleted = manager
                .delete_cluster(ns, &cluster, force)
                .await
                .with_context(|| format!("Failed to delete cluster {cluster}"))?;
            print_json(&serde_json::json!({ "success": deleted }))?;
        }
        Commands::DeleteAll { pattern, force } => {
            let report = manager.delete_all_cluster(ns, &pattern, force).await?;
            print_json(&report)?;
        }
        Commands::AddNodeGroup { cluster, file } => {
            let req: NodeGroupAddRequest = read_request(&file)?;
            let record = manager
                .add_node_group(ns, &cluster, &req)
                .await
                .with_context(|| format!("Failed to add node group to {cluster}"))?;
            print_json(&record)?;
        }
        Commands::RemoveNodeGroup {
            cluster,
            node_group,
            force,
        } => {
            let removed = manager
                .remove_node_group(ns, &cluster, &node_group, force)
                .await
                .with_context(|| format!("Failed to remove node group {node_group}"))?;
            print_json(&serde_json::json!({ "success": removed }))?;
        }
        Commands::SetAutoscaling {
            cluster,
            node_group,
            on,
        } => {
            let ok = manager
                .set_autoscaling(ns, &cluster, &node_group, on)
                .await
                .with_context(|| format!("Failed to set autoscaling on {node_group}"))?;
            print_json(&serde_json::json!({ "success": ok }))?;
        }
        Commands::ChangeAutoscaleSize {
            cluster,
            node_group,
            desired,
            min,
            max,
        } => {
            let req = AutoscaleSizeRequest {
                desired_node_size: desired,
                min_node_size: min,
                max_node_size: max,
            };
            let updated = manager
                .change_autoscale_size(ns, &cluster, &node_group, &req)
                .await
                .with_context(|| format!("Failed to resize node group {node_group}"))?;
            print_json(&updated)?;
        }
        Commands::Upgrade {
            cluster,
            target_version,
        } => {
            let req = UpgradeRequest {
                version: target_version,
            };
            let record = manager
                .upgrade_cluster(ns, &cluster, &req)
                .await
                .with_context(|| format!("Failed to upgrade cluster {cluster}"))?;
            print_json(&record)?;
        }
    }

    Ok(())
}
