//! podman-varlink - command line client for the Podman varlink service.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podman_varlink::api::LogsOptions;
use podman_varlink::{datetime_format, Client, ClientConfig};

/// Environment variable selecting the log level when `RUST_LOG` is unset.
const LOG_LEVEL_ENV: &str = "PODMAN_LOG_LEVEL";

#[derive(Parser)]
#[command(name = "podman-varlink", version, about = "Manage containers through the Podman varlink service")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Local service uri (defaults to $PODMAN_VARLINK_ADDRESS or the system socket)
    #[arg(long, global = true)]
    uri: Option<String>,

    /// Remote service uri, ssh://user@host[:port]/path_to_socket
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Identity file for the ssh tunnel
    #[arg(long, global = true)]
    identity_file: Option<String>,

    /// Skip ssh host key verification
    #[arg(long, global = true)]
    ignore_hosts: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

impl ConnectionArgs {
    fn config(&self) -> ClientConfig {
        let mut config = match &self.uri {
            Some(uri) => ClientConfig::new(uri.clone()),
            None => ClientConfig::from_env(),
        };
        if let Some(remote) = &self.remote {
            config = config.remote(remote.clone()).ignore_hosts(self.ignore_hosts);
        }
        if let Some(identity) = &self.identity_file {
            config = config.identity_file(identity);
        }
        if let Some(secs) = self.timeout {
            config = config.timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show client and service versions
    Version,
    /// Show service host information
    Info,
    /// List images
    Images,
    /// List containers
    Ps {
        /// Show all containers, not only running ones
        #[arg(short, long)]
        all: bool,
    },
    /// List pods
    Pods,
    /// List volumes
    Volumes,
    /// Remove a container
    Rm {
        name: String,
        #[arg(short, long)]
        force: bool,
        /// Also remove anonymous volumes
        #[arg(short, long)]
        volumes: bool,
    },
    /// Remove an image
    Rmi {
        name: String,
        #[arg(short, long)]
        force: bool,
    },
    /// Start a container
    Start { name: String },
    /// Stop a container
    Stop {
        name: String,
        /// Seconds to wait before killing the container
        #[arg(short, long)]
        time: Option<i64>,
    },
    /// Print container logs
    Logs {
        name: String,
        /// Keep streaming new lines
        #[arg(short, long)]
        follow: bool,
        /// Number of lines from the end
        #[arg(long)]
        tail: Option<i64>,
    },
    /// Print the inspect document of a container, image or pod
    Inspect {
        name: String,
        #[arg(short = 't', long = "type", value_enum, default_value_t = InspectKind::Container)]
        kind: InspectKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InspectKind {
    Container,
    Image,
    Pod,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "podman_varlink=debug".to_string()
    } else {
        std::env::var(LOG_LEVEL_ENV)
            .map(|level| format!("podman_varlink={}", level.to_lowercase()))
            .unwrap_or_else(|_| "podman_varlink=info".to_string())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let client = Client::connect(cli.connection.config())
        .await
        .context("Failed to connect to podman service")?;

    let result = run(&client, cli.command).await;
    client.close().await;
    result
}

async fn run(client: &Client, command: Commands) -> Result<()> {
    match command {
        Commands::Version => {
            let version = client.system().version().await?;
            println!("Client version:  {}", version.client_version);
            println!("Service version: {}", version.version);
            println!("API version:     {}", version.remote_api_version);
            println!("Go version:      {}", version.go_version);
            println!("Git commit:      {}", version.git_commit);
            println!("OS/Arch:         {}", version.os_arch);
        }
        Commands::Info => {
            let info = client.system().info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Images => {
            println!("{:<40} {:<14} {:<22} {:>10}", "REPOSITORY", "IMAGE ID", "CREATED", "SIZE");
            for image in client.images().list().await? {
                let created = image
                    .created_at()
                    .map(|dt| datetime_format(&dt))
                    .unwrap_or_default();
                let size = image.size_display();
                if image.repo_tags.is_empty() {
                    println!("{:<40} {:<14} {:<22} {:>10}", "<none>", image.short_id(), created, size);
                }
                for tag in &image.repo_tags {
                    println!("{:<40} {:<14} {:<22} {:>10}", tag, image.short_id(), created, size);
                }
            }
        }
        Commands::Ps { all } => {
            println!("{:<14} {:<30} {:<20} {:<12} {}", "CONTAINER ID", "IMAGE", "COMMAND", "STATUS", "NAMES");
            for container in client.containers().list().await? {
                if !all && !container.is_running() {
                    continue;
                }
                let command: String = container.command_line().chars().take(20).collect();
                println!(
                    "{:<14} {:<30} {:<20} {:<12} {}",
                    container.short_id(),
                    container.image,
                    command,
                    container.status,
                    container.names
                );
            }
        }
        Commands::Pods => {
            println!("{:<14} {:<24} {:<10} {}", "POD ID", "NAME", "STATUS", "# OF CONTAINERS");
            for pod in client.pods().list().await? {
                println!(
                    "{:<14} {:<24} {:<10} {}",
                    pod.short_id(),
                    pod.name,
                    pod.status,
                    pod.container_count()
                );
            }
        }
        Commands::Volumes => {
            println!("{:<10} {}", "DRIVER", "VOLUME NAME");
            for volume in client.volumes().list(&[], true).await? {
                println!("{:<10} {}", volume.driver, volume.name);
            }
        }
        Commands::Rm { name, force, volumes } => {
            println!("{}", client.containers().remove(&name, force, volumes).await?);
        }
        Commands::Rmi { name, force } => {
            println!("{}", client.images().remove(&name, force).await?);
        }
        Commands::Start { name } => {
            let container = client.containers().start(&name).await?;
            println!("{}", container.id);
        }
        Commands::Stop { name, time } => {
            let container = client.containers().stop(&name, time).await?;
            println!("{}", container.id);
        }
        Commands::Logs { name, follow, tail } => {
            let options = LogsOptions {
                follow,
                tail,
                timestamps: false,
                ..Default::default()
            };
            let mut lines = client.containers().logs_follow(&[name], &options).await?;
            while let Some(line) = lines.next().await {
                println!("{}", line?.msg);
            }
        }
        Commands::Inspect { name, kind } => {
            let doc = match kind {
                InspectKind::Container => client.containers().inspect(&name).await?,
                InspectKind::Image => client.images().inspect(&name).await?,
                InspectKind::Pod => client.pods().inspect(&name).await?,
            };
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}
