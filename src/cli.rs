use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::BasicAuth;
use crate::config::{default_settings_file, Config, GoCdConfig};
use crate::gocd::GoCdClient;
use crate::monitor::{MonitorState, PollingAggregator};
use crate::output;
use crate::server::SubscriberServer;
use crate::settings::{DocumentStore, JsonFileStore, MemoryStore, SettingsStore};
use crate::status::StatusReport;
use crate::subscribers::SubscriberRegistry;

#[derive(Parser)]
#[command(name = "gocd-monitor")]
#[command(author, version, about = "GoCD pipeline monitor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    gocd: GoCdArgs,

    /// Config file (defaults to ./gocd-monitor.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct GoCdArgs {
    #[arg(short, long, global = true, env = "GOCD_URL")]
    url: Option<String>,

    #[arg(long, global = true, env = "GOCD_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "GOCD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Seconds between refresh cycles
    #[arg(
        long,
        global = true,
        env = "GOCD_POLL_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll GoCD continuously and push updates to subscribers
    Serve {
        #[arg(short, long, env = "GOCD_MONITOR_LISTEN")]
        listen: Option<String>,

        #[arg(short, long, env = "GOCD_SETTINGS_FILE")]
        settings_file: Option<PathBuf>,
    },
    /// Poll GoCD once and print every pipeline's status as JSON
    Status {
        #[arg(short, long, default_value_t = false)]
        pretty: bool,
    },
}

/// GoCD connection after merging command-line values over the config file.
#[derive(Debug)]
struct Connection {
    url: String,
    auth: Option<BasicAuth>,
    poll_interval: Duration,
    history_depth: usize,
}

impl Connection {
    fn client(&self) -> Result<GoCdClient> {
        let client = GoCdClient::new(&self.url, self.auth.clone())
            .with_context(|| format!("Invalid GoCD URL: {}", self.url))?;
        Ok(client.with_history_depth(self.history_depth))
    }
}

impl GoCdArgs {
    fn resolve(&self, file: &GoCdConfig) -> Result<Connection> {
        let Some(url) = self.url.clone().or_else(|| file.url.clone()) else {
            bail!("No GoCD URL configured; pass --url or set GOCD_URL");
        };

        let poll_interval = self.poll_interval.unwrap_or(file.poll_interval);
        if poll_interval == 0 {
            bail!("Poll interval must be at least one second");
        }

        let user = self.user.as_deref().or(file.user.as_deref());
        let password = self.password.as_deref().or(file.password.as_deref());

        Ok(Connection {
            url,
            auth: BasicAuth::from_parts(user, password),
            poll_interval: Duration::from_secs(poll_interval),
            history_depth: file.history_depth,
        })
    }
}

impl Cli {
    async fn execute_serve(
        &self,
        config: &Config,
        listen: Option<&str>,
        settings_file: Option<&Path>,
    ) -> Result<()> {
        let connection = self.gocd.resolve(&config.gocd)?;
        let client = Arc::new(connection.client()?);
        info!("Monitoring GoCD at: {}", client.base_url());

        let settings_path = match settings_file
            .map(Path::to_path_buf)
            .or_else(|| config.server.settings_file.clone())
        {
            Some(path) => path,
            None => default_settings_file()?,
        };
        let store = JsonFileStore::open(&settings_path).with_context(|| {
            format!("Failed to open settings store: {}", settings_path.display())
        })?;
        info!(
            "Settings store at: {} ({} documents)",
            store.path().display(),
            store.count()?
        );

        let settings = Arc::new(SettingsStore::new(Box::new(store)));
        let state = Arc::new(MonitorState::default());
        let registry = Arc::new(SubscriberRegistry::new(
            Arc::clone(&settings),
            Arc::clone(&state),
        ));

        let listen = listen.unwrap_or(&config.server.listen);
        let server = SubscriberServer::bind(listen, Arc::clone(&registry))
            .await
            .with_context(|| format!("Failed to listen on {listen}"))?;

        let aggregator = Arc::new(PollingAggregator::new(client, settings, state, registry));
        let handle = aggregator
            .start(connection.poll_interval)
            .await
            .context("Failed to load the pipeline list")?;

        let result = tokio::select! {
            result = server.run() => result.context("Subscriber server failed"),
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for Ctrl-C: {e}");
                }
                info!("Shutting down");
                Ok(())
            }
        };

        handle.stop().await;
        result
    }

    async fn execute_status(&self, config: &Config, pretty: bool) -> Result<()> {
        let connection = self.gocd.resolve(&config.gocd)?;
        let client = Arc::new(connection.client()?);
        info!("Collecting pipeline status from: {}", client.base_url());

        let settings = Arc::new(SettingsStore::new(status_settings_store(config)));
        let state = Arc::new(MonitorState::default());
        // Nobody is subscribed during a one-shot run.
        let registry = Arc::new(SubscriberRegistry::new(
            Arc::clone(&settings),
            Arc::clone(&state),
        ));

        let aggregator = PollingAggregator::new(Arc::clone(&client), settings, state, registry);
        aggregator.bootstrap().await?;
        let snapshot = aggregator.refresh().await;

        let report = StatusReport {
            server: client.base_url().to_string(),
            collected_at: Utc::now(),
            total_pipelines: snapshot.len(),
            pipelines: snapshot.values().cloned().collect(),
        };

        output::write_json(&report, pretty, self.output.as_deref())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Serve {
                listen,
                settings_file,
            } => {
                self.execute_serve(&config, listen.as_deref(), settings_file.as_deref())
                    .await
            }
            Commands::Status { pretty } => self.execute_status(&config, *pretty).await,
        }
    }
}

/// Reuses the saved settings when they exist; a one-shot run never creates them.
fn status_settings_store(config: &Config) -> Box<dyn DocumentStore> {
    let path = config
        .server
        .settings_file
        .clone()
        .or_else(|| default_settings_file().ok())
        .filter(|path| path.exists());

    if let Some(path) = path {
        match JsonFileStore::open(&path) {
            Ok(store) => return Box::new(store),
            Err(e) => warn!("Ignoring settings store {}: {e}", path.display()),
        }
    }

    Box::new(MemoryStore::default())
}
