use std::{env, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use derive_new::new;
use eyre::Result;
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{settings::Settings, CoreMetrics};

/// Build information served on `/api/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct AgentMetadata {
    /// Agent name
    pub agent: String,
    /// Crate version
    pub version: String,
}

/// Settings of an agent defined from configuration
pub trait LoadableFromSettings: AsRef<Settings> + Sized {
    /// Create a new instance of these settings by reading the configs and env
    /// vars, then applying `overrides` given on the command line.
    fn load(overrides: &[(&str, String)]) -> Result<Self>;
}

impl LoadableFromSettings for Settings {
    fn load(overrides: &[(&str, String)]) -> Result<Self> {
        crate::settings::load_settings(overrides)
    }
}

/// A fundamental agent which does not make any assumptions about the tools
/// which are used.
#[async_trait]
pub trait BaseAgent: Send + Sync + Debug {
    /// The agent's name
    const AGENT_NAME: &'static str;

    /// The settings object for this agent
    type Settings: LoadableFromSettings;

    /// Instantiate the agent from the standard settings object
    async fn from_settings(
        agent_metadata: AgentMetadata,
        settings: Self::Settings,
        metrics: Arc<CoreMetrics>,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Run until `shutdown` fires or a fatal error happens.
    async fn run(self, shutdown: CancellationToken) -> Result<()>;
}

/// Install the process wide eyre report handler. `ONELINE_BACKTRACES=true`
/// selects the single line handler.
pub fn install_error_handler() -> Result<()> {
    if env::var("ONELINE_BACKTRACES")
        .map(|v| v.to_lowercase())
        .as_deref()
        == Ok("true")
    {
        #[cfg(feature = "oneline-errors")]
        crate::oneline_eyre::install()?;
        #[cfg(not(feature = "oneline-errors"))]
        eyre::bail!("The oneline errors feature was not included");
    } else {
        #[cfg(feature = "color-eyre")]
        color_eyre::install()?;
    }
    Ok(())
}

/// Cancel `token` on ctrl-c or SIGTERM.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        token.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(?err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Call this from `main` to fully initialize and run the agent for its entire
/// lifecycle. This assumes only a single agent is being run. This will
/// initialize tracing and metrics as well.
pub async fn agent_main<A: BaseAgent>(overrides: &[(&str, String)]) -> Result<()> {
    install_error_handler()?;

    let agent_metadata = AgentMetadata::new(A::AGENT_NAME.into(), env!("CARGO_PKG_VERSION").into());

    let settings = A::Settings::load(overrides)?;
    settings.as_ref().tracing.start_tracing()?;
    let metrics = Arc::new(CoreMetrics::new(A::AGENT_NAME, Registry::new())?);
    let agent = A::from_settings(agent_metadata, settings, metrics).await?;

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());
    agent.run(shutdown).await?;
    info!(agent = A::AGENT_NAME, "Shutting down agent...");
    Ok(())
}
