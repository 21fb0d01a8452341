use clap::Args;
use fedgate_server::{router, AppState, DataSourceRegistry, ReadSplitsService, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args)]
pub struct ServeCommand {
    /// Path to the YAML config file
    #[arg(long, env = "FEDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<SocketAddr>,
}

impl ServeCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.serve())
    }

    async fn serve(self) -> anyhow::Result<()> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }

        let registry = DataSourceRegistry::new(&config.backends)?;
        let service = Arc::new(ReadSplitsService::new(registry, config.paging));

        // Root of every session token: shutdown drains in-flight streams
        let shutdown = CancellationToken::new();

        let app = router(AppState {
            service,
            shutdown: shutdown.clone(),
        });

        let listener = tokio::net::TcpListener::bind(config.listen).await?;
        info!("fedgate listening on {}", config.listen);

        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                    shutdown.cancel();
                }
            }
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        Ok(())
    }
}
