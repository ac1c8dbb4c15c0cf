use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tutora_cache::RecommendationCache;
use tutora_config::Config;
use tutora_core::pipeline::FixedAbility;
use tutora_gateway::{
    ConnectionRegistry, GatewayConfig, MessageRouter, RouterConfig, SessionRegistry, TutorGateway,
};
use tutora_path::{GeneratorConfig, PathGenerator, PathStore};

mod adapters;

use adapters::{CannedDialogue, CatalogRecommendations, HeuristicSpeech};

#[derive(Parser, Debug, Clone)]
#[command(name = "tutora-server")]
#[command(about = "Tutora real-time tutoring gateway")]
#[command(version)]
struct Cli {
    /// Bind address (overrides config)
    #[arg(long, env = "TUTORA_BIND")]
    bind: Option<String>,

    /// Config file path
    #[arg(long, env = "TUTORA_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long, env = "TUTORA_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    info!(config = %config_path.display(), bind = %config.server.bind, "starting");

    // Explicit dependency injection: everything is constructed once here and
    // handed into the gateway; no ambient singletons.
    let connections = Arc::new(ConnectionRegistry::new());
    let sessions = Arc::new(SessionRegistry::new());
    let cache = Arc::new(RecommendationCache::new());
    let generator = Arc::new(PathGenerator::new(
        GeneratorConfig {
            min_study_minutes: config.path.min_study_minutes,
            max_study_minutes: config.path.max_study_minutes,
            ..GeneratorConfig::default()
        },
        Arc::new(FixedAbility::default()),
    ));
    let paths = Arc::new(PathStore::new());

    let router = Arc::new(MessageRouter::new(
        Arc::new(CannedDialogue),
        Arc::new(HeuristicSpeech),
        Arc::new(CatalogRecommendations),
        cache,
        generator,
        paths,
        Arc::clone(&sessions),
        RouterConfig {
            chat_timeout: Duration::from_millis(config.pipelines.chat_timeout_ms),
            audio_timeout: Duration::from_millis(config.pipelines.audio_timeout_ms),
            recommendation_ttl: chrono::Duration::seconds(
                config.recommendations.cache_ttl_secs as i64,
            ),
            max_recommendations: config.recommendations.max_items,
        },
    ));

    let gateway = Arc::new(TutorGateway::new(
        GatewayConfig {
            bind: config.server.bind.clone(),
            max_connections: config.server.max_connections,
            heartbeat_interval_secs: config.server.heartbeat_interval_secs,
        },
        connections,
        sessions,
        router,
    ));

    gateway.run().await?;
    Ok(())
}
