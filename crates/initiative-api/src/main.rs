//! Initiative tracker API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use initiative_core::announce::TracingAnnouncer;
use initiative_core::clock::SystemClock;
use initiative_core::rng::{DeterministicRng, SeededRng};
use initiative_core::roll::DiceRollEvaluator;
use initiative_event_store::memory_event_repository::MemoryEventRepository;
use initiative_event_store::memory_identity_store::MemoryIdentityStore;
use initiative_tracker::application::scheduler::SchedulerRegistry;
use initiative_tracker::application::services::TrackerServices;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use initiative_api::config::ApiConfig;
use initiative_api::error::AppError;
use initiative_api::state::AppState;

/// Buffer for decision requests awaiting the logger.
const DECISION_CHANNEL_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting initiative tracker API server");

    // Read configuration from environment.
    let config = ApiConfig::from_env()?;

    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = match config.rng_seed {
        Some(seed) => {
            tracing::info!(seed, "using seeded RNG");
            Arc::new(Mutex::new(SeededRng::from_seed(seed)))
        }
        None => Arc::new(Mutex::new(SeededRng::from_os())),
    };
    let identities = MemoryIdentityStore::new();
    let services = TrackerServices {
        clock: Arc::new(SystemClock),
        rng,
        roller: Arc::new(DiceRollEvaluator),
        repository: Arc::new(MemoryEventRepository::new()),
        identities: Arc::new(identities.clone()),
        announcer: Arc::new(TracingAnnouncer),
    };

    let (decisions, decision_rx) = mpsc::channel(DECISION_CHANNEL_BUFFER);
    initiative_api::spawn_decision_logger(decision_rx);

    // Build application state.
    let registry = Arc::new(SchedulerRegistry::new(services, decisions));
    let app_state = AppState::new(registry, identities, config.initiative_formula.clone());
    let app = initiative_api::app(app_state);

    // Start server.
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::Server)?;

    axum::serve(listener, app).await.map_err(AppError::Server)?;

    Ok(())
}
