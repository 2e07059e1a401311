//! Portfolio Backend
//! Mission: Auth, cached content and chat proxy for the portfolio site

use anyhow::{Context, Result};
use portfolio_backend::{
    api::{router, AppState},
    auth::{
        credentials::CredentialVerifier, service::AuthService, session::SessionMirror,
        session::SessionStore, token::TokenCodec,
    },
    clock::{Clock, SystemClock},
    content::{cache::ContentCache, chat::ChatClient},
    models::Config,
    store::{LocalStateStore, RecordStore, SqliteStore},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!("Portfolio backend starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn RecordStore> = Arc::new(
        SqliteStore::new(&config.database_path)
            .with_context(|| format!("Failed to open record store at {}", config.database_path))?,
    );
    let local = Arc::new(
        LocalStateStore::new(&config.local_state_path, Arc::clone(&clock)).with_context(|| {
            format!(
                "Failed to open local state store at {}",
                config.local_state_path
            )
        })?,
    );

    let codec = Arc::new(TokenCodec::new(
        config.token_secret.clone(),
        Arc::clone(&clock),
    ));
    let sessions = Arc::new(SessionStore::new(
        Arc::clone(&local),
        SessionMirror::new(Arc::clone(&store)),
        Arc::clone(&codec),
        Arc::clone(&clock),
    ));
    let verifier = CredentialVerifier::new(Arc::clone(&store), Arc::clone(&clock));
    let auth = Arc::new(AuthService::new(
        verifier,
        Arc::clone(&codec),
        sessions,
        Arc::clone(&clock),
    ));

    let cache = Arc::new(ContentCache::new(
        Arc::clone(&store),
        Arc::clone(&local),
        Arc::clone(&clock),
    ));

    let chat = config
        .chat_base_url
        .clone()
        .map(|url| Arc::new(ChatClient::new(url)));
    if chat.is_none() {
        info!("CHAT_BASE_URL not set, chat endpoints disabled");
    }

    // Restore a prior session and warm the content cache before serving.
    if auth.check_existing_session().await {
        info!("Previous session restored at startup");
    }
    if let Err(e) = cache.load(false).await {
        info!("Content not warmed at startup: {}", e);
    }

    let state = AppState {
        auth,
        cache,
        codec,
        chat,
    };
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
