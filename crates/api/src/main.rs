#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Sweet Shop API Server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sweetshop_api::{
    auth::{
        AssertionVerifier, ChallengeBackend, ChallengeStore, GoogleIdTokenVerifier,
        InMemoryChallengeBackend, RedisChallengeBackend,
    },
    config::Config,
    email::{LogMailer, OtpMailer, ResendMailer},
    identity::PgIdentityRepository,
    routes::create_router,
    security::security_headers_middleware,
    sweets::PgSweetRepository,
    AppState, Backends,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // LOG_FORMAT=json switches to structured output for log shipping
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sweetshop_api=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Sweet Shop API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Database connection established");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let challenge_backend: Arc<dyn ChallengeBackend> = match &config.redis_url {
        Some(url) => {
            let backend = RedisChallengeBackend::connect(url).await?;
            tracing::info!("OTP challenges stored in Redis");
            Arc::new(backend)
        }
        None => {
            tracing::warn!("REDIS_URL not set - OTP challenges kept in process memory");
            Arc::new(InMemoryChallengeBackend::new())
        }
    };

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mailer: Arc<dyn OtpMailer> = match &config.resend_api_key {
        Some(key) => Arc::new(ResendMailer::new(
            http_client.clone(),
            key.clone(),
            config.mail_from.clone(),
        )),
        None => {
            tracing::warn!("RESEND_API_KEY not set - OTP codes are written to the debug log");
            Arc::new(LogMailer)
        }
    };

    let federated: Arc<dyn AssertionVerifier> = Arc::new(GoogleIdTokenVerifier::new(
        http_client,
        config.google_client_id.clone(),
        config.google_jwks_url.clone(),
    ));

    let state = AppState::new(
        config.clone(),
        Backends {
            identities: Arc::new(PgIdentityRepository::new(pool.clone())),
            sweets: Arc::new(PgSweetRepository::new(pool)),
            challenges: ChallengeStore::new(challenge_backend, config.otp_ttl),
            mailer,
            federated,
        },
    );

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    tracing::info!(
        allowed_origins = ?allowed_origins,
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
