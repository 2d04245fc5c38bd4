use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use modgate_core::auth::hash_token;
use modgate_engine::confirmation::ConfirmationState;
use modgate_engine::model::OpenAiCompatClient;
use modgate_engine::{Engine, EngineConfig, ModerationError};

mod auth;
mod bridge;
mod error;
mod middleware;
mod routes;
mod state;
mod store;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(OpenApi)]
#[openapi(
    info(
        title = "modgate API",
        version = "0.1.0",
        description = "Routes free-text moderation requests from a chat-platform bridge to validated, permission-checked moderation actions."
    ),
    paths(
        routes::health::health_check,
        routes::requests::handle_request,
        routes::preview::preview_request,
        routes::confirmations::get_confirmation,
        routes::confirmations::confirm,
        routes::confirmations::cancel,
        routes::settings::get_settings,
        routes::settings::update_settings,
        routes::settings::toggle,
        routes::settings::status,
    ),
    components(schemas(
        HealthResponse,
        modgate_core::error::ApiError,
        modgate_core::actor::InboundRequest,
        modgate_core::actor::Actor,
        modgate_core::actor::Member,
        modgate_core::actor::PermissionFlags,
        modgate_core::decision::Decision,
        modgate_core::decision::Tool,
        modgate_core::audit::AuditRecord,
        modgate_core::settings::GuildSettings,
        modgate_core::settings::SettingsUpdate,
        routes::confirmations::ConfirmBody,
        routes::confirmations::CancelBody,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: bool,
    pub model_configured: bool,
    pub pending_confirmations: usize,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "modgate_api=debug,modgate_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let api_token = std::env::var("MODGATE_API_TOKEN").expect("MODGATE_API_TOKEN must be set");

    // Engine and its collaborators
    let engine_config = EngineConfig::from_env();
    if engine_config.model.api_key.is_none() {
        tracing::warn!("GROQ_API_KEY is not set; every request will report that AI moderation is not configured");
    }

    let model = OpenAiCompatClient::new(&engine_config.model).expect("Invalid model configuration");
    let bridge_url = std::env::var("MODGATE_BRIDGE_URL").expect("MODGATE_BRIDGE_URL must be set");
    let bridge = Arc::new(
        bridge::HttpBridge::new(
            &bridge_url,
            std::env::var("MODGATE_BRIDGE_TOKEN").ok(),
            engine_config.provider_timeout,
        )
        .expect("Invalid bridge configuration"),
    );

    let engine = Arc::new(Engine::new(
        engine_config,
        Arc::new(model),
        bridge.clone(),
        Arc::new(store::PgMemoryStore::new(pool.clone())),
        Arc::new(store::PgAuditLog::new(pool.clone())),
    ));

    spawn_expiry_forwarder(engine.clone(), bridge);
    spawn_cleanup(engine.clone());

    let app_state = state::AppState {
        settings: store::PgSettingsStore::new(pool.clone()),
        db: pool,
        engine,
        api_token_hash: hash_token(&api_token).into(),
    };

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-surface rate limiting
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::requests::router().layer(middleware::rate_limit::requests_layer()))
        .merge(
            routes::confirmations::router().layer(middleware::rate_limit::confirmations_layer()),
        )
        .merge(routes::settings::router().layer(middleware::rate_limit::operator_layer()))
        .merge(routes::preview::router().layer(middleware::rate_limit::operator_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("modgate API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Ask the bridge to retire prompts whose confirmation window ran out.
/// Confirm and cancel arrive through the API, so the bridge already knows
/// about those. After a lag, every retained expired request is retired
/// again; the bridge treats a repeat as a no-op.
fn spawn_expiry_forwarder(engine: Arc<Engine>, bridge: Arc<bridge::HttpBridge>) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        let message = ModerationError::ConfirmationExpired.to_string();
        loop {
            match events.recv().await {
                Ok(event) if event.state == ConfirmationState::Expired => {
                    retire(&bridge, event.request.id, &message).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    let expired = engine.expired_confirmations();
                    tracing::warn!(skipped, resweep = expired.len(), "confirmation event stream lagged");
                    for request in expired {
                        retire(&bridge, request.id, &message).await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn retire(bridge: &bridge::HttpBridge, id: uuid::Uuid, message: &str) {
    if let Err(err) = bridge
        .retire_prompt(id, ConfirmationState::Expired, message)
        .await
    {
        tracing::warn!(error = %err, confirmation_id = %id, "failed to retire expired confirmation prompt");
    }
}

fn spawn_cleanup(engine: Arc<Engine>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            engine.cleanup().await;
        }
    });
}
