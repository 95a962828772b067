use axum::{routing::get, Extension, Router};
use std::sync::Arc;

mod config;
mod conversation;
mod db;
mod document;
mod handlers;
mod line_client;
mod models;
mod openai_client;
mod signature;

use config::{Capability, Config};

/// Process-scoped dependencies, constructed once at startup and injected into
/// every handler via `Extension`. Missing configuration leaves a capability in
/// `Missing` form instead of aborting startup; each request then answers with
/// a degraded response.
pub struct AppState {
    pub db: Capability<sqlx::PgPool>,
    pub llm: Capability<openai_client::OpenAiClient>,
    pub line: Capability<line_client::LineClient>,
    pub channel_secret: Option<String>,
    pub public_base_url: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging();

    let config = Config::from_env();

    let db = match &config.database_url {
        Some(url) => match db::create_pool(url).await {
            Ok(pool) => {
                tracing::info!("connected to PostgreSQL");
                Capability::Ready(pool)
            }
            Err(e) => {
                tracing::error!(
                    "failed to connect to PostgreSQL: {}; running without history or file storage",
                    e
                );
                Capability::Missing {
                    reason: "the message store is unreachable",
                }
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set; running without history or file storage");
            Capability::Missing {
                reason: "DATABASE_URL is not configured",
            }
        }
    };

    let llm = match config.openai_api_key.clone() {
        Some(api_key) => {
            tracing::info!("chat completion client ready (model: {})", config.openai_model);
            Capability::Ready(openai_client::OpenAiClient::new(
                api_key,
                config.openai_model.clone(),
            ))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set; replies will ask the operator to configure it");
            Capability::Missing {
                reason: "目前尚未設定 OPENAI_API_KEY，無法產生回覆，請通知管理員。",
            }
        }
    };

    let line = match config.channel_access_token.clone() {
        Some(token) => Capability::Ready(line_client::LineClient::new(token)),
        None => {
            tracing::warn!("LINE_CHANNEL_ACCESS_TOKEN not set; replies cannot be delivered");
            Capability::Missing {
                reason: "LINE_CHANNEL_ACCESS_TOKEN is not configured",
            }
        }
    };

    if config.channel_secret.is_none() {
        tracing::warn!("LINE_CHANNEL_SECRET not set; webhook signatures will not be verified");
    }
    if config.public_base_url.is_none() {
        tracing::warn!("PUBLIC_BASE_URL not set; document replies will carry a reminder instead of a link");
    }

    let shared_state = Arc::new(AppState {
        db,
        llm,
        line,
        channel_secret: config.channel_secret.clone(),
        public_base_url: config.public_base_url.clone(),
    });

    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .merge(handlers::webhook::webhook_routes())
        .merge(handlers::files::file_routes())
        .layer(Extension(shared_state));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", addr, e);
            return;
        }
    };

    tracing::info!("listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server exited with error: {}", e);
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,line_relay=debug,sqlx=warn,reqwest=warn,hyper=warn")
    });

    // JSON logging for production log aggregation, human-readable otherwise.
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("line_relay starting up (version {})", env!("CARGO_PKG_VERSION"));
}
