use std::sync::Arc;

use authflow::core::auth::{AuthApiState, AuthService, JwtService, auth_api_router};
use authflow::core::config::Config;
use authflow::core::db::{AuthStore, DbConfig, MemoryStore, PgStore, create_pool_with_migrations};
use authflow::core::mail::{LogMailer, MailTemplates, Mailer, SmtpConfig, SmtpMailer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing, RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("authflow=info,tower_http=info")),
        )
        .init();

    // Load application config from environment variables
    let config = Config::from_env()?;
    let jwt_service = JwtService::from_env()?;

    tracing::info!(
        "Config loaded: database={}, frontend_url={}",
        config.has_database(),
        config.frontend_url.is_some()
    );

    let store: Arc<dyn AuthStore> = if config.has_database() {
        let pool = create_pool_with_migrations(&DbConfig::from_env()?).await?;
        Arc::new(PgStore::new(pool))
    } else {
        tracing::warn!("DATABASE_URL not set, keeping users and tokens in memory");
        Arc::new(MemoryStore::new())
    };

    let templates = MailTemplates::new(
        config.frontend_url.clone(),
        config.verification_token_expiry_minutes,
        config.reset_token_expiry_minutes,
    );
    let mailer: Arc<dyn Mailer> = match SmtpConfig::from_env() {
        Some(smtp) => {
            tracing::info!("Sending mail through {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailer::new(&smtp, templates)?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, emails will be logged instead of sent");
            Arc::new(LogMailer::new(templates))
        }
    };

    let auth_service = AuthService::new(store, mailer, jwt_service, config.auth_config());

    let app = auth_api_router(AuthApiState { auth_service })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
