use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod notifications;
mod pagination;
mod services;

pub use error::{ApiError, ApiResult, AppError};
pub use pagination::{PaginatedResponse, PaginationMeta, PaginationParams};

#[cfg(test)]
mod tests;

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub config: config::Config,
    pub email: Option<services::email::EmailService>,
    pub encryption: services::encryption::EncryptionService,
    pub pdf: services::pdf::PdfService,
    pub push: services::push::PushService,
    pub sms: services::sms::SmsService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let email = if config.smtp.is_configured() {
        Some(
            services::email::EmailService::new(&config.smtp)
                .await
                .map_err(|e| anyhow::anyhow!(e))?,
        )
    } else {
        tracing::warn!("SMTP not configured; outbound email disabled");
        None
    };
    let encryption = services::encryption::EncryptionService::new(&config.encryption_key)
        .map_err(|e| anyhow::anyhow!(e))?;
    let pdf = services::pdf::PdfService::new(&config.uploads_dir);
    let push = services::push::PushService::new(config.fcm.clone());
    let sms = services::sms::SmsService::new(config.twilio.clone());

    let uploads_dir = config.uploads_dir.clone();
    let server_addr = config.server_addr.clone();

    let app_state = Arc::new(AppState {
        db_pool,
        config,
        email,
        encryption,
        pdf,
        push,
        sms,
    });

    let scheduler = jobs::JobScheduler::new(app_state.clone()).await?;
    scheduler.start().await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/auth", handlers::auth_routes())
        .nest("/api/v1/companies", handlers::company_routes())
        .nest("/api/v1/users", handlers::user_routes())
        .nest("/api/v1/employees", handlers::employee_routes())
        .nest("/api/v1/customers", handlers::customer_routes())
        .nest("/api/v1/quotations", handlers::quotation_routes())
        .nest("/api/v1/jobs", handlers::job_routes())
        .nest("/api/v1/invoices", handlers::invoice_routes())
        .nest("/api/v1/chat", handlers::chat_routes())
        .nest("/api/v1/notifications", notifications::notification_routes())
        .nest("/api/v1/volume", handlers::volume_routes())
        .nest("/api/v1/dashboard", handlers::dashboard_routes())
        .nest("/public/quotations", handlers::public_quotation_routes())
        .nest("/public/employees", handlers::employee_public_routes())
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&server_addr).await?;
    tracing::info!("Server running on {}", server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
