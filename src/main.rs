use std::sync::Arc;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use colecta::{
    api,
    config::Settings,
    notifications::{EmailNotifier, LogNotifier, NotificationManager},
    payments::redsys::{RedsysGateway, ReqwestTransport},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colecta=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new()?;

    tracing::info!("Starting Colecta server on {}:{}", settings.server.host, settings.server.port);

    let context = colecta_context(&settings).await?;
    let app = api::create_app(context);

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn colecta_context(settings: &Settings) -> anyhow::Result<Arc<ServiceContext>> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let notification_manager = Arc::new(NotificationManager::new());
    notification_manager.register(Arc::new(LogNotifier)).await;

    if let Some(smtp) = settings.notifications.smtp.clone() {
        notification_manager.register(Arc::new(EmailNotifier::new(smtp)?)).await;
    }

    let transport = Arc::new(ReqwestTransport::new(settings.redsys.request_timeout())?);
    let gateway = Arc::new(RedsysGateway::new(settings.redsys.clone(), transport));

    Ok(Arc::new(ServiceContext::new(
        db_pool,
        notification_manager,
        gateway,
        settings.sepa.clone(),
        settings.billing_policy(),
    )))
}
