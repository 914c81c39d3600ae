use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use sse_service::{
    handlers::{register_notifications, register_stream},
    metrics, Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        env = %config.app.env,
        ping_interval_ms = config.sse.ping_interval_ms,
        max_lifetime_minutes = ?config.sse.connection_max_lifetime_minutes,
        max_notifications = ?config.sse.max_notifications_per_connection,
        max_notification_bytes = ?config.sse.max_notification_bytes,
        "Starting sse service"
    );

    let connection_path = config.sse.connection_path.clone();
    let (supervisor, publisher) = sse_service::build(config.sse);
    tracing::info!("SSE connection registry initialized");

    let registry = supervisor.registry().clone();

    // Close every stream with a disconnect message before the workers stop
    let shutdown = supervisor.clone();
    actix_web::rt::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    let addr = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    HttpServer::new(move || {
        let connection_path = connection_path.clone();
        App::new()
            .app_data(web::Data::new(supervisor.clone()))
            .app_data(web::Data::new(publisher.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(move |cfg| {
                register_stream(cfg, &connection_path);
                register_notifications(cfg);
            })
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("HTTP server failed")?;

    // Streams whose workers were stopped before their loop finished
    registry.close_all().await;
    tracing::info!("all streams closed");
    Ok(())
}
