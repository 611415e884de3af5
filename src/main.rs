use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use feedback_service::config::Settings;
use feedback_service::openapi::ApiDoc;
use feedback_service::repo::pg::PgFeedbackStore;
use feedback_service::repo::FeedbackStore;
use feedback_service::{config, telemetry, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    telemetry::init_tracing();
    info!("Bootstrapping feedback service");

    let settings = Settings::from_env().context("invalid configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;
    if settings.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await.context("migrations failed")?;
        info!("Migrations applied");
    }
    let store: Arc<dyn FeedbackStore> = Arc::new(PgFeedbackStore::new(pool));

    match settings.kafka {
        #[cfg(feature = "kafka")]
        Some(ref kafka) => {
            use feedback_service::queue::{kafka::KafkaSource, FeedbackConsumer};
            let source = KafkaSource::connect(kafka).context("failed to start kafka consumer")?;
            let consumer = FeedbackConsumer::new(Arc::clone(&store));
            tokio::spawn(async move { consumer.run(source).await });
        }
        #[cfg(not(feature = "kafka"))]
        Some(_) => tracing::warn!("KAFKA_BROKER_ADDRESS is set but this build has no kafka feature; queue ingress disabled"),
        None => info!("KAFKA_BROKER_ADDRESS not set; queue ingress disabled"),
    }

    let mut state = AppState::new(store);
    if let Some(handle) = telemetry::install_prometheus() {
        state = state.with_metrics(handle);
    }
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(settings.bind_addr)?;

    info!("Listening on http://{}", settings.bind_addr);

    server.run().await?;
    Ok(())
}
