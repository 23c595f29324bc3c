use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weathercore::app::Application;
use weathercore::config::Config;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,weathercore=debug")))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(true).with_line_number(true))
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    info!("Starting weathercore with config: {:?}", config);

    info!("Connecting to database...");
    let pool = PgPoolOptions::new().max_connections(5).connect(&config.database_url).await?;
    info!("Database connection established");

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations completed");

    let app = Application::build(config, pool).await?;
    let shutdown = app.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            shutdown.cancel();
        }
    });

    app.run_until_stopped().await
}
