use course_keeper::{
    bot::{TelegramClient, TelegramNotifier},
    config::{Settings, courses, database},
    core::{course, payment::PaymentProcessor},
    errors::Result,
    payme::{self, AppState},
};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, env vars can also be set externally
    dotenv().ok();

    // 3. Settings
    let settings = Settings::from_env()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    info!(
        test_mode = settings.payme.test_mode,
        port = settings.server_port,
        "Settings loaded"
    );

    // 4. Database
    let db = database::create_connection(&settings.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;

    // 5. Seed courses from config.toml
    let seed = courses::load_optional_config(&settings.courses_config)?;
    let inserted = course::seed_courses(&db, &seed).await?;
    info!("Seeded {} new course(s)", inserted);

    // 6. Payment processor with Telegram fulfillment
    let notifier = TelegramNotifier::new(TelegramClient::new(&settings.bot_token)?);
    let processor = PaymentProcessor::new(
        db,
        settings.default_product.clone(),
        Arc::new(notifier),
    );

    // 7. Serve the webhook
    let addr = format!("0.0.0.0:{}", settings.server_port);
    let state = AppState {
        processor: Arc::new(processor),
        settings: Arc::new(settings),
    };
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .inspect_err(|e| error!("Failed to bind {}: {}", addr, e))?;
    info!("Payme webhook listening on {}", addr);
    axum::serve(listener, payme::router(state)).await?;

    Ok(())
}
