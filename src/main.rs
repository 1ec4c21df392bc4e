use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wellness::analysis::HttpAnalysisGateway;
use wellness::bot::{self, DialogueManager};
use wellness::config::BotConfig;
use wellness::db::{self, PgStore};
use wellness::diary::FatSecretDiaryClient;
use wellness::keywords::KeywordTable;
use wellness::localization::init_localization;
use wellness::storage::WellnessStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting Wellness Telegram Bot");

    let config = BotConfig::from_env()?;
    init_localization()?;

    info!(max_connections = config.max_db_connections, "Connecting to database");
    let pool = db::connect(&config.database_url, config.max_db_connections).await?;
    db::init_database_schema(&pool).await?;
    let store: Arc<dyn WellnessStore> = Arc::new(PgStore::new(pool));

    let keywords = match &config.keywords_path {
        Some(path) => KeywordTable::builtin_with_file(path)?,
        None => KeywordTable::builtin().clone(),
    };

    let mut manager = DialogueManager::new(store, Arc::new(keywords));
    if let Some(analysis) = &config.analysis {
        info!(model = %analysis.model, "AI analysis enabled");
        manager = manager.with_analysis(
            Arc::new(HttpAnalysisGateway::new(analysis)?),
            analysis.breaker.clone(),
            Duration::from_secs(analysis.timeout_secs),
        );
    }
    if let Some(diary) = &config.diary {
        info!("Nutrition diary import enabled");
        manager = manager.with_diary(Arc::new(FatSecretDiaryClient::new(diary)?));
    }

    let bot = Bot::new(config.telegram_token);

    info!("Bot initialized, starting dispatcher");

    let handler = Update::filter_message().endpoint(bot::message_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![Arc::new(manager)])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
