//! codeglass entry point: load configuration, wire the pipeline, poll Telegram.

mod config;

use std::sync::Arc;

use {
    anyhow::Context,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    codeglass_chat::Orchestrator,
    codeglass_completion::DeepSeekClient,
    codeglass_ocr::TesseractExtractor,
    codeglass_telegram::{Dispatcher, TelegramDelivery, build_bot, start_polling},
    codeglass_transcripts::TranscriptStore,
};

use crate::config::Config;

fn init_telemetry(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_telemetry(config.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "codeglass starting");

    tokio::fs::create_dir_all(&config.sessions_dir)
        .await
        .context("create sessions directory")?;

    // Probe the OCR engine off the startup path. Image messages that arrive
    // before it is ready fail per message instead of blocking the bot.
    let extractor = Arc::new(TesseractExtractor::new(config.ocr_languages));
    {
        let extractor = Arc::clone(&extractor);
        tokio::spawn(async move {
            if let Err(error) = extractor.initialize().await {
                warn!(%error, "ocr engine unavailable, screenshots cannot be read");
            }
        });
    }

    let completion = Arc::new(DeepSeekClient::with_endpoint(
        config.deepseek_api_key,
        config.api_base,
        config.model,
    ));

    let bot = build_bot(&config.telegram_token)?;
    let store = TranscriptStore::new(config.sessions_dir);
    let delivery = Arc::new(TelegramDelivery::new(bot.clone()));
    let orchestrator = Arc::new(Orchestrator::new(store, completion, delivery));
    let dispatcher = Arc::new(Dispatcher::new(bot.clone(), orchestrator, extractor));

    let cancel = start_polling(bot, dispatcher).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();

    Ok(())
}
