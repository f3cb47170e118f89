use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod models;
mod services;
mod traits;
mod utils;
mod webhook;

use api::openai::OpenAiClient;
use api::whatsapp::{WhatsAppClient, WhatsAppCredentials};
use config::Settings;
use services::intent_service::IntentClassifier;
use services::ledger_service::Ledger;
use services::pipeline_service::Pipeline;
use services::response_service::ResponseComposer;
use traits::{StructuredExtractor, TransactionStore};
use utils::clock::SystemClock;
use webhook::AppState;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("lanabot=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap()))
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("🤖 Starting LanaBot...");
    info!("  _                        ____        _   ");
    info!(" | |    __ _ _ __   __ _  | __ )  ___ | |_ ");
    info!(" | |   / _` | '_ \\ / _` | |  _ \\ / _ \\| __|");
    info!(" | |__| (_| | | | | (_| | | |_) | (_) | |_ ");
    info!(" |_____\\__,_|_| |_|\\__,_| |____/ \\___/ \\__|");
    info!("  LanaBot v0.2.0 - Contabilidad por WhatsApp para tienditas");
    info!("");

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };
    let retry = settings.retry_policy();
    let clock = Arc::new(SystemClock);

    // Initialize store
    let store: Arc<dyn TransactionStore> = match &settings.database_url {
        Some(url) => {
            info!("Initializing database...");
            match db::init_db(url).await {
                Ok(pool) => {
                    info!("Database initialized successfully");
                    Arc::new(db::MySqlTransactionStore::new(pool))
                }
                Err(e) => {
                    error!("Failed to initialize database: {}", e);
                    return;
                }
            }
        }
        None => {
            warn!("DATABASE_URL not set, the ledger lives in memory and is lost on restart");
            Arc::new(db::MemoryStore::new())
        }
    };
    let ledger = Arc::new(Ledger::new(
        store,
        clock.clone(),
        retry,
        settings.burn_rate_window_days,
    ));

    let openai = settings
        .openai_api_key
        .clone()
        .map(|key| Arc::new(OpenAiClient::new(key)));
    if openai.is_none() {
        warn!("OPENAI_API_KEY not set, voice notes and ticket photos will not be read");
    }

    let classifier = IntentClassifier::new(
        openai.clone().map(|client| client as Arc<dyn StructuredExtractor>),
        retry,
        settings.model_confidence_threshold,
    );
    let mut pipeline = Pipeline::new(
        settings.pipeline_config(),
        classifier,
        ledger,
        clock,
        retry,
    );
    if let Some(client) = openai {
        pipeline = pipeline.with_speech(client.clone()).with_vision(client);
    }

    let credentials = match (&settings.meta_app_id, &settings.meta_app_secret) {
        (Some(app_id), Some(app_secret)) => Some(WhatsAppCredentials {
            app_id: app_id.clone(),
            app_secret: app_secret.clone(),
        }),
        _ => {
            warn!("META_APP_ID/META_APP_SECRET not set, an expired access token cannot be refreshed");
            None
        }
    };
    let whatsapp = Arc::new(WhatsAppClient::new(
        settings.meta_phone_number_id.clone(),
        settings.meta_access_token.clone(),
        credentials,
        settings.whatsapp_rate_limit_per_sec,
    ));

    let state = AppState {
        pipeline: Arc::new(pipeline),
        composer: Arc::new(ResponseComposer::new(
            settings.minimum_balance_alert,
            &settings.default_currency,
        )),
        sender: whatsapp.clone(),
        media: whatsapp,
        verify_token: settings.meta_webhook_verify_token.clone(),
        retry,
    };

    let address = settings.bind_address();
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", address, e);
            return;
        }
    };
    info!("🚀 Listening on {}", address);

    if let Err(e) = axum::serve(listener, webhook::router(state)).await {
        error!("Server error: {}", e);
    }
}
