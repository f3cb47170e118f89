//! HTTP host for the WhatsApp Cloud API webhook

pub mod payload;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::models::{FailureReason, InboundMessage, Outcome, Payload, ShopId};
use crate::services::pipeline_service::Pipeline;
use crate::services::response_service::ResponseComposer;
use crate::traits::{MediaSource, MessageSender};
use crate::utils::retry::RetryPolicy;
use payload::{MessageContent, WebhookMessage, WebhookPayload};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub composer: Arc<ResponseComposer>,
    pub sender: Arc<dyn MessageSender>,
    pub media: Arc<dyn MediaSource>,
    pub verify_token: String,
    pub retry: RetryPolicy,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify).post(receive))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Meta's subscription handshake
async fn verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);

    match (mode, token, params.get("hub.challenge")) {
        (Some("subscribe"), Some(token), Some(challenge)) if token == state.verify_token => {
            info!("✅ Webhook verified");
            (StatusCode::OK, challenge.clone())
        }
        _ => {
            warn!("Webhook verification failed (mode: {:?})", mode);
            (StatusCode::FORBIDDEN, "Forbidden".to_string())
        }
    }
}

/// Acknowledge at once; every message is handled in its own task
async fn receive(State(state): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    let payload = match serde_json::from_str::<WebhookPayload>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Unreadable webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({"status": "error"})));
        }
    };

    let messages = payload.messages();
    debug!("Webhook carried {} message(s)", messages.len());
    for message in messages {
        let state = state.clone();
        let message = message.clone();
        tokio::spawn(async move {
            handle_message(state, message).await;
        });
    }

    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn handle_message(state: AppState, message: WebhookMessage) {
    let Some(shop_id) = ShopId::from_phone(&message.from) else {
        warn!("Ignoring message {} from unusable sender {:?}", message.id, message.from);
        return;
    };
    let Some(content) = message.content() else {
        debug!("Ignoring {} message {}", message.kind, message.id);
        return;
    };

    let payload = match content {
        MessageContent::Text(body) => Payload::Text(body),
        MessageContent::Audio { media_id } => match download(&state, &media_id).await {
            Some(media) => Payload::Audio(media),
            None => return reply(&state, &shop_id, &Outcome::Failed(FailureReason::MediaDownload)).await,
        },
        MessageContent::Image { media_id } => match download(&state, &media_id).await {
            Some(media) => Payload::Image(media),
            None => return reply(&state, &shop_id, &Outcome::Failed(FailureReason::MediaDownload)).await,
        },
    };

    let inbound = InboundMessage {
        message_id: message.id.clone(),
        shop_id: shop_id.clone(),
        payload,
        received_at: message.sent_at().unwrap_or_else(Utc::now),
    };
    let outcome = state.pipeline.handle_inbound_message(&inbound).await;
    reply(&state, &shop_id, &outcome).await;
}

async fn download(state: &AppState, media_id: &str) -> Option<crate::models::Media> {
    match state
        .retry
        .run("media download", || state.media.fetch(media_id))
        .await
    {
        Ok(media) => Some(media),
        Err(e) => {
            warn!("Could not download media {}: {}", media_id, e);
            None
        }
    }
}

async fn reply(state: &AppState, shop_id: &ShopId, outcome: &Outcome) {
    let Some(text) = state.composer.compose(outcome) else {
        return;
    };
    if let Err(e) = state
        .retry
        .run("reply delivery", || state.sender.send(shop_id, &text))
        .await
    {
        error!("❌ Reply to shop {} lost: {}", shop_id, e);
    }
}
