//! Inbound message pipeline: text resolution, classification, extraction,
//! the per-shop conversation and the ledger, ending in one `Outcome`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::models::{
    ClarifyReason, CommitPath, ExtractionResult, FailureReason, InboundMessage, Intent, Outcome,
    Payload, ShopId, TransactionDraft,
};
use crate::services::conversation_service::{Admission, Conversation, Resolution};
use crate::services::extraction_service::{extract, extract_ticket};
use crate::services::intent_service::IntentClassifier;
use crate::services::ledger_service::Ledger;
use crate::traits::{ImageToText, SpeechToText};
use crate::utils::clock::Clock;
use crate::utils::dedup::MessageDeduplicator;
use crate::utils::errors::{ExtractionError, LedgerError};
use crate::utils::normalize::normalize;
use crate::utils::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Extractions at or above this confidence are committed without asking
    pub commit_threshold: f64,
    pub pending_timeout: chrono::Duration,
    pub currency: String,
    pub dedup_ttl: std::time::Duration,
    pub dedup_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_threshold: 0.8,
            pending_timeout: chrono::Duration::minutes(2),
            currency: "MXN".to_string(),
            dedup_ttl: std::time::Duration::from_secs(24 * 60 * 60),
            dedup_capacity: 10_000,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    classifier: IntentClassifier,
    ledger: Arc<Ledger>,
    speech: Option<Arc<dyn SpeechToText>>,
    vision: Option<Arc<dyn ImageToText>>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<ShopId, Arc<AsyncMutex<Conversation>>>>,
    dedup: MessageDeduplicator,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        classifier: IntentClassifier,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        let dedup = MessageDeduplicator::new(config.dedup_ttl, config.dedup_capacity);
        Self {
            config,
            classifier,
            ledger,
            speech: None,
            vision: None,
            retry,
            clock,
            sessions: Mutex::new(HashMap::new()),
            dedup,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechToText>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_vision(mut self, vision: Arc<dyn ImageToText>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Handle one webhook message end to end. Never panics and never errors:
    /// every failure is an `Outcome::Failed`.
    pub async fn handle_inbound_message(&self, message: &InboundMessage) -> Outcome {
        if !self.dedup.claim(&message.message_id) {
            debug!("Message {} already handled, skipping", message.message_id);
            return Outcome::Duplicate;
        }

        let outcome = self.process(message).await;
        if outcome.is_failure() {
            // let a redelivery try again
            self.dedup.release(&message.message_id);
        }

        info!(
            "📨 {} from shop {} ({:?}) -> {}",
            message.message_id,
            message.shop_id,
            message.payload.source(),
            outcome.label()
        );
        outcome
    }

    async fn process(&self, message: &InboundMessage) -> Outcome {
        // slow collaborator calls happen before the shop is locked
        let text = match self.resolve_text(&message.payload).await {
            Ok(text) => text,
            Err(reason) => return Outcome::Failed(reason),
        };
        let normalized = normalize(&text);
        if normalized.is_empty() {
            return Outcome::Clarify(ClarifyReason::EmptyMessage);
        }

        let now = self.clock.now();
        let session = self.session(&message.shop_id, now);
        let mut conversation = session.lock().await;

        if let Payload::Image(_) = message.payload {
            return self
                .handle_ticket(&mut conversation, message, &text, now)
                .await;
        }
        self.handle_utterance(&mut conversation, message, &normalized, now)
            .await
    }

    async fn resolve_text(&self, payload: &Payload) -> Result<String, FailureReason> {
        match payload {
            Payload::Text(body) => Ok(body.clone()),
            Payload::Audio(media) => {
                let Some(speech) = &self.speech else {
                    warn!("Voice note received but no speech-to-text is configured");
                    return Err(FailureReason::Transcription);
                };
                self.retry
                    .run("transcription", || speech.transcribe(media))
                    .await
                    .map_err(|e| {
                        warn!("Transcription failed: {}", e);
                        FailureReason::Transcription
                    })
            }
            Payload::Image(media) => {
                let Some(vision) = &self.vision else {
                    warn!("Ticket photo received but no image reader is configured");
                    return Err(FailureReason::Vision);
                };
                self.retry
                    .run("ticket reading", || vision.read_text(media))
                    .await
                    .map_err(|e| {
                        warn!("Ticket reading failed: {}", e);
                        FailureReason::Vision
                    })
            }
        }
    }

    async fn handle_utterance(
        &self,
        conversation: &mut Conversation,
        message: &InboundMessage,
        normalized: &str,
        now: DateTime<Utc>,
    ) -> Outcome {
        let context = conversation.context(now);
        let classification = match self.classifier.classify(normalized, &context).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!("Intent classification failed for {}: {}", message.message_id, e);
                return Outcome::Failed(FailureReason::ExtractionService);
            }
        };
        debug!(
            "Classified {:?} as {} ({:.2})",
            normalized,
            classification.intent.name(),
            classification.confidence
        );

        if !matches!(classification.intent, Intent::Correction(_)) {
            if let Some(stale) = conversation.begin_fresh() {
                debug!(
                    "Dropped unconfirmed {} of {} for shop {}",
                    stale.kind, stale.amount, message.shop_id
                );
            }
        }

        match classification.intent {
            Intent::Correction(reply) => match conversation.resolve(reply) {
                Resolution::Commit {
                    draft,
                    path,
                    confidence,
                } => self.commit(conversation, draft, path, confidence).await,
                Resolution::Discard { candidate } => Outcome::Discarded { candidate },
                Resolution::Amend {
                    original,
                    replacement,
                } => match self.ledger.append_correction(&original, replacement).await {
                    Ok((reversal, replacement)) => Outcome::Corrected {
                        account: self.account_after_write(&message.shop_id).await,
                        reversal,
                        replacement,
                    },
                    Err(e) => {
                        warn!("Could not correct {}: {}", original.id, e);
                        conversation.record_commit(original, self.clock.now());
                        Outcome::Failed(FailureReason::StoreUnavailable {
                            pending_kept: false,
                        })
                    }
                },
                Resolution::NothingPending => Outcome::Clarify(ClarifyReason::NothingPending),
            },
            Intent::BalanceQuery => match self.ledger.balance(&message.shop_id).await {
                Ok(account) => Outcome::Balance { account },
                Err(e) => {
                    warn!("Balance read failed for shop {}: {}", message.shop_id, e);
                    Outcome::Failed(FailureReason::StoreUnavailable {
                        pending_kept: false,
                    })
                }
            },
            Intent::Search { keyword, kind } => {
                match self.ledger.search(&message.shop_id, &keyword, kind).await {
                    Ok(transactions) => Outcome::SearchResults {
                        keyword,
                        kind,
                        transactions,
                    },
                    Err(e) => {
                        warn!("Search failed for shop {}: {}", message.shop_id, e);
                        Outcome::Failed(FailureReason::StoreUnavailable {
                            pending_kept: false,
                        })
                    }
                }
            }
            Intent::Greeting => Outcome::Greeting,
            Intent::Unknown => Outcome::Clarify(ClarifyReason::UnknownIntent),
            intent @ (Intent::Sale | Intent::Expense | Intent::CashAdjustment) => {
                let extraction = match extract(&intent, normalized) {
                    Ok(extraction) => extraction,
                    Err(ExtractionError::NoAmountFound) => {
                        return Outcome::Clarify(ClarifyReason::NoAmount)
                    }
                    Err(ExtractionError::NotTransactional) => {
                        return Outcome::Clarify(ClarifyReason::UnknownIntent)
                    }
                };
                let confidence = extraction.confidence.min(classification.confidence);
                self.admit(conversation, message, extraction, confidence, false, now)
                    .await
            }
        }
    }

    async fn handle_ticket(
        &self,
        conversation: &mut Conversation,
        message: &InboundMessage,
        ocr_text: &str,
        now: DateTime<Utc>,
    ) -> Outcome {
        conversation.context(now);
        conversation.begin_fresh();

        match extract_ticket(ocr_text) {
            Ok(extraction) => {
                let confidence = extraction.confidence;
                self.admit(conversation, message, extraction, confidence, true, now)
                    .await
            }
            Err(_) => Outcome::Clarify(ClarifyReason::UnreadableTicket),
        }
    }

    async fn admit(
        &self,
        conversation: &mut Conversation,
        message: &InboundMessage,
        extraction: ExtractionResult,
        confidence: f64,
        from_ticket: bool,
        now: DateTime<Utc>,
    ) -> Outcome {
        let draft = TransactionDraft::new(
            message.shop_id.clone(),
            extraction.kind,
            extraction.amount,
            extraction.description,
        )
        .with_currency(&self.config.currency)
        .with_source(Some(message.message_id.clone()));

        match conversation.admit(draft, confidence, self.config.commit_threshold, now) {
            Admission::Commit(draft) => {
                self.commit(conversation, draft, CommitPath::Direct, confidence)
                    .await
            }
            Admission::Await {
                candidate,
                confidence,
            } => Outcome::AwaitingConfirmation {
                candidate,
                confidence,
                from_ticket,
            },
        }
    }

    async fn commit(
        &self,
        conversation: &mut Conversation,
        draft: TransactionDraft,
        path: CommitPath,
        confidence: f64,
    ) -> Outcome {
        match self.ledger.append(draft.clone()).await {
            Ok(transaction) => {
                conversation.record_commit(transaction.clone(), self.clock.now());
                Outcome::Committed {
                    account: self.account_after_write(&transaction.shop_id).await,
                    transaction,
                    path,
                }
            }
            Err(LedgerError::Rejected(reason)) => {
                warn!("Ledger rejected {} of {}: {}", draft.kind, draft.amount, reason);
                Outcome::Clarify(ClarifyReason::NoAmount)
            }
            Err(e) => {
                warn!("Commit failed for shop {}: {}", draft.shop_id, e);
                // a confirmed candidate goes back to waiting so "sí" can retry it
                let pending_kept = path != CommitPath::Direct;
                if pending_kept {
                    conversation.park(draft, confidence, self.clock.now());
                }
                Outcome::Failed(FailureReason::StoreUnavailable { pending_kept })
            }
        }
    }

    /// The write already happened; a failed read only costs the balance lines
    async fn account_after_write(&self, shop_id: &ShopId) -> Option<crate::models::ShopAccount> {
        match self.ledger.balance(shop_id).await {
            Ok(account) => Some(account),
            Err(e) => {
                warn!("Balance read after write failed for shop {}: {}", shop_id, e);
                None
            }
        }
    }

    /// The shop's conversation. Dormant conversations nobody holds are
    /// dropped on the way, so the map only keeps shops mid-dialogue.
    fn session(&self, shop_id: &ShopId, now: DateTime<Utc>) -> Arc<AsyncMutex<Conversation>> {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.retain(|_, session| {
            Arc::strong_count(session) > 1
                || session
                    .try_lock()
                    .map_or(true, |conversation| !conversation.is_dormant(now))
        });
        sessions
            .entry(shop_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Conversation::new(self.config.pending_timeout))))
            .clone()
    }
}
