use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::{Classification, ConversationContext, CorrectionReply, Intent, ModelGuess};
use crate::services::vocabulary::{
    self, contains_any, find_phrase, BALANCE_KEYWORDS, CASH_IN_VERBS, CASH_OUT_VERBS,
    EXPENSE_VERBS, GREETING_KEYWORDS, SALE_VERBS, SEARCH_CONNECTORS, SEARCH_PHRASES,
};
use crate::traits::StructuredExtractor;
use crate::utils::errors::ExtractionServiceError;
use crate::utils::normalize::{fold_accents, has_digit};
use crate::utils::retry::RetryPolicy;

type Rule = fn(&str, &str, &ConversationContext) -> Option<Intent>;

/// Checked top to bottom; the first rule that returns an intent wins.
/// Each rule gets the normalized text, its accent-folded twin and the context.
const RULES: &[(&str, Rule)] = &[
    ("pending_reply", pending_reply),
    ("recent_commit_reply", recent_commit_reply),
    ("search", search),
    ("balance", balance),
    ("greeting", greeting),
    ("transaction_verb", transaction_verb),
];

pub struct IntentClassifier {
    fallback: Option<Arc<dyn StructuredExtractor>>,
    retry: RetryPolicy,
    model_threshold: f64,
}

impl IntentClassifier {
    pub fn new(
        fallback: Option<Arc<dyn StructuredExtractor>>,
        retry: RetryPolicy,
        model_threshold: f64,
    ) -> Self {
        Self {
            fallback,
            retry,
            model_threshold,
        }
    }

    /// Rules first, then the model. Only a failing model call is an error.
    pub async fn classify(
        &self,
        normalized: &str,
        context: &ConversationContext,
    ) -> Result<Classification, ExtractionServiceError> {
        if let Some(intent) = classify_by_rules(normalized, context) {
            return Ok(Classification::by_rule(intent));
        }

        let Some(fallback) = &self.fallback else {
            debug!("No rule matched and no model configured: {:?}", normalized);
            return Ok(Classification {
                intent: Intent::Unknown,
                confidence: 0.0,
            });
        };

        let guess = self
            .retry
            .run("intent guess", || fallback.guess_intent(normalized, context))
            .await?;

        let classification = self.interpret(guess, normalized);
        debug!(
            "Model classified {:?} as {} ({:.2})",
            normalized,
            classification.intent.name(),
            classification.confidence
        );
        Ok(classification)
    }

    fn interpret(&self, guess: ModelGuess, normalized: &str) -> Classification {
        if !(0.0..=1.0).contains(&guess.confidence) {
            warn!("Model confidence out of range: {}", guess.confidence);
        }
        let confidence = guess.confidence.clamp(0.0, 1.0);
        if confidence < self.model_threshold {
            return Classification {
                intent: Intent::Unknown,
                confidence,
            };
        }

        let intent = match guess.intent.trim().to_uppercase().as_str() {
            "SALE" => Intent::Sale,
            "EXPENSE" => Intent::Expense,
            "CASH_ADJUSTMENT" => Intent::CashAdjustment,
            "BALANCE_QUERY" => Intent::BalanceQuery,
            "GREETING" => Intent::Greeting,
            "SEARCH" => match guess.keyword.as_deref().map(str::trim) {
                Some(keyword) if !keyword.is_empty() => Intent::Search {
                    keyword: keyword.to_lowercase(),
                    kind: None,
                },
                _ => Intent::Unknown,
            },
            _ => Intent::Unknown,
        };

        // A transaction without a number cannot be extracted anyway
        let intent = if intent.is_transactional() && !has_digit(normalized) {
            Intent::Unknown
        } else {
            intent
        };

        Classification { intent, confidence }
    }
}

/// Deterministic part of classification; `None` means "ask the model"
pub fn classify_by_rules(normalized: &str, context: &ConversationContext) -> Option<Intent> {
    let folded = fold_accents(normalized);
    RULES.iter().find_map(|(name, rule)| {
        let intent = rule(normalized, &folded, context)?;
        debug!("Rule {} matched: {}", name, intent.name());
        Some(intent)
    })
}

fn pending_reply(_: &str, folded: &str, context: &ConversationContext) -> Option<Intent> {
    if !context.has_pending_confirmation {
        return None;
    }
    vocabulary::reply_token(folded).map(Intent::Correction)
}

fn recent_commit_reply(_: &str, folded: &str, context: &ConversationContext) -> Option<Intent> {
    if context.has_pending_confirmation || !context.has_recent_commit {
        return None;
    }
    match vocabulary::reply_token(folded)? {
        CorrectionReply::Affirm => None,
        reply => Some(Intent::Correction(reply)),
    }
}

fn search(normalized: &str, folded: &str, _: &ConversationContext) -> Option<Intent> {
    SEARCH_PHRASES.iter().find_map(|(phrase, kind)| {
        let end = find_phrase(folded, phrase)?;
        // folding keeps one char per char, so char offsets line up
        let end_chars = folded[..end].chars().count();
        let rest: String = normalized.chars().skip(end_chars).collect();

        let words: Vec<&str> = rest.split_whitespace().collect();
        let start = words
            .iter()
            .position(|w| !SEARCH_CONNECTORS.contains(&fold_accents(w).as_str()))?;
        let keyword = words[start..].join(" ");

        Some(Intent::Search {
            keyword,
            kind: *kind,
        })
    })
}

fn balance(_: &str, folded: &str, _: &ConversationContext) -> Option<Intent> {
    (!has_digit(folded) && contains_any(folded, BALANCE_KEYWORDS)).then_some(Intent::BalanceQuery)
}

fn greeting(_: &str, folded: &str, _: &ConversationContext) -> Option<Intent> {
    (!has_digit(folded) && contains_any(folded, GREETING_KEYWORDS)).then_some(Intent::Greeting)
}

fn transaction_verb(_: &str, folded: &str, _: &ConversationContext) -> Option<Intent> {
    if !has_digit(folded) {
        return None;
    }

    let sale = contains_any(folded, SALE_VERBS);
    let expense = contains_any(folded, EXPENSE_VERBS);
    let cash = contains_any(folded, CASH_IN_VERBS) || contains_any(folded, CASH_OUT_VERBS);

    match (sale, expense, cash) {
        (true, false, false) => Some(Intent::Sale),
        (false, true, false) => Some(Intent::Expense),
        (false, false, true) => Some(Intent::CashAdjustment),
        _ => None,
    }
}
