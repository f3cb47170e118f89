//! Per-shop dialogue state: IDLE or AWAITING_CONFIRMATION.
//!
//! Expiry is checked against the clock whenever the state is read, so nothing
//! runs in the background.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::{
    CommitPath, ConversationContext, CorrectionReply, Transaction, TransactionDraft,
    TransactionKind,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub candidate: TransactionDraft,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Last auto-committed transaction, open to a quick "GASTO" / "NO" fix
#[derive(Debug, Clone, PartialEq)]
pub struct RecentCommit {
    pub transaction: Transaction,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingConfirmation(PendingConfirmation),
}

/// What to do with a fresh extraction
#[derive(Debug, PartialEq)]
pub enum Admission {
    Commit(TransactionDraft),
    Await { candidate: TransactionDraft, confidence: f64 },
}

/// What a correction reply asks for
#[derive(Debug, PartialEq)]
pub enum Resolution {
    Commit {
        draft: TransactionDraft,
        path: CommitPath,
        confidence: f64,
    },
    Discard {
        candidate: TransactionDraft,
    },
    /// Reverse a committed record; re-record it under `replacement` if given
    Amend {
        original: Transaction,
        replacement: Option<TransactionKind>,
    },
    NothingPending,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    state: ConversationState,
    recent_commit: Option<RecentCommit>,
    timeout: Duration,
}

impl Conversation {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: ConversationState::Idle,
            recent_commit: None,
            timeout,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Drop whatever has timed out, then describe what is left
    pub fn context(&mut self, now: DateTime<Utc>) -> ConversationContext {
        let expired = matches!(
            &self.state,
            ConversationState::AwaitingConfirmation(pending) if now >= pending.expires_at
        );
        if expired {
            debug!("Pending confirmation expired before {}", now);
            self.state = ConversationState::Idle;
        }
        if self.recent_commit.as_ref().map_or(false, |r| now >= r.expires_at) {
            self.recent_commit = None;
        }

        ConversationContext {
            has_pending_confirmation: matches!(self.state, ConversationState::AwaitingConfirmation(_)),
            has_recent_commit: self.recent_commit.is_some(),
        }
    }

    /// Nothing pending and no correction window open at `now`; a dormant
    /// conversation behaves exactly like a new one
    pub fn is_dormant(&self, now: DateTime<Utc>) -> bool {
        let pending = matches!(
            &self.state,
            ConversationState::AwaitingConfirmation(pending) if now < pending.expires_at
        );
        let recent = self.recent_commit.as_ref().map_or(false, |r| now < r.expires_at);
        !pending && !recent
    }

    /// A new, unrelated message arrived: forget any stale candidate and the
    /// correction window. Returns the dropped candidate, if any.
    pub fn begin_fresh(&mut self) -> Option<TransactionDraft> {
        self.recent_commit = None;
        match std::mem::take(&mut self.state) {
            ConversationState::AwaitingConfirmation(pending) => Some(pending.candidate),
            ConversationState::Idle => None,
        }
    }

    /// IDLE + extraction: commit when confident enough, otherwise wait for the owner
    pub fn admit(
        &mut self,
        candidate: TransactionDraft,
        confidence: f64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Admission {
        if confidence >= threshold {
            Admission::Commit(candidate)
        } else {
            self.park(candidate.clone(), confidence, now);
            Admission::Await {
                candidate,
                confidence,
            }
        }
    }

    /// Put a candidate (back) into AWAITING_CONFIRMATION
    pub fn park(&mut self, candidate: TransactionDraft, confidence: f64, now: DateTime<Utc>) {
        self.recent_commit = None;
        self.state = ConversationState::AwaitingConfirmation(PendingConfirmation {
            candidate,
            confidence,
            created_at: now,
            expires_at: now + self.timeout,
        });
    }

    /// Open the correction window for a just-committed transaction
    pub fn record_commit(&mut self, transaction: Transaction, now: DateTime<Utc>) {
        self.state = ConversationState::Idle;
        self.recent_commit = Some(RecentCommit {
            transaction,
            expires_at: now + self.timeout,
        });
    }

    /// Apply a correction reply. Leaves the conversation IDLE.
    pub fn resolve(&mut self, reply: CorrectionReply) -> Resolution {
        match std::mem::take(&mut self.state) {
            ConversationState::AwaitingConfirmation(pending) => {
                self.recent_commit = None;
                let PendingConfirmation {
                    candidate,
                    confidence,
                    ..
                } = pending;
                match reply {
                    CorrectionReply::Affirm => Resolution::Commit {
                        draft: candidate,
                        path: CommitPath::Confirmed,
                        confidence,
                    },
                    CorrectionReply::Kind(kind) => {
                        let path = if kind == candidate.kind {
                            CommitPath::Confirmed
                        } else {
                            CommitPath::KindCorrected
                        };
                        Resolution::Commit {
                            draft: TransactionDraft { kind, ..candidate },
                            path,
                            confidence,
                        }
                    }
                    CorrectionReply::Reject => Resolution::Discard { candidate },
                }
            }
            ConversationState::Idle => match (self.recent_commit.take(), reply) {
                (Some(recent), CorrectionReply::Reject) => Resolution::Amend {
                    original: recent.transaction,
                    replacement: None,
                },
                (Some(recent), CorrectionReply::Kind(kind)) if kind != recent.transaction.kind => {
                    Resolution::Amend {
                        original: recent.transaction,
                        replacement: Some(kind),
                    }
                }
                // same kind or a plain "sí": nothing to change, keep the window open
                (Some(recent), _) => {
                    self.recent_commit = Some(recent);
                    Resolution::NothingPending
                }
                (None, _) => Resolution::NothingPending,
            },
        }
    }
}
