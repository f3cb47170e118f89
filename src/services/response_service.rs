//! Turns pipeline outcomes into the Spanish replies sent back over WhatsApp.

use rust_decimal::Decimal;

use crate::models::{
    ClarifyReason, CommitPath, FailureReason, Outcome, ShopAccount, Transaction, TransactionDraft,
    TransactionKind,
};
use crate::utils::table::Table;

const UNKNOWN_INTENT: &str = "No pude entender si es una venta o gasto. ¿Puedes ser más específico? Por ejemplo: 'Vendí 3 refrescos a 10 pesos' 🤔";
const GENERIC_FAILURE: &str = "¡Órale! Algo salió mal por acá. Intenta de nuevo en un ratito 🤖";
const BALANCE_UNAVAILABLE: &str = "(No pude leer tu saldo ahorita. Escribe 'saldo' en un ratito 📊)";

/// Advice appended to balance summaries, checked in this order
#[derive(Debug, Clone, PartialEq)]
pub enum Tip {
    Urgent(Decimal),
    Negative,
    LowBalance(Decimal),
    Caution(Decimal),
    Encouragement,
}

impl Tip {
    pub fn is_warning(&self) -> bool {
        !matches!(self, Tip::Encouragement)
    }
}

#[derive(Debug, Clone)]
pub struct ResponseComposer {
    minimum_balance_alert: Decimal,
    currency: String,
}

impl ResponseComposer {
    pub fn new(minimum_balance_alert: Decimal, currency: &str) -> Self {
        Self {
            minimum_balance_alert,
            currency: currency.to_string(),
        }
    }

    /// Reply text for an outcome. `None` only for duplicates, which get no reply.
    pub fn compose(&self, outcome: &Outcome) -> Option<String> {
        let text = match outcome {
            Outcome::Committed {
                transaction,
                account,
                path,
            } => self.committed(transaction, account.as_ref(), *path),
            Outcome::AwaitingConfirmation {
                candidate,
                from_ticket,
                ..
            } => self.awaiting(candidate, *from_ticket),
            Outcome::Corrected {
                reversal,
                replacement,
                account,
            } => self.corrected(reversal, replacement.as_ref(), account.as_ref()),
            Outcome::Discarded { candidate } => format!(
                "👌 Listo, no registré nada ({} de {}).",
                candidate.kind.label(),
                money(candidate.amount)
            ),
            Outcome::Balance { account } => self.balance(account),
            Outcome::SearchResults {
                keyword,
                kind,
                transactions,
            } => self.search_results(keyword, *kind, transactions),
            Outcome::Greeting => greeting(),
            Outcome::Clarify(reason) => clarify(*reason).to_string(),
            Outcome::Failed(reason) => failure(*reason).to_string(),
            Outcome::Duplicate => return None,
        };
        Some(text)
    }

    pub fn tip(&self, account: &ShopAccount) -> Tip {
        let runway = account.runway_days();
        match runway {
            Some(days) if days < Decimal::from(2) => Tip::Urgent(days),
            _ if account.balance < Decimal::ZERO => Tip::Negative,
            _ if account.balance < self.minimum_balance_alert => Tip::LowBalance(account.balance),
            Some(days) if days < Decimal::from(7) => Tip::Caution(days),
            _ => Tip::Encouragement,
        }
    }

    fn committed(&self, transaction: &Transaction, account: Option<&ShopAccount>, path: CommitPath) -> String {
        let headline = match path {
            CommitPath::KindCorrected => "✅ Corregido y registrado:",
            CommitPath::Direct | CommitPath::Confirmed => "✅ Registré",
        };
        let mut text = format!(
            "{} {} de {} ({})",
            headline,
            transaction.kind.label(),
            money(transaction.amount),
            transaction.description
        );

        match account {
            Some(account) => {
                text.push_str("\n\n");
                text.push_str(&self.balance_lines(account));
                let tip = self.tip(account);
                if tip.is_warning() {
                    text.push_str("\n\n");
                    text.push_str(&render_tip(&tip));
                }
            }
            None => {
                text.push_str("\n\n");
                text.push_str(BALANCE_UNAVAILABLE);
            }
        }

        text.push_str(&format!(
            "\n\n❌ ¿Está mal? Responde {} para corregir",
            opposite(transaction.kind)
        ));
        text
    }

    fn awaiting(&self, candidate: &TransactionDraft, from_ticket: bool) -> String {
        if from_ticket {
            return format!(
                "📊 Leí {} en el ticket ({})\n\n¿Es una VENTA o un GASTO?\nResponde: VENTA o GASTO",
                money(candidate.amount),
                candidate.description
            );
        }
        format!(
            "🤔 Entendí {} de {} ({})\n\n¿Es correcto? Responde SÍ para registrarlo, {} para cambiarlo o NO para cancelar",
            candidate.kind.label(),
            money(candidate.amount),
            candidate.description,
            opposite(candidate.kind)
        )
    }

    fn corrected(
        &self,
        reversal: &Transaction,
        replacement: Option<&Transaction>,
        account: Option<&ShopAccount>,
    ) -> String {
        let mut text = match replacement {
            Some(replacement) => format!(
                "✅ Corregido a {} de {} ({})",
                replacement.kind.label(),
                money(replacement.amount),
                replacement.description
            ),
            None => format!(
                "↩️ Cancelé {} de {} ({})",
                reversal.kind.label(),
                money(reversal.amount),
                reversal.description.trim_start_matches("corrección: ")
            ),
        };
        text.push_str("\n\n");
        match account {
            Some(account) => text.push_str(&self.balance_lines(account)),
            None => text.push_str(BALANCE_UNAVAILABLE),
        }
        text
    }

    fn balance(&self, account: &ShopAccount) -> String {
        let mut text = String::from("📊 Así van tus cuentas:\n\n");
        text.push_str(&self.balance_lines(account));
        if let Some(days) = account.runway_days() {
            text.push_str(&format!(
                "\n🔥 Gasto diario promedio: {}\n⏳ Te alcanza para {} días",
                money(account.burn_rate),
                days
            ));
        }
        text.push_str("\n\n");
        text.push_str(&render_tip(&self.tip(account)));
        text
    }

    pub fn balance_lines(&self, account: &ShopAccount) -> String {
        format!(
            "💰 Saldo actual: {} {}\n📈 Total ventas: {}\n📉 Total gastos: {}\n🔄 Total ajustes: {}",
            money(account.balance),
            self.currency,
            money(account.total_sales),
            money(account.total_expenses),
            money(account.total_adjustments)
        )
    }

    fn search_results(
        &self,
        keyword: &str,
        kind: Option<TransactionKind>,
        transactions: &[Transaction],
    ) -> String {
        let filter = match kind {
            Some(TransactionKind::Sale) => " (solo ventas)",
            Some(TransactionKind::Expense) => " (solo gastos)",
            Some(_) => " (solo caja)",
            None => "",
        };
        if transactions.is_empty() {
            return format!(
                "🔍 No encontré movimientos de '{}'{}. Prueba con otra palabra 🤔",
                keyword, filter
            );
        }

        let mut table = Table::new(&["Fecha", "Descripción", "Monto"]);
        let mut total = Decimal::ZERO;
        for transaction in transactions {
            total += transaction.signed_amount();
            table.add_row(vec![
                transaction.created_at.format("%d/%m").to_string(),
                transaction.description.clone(),
                format!("{:.2}", transaction.signed_amount()),
            ]);
        }

        format!(
            "🔍 Encontré {} movimiento{} de '{}'{}:\n\n{}\n\nNeto: {} {}",
            transactions.len(),
            if transactions.len() == 1 { "" } else { "s" },
            keyword,
            filter,
            table.render(),
            money(total),
            self.currency
        )
    }
}

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

fn opposite(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Sale => "GASTO",
        TransactionKind::Expense => "VENTA",
        TransactionKind::CashIn | TransactionKind::CashOut => "VENTA o GASTO",
    }
}

fn render_tip(tip: &Tip) -> String {
    match tip {
        Tip::Urgent(days) => format!(
            "🔥 ¡Ojo! Al ritmo de tus gastos te alcanza para {} días. Junta efectivo o frena las compras.",
            days
        ),
        Tip::Negative => {
            "⚠️ Tu saldo está en negativo. Revisa si te faltó registrar alguna venta.".to_string()
        }
        Tip::LowBalance(balance) => format!(
            "🚨 ¡Aguas! Tu saldo está muy bajo: {}. Considera hacer más ventas o reducir gastos.",
            money(*balance)
        ),
        Tip::Caution(days) => format!(
            "⏳ Te alcanza para unos {} días. Cuida los gastos esta semana.",
            days
        ),
        Tip::Encouragement => {
            "💪 ¡Vas bien! Sigue registrando todo para conocer mejor tu negocio.".to_string()
        }
    }
}

fn greeting() -> String {
    "¡Hola! 👋 Soy Lana, tu asistente de cuentas.\n\n\
     Mándame tus ventas y gastos por texto, audio o foto del ticket:\n\
     • \"Vendí 3 refrescos a 15\"\n\
     • \"Compré mercancía por 200\"\n\
     • \"Saldo\" para ver cómo vas"
        .to_string()
}

fn clarify(reason: ClarifyReason) -> &'static str {
    match reason {
        ClarifyReason::NoAmount => {
            "¿De cuánto fue? No vi el monto 🤔 Por ejemplo: 'Vendí 3 refrescos a 10 pesos'"
        }
        ClarifyReason::UnknownIntent => UNKNOWN_INTENT,
        ClarifyReason::EmptyMessage => {
            "No recibí nada que leer 🤔 Mándame tu venta o gasto, por ejemplo: 'Vendí 3 refrescos a 10 pesos'"
        }
        ClarifyReason::NothingPending => "No hay transacciones pendientes de corrección 🤔",
        ClarifyReason::UnreadableTicket => {
            "No pude encontrar información de compra en esta imagen. ¿Puedes tomar otra foto del ticket? 🧾"
        }
    }
}

fn failure(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::Transcription => {
            "¡Órale! No pude entender el audio. ¿Puedes intentar de nuevo o escribir tu mensaje? 🎤"
        }
        FailureReason::Vision => "¡Órale! No pude leer el ticket. ¿Puedes tomar otra foto más clara? 📸",
        FailureReason::MediaDownload => {
            "¡Órale! No pude descargar tu archivo. ¿Puedes intentar de nuevo? 📎"
        }
        FailureReason::ExtractionService => GENERIC_FAILURE,
        FailureReason::StoreUnavailable { pending_kept: true } => {
            "¡Órale! No pude guardar el movimiento. Responde SÍ en un ratito para intentarlo de nuevo 💾"
        }
        FailureReason::StoreUnavailable { pending_kept: false } => GENERIC_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShopId;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;
    use uuid::Uuid;

    fn composer() -> ResponseComposer {
        ResponseComposer::new(Decimal::from(500), "MXN")
    }

    fn shop() -> ShopId {
        ShopId::from_phone("5215512345678").unwrap()
    }

    fn account(balance: &str, burn_rate: &str) -> ShopAccount {
        ShopAccount {
            balance: Decimal::from_str(balance).unwrap(),
            burn_rate: Decimal::from_str(burn_rate).unwrap(),
            ..ShopAccount::empty(shop())
        }
    }

    fn record(kind: TransactionKind, amount: i64, description: &str) -> Transaction {
        let draft = TransactionDraft::new(shop(), kind, Decimal::from(amount), description);
        Transaction::from_draft(
            draft,
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap(),
        )
    }

    fn stated_balance(text: &str) -> Decimal {
        let start = text.find("Saldo actual: $").unwrap() + "Saldo actual: $".len();
        let rest = &text[start..];
        let end = rest.find(" MXN").unwrap();
        Decimal::from_str(&rest[..end]).unwrap()
    }

    #[test]
    fn test_balance_reply_states_exact_figure() {
        for figure in ["845", "0", "-120.5", "1234567.89"] {
            let account = account(figure, "0");
            let text = composer().compose(&Outcome::Balance { account }).unwrap();
            assert_eq!(stated_balance(&text), Decimal::from_str(figure).unwrap());
        }
    }

    #[test]
    fn test_commit_reply_offers_correction() {
        let transaction = record(TransactionKind::Sale, 45, "3 coca colas");
        let text = composer()
            .compose(&Outcome::Committed {
                transaction,
                account: Some(account("845", "0")),
                path: CommitPath::Direct,
            })
            .unwrap();
        assert!(text.starts_with("✅ Registré VENTA de $45.00 (3 coca colas)"));
        assert_eq!(stated_balance(&text), Decimal::from(845));
        assert!(text.ends_with("Responde GASTO para corregir"));
    }

    #[test]
    fn test_commit_reply_without_balance() {
        let transaction = record(TransactionKind::Expense, 200, "mercancía");
        let text = composer()
            .compose(&Outcome::Committed {
                transaction,
                account: None,
                path: CommitPath::Confirmed,
            })
            .unwrap();
        assert!(text.contains(BALANCE_UNAVAILABLE));
        assert!(!text.contains("Saldo actual"));
    }

    #[test]
    fn test_tip_order() {
        let composer = composer();
        // 150 / 100 = 1.5 days: urgent wins over low balance
        assert_eq!(composer.tip(&account("150", "100")), Tip::Urgent(Decimal::from_str("1.5").unwrap()));
        assert_eq!(composer.tip(&account("-20", "0")), Tip::Negative);
        assert_eq!(composer.tip(&account("300", "0")), Tip::LowBalance(Decimal::from(300)));
        assert_eq!(composer.tip(&account("1000", "200")), Tip::Caution(Decimal::from(5)));
        assert_eq!(composer.tip(&account("5000", "100")), Tip::Encouragement);
        assert_eq!(composer.tip(&account("800", "0")), Tip::Encouragement);
    }

    #[test]
    fn test_low_balance_alert_text() {
        let text = composer()
            .compose(&Outcome::Balance {
                account: account("320", "0"),
            })
            .unwrap();
        assert!(text.contains("🚨 ¡Aguas! Tu saldo está muy bajo: $320.00."));
    }

    #[test]
    fn test_search_results_table() {
        let transactions = vec![
            record(TransactionKind::Expense, 120, "coca cola caja"),
            record(TransactionKind::Sale, 30, "coca colas"),
        ];
        let text = composer()
            .compose(&Outcome::SearchResults {
                keyword: "coca".to_string(),
                kind: None,
                transactions,
            })
            .unwrap();
        assert!(text.contains("Encontré 2 movimientos de 'coca'"));
        assert!(text.contains("```"));
        assert!(text.contains("-120.00"));
        assert!(text.contains("Neto: $-90.00 MXN"));
    }

    #[test]
    fn test_every_outcome_gets_text_except_duplicates() {
        let candidate = TransactionDraft::new(shop(), TransactionKind::Expense, Decimal::from(75), "ticket oxxo");
        let committed = record(TransactionKind::Sale, 10, "chicles");
        let reversal = Transaction::from_draft(committed.reversal_draft(), Uuid::new_v4(), committed.created_at);
        let outcomes = vec![
            Outcome::AwaitingConfirmation {
                candidate: candidate.clone(),
                confidence: 0.5,
                from_ticket: true,
            },
            Outcome::AwaitingConfirmation {
                candidate: candidate.clone(),
                confidence: 0.4,
                from_ticket: false,
            },
            Outcome::Corrected {
                reversal,
                replacement: None,
                account: None,
            },
            Outcome::Discarded { candidate },
            Outcome::SearchResults {
                keyword: "pan".to_string(),
                kind: Some(TransactionKind::Sale),
                transactions: Vec::new(),
            },
            Outcome::Greeting,
            Outcome::Clarify(ClarifyReason::NoAmount),
            Outcome::Clarify(ClarifyReason::UnknownIntent),
            Outcome::Clarify(ClarifyReason::EmptyMessage),
            Outcome::Clarify(ClarifyReason::NothingPending),
            Outcome::Clarify(ClarifyReason::UnreadableTicket),
            Outcome::Failed(FailureReason::Transcription),
            Outcome::Failed(FailureReason::Vision),
            Outcome::Failed(FailureReason::MediaDownload),
            Outcome::Failed(FailureReason::ExtractionService),
            Outcome::Failed(FailureReason::StoreUnavailable { pending_kept: true }),
        ];
        for outcome in &outcomes {
            let text = composer().compose(outcome);
            assert!(text.map_or(false, |t| !t.is_empty()), "{} has no reply", outcome.label());
        }
        assert_eq!(composer().compose(&Outcome::Duplicate), None);
    }

    #[test]
    fn test_ticket_confirmation_asks_for_kind() {
        let candidate = TransactionDraft::new(shop(), TransactionKind::Expense, Decimal::from(75), "ticket oxxo");
        let text = composer()
            .compose(&Outcome::AwaitingConfirmation {
                candidate,
                confidence: 0.5,
                from_ticket: true,
            })
            .unwrap();
        assert!(text.starts_with("📊 Leí $75.00 en el ticket (ticket oxxo)"));
        assert!(text.contains("Responde: VENTA o GASTO"));
    }
}
