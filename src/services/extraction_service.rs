use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::transaction::MAX_AMOUNT;
use crate::models::{ExtractionResult, Intent, TransactionKind};
use crate::services::vocabulary::{
    contains_any, find_phrase, is_verb_word, CASH_OUT_VERBS, KNOWN_CHAINS, OPENING_WORDS,
    STOPWORDS,
};
use crate::utils::errors::ExtractionError;
use crate::utils::normalize::{fold_accents, normalize, truncate_chars};

pub const SINGLE_AMOUNT_CONFIDENCE: f64 = 0.95;
pub const PER_UNIT_CONFIDENCE: f64 = 0.9;
pub const BARE_PATTERN_CONFIDENCE: f64 = 0.85;
pub const GUESSED_AMOUNT_CONFIDENCE: f64 = 0.4;
pub const KNOWN_CHAIN_TICKET_CONFIDENCE: f64 = 0.9;
pub const TICKET_TOTAL_CONFIDENCE: f64 = 0.5;

/// Longest fallback description copied from the message itself
const FALLBACK_DESCRIPTION_CHARS: usize = 60;

/// Largest quantity read as "N items at P each"
const MAX_QUANTITY: i64 = 1000;

const PER_UNIT_MARKERS: &[&str] = &["x", "por"];
const BARE_CONNECTORS: &[&str] = &["a", "de", "en"];

/// One word of a normalized utterance, with its accent-folded form
struct Word<'a> {
    text: &'a str,
    folded: String,
    number: Option<Decimal>,
}

impl<'a> Word<'a> {
    fn split(normalized: &'a str) -> Vec<Word<'a>> {
        normalized
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(|text| Word {
                text,
                folded: fold_accents(text),
                number: Decimal::from_str(text).ok(),
            })
            .collect()
    }

    fn is_item(&self) -> bool {
        self.number.is_none()
            && !STOPWORDS.contains(&self.folded.as_str())
            && !is_verb_word(&self.folded)
    }
}

/// How the amount was read
enum AmountPattern {
    Single,
    /// quantity x unit price; carries the indexes of both numbers
    PerUnit { quantity: usize, price: usize, explicit: bool },
    Guessed,
}

/// Pull kind, amount and description out of a transactional utterance
pub fn extract(intent: &Intent, normalized: &str) -> Result<ExtractionResult, ExtractionError> {
    let words = Word::split(normalized);
    let folded = fold_accents(normalized);

    let numbers: Vec<(usize, Decimal)> = words
        .iter()
        .enumerate()
        .filter_map(|(i, w)| w.number.map(|n| (i, n)))
        .filter(|(_, n)| !n.is_zero())
        .collect();

    let kind = match intent {
        Intent::Sale => TransactionKind::Sale,
        Intent::Expense => TransactionKind::Expense,
        Intent::CashAdjustment => {
            let negative = numbers.iter().any(|(_, n)| n.is_sign_negative());
            if negative || contains_any(&folded, CASH_OUT_VERBS) {
                TransactionKind::CashOut
            } else {
                TransactionKind::CashIn
            }
        }
        _ => return Err(ExtractionError::NotTransactional),
    };

    if numbers.is_empty() {
        return Err(ExtractionError::NoAmountFound);
    }

    let pattern = amount_pattern(&words, &numbers);
    let (amount, confidence) = match &pattern {
        AmountPattern::Single => (numbers[0].1.abs(), SINGLE_AMOUNT_CONFIDENCE),
        AmountPattern::PerUnit {
            quantity,
            price,
            explicit,
        } => {
            let product = words[*quantity]
                .number
                .unwrap_or_default()
                .abs()
                .checked_mul(words[*price].number.unwrap_or_default().abs())
                .ok_or(ExtractionError::NoAmountFound)?;
            let confidence = if *explicit {
                PER_UNIT_CONFIDENCE
            } else {
                BARE_PATTERN_CONFIDENCE
            };
            (product, confidence)
        }
        AmountPattern::Guessed => {
            let largest = numbers
                .iter()
                .map(|(_, n)| n.abs())
                .max()
                .unwrap_or_default();
            (largest, GUESSED_AMOUNT_CONFIDENCE)
        }
    };

    let amount = storable(amount)?;
    let description = describe(kind, &pattern, &words, &folded, normalized);
    debug!(
        "Extracted {} {} ({:?}) at {:.2} from {:?}",
        kind, amount, description, confidence, normalized
    );

    Ok(ExtractionResult {
        kind,
        amount: amount.round_dp(2),
        description,
        confidence,
    })
}

/// Read a ticket photo's OCR text as an expense
pub fn extract_ticket(ocr_text: &str) -> Result<ExtractionResult, ExtractionError> {
    let normalized = normalize(ocr_text);
    let words = Word::split(&normalized);
    let folded = fold_accents(&normalized);

    let total = words
        .iter()
        .rposition(|w| w.folded == "total")
        .and_then(|at| {
            words[at + 1..]
                .iter()
                .take(3)
                .find_map(|w| w.number.filter(|n| *n > Decimal::ZERO))
        });

    let chain = KNOWN_CHAINS
        .iter()
        .find(|chain| find_phrase(&folded, chain).is_some())
        .copied();

    let (amount, confidence) = match total {
        Some(total) if chain.is_some() => (total, KNOWN_CHAIN_TICKET_CONFIDENCE),
        Some(total) => (total, TICKET_TOTAL_CONFIDENCE),
        None => {
            let largest = words
                .iter()
                .filter_map(|w| w.number)
                .filter(|n| *n > Decimal::ZERO)
                .max()
                .ok_or(ExtractionError::NoAmountFound)?;
            (largest, GUESSED_AMOUNT_CONFIDENCE)
        }
    };

    let amount = storable(amount)?;
    let description = match chain {
        Some(chain) => format!("ticket {}", chain),
        None => "ticket de compra".to_string(),
    };
    debug!(
        "Ticket read as {} ({}) at {:.2}",
        amount, description, confidence
    );

    Ok(ExtractionResult {
        kind: TransactionKind::Expense,
        amount: amount.round_dp(2),
        description,
        confidence,
    })
}

/// An amount the ledger column can hold, or no amount at all
fn storable(amount: Decimal) -> Result<Decimal, ExtractionError> {
    if amount > MAX_AMOUNT {
        debug!("Amount {} is out of range, ignoring it", amount);
        return Err(ExtractionError::NoAmountFound);
    }
    Ok(amount)
}

fn amount_pattern(words: &[Word<'_>], numbers: &[(usize, Decimal)]) -> AmountPattern {
    match numbers {
        [_] => AmountPattern::Single,
        [(quantity, q), (price, _)] if is_quantity(*q) => {
            let before_price = words[*price - 1].folded.as_str();
            let after_price = words.get(*price + 1).map(|w| w.folded.as_str());

            if after_price == Some("cada") || PER_UNIT_MARKERS.contains(&before_price) {
                return AmountPattern::PerUnit {
                    quantity: *quantity,
                    price: *price,
                    explicit: true,
                };
            }

            let has_item = words[*quantity + 1..*price].iter().any(Word::is_item);
            if BARE_CONNECTORS.contains(&before_price) && has_item {
                AmountPattern::PerUnit {
                    quantity: *quantity,
                    price: *price,
                    explicit: false,
                }
            } else {
                AmountPattern::Guessed
            }
        }
        _ => AmountPattern::Guessed,
    }
}

fn is_quantity(n: Decimal) -> bool {
    n.fract().is_zero() && n > Decimal::ZERO && n <= Decimal::from(MAX_QUANTITY)
}

fn describe(
    kind: TransactionKind,
    pattern: &AmountPattern,
    words: &[Word<'_>],
    folded: &str,
    normalized: &str,
) -> String {
    match kind {
        TransactionKind::CashIn if contains_any(folded, OPENING_WORDS) => {
            return "saldo inicial".to_string()
        }
        TransactionKind::CashIn => return "agregado a caja".to_string(),
        TransactionKind::CashOut => return "retirado de caja".to_string(),
        _ => {}
    }

    if let AmountPattern::PerUnit {
        quantity, price, ..
    } = pattern
    {
        let items: Vec<&str> = words[*quantity + 1..*price]
            .iter()
            .filter(|w| w.is_item() && !PER_UNIT_MARKERS.contains(&w.folded.as_str()))
            .map(|w| w.text)
            .collect();
        if !items.is_empty() {
            return format!("{} {}", words[*quantity].text, items.join(" "));
        }
    }

    let leftovers: Vec<&str> = words.iter().filter(|w| w.is_item()).map(|w| w.text).collect();
    if leftovers.is_empty() {
        truncate_chars(normalized, FALLBACK_DESCRIPTION_CHARS)
    } else {
        truncate_chars(&leftovers.join(" "), FALLBACK_DESCRIPTION_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(intent: Intent, raw: &str) -> Result<ExtractionResult, ExtractionError> {
        extract(&intent, &normalize(raw))
    }

    #[test]
    fn test_quantity_times_price_with_cada() {
        let result = run(Intent::Sale, "Vendí 3 coca colas a 15 pesos cada una").unwrap();
        assert_eq!(result.kind, TransactionKind::Sale);
        assert_eq!(result.amount, Decimal::from_str("45.00").unwrap());
        assert_eq!(result.description, "3 coca colas");
        assert_eq!(result.confidence, PER_UNIT_CONFIDENCE);
    }

    #[test]
    fn test_quantity_times_price_with_x() {
        let result = run(Intent::Sale, "vendí 3x15").unwrap();
        assert_eq!(result.amount, Decimal::from(45));
        assert_eq!(result.confidence, PER_UNIT_CONFIDENCE);
    }

    #[test]
    fn test_bare_de_pattern() {
        let result = run(Intent::Sale, "Se llevaron 2 sabritas de 12 pesos").unwrap();
        assert_eq!(result.amount, Decimal::from(24));
        assert_eq!(result.description, "2 sabritas");
        assert_eq!(result.confidence, BARE_PATTERN_CONFIDENCE);
    }

    #[test]
    fn test_single_amount() {
        let result = run(Intent::Expense, "Gasté 200 en mercancía").unwrap();
        assert_eq!(result.kind, TransactionKind::Expense);
        assert_eq!(result.amount, Decimal::from(200));
        assert_eq!(result.description, "mercancía");
        assert_eq!(result.confidence, SINGLE_AMOUNT_CONFIDENCE);
    }

    #[test]
    fn test_spelled_out_amount() {
        let result = run(Intent::Sale, "vendí quince pesos de dulces").unwrap();
        assert_eq!(result.amount, Decimal::from(15));
        assert_eq!(result.description, "dulces");
    }

    #[test]
    fn test_no_amount() {
        assert_eq!(
            run(Intent::Sale, "vendí unas cocas").unwrap_err(),
            ExtractionError::NoAmountFound
        );
        assert_eq!(run(Intent::Sale, "vendí 0").unwrap_err(), ExtractionError::NoAmountFound);
    }

    #[test]
    fn test_non_transactional_intent() {
        assert_eq!(
            run(Intent::BalanceQuery, "saldo 20").unwrap_err(),
            ExtractionError::NotTransactional
        );
    }

    #[test]
    fn test_unclear_numbers_take_the_largest() {
        let result = run(Intent::Expense, "pagué 200 de luz y 50 de agua").unwrap();
        assert_eq!(result.amount, Decimal::from(200));
        assert_eq!(result.confidence, GUESSED_AMOUNT_CONFIDENCE);
    }

    #[test]
    fn test_cash_adjustment_direction_and_labels() {
        let opening = run(Intent::CashAdjustment, "Empiezo el día con 500 pesos").unwrap();
        assert_eq!(opening.kind, TransactionKind::CashIn);
        assert_eq!(opening.amount, Decimal::from_str("500.00").unwrap());
        assert_eq!(opening.description, "saldo inicial");

        let withdrawal = run(Intent::CashAdjustment, "Saqué 150").unwrap();
        assert_eq!(withdrawal.kind, TransactionKind::CashOut);
        assert_eq!(withdrawal.description, "retirado de caja");

        let negative = run(Intent::CashAdjustment, "Ajuste: -50").unwrap();
        assert_eq!(negative.kind, TransactionKind::CashOut);
        assert_eq!(negative.amount, Decimal::from(50));

        let deposit = run(Intent::CashAdjustment, "puse 300 a la caja").unwrap();
        assert_eq!(deposit.kind, TransactionKind::CashIn);
        assert_eq!(deposit.description, "agregado a caja");
    }

    #[test]
    fn test_ticket_from_known_chain() {
        let ocr = "OXXO TIENDA 1234\nCOCA COLA 600ML  $18.00\nSUBTOTAL $86.21\nIVA $13.79\nTOTAL: $100.00\nGRACIAS";
        let result = extract_ticket(ocr).unwrap();
        assert_eq!(result.kind, TransactionKind::Expense);
        assert_eq!(result.amount, Decimal::from(100));
        assert_eq!(result.description, "ticket oxxo");
        assert_eq!(result.confidence, KNOWN_CHAIN_TICKET_CONFIDENCE);
    }

    #[test]
    fn test_ticket_unknown_store() {
        let result = extract_ticket("Abarrotes Don Pepe\nTotal 235.50").unwrap();
        assert_eq!(result.amount, Decimal::from_str("235.50").unwrap());
        assert_eq!(result.description, "ticket de compra");
        assert_eq!(result.confidence, TICKET_TOTAL_CONFIDENCE);
    }

    #[test]
    fn test_ticket_without_total() {
        let result = extract_ticket("Recibo 45.00 12.00").unwrap();
        assert_eq!(result.amount, Decimal::from(45));
        assert_eq!(result.confidence, GUESSED_AMOUNT_CONFIDENCE);
        assert_eq!(extract_ticket("ilegible").unwrap_err(), ExtractionError::NoAmountFound);
    }

    #[test]
    fn test_amounts_beyond_the_ledger_are_not_read() {
        assert_eq!(
            run(Intent::Sale, "vendí 2 chicles a 79228162514264337593543950335 cada uno").unwrap_err(),
            ExtractionError::NoAmountFound
        );
        assert_eq!(
            run(Intent::Expense, "gasté 10000000000 en mercancía").unwrap_err(),
            ExtractionError::NoAmountFound
        );
        assert_eq!(
            extract_ticket("OXXO\nTOTAL 99999999999999").unwrap_err(),
            ExtractionError::NoAmountFound
        );
    }
}
