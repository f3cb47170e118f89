//! Keyword tables shared by the classifier and the extractor.
//!
//! Every phrase is written without accents; callers match against
//! `fold_accents(normalized)`.

use crate::models::{CorrectionReply, TransactionKind};

pub const SALE_VERBS: &[&str] = &[
    "vendi", "vendimos", "vendo", "vende", "venta", "ventas", "cobre", "cobramos",
    "se llevaron", "se llevo", "me compraron", "me compro", "me pagaron", "me pago", "ingreso",
    "gane", "despache",
];

pub const EXPENSE_VERBS: &[&str] = &[
    "gaste", "gastamos", "gasto", "gastos", "compre", "compramos", "compra", "pague",
    "pagamos", "pagar", "surti", "resurti", "me cobraron", "inverti", "costo",
    "me costo",
];

pub const CASH_IN_VERBS: &[&str] = &[
    "empiezo", "empece", "empezamos", "inicio", "inicie", "abro", "abri", "saldo inicial",
    "fondo", "meti", "puse", "agregue", "deposite", "ajuste",
];

pub const CASH_OUT_VERBS: &[&str] = &["saque", "sacamos", "retire", "retiro", "tome", "me lleve"];

pub const OPENING_WORDS: &[&str] = &[
    "empiezo", "empece", "empezamos", "inicio", "inicie", "abro", "abri", "saldo inicial", "fondo",
];

pub const AFFIRM_TOKENS: &[&str] = &[
    "si", "sip", "simon", "ok", "okay", "va", "vale", "correcto", "confirmo", "confirmar",
    "asi es", "esta bien", "dale", "claro", "exacto", "eso",
];

pub const REJECT_TOKENS: &[&str] = &[
    "no", "nel", "nop", "cancela", "cancelar", "cancelalo", "borra", "borralo", "olvidalo",
    "esta mal", "mal",
];

pub const KIND_TOKENS: &[(&str, TransactionKind)] = &[
    ("venta", TransactionKind::Sale),
    ("vendi", TransactionKind::Sale),
    ("gasto", TransactionKind::Expense),
    ("compra", TransactionKind::Expense),
    ("compre", TransactionKind::Expense),
    ("entrada", TransactionKind::CashIn),
    ("deposito", TransactionKind::CashIn),
    ("retiro", TransactionKind::CashOut),
    ("salida", TransactionKind::CashOut),
];

/// Replies longer than this are never read as confirmation tokens
pub const MAX_REPLY_TOKENS: usize = 5;

/// Words allowed around a reply token ("es venta", "no, era gasto")
pub const REPLY_FILLERS: &[&str] = &["es", "era", "fue", "un", "una", "mejor", "mas", "bien"];

/// (phrase, kind filter) pairs that introduce a keyword search
pub const SEARCH_PHRASES: &[(&str, Option<TransactionKind>)] = &[
    ("cuanto he gastado", Some(TransactionKind::Expense)),
    ("cuanto gastamos", Some(TransactionKind::Expense)),
    ("cuanto gaste", Some(TransactionKind::Expense)),
    ("cuanto he vendido", Some(TransactionKind::Sale)),
    ("cuanto vendimos", Some(TransactionKind::Sale)),
    ("cuanto vendi", Some(TransactionKind::Sale)),
    ("mis gastos", Some(TransactionKind::Expense)),
    ("mis ventas", Some(TransactionKind::Sale)),
    ("buscar", None),
    ("busca", None),
    ("busqueda", None),
];

/// Words dropped from the front of a search keyword
pub const SEARCH_CONNECTORS: &[&str] = &["en", "de", "del", "el", "la", "los", "las", "por", "con"];

pub const BALANCE_KEYWORDS: &[&str] = &[
    "saldo", "balance", "cuanto tengo", "cuanto llevo", "cuanto hay", "dinero", "estado",
    "resumen", "cuentas", "corte", "como voy", "como vamos",
];

pub const GREETING_KEYWORDS: &[&str] = &[
    "hola", "buenas", "buenos dias", "buenas tardes", "buenas noches", "que onda", "quiubo",
    "hey", "ayuda", "help", "menu", "gracias",
];

/// Words that never end up in a description
pub const STOPWORDS: &[&str] = &[
    "a", "al", "de", "del", "en", "el", "la", "lo", "los", "las", "un", "una", "uno", "unos",
    "unas", "con", "por", "para", "y", "cada", "x", "que", "me", "se", "mi", "mis", "hoy", "le",
    "les", "es", "fue", "ya", "acabo", "total", "como", "dia", "caja",
];

pub const KNOWN_CHAINS: &[&str] = &[
    "oxxo", "walmart", "soriana", "chedraui", "costco", "sams", "aurrera", "coca cola", "bimbo",
    "sabritas", "modelo", "pemex", "shell", "heb", "la comer", "7 eleven", "lala", "gamesa",
    "comercial mexicana", "farmacias guadalajara", "extra", "circle k",
];

/// Whole-word phrase match on space separated text
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    find_phrase(text, phrase).is_some()
}

/// Byte offset just past the first whole-word match of `phrase`
pub fn find_phrase(text: &str, phrase: &str) -> Option<usize> {
    let padded = format!(" {} ", text);
    padded
        .find(&format!(" {} ", phrase))
        .map(|start| start + phrase.len())
}

pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

/// Read a short reply to a pending or just-committed transaction.
/// Every word has to come from the reply vocabulary, so questions like
/// "cuanto vendi de refrescos" are never replies.
/// The last kind token wins over negations, which win over affirmations.
pub fn reply_token(folded: &str) -> Option<CorrectionReply> {
    let words: Vec<&str> = folded.split(' ').filter(|t| !t.is_empty()).collect();
    if words.is_empty() || words.len() > MAX_REPLY_TOKENS {
        return None;
    }
    if !words.iter().all(|word| is_reply_word(word)) {
        return None;
    }

    let last_kind = folded
        .split(' ')
        .filter_map(|word| {
            KIND_TOKENS
                .iter()
                .find(|(token, _)| *token == word)
                .map(|(_, kind)| *kind)
        })
        .last();

    if let Some(kind) = last_kind {
        Some(CorrectionReply::Kind(kind))
    } else if contains_any(folded, REJECT_TOKENS) {
        Some(CorrectionReply::Reject)
    } else if contains_any(folded, AFFIRM_TOKENS) {
        Some(CorrectionReply::Affirm)
    } else {
        None
    }
}

fn is_reply_word(word: &str) -> bool {
    REPLY_FILLERS.contains(&word)
        || KIND_TOKENS.iter().any(|(token, _)| *token == word)
        || AFFIRM_TOKENS
            .iter()
            .chain(REJECT_TOKENS)
            .any(|phrase| phrase.split(' ').any(|w| w == word))
}

/// Words belonging to any verb phrase, so descriptions can skip them
pub fn is_verb_word(word: &str) -> bool {
    [SALE_VERBS, EXPENSE_VERBS, CASH_IN_VERBS, CASH_OUT_VERBS]
        .iter()
        .flat_map(|list| list.iter())
        .any(|phrase| phrase.split(' ').any(|w| w == word && !STOPWORDS.contains(&w)))
}
