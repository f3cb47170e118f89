//! Utterance normalization
//!
//! `normalize` is pure and total: any input, including empty or emoji-only text,
//! produces a (possibly empty) lowercase string of single-space separated tokens.

use std::collections::HashMap;
use std::str::FromStr;

use lazy_static::lazy_static;
use rust_decimal::Decimal;

const CURRENCY_WORDS: &[&str] = &["pesos", "peso", "pesitos", "varos", "varo", "mxn", "mx", "mn"];

const FILLER_WORDS: &[&str] = &[
    "eh", "ehh", "em", "emm", "mmm", "mm", "pues", "oye", "órale", "orale", "ándale", "andale",
    "ajá", "aja",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Magnitude {
    Unit,
    /// 10 to 29, written as one word
    Teen,
    Ten,
    Hundred,
    Thousand,
}

lazy_static! {
    static ref NUMERALS: HashMap<&'static str, (u64, Magnitude)> = {
        use Magnitude::*;
        let entries: &[(&str, u64, Magnitude)] = &[
            ("dos", 2, Unit), ("tres", 3, Unit), ("cuatro", 4, Unit), ("cinco", 5, Unit),
            ("seis", 6, Unit), ("siete", 7, Unit), ("ocho", 8, Unit), ("nueve", 9, Unit),
            ("diez", 10, Teen), ("once", 11, Teen), ("doce", 12, Teen), ("trece", 13, Teen),
            ("catorce", 14, Teen), ("quince", 15, Teen),
            ("dieciséis", 16, Teen), ("dieciseis", 16, Teen), ("diecisiete", 17, Teen),
            ("dieciocho", 18, Teen), ("diecinueve", 19, Teen),
            ("veinte", 20, Teen), ("veintiuno", 21, Teen), ("veintiún", 21, Teen),
            ("veintiun", 21, Teen), ("veintiuna", 21, Teen),
            ("veintidós", 22, Teen), ("veintidos", 22, Teen),
            ("veintitrés", 23, Teen), ("veintitres", 23, Teen), ("veinticuatro", 24, Teen),
            ("veinticinco", 25, Teen), ("veintiséis", 26, Teen), ("veintiseis", 26, Teen),
            ("veintisiete", 27, Teen), ("veintiocho", 28, Teen), ("veintinueve", 29, Teen),
            ("treinta", 30, Ten), ("cuarenta", 40, Ten), ("cincuenta", 50, Ten),
            ("sesenta", 60, Ten), ("setenta", 70, Ten), ("ochenta", 80, Ten),
            ("noventa", 90, Ten),
            ("cien", 100, Hundred), ("ciento", 100, Hundred),
            ("doscientos", 200, Hundred), ("doscientas", 200, Hundred),
            ("trescientos", 300, Hundred), ("trescientas", 300, Hundred),
            ("cuatrocientos", 400, Hundred), ("cuatrocientas", 400, Hundred),
            ("quinientos", 500, Hundred), ("quinientas", 500, Hundred),
            ("seiscientos", 600, Hundred), ("seiscientas", 600, Hundred),
            ("setecientos", 700, Hundred), ("setecientas", 700, Hundred),
            ("ochocientos", 800, Hundred), ("ochocientas", 800, Hundred),
            ("novecientos", 900, Hundred), ("novecientas", 900, Hundred),
            ("mil", 1000, Thousand),
        ];
        entries.iter().map(|&(word, value, magnitude)| (word, (value, magnitude))).collect()
    };
}

/// Lowercase, strip currency and filler noise, and turn Spanish numerals into digits
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase().replace("c/u", " cada uno ");
    let cleaned = clean_chars(&lowered);

    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| !CURRENCY_WORDS.contains(t) && !FILLER_WORDS.contains(t))
        .collect();

    expand_numerals(&tokens).join(" ")
}

/// Map accented vowels to their plain form, one char for one char
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

pub fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

fn clean_chars(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        let prev_digit = prev.map_or(false, |p| p.is_ascii_digit());
        let next_digit = next.map_or(false, |n| n.is_ascii_digit());

        if c.is_ascii_digit() {
            if prev.map_or(false, char::is_alphabetic) {
                out.push(' ');
            }
            out.push(c);
        } else if c.is_alphabetic() {
            if prev_digit {
                out.push(' ');
            }
            out.push(c);
        } else if c == ',' && prev_digit && is_thousands_group(&chars[i + 1..]) {
            // 1,500 -> 1500
        } else if c == '.' && prev_digit && next_digit {
            out.push('.');
        } else if (c == '-' || c == '+') && next_digit && prev.map_or(true, char::is_whitespace) {
            out.push(c);
        } else {
            out.push(' ');
        }
    }

    out
}

fn is_thousands_group(rest: &[char]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(char::is_ascii_digit)
        && rest.get(3).map_or(true, |c| !c.is_ascii_digit())
}

fn expand_numerals<'a>(tokens: &[&'a str]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        if let Some((value, consumed)) = read_numeral(&tokens[i..]) {
            out.push(value.to_string());
            i += consumed;
            continue;
        }

        // "2 mil" / "1.5 mil"; a number too big to scale is left as written
        if let (Ok(value), Some(&"mil")) = (Decimal::from_str(tokens[i]), tokens.get(i + 1)) {
            match value.checked_mul(Decimal::from(1000)) {
                Some(scaled) => out.push(scaled.normalize().to_string()),
                None => out.extend([tokens[i].to_string(), "mil".to_string()]),
            }
            i += 2;
            continue;
        }

        out.push(tokens[i].to_string());
        i += 1;
    }

    out
}

/// Read one spelled-out number from the front of `tokens`.
/// Returns the value and how many tokens it used.
fn read_numeral(tokens: &[&str]) -> Option<(u64, usize)> {
    let mut thousands = 0u64;
    let mut current = 0u64;
    let mut consumed = 0usize;
    let mut last: Option<Magnitude> = None;

    while consumed < tokens.len() {
        let token = tokens[consumed];

        if token == "y" {
            // only "treinta y cinco" style joins
            let next = tokens.get(consumed + 1).copied();
            let unit = next.and_then(unit_after_y);
            match (last, unit) {
                (Some(Magnitude::Ten), Some(unit)) => {
                    current += unit;
                    consumed += 2;
                    last = Some(Magnitude::Unit);
                    continue;
                }
                _ => break,
            }
        }

        let Some(&(value, magnitude)) = NUMERALS.get(token) else {
            break;
        };

        let fits = match magnitude {
            Magnitude::Hundred => current == 0,
            Magnitude::Ten | Magnitude::Teen => current % 100 == 0,
            Magnitude::Unit => current % 100 == 0 && last != Some(Magnitude::Ten),
            Magnitude::Thousand => thousands == 0 && last != Some(Magnitude::Thousand),
        };
        if !fits {
            break;
        }

        match magnitude {
            Magnitude::Thousand => {
                thousands = current.max(1) * 1000;
                current = 0;
            }
            _ => current += value,
        }
        last = Some(magnitude);
        consumed += 1;
    }

    if consumed == 0 {
        None
    } else {
        Some((thousands + current, consumed))
    }
}

fn unit_after_y(token: &str) -> Option<u64> {
    match token {
        "un" | "una" | "uno" => Some(1),
        other => match NUMERALS.get(other) {
            Some(&(value, Magnitude::Unit)) => Some(value),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_currency() {
        assert_eq!(normalize("  Vendí 3 Coca Colas a $15 PESOS cada una!! "), "vendí 3 coca colas a 15 cada una");
        assert_eq!(normalize("Gasté MX$ 200 en mercancía"), "gasté 200 en mercancía");
        assert_eq!(normalize("quince varos"), "15");
    }

    #[test]
    fn test_thousands_separator_and_decimals() {
        assert_eq!(normalize("Pagué $1,500.50 de luz"), "pagué 1500.50 de luz");
        assert_eq!(normalize("son 12.5, no 13"), "son 12.5 no 13");
        assert_eq!(normalize("vendí 3,5 kilos"), "vendí 3 5 kilos");
    }

    #[test]
    fn test_keeps_leading_sign_only() {
        assert_eq!(normalize("Ajuste: -50"), "ajuste -50");
        assert_eq!(normalize("coca-cola 15"), "coca cola 15");
        assert_eq!(normalize("+200 a caja"), "+200 a caja");
    }

    #[test]
    fn test_splits_digits_from_letters() {
        assert_eq!(normalize("3x15"), "3 x 15");
        assert_eq!(normalize("2sabritas de 12"), "2 sabritas de 12");
        assert_eq!(normalize("3 cocas a 15 c/u"), "3 cocas a 15 cada uno");
    }

    #[test]
    fn test_drops_fillers() {
        assert_eq!(normalize("Eh, pues, vendí mmm 20 de chicles, órale"), "vendí 20 de chicles");
    }

    #[test]
    fn test_expands_numerals() {
        assert_eq!(normalize("quince pesos"), "15");
        assert_eq!(normalize("treinta y cinco"), "35");
        assert_eq!(normalize("dos mil quinientos"), "2500");
        assert_eq!(normalize("ciento veinte"), "120");
        assert_eq!(normalize("doscientos treinta y dos"), "232");
        assert_eq!(normalize("mil quinientos"), "1500");
        assert_eq!(normalize("cuarenta y un pesos"), "41");
        assert_eq!(normalize("2 mil"), "2000");
        assert_eq!(normalize("1.5 mil"), "1500");
        assert_eq!(normalize("vendí tres cocas a quince cada una"), "vendí 3 cocas a 15 cada una");
    }

    #[test]
    fn test_does_not_expand_un_una_uno() {
        assert_eq!(normalize("vendí una coca de 15"), "vendí una coca de 15");
        assert_eq!(normalize("a 15 cada uno"), "a 15 cada uno");
    }

    #[test]
    fn test_adjacent_numerals_stay_separate() {
        assert_eq!(normalize("dos tres"), "2 3");
        assert_eq!(normalize("treinta papas y dos"), "30 papas y 2");
    }

    #[test]
    fn test_total_on_odd_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("👍🙏"), "");
        assert_eq!(normalize("¿¡!?"), "");
    }

    #[test]
    fn test_fold_accents_is_char_for_char() {
        let text = "cuánto gasté en mercancía";
        let folded = fold_accents(text);
        assert_eq!(folded, "cuanto gaste en mercancia");
        assert_eq!(folded.chars().count(), text.chars().count());
    }

    #[test]
    fn test_huge_number_before_mil_is_left_alone() {
        assert_eq!(
            normalize("vendí 79228162514264337593543950335 mil"),
            "vendí 79228162514264337593543950335 mil"
        );
        assert_eq!(normalize("gasté 2 mil"), "gasté 2000");
    }
}
