//! Price text normalization
//!
//! Turns display strings such as `"1 234,56 €"`, `"12.90€ HT"` or
//! `"Prix : 1.299,00 EUR"` into numbers. The first numeric run in the text is
//! used; currency symbols and labels around it are ignored.

use once_cell::sync::Lazy;
use regex::Regex;

// Digits plus the separators French and English storefronts put inside amounts
static NUMERIC_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d.,' \u{00A0}\u{202F}]*").expect("price pattern is a valid regex"));

fn is_group_space(c: char) -> bool {
    matches!(c, ' ' | '\u{00A0}' | '\u{202F}')
}

/// Cut the run where a space stops looking like a thousands separator.
///
/// `"12,90 3"` keeps `"12,90"`; `"1 234 567,89"` is kept whole.
fn leading_amount(run: &str) -> String {
    let mut chunks = run.split(is_group_space).filter(|c| !c.is_empty());
    let Some(first) = chunks.next() else {
        return String::new();
    };

    let mut amount = first.to_string();
    for chunk in chunks {
        let has_decimal = amount.contains([',', '.']);
        let digits = chunk.chars().take_while(char::is_ascii_digit).count();
        if has_decimal || digits != 3 {
            break;
        }
        amount.push_str(chunk);
    }
    amount
}

/// Parse an amount, allowing zero. Used for catalog cells.
pub fn parse_amount(text: &str) -> Option<f64> {
    let run = NUMERIC_RUN.find(text)?.as_str();
    let amount: String = leading_amount(run).chars().filter(|c| *c != '\'').collect();
    let amount = amount.trim_end_matches(['.', ',']);

    let last_comma = amount.rfind(',');
    let last_dot = amount.rfind('.');
    let decimal = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => Some(comma.max(dot)),
        (Some(comma), None) if amount.matches(',').count() == 1 => Some(comma),
        (None, Some(dot)) if amount.matches('.').count() == 1 => Some(dot),
        _ => None,
    };

    let canonical: String = amount
        .char_indices()
        .filter_map(|(i, c)| match c {
            '0'..='9' => Some(c),
            ',' | '.' if Some(i) == decimal => Some('.'),
            _ => None,
        })
        .collect();

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a scraped price. Zero, negative or unparsable text is not a price.
pub fn normalize_price(text: &str) -> Option<f64> {
    parse_amount(text).filter(|price| *price > 0.0)
}
