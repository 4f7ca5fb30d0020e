// src/sheet/text.rs

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use super::Cell;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

static YEAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"19\d{2}|20\d{2}|2100").expect("year pattern should compile"));

/// NFC-compose `raw` and collapse every whitespace run into a single space.
pub fn normalize_text(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Matching key used for section headers, metric aliases and geography
/// names: whitespace-collapsed, lowercased, with combining marks removed
/// and `đ` folded to `d`, so "HÀ  NỘI", "Hà Nội" and "ha noi" agree.
pub fn fold_key(raw: &str) -> String {
    normalize_text(raw)
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'đ' { 'd' } else { c })
        .collect()
}

/// Year carried by a header or year-column cell.
///
/// Numbers count when they fall inside [`MIN_YEAR`, `MAX_YEAR`]; text counts
/// when it contains a year token ("Năm 2021" → 2021). Anything else is `None`.
pub fn year_of(cell: &Cell) -> Option<i32> {
    match cell {
        Cell::Number(n) if (f64::from(MIN_YEAR)..=f64::from(MAX_YEAR)).contains(n) => {
            Some(n.trunc() as i32)
        }
        Cell::Text(s) => year_in_text(s),
        _ => None,
    }
}

pub fn year_in_text(text: &str) -> Option<i32> {
    YEAR_TOKEN
        .find(text)
        .and_then(|m| m.as_str().parse::<i32>().ok())
}
