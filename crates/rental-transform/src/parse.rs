//! Best-effort scalar parsers.
//!
//! Every parser returns `Option`: a malformed value becomes `None` and flows
//! into imputation instead of aborting the run.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use rental_common::parse_f64;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

static LINE_BREAK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("Invalid line break regex"));

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static LEADING_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").expect("Invalid number regex"));

/// Localized tokens meaning "not applicable" in percentage fields.
const PERCENT_NA_TOKENS: &[&str] = &["n/a", "na", "none", "nan", "no aplica", "null"];

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parses a date-like value to a UTC instant.
///
/// Accepts RFC 3339 strings, common date and date-time layouts, and
/// extended-JSON wrappers such as `{"$date": "..."}` or
/// `{"$date": {"$numberLong": "1700000000000"}}`.
pub fn parse_instant(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        return unwrap_date_object(trimmed);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    try_parse_datetime(trimmed).or_else(|| try_parse_date(trimmed).map(|d| d.and_time(NaiveTime::MIN)))
}

/// Renders a date-like value as `YYYY-MM-DD`.
pub fn to_iso_date(value: &str) -> Option<String> {
    parse_instant(value).map(|dt| dt.format(DATE_FORMAT).to_string())
}

/// Renders a date-like value as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn to_iso_timestamp(value: &str) -> Option<String> {
    parse_instant(value).map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Parses an ISO date produced by [`to_iso_date`].
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .ok()
        .or_else(|| parse_instant(value).map(|dt| dt.date()))
}

fn unwrap_date_object(text: &str) -> Option<NaiveDateTime> {
    let parsed: Value = serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(&text.replace('\'', "\"")))
        .ok()?;
    let inner = parsed.get("$date")?;
    match inner {
        Value::String(s) => parse_instant(s),
        Value::Number(n) => n.as_i64().and_then(from_epoch_millis),
        Value::Object(map) => map
            .get("$numberLong")
            .and_then(|v| match v {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            })
            .and_then(from_epoch_millis),
        _ => None,
    }
}

fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

fn try_parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    None
}

fn try_parse_date(value: &str) -> Option<NaiveDate> {
    let formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d-%b-%Y",
        "%b %d, %Y",
        "%Y%m%d",
    ];

    for fmt in &formats {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d);
        }
    }

    None
}

/// Parses a currency string such as `"$1,234.50"`.
pub fn parse_currency(value: &str) -> Option<f64> {
    let digits: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    parse_f64(&digits)
}

/// Parses a percentage string such as `"95%"`. The result is not clipped.
pub fn parse_percent(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if PERCENT_NA_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        return None;
    }
    parse_f64(&trimmed.replace('%', ""))
}

/// Extracts the leading decimal number from text like `"1.5 shared baths"`.
pub fn leading_number(value: &str) -> Option<f64> {
    LEADING_NUMBER_REGEX
        .find(value)
        .and_then(|m| parse_f64(m.as_str()))
}

/// Cleans free text: markup removed, NFC composed, whitespace collapsed.
///
/// Null-like literals (`none`, `nan`) become the empty string.
pub fn clean_text(value: &str) -> String {
    let without_breaks = LINE_BREAK_REGEX.replace_all(value, " ");
    let without_tags = TAG_REGEX.replace_all(&without_breaks, " ");
    let composed: String = without_tags.nfc().collect();
    let collapsed = WHITESPACE_REGEX.replace_all(&composed, " ");
    let cleaned = collapsed.trim();
    if cleaned.eq_ignore_ascii_case("none") || cleaned.eq_ignore_ascii_case("nan") {
        return String::new();
    }
    cleaned.to_string()
}

/// Parses a nested attribute into a list of strings.
///
/// List literals in JSON (`["Wifi", "Kitchen"]`) or single-quoted
/// (`['email', 'phone']`) form are split into items. A malformed literal
/// yields an empty list, blank input yields an empty list, and any other
/// scalar becomes a singleton list.
pub fn parse_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if !trimmed.starts_with('[') {
        return vec![trimmed.to_string()];
    }
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect();
    }
    parse_quoted_list(trimmed).unwrap_or_default()
}

/// Splits a single- or double-quoted list literal, honoring backslash escapes.
fn parse_quoted_list(text: &str) -> Option<Vec<String>> {
    let body = text.strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut chars = body.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let Some(quote) = chars.next() else {
            return Some(items);
        };
        if quote != '\'' && quote != '"' {
            return None;
        }
        let mut item = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => item.push(chars.next()?),
                c if c == quote => {
                    closed = true;
                    break;
                }
                c => item.push(c),
            }
        }
        if !closed {
            return None;
        }
        items.push(item);
    }
}

/// Canonical item name for allow-list matching.
///
/// Decomposes (NFKD), drops non-ASCII marks, turns runs of anything other
/// than ASCII letters and digits into `_`, trims `_`, lowercases.
pub fn slug(value: &str) -> String {
    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let mut out = String::with_capacity(ascii.len());
    let mut pending_sep = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_render_as_iso() {
        assert_eq!(to_iso_date("2024-03-05"), Some("2024-03-05".to_string()));
        assert_eq!(to_iso_date("2024-03-05T23:10:00Z"), Some("2024-03-05".to_string()));
        assert_eq!(to_iso_date("05/03/2024"), Some("2024-03-05".to_string()));
        assert_eq!(
            to_iso_timestamp("2024-03-05 08:00:00"),
            Some("2024-03-05T08:00:00Z".to_string())
        );
        assert_eq!(to_iso_date("not a date"), None);
        assert_eq!(to_iso_date(""), None);
    }

    #[test]
    fn offsets_convert_to_utc() {
        assert_eq!(
            to_iso_timestamp("2024-03-05T22:30:00-06:00"),
            Some("2024-03-06T04:30:00Z".to_string())
        );
    }

    #[test]
    fn date_wrappers_unwrap() {
        assert_eq!(
            to_iso_date(r#"{"$date": "2023-12-31T00:00:00Z"}"#),
            Some("2023-12-31".to_string())
        );
        assert_eq!(
            to_iso_date("{'$date': '2023-12-31'}"),
            Some("2023-12-31".to_string())
        );
        assert_eq!(
            to_iso_date(r#"{"$date": {"$numberLong": "0"}}"#),
            Some("1970-01-01".to_string())
        );
        assert_eq!(to_iso_date(r#"{"other": 1}"#), None);
    }

    #[test]
    fn currency_strips_symbols() {
        assert_eq!(parse_currency("$1,234.50"), Some(1234.5));
        assert_eq!(parse_currency(" 80 "), Some(80.0));
        assert_eq!(parse_currency("N/A"), None);
        assert_eq!(parse_currency(""), None);
    }

    #[test]
    fn percent_handles_na_tokens() {
        assert_eq!(parse_percent("95%"), Some(95.0));
        assert_eq!(parse_percent("120%"), Some(120.0));
        assert_eq!(parse_percent("N/A"), None);
        assert_eq!(parse_percent("No aplica"), None);
        assert_eq!(parse_percent("abc%"), None);
    }

    #[test]
    fn text_is_cleaned() {
        assert_eq!(clean_text("Nice<br/>place  <b>here</b>"), "Nice place here");
        assert_eq!(clean_text("Cafe\u{301}"), "Caf\u{e9}");
        assert_eq!(clean_text(" nan "), "");
        assert_eq!(clean_text("None"), "");
        assert_eq!(clean_text("   "), "");
    }

    #[test]
    fn lists_parse_both_quote_styles() {
        assert_eq!(parse_list(r#"["Wifi", "Kitchen"]"#), vec!["Wifi", "Kitchen"]);
        assert_eq!(parse_list("['email', 'phone']"), vec!["email", "phone"]);
        assert_eq!(parse_list("['it\\'s']"), vec!["it's"]);
        assert_eq!(parse_list("[]"), Vec::<String>::new());
        assert_eq!(parse_list("[broken"), Vec::<String>::new());
        assert_eq!(parse_list("phone"), vec!["phone"]);
        assert_eq!(parse_list(""), Vec::<String>::new());
    }

    #[test]
    fn slugs_ignore_case_accents_and_punctuation() {
        assert_eq!(slug("Self check-in"), "self_check_in");
        assert_eq!(slug("Room-darkening shades"), "room_darkening_shades");
        assert_eq!(slug("  WIFI "), "wifi");
        assert_eq!(slug("Café"), "cafe");
        assert_eq!(slug("work_email"), "work_email");
    }

    #[test]
    fn leading_number_reads_bath_text() {
        assert_eq!(leading_number("1.5 shared baths"), Some(1.5));
        assert_eq!(leading_number("Half-bath"), None);
    }
}
