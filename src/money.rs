//! Rupee amounts.
//!
//! Balances and payment amounts are stored as `i64` paise so arithmetic never
//! touches floating point. Clients send decimal rupees, either as a JSON
//! number or as the string a form field produced ("199", "49.50").

use serde::{Deserialize, Deserializer, de};

use crate::error::AppError;

/// Largest single amount accepted: 1 crore rupees.
pub const MAX_AMOUNT_PAISE: i64 = 10_000_000 * 100;

/// Raw amount as sent by a client, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for RawAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(RawAmount::Number)
                .ok_or_else(|| de::Error::custom("amount is not a finite number")),
            serde_json::Value::String(s) => Ok(RawAmount::Text(s)),
            _ => Err(de::Error::custom("amount must be a number or numeric string")),
        }
    }
}

impl RawAmount {
    /// Convert into paise, rejecting zero, negatives, more than two decimal
    /// places and values above [`MAX_AMOUNT_PAISE`].
    pub fn to_paise(&self) -> Result<i64, AppError> {
        let text = match self {
            RawAmount::Number(n) => {
                if !n.is_finite() {
                    return Err(invalid());
                }
                // Format with enough precision that 0.1 + 0.2 style noise shows up
                // as a third decimal and gets rejected below.
                format_number(*n)
            }
            RawAmount::Text(s) => s.trim().to_string(),
        };
        parse_rupees(&text)
    }
}

fn invalid() -> AppError {
    AppError::InvalidRequest("Enter a valid amount".to_string())
}

fn format_number(n: f64) -> String {
    let s = format!("{:.6}", n);
    let s = s.trim_end_matches('0');
    s.trim_end_matches('.').to_string()
}

/// Parse a decimal rupee string ("120", "120.5", "120.50") into paise.
pub fn parse_rupees(text: &str) -> Result<i64, AppError> {
    if text.is_empty() || text.starts_with('-') || text.starts_with('+') {
        return Err(invalid());
    }

    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > 2 {
        return Err(AppError::InvalidRequest(
            "Amount can have at most two decimal places".to_string(),
        ));
    }

    let rupees: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let paise_part: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };

    let total = rupees
        .checked_mul(100)
        .and_then(|p| p.checked_add(paise_part))
        .ok_or_else(invalid)?;

    if total <= 0 {
        return Err(invalid());
    }
    if total > MAX_AMOUNT_PAISE {
        return Err(AppError::InvalidRequest(
            "Amount exceeds the maximum allowed".to_string(),
        ));
    }
    Ok(total)
}

/// Paise to decimal rupees for JSON responses.
pub fn paise_to_rupees(paise: i64) -> f64 {
    paise as f64 / 100.0
}

/// Human-readable amount used in notification text, e.g. `₹1234.50`.
pub fn format_rupees(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{}₹{}.{:02}", sign, abs / 100, abs % 100)
}
