//! Timestamp-like values as they appear in stored user documents.
//!
//! Entitlement records were written by several generations of tooling, so an
//! expiry may be an epoch-millisecond number, a string (numeric or RFC 3339),
//! or a database timestamp object with `seconds`/`nanoseconds`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest magnitude an epoch-millisecond expiry may have (±100,000,000 days).
const MAX_MILLIS: i64 = 8_640_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Number(f64),
    Text(String),
    Object(TimestampObject),
}

/// Database timestamp object. Admin SDK exports use the underscored names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampObject {
    #[serde(alias = "_seconds")]
    pub seconds: i64,
    #[serde(default, alias = "_nanoseconds")]
    pub nanoseconds: i64,
}

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Timestamp::Number(ms as f64)
    }

    /// Read a stored value, `None` when it has none of the known shapes.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Milliseconds since the epoch. Zero and unparseable values count as absent.
    pub fn to_millis(&self) -> Option<i64> {
        let ms = match self {
            Timestamp::Number(n) => float_millis(*n)?,
            Timestamp::Text(s) => parse_text_millis(s)?,
            Timestamp::Object(o) => o
                .seconds
                .checked_mul(1000)?
                .checked_add(o.nanoseconds / 1_000_000)?,
        };
        (ms != 0 && ms.abs() <= MAX_MILLIS).then_some(ms)
    }
}

fn float_millis(n: f64) -> Option<i64> {
    (n.is_finite() && n.abs() <= MAX_MILLIS as f64).then(|| n as i64)
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp::from_millis(value.timestamp_millis())
    }
}

fn parse_text_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return float_millis(n);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.timestamp_millis())
}

/// A record is active while its expiry lies in the future. A missing expiry
/// never lapses.
pub fn is_active_until(expiry: Option<&Timestamp>, now: DateTime<Utc>) -> bool {
    match expiry.and_then(Timestamp::to_millis) {
        None => true,
        Some(ms) => ms > now.timestamp_millis(),
    }
}

/// Same rule for expiries already stored as epoch milliseconds.
pub fn is_active_until_millis(expiry_ms: Option<i64>, now: DateTime<Utc>) -> bool {
    match expiry_ms.filter(|ms| *ms != 0) {
        None => true,
        Some(ms) => ms > now.timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_every_stored_shape() {
        let ms = now().timestamp_millis();
        let number: Timestamp = serde_json::from_value(serde_json::json!(ms)).unwrap();
        assert_eq!(number.to_millis(), Some(ms));

        let numeric_text: Timestamp =
            serde_json::from_value(serde_json::json!(ms.to_string())).unwrap();
        assert_eq!(numeric_text.to_millis(), Some(ms));

        let iso: Timestamp =
            serde_json::from_value(serde_json::json!("2026-03-01T21:00:00+09:00")).unwrap();
        assert_eq!(iso.to_millis(), Some(ms));

        let obj: Timestamp = serde_json::from_value(serde_json::json!({
            "seconds": ms / 1000,
            "nanoseconds": 0
        }))
        .unwrap();
        assert_eq!(obj.to_millis(), Some(ms));

        let admin_obj: Timestamp = serde_json::from_value(serde_json::json!({
            "_seconds": ms / 1000,
            "_nanoseconds": 250_000_000
        }))
        .unwrap();
        assert_eq!(admin_obj.to_millis(), Some(ms + 250));
    }

    #[test]
    fn garbage_and_zero_count_as_absent() {
        assert_eq!(Timestamp::Text("soon".into()).to_millis(), None);
        assert_eq!(Timestamp::Text("   ".into()).to_millis(), None);
        assert_eq!(Timestamp::Number(0.0).to_millis(), None);
        assert_eq!(Timestamp::Number(f64::NAN).to_millis(), None);
    }

    #[test]
    fn out_of_range_values_count_as_absent() {
        let huge = Timestamp::Object(TimestampObject {
            seconds: i64::MAX / 10,
            nanoseconds: 0,
        });
        assert_eq!(huge.to_millis(), None);
        let underflow = Timestamp::Object(TimestampObject {
            seconds: i64::MIN / 100,
            nanoseconds: -999_999_999,
        });
        assert_eq!(underflow.to_millis(), None);
        assert_eq!(Timestamp::Number(1e300).to_millis(), None);
        assert_eq!(Timestamp::Text("9e99".into()).to_millis(), None);

        // An unreadable expiry never lapses, same as a missing one.
        assert!(is_active_until(Some(&huge), now()));
    }

    #[test]
    fn active_until_is_strictly_future() {
        let now = now();
        let past = Timestamp::from(now - chrono::Duration::seconds(1));
        let exact = Timestamp::from(now);
        let future = Timestamp::from(now + chrono::Duration::days(30));

        assert!(is_active_until(None, now));
        assert!(!is_active_until(Some(&past), now));
        assert!(!is_active_until(Some(&exact), now));
        assert!(is_active_until(Some(&future), now));
        assert!(is_active_until(Some(&Timestamp::Text("n/a".into())), now));

        assert!(is_active_until_millis(None, now));
        assert!(!is_active_until_millis(Some(now.timestamp_millis()), now));
        assert!(is_active_until_millis(Some(now.timestamp_millis() + 1), now));
    }
}
