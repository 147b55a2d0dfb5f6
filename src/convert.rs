use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::time::{Duration, SystemTime};

/// Formats a duration as the `d.hh:mm:ss.ffffff` time span expected by the ingestion endpoint.
pub(crate) fn duration_to_string(duration: Duration) -> String {
    let micros = duration.as_micros();
    let s = micros / 1_000_000 % 60;
    let m = micros / 1_000_000 / 60 % 60;
    let h = micros / 1_000_000 / 60 / 60 % 24;
    let d = micros / 1_000_000 / 60 / 60 / 24;
    let micros_remaining = micros % 1_000_000;
    format!(
        "{}.{:0>2}:{:0>2}:{:0>2}.{:0>6}",
        d, h, m, s, micros_remaining
    )
}

/// Converts a millisecond count as found in telemetry payloads into a duration. Negative and
/// non-finite values become zero, values too large for a [`Duration`] saturate.
pub(crate) fn ms_to_duration(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Time span string for a JSON value holding milliseconds (number or numeric string).
pub(crate) fn value_to_time_span(value: &Value) -> String {
    duration_to_string(ms_to_duration(value_to_f64(value).unwrap_or(0.0)))
}

/// `None` for times outside the range chrono can represent.
pub(crate) fn system_time_to_datetime(time: SystemTime) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(since) => (i64::try_from(since.as_secs()).ok()?, since.subsec_nanos()),
        Err(err) => {
            let before = err.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => (-secs, 0),
                nanos => (-secs - 1, 1_000_000_000 - nanos),
            }
        }
    };
    DateTime::<Utc>::from_timestamp(secs, nanos)
}

/// ISO-8601 timestamp with millisecond precision. Times chrono cannot represent are rendered as
/// the Unix epoch; callers replace them before they get here.
pub(crate) fn time_to_string(time: SystemTime) -> String {
    system_time_to_datetime(time)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Numeric interpretation of a JSON value, accepting numeric strings the way custom measurements
/// are commonly passed around.
pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String form of a custom property value: strings verbatim, `null` as `"null"`, anything else as
/// its JSON text.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".into(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(Duration::from_micros(123456789123), "1.10:17:36.789123" ; "all")]
    #[test_case(Duration::from_millis(1500), "0.00:00:01.500000" ; "millis")]
    fn duration(duration: Duration, expected: &'static str) {
        assert_eq!(expected.to_string(), duration_to_string(duration));
    }

    #[test_case(-5.0, Duration::ZERO ; "negative")]
    #[test_case(f64::NAN, Duration::ZERO ; "nan")]
    #[test_case(250.0, Duration::from_millis(250) ; "positive")]
    #[test_case(1e300, Duration::MAX ; "too large")]
    fn millis(ms: f64, expected: Duration) {
        assert_eq!(expected, ms_to_duration(ms));
    }

    #[test]
    fn time() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(1_596_665_700_123);
        assert_eq!("2020-08-05T22:15:00.123Z", time_to_string(time));
    }

    #[test]
    fn time_before_epoch() {
        let time = SystemTime::UNIX_EPOCH - Duration::from_millis(1500);
        assert_eq!("1969-12-31T23:59:58.500Z", time_to_string(time));
    }

    #[test]
    fn time_out_of_range() {
        let time = SystemTime::UNIX_EPOCH
            .checked_add(Duration::from_secs(u64::MAX / 4))
            .unwrap();
        assert_eq!(None, system_time_to_datetime(time));
        assert_eq!("1970-01-01T00:00:00.000Z", time_to_string(time));
    }

    #[test]
    fn property_strings() {
        assert_eq!("text", value_to_string(&json!("text")));
        assert_eq!("null", value_to_string(&json!(null)));
        assert_eq!("true", value_to_string(&json!(true)));
        assert_eq!("{\"a\":1}", value_to_string(&json!({"a": 1})));
    }
}
