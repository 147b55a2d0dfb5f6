use crate::error::DeliveryError;
use serde::Deserialize;
use std::time::Duration;

pub(crate) const STATUS_PARTIAL_CONTENT: u16 = 206;
const STATUS_REQUEST_TIMEOUT: u16 = 408;
const STATUS_TOO_MANY_REQUESTS: u16 = 429;
const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;
const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

const MIN_RETRY_DELAY_SECS: f64 = 10.0;
const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

/// Response body of the ingestion endpoint.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Transmission {
    pub(crate) items_received: usize,
    pub(crate) items_accepted: usize,
    pub(crate) errors: Vec<TransmissionItem>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct TransmissionItem {
    pub(crate) index: usize,
    pub(crate) status_code: u16,
    pub(crate) message: Option<String>,
}

impl Transmission {
    /// Parses a response body. Bodies that do not account for every rejected item are invalid.
    pub(crate) fn parse(body: &[u8]) -> Result<Transmission, DeliveryError> {
        let transmission: Transmission = serde_json::from_slice(body)
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;
        if transmission.items_received == 0
            || transmission.items_received < transmission.items_accepted
            || transmission.items_received - transmission.items_accepted
                != transmission.errors.len()
        {
            return Err(DeliveryError::InvalidResponse(format!(
                "received {}, accepted {}, {} errors",
                transmission.items_received,
                transmission.items_accepted,
                transmission.errors.len()
            )));
        }
        Ok(transmission)
    }

    /// Some items were rejected.
    pub(crate) fn is_partial(&self) -> bool {
        self.items_received > self.items_accepted
    }
}

/// Determines whether a request or telemetry item answered with this status may be sent again.
pub(crate) fn is_retriable(status: u16) -> bool {
    status == STATUS_REQUEST_TIMEOUT
        || status == STATUS_TOO_MANY_REQUESTS
        || status == STATUS_INTERNAL_SERVER_ERROR
        || status == STATUS_SERVICE_UNAVAILABLE
}

/// Outcome of a partially accepted batch.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct PartialOutcome {
    /// Payloads the endpoint did not complain about.
    pub(crate) accepted: Vec<String>,
    /// Payloads rejected with a retriable status.
    pub(crate) retry: Vec<String>,
    /// Payloads rejected for good, with the reason.
    pub(crate) failed: Vec<(String, TransmissionItem)>,
    /// Error entries whose index does not exist in the batch.
    pub(crate) out_of_range: Vec<TransmissionItem>,
}

/// Splits a sent batch according to the per-item errors of a response. Errors are applied in
/// descending index order so earlier indices stay valid while entries are taken out.
pub(crate) fn split_partial(payloads: &[String], errors: Vec<TransmissionItem>) -> PartialOutcome {
    let mut remaining: Vec<Option<String>> = payloads.iter().cloned().map(Some).collect();
    let mut errors = errors;
    errors.sort_by(|a, b| b.index.cmp(&a.index));

    let mut outcome = PartialOutcome::default();
    for error in errors {
        match remaining.get_mut(error.index).and_then(Option::take) {
            Some(payload) if is_retriable(error.status_code) => outcome.retry.push(payload),
            Some(payload) => outcome.failed.push((payload, error)),
            None => outcome.out_of_range.push(error),
        }
    }
    outcome.accepted = remaining.into_iter().flatten().collect();
    outcome
}

/// Delay before the next attempt after `consecutive_errors` failures in a row.
///
/// The first failure waits the minimum delay. Afterwards the delay is drawn from an exponentially
/// growing window using `random` in `[0, 1)`, clamped to the minimum and maximum delay.
pub(crate) fn retry_delay(consecutive_errors: u32, random: f64) -> Duration {
    let seconds = if consecutive_errors <= 1 {
        MIN_RETRY_DELAY_SECS
    } else {
        let exponent = consecutive_errors.min(64) as i32;
        let slot = (2f64.powi(exponent) - 1.0) / 2.0;
        (random * slot * 10.0).floor() + 1.0
    };
    Duration::from_secs_f64(seconds.clamp(MIN_RETRY_DELAY_SECS, MAX_RETRY_DELAY_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn payloads(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{}", i)).collect()
    }

    fn error(index: usize, status_code: u16) -> TransmissionItem {
        TransmissionItem {
            index,
            status_code,
            message: None,
        }
    }

    #[test]
    fn partial_success_splits_batch() {
        let outcome = split_partial(&payloads(5), vec![error(4, 500), error(1, 400)]);
        assert_eq!(vec!["p0", "p2", "p3"], outcome.accepted);
        assert_eq!(vec!["p4"], outcome.retry);
        assert_eq!(1, outcome.failed.len());
        assert_eq!("p1", outcome.failed[0].0);
        assert!(outcome.out_of_range.is_empty());
    }

    #[test]
    fn out_of_range_errors_are_reported() {
        let outcome = split_partial(&payloads(2), vec![error(7, 500), error(0, 429)]);
        assert_eq!(vec!["p1"], outcome.accepted);
        assert_eq!(vec!["p0"], outcome.retry);
        assert_eq!(vec![error(7, 500)], outcome.out_of_range);
    }

    #[test]
    fn parses_valid_transmission() {
        let body = br#"{"itemsReceived":3,"itemsAccepted":2,"errors":[{"index":1,"statusCode":500,"message":"Internal"}]}"#;
        let transmission = Transmission::parse(body).unwrap();
        assert!(transmission.is_partial());
        assert_eq!(Some("Internal".to_string()), transmission.errors[0].message);
    }

    #[test_case(b"not json" ; "not json")]
    #[test_case(br#"{"itemsReceived":0,"itemsAccepted":0,"errors":[]}"# ; "nothing received")]
    #[test_case(br#"{"itemsReceived":3,"itemsAccepted":1,"errors":[{"index":1,"statusCode":500}]}"# ; "errors missing")]
    #[test_case(br#"{"itemsReceived":1,"itemsAccepted":2,"errors":[]}"# ; "more accepted than received")]
    fn rejects_invalid_transmission(body: &[u8]) {
        assert!(Transmission::parse(body).is_err());
    }

    #[test_case(408, true)]
    #[test_case(429, true)]
    #[test_case(500, true)]
    #[test_case(503, true)]
    #[test_case(400, false)]
    #[test_case(439, false)]
    fn retriable_statuses(status: u16, expected: bool) {
        assert_eq!(expected, is_retriable(status));
    }

    #[test]
    fn first_retry_waits_minimum() {
        assert_eq!(Duration::from_secs(10), retry_delay(0, 0.99));
        assert_eq!(Duration::from_secs(10), retry_delay(1, 0.99));
    }

    #[test]
    fn backoff_is_bounded() {
        for n in 1..=10 {
            for random in [0.0, 0.25, 0.5, 0.999_999] {
                let delay = retry_delay(n, random);
                assert!(delay >= Duration::from_secs(10), "n={} r={}", n, random);
                assert!(delay <= Duration::from_secs(3600), "n={} r={}", n, random);
            }
        }
        assert_eq!(Duration::from_secs(3600), retry_delay(40, 0.999));
    }

    #[test]
    fn backoff_grows_with_errors() {
        // n = 4: slot = 7.5, delay = floor(0.5 * 75) + 1
        assert_eq!(Duration::from_secs(38), retry_delay(4, 0.5));
    }
}
