//! Ways a batch can leave the process.

use crate::storage::DurableStorage;
use bytes::Bytes;
use http::{header::CONTENT_TYPE, Request, Uri};
use opentelemetry_http::HttpClient;
use std::{fmt::Debug, sync::Arc};

const SDK_CONTEXT_HEADER: &str = "Sdk-Context";
const SDK_CONTEXT_HEADER_APP_ID_REQUEST: &str = "appId";

/// Hosts that understand the `Sdk-Context` header.
const INTERNAL_ENDPOINTS: [&str; 3] = [
    "dc.services.visualstudio.com",
    "breeze.aimon.applicationinsights.io",
    "dc-int.services.visualstudio.com",
];

/// Fire-and-forget delivery that keeps working while the host shuts down, like the browser's
/// `navigator.sendBeacon`.
pub trait BeaconSender: Debug + Send + Sync {
    /// Queue `body` for delivery to `url`. Returns `false` if the payload was not accepted.
    fn send_beacon(&self, url: &str, body: Bytes) -> bool;
}

/// Capabilities of the host a [`Sender`](crate::Sender) can use.
#[derive(Debug, Default, Clone)]
pub struct SenderEnvironment {
    pub(crate) client: Option<Arc<dyn HttpClient>>,
    pub(crate) legacy_client: Option<Arc<dyn HttpClient>>,
    pub(crate) beacon: Option<Arc<dyn BeaconSender>>,
    pub(crate) storage: Option<Arc<dyn DurableStorage>>,
    pub(crate) page_protocol: Option<String>,
}

impl SenderEnvironment {
    /// An environment without any transport. Add at least one before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP client with full request and response access.
    pub fn with_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// HTTP client that cannot set headers or read status codes reliably. Only the response body
    /// is inspected.
    pub fn with_legacy_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.legacy_client = Some(client);
        self
    }

    /// Beacon transport.
    pub fn with_beacon(mut self, beacon: Arc<dyn BeaconSender>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    /// Durable storage for the persistent buffer.
    pub fn with_storage(mut self, storage: Arc<dyn DurableStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Protocol of the hosting page, e.g. `https`. The legacy client only works when it matches
    /// the endpoint's.
    pub fn with_page_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.page_protocol = Some(protocol.into().trim_end_matches(':').to_ascii_lowercase());
        self
    }
}

/// Transport a channel sends its batches with.
#[derive(Debug, Clone)]
pub(crate) enum Transport {
    Beacon(Arc<dyn BeaconSender>),
    Full(Arc<dyn HttpClient>),
    Legacy(Arc<dyn HttpClient>),
}

/// Picks the first transport the environment supports: beacon (unless disabled), then the full
/// HTTP client, then the legacy client.
pub(crate) fn select(environment: &SenderEnvironment, beacon_disabled: bool) -> Option<Transport> {
    let probes: [&dyn Fn() -> Option<Transport>; 3] = [
        &|| {
            environment
                .beacon
                .clone()
                .filter(|_| !beacon_disabled)
                .map(Transport::Beacon)
        },
        &|| environment.client.clone().map(Transport::Full),
        &|| environment.legacy_client.clone().map(Transport::Legacy),
    ];
    probes
        .iter()
        .fold(None, |selected, probe| selected.or_else(|| probe()))
}

pub(crate) fn is_internal_endpoint(endpoint: &str) -> bool {
    endpoint
        .parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(|h| h.to_ascii_lowercase()))
        .map_or(false, |host| INTERNAL_ENDPOINTS.contains(&host.as_str()))
}

/// Whether the legacy client can reach `endpoint` from a page served over `page_protocol`.
pub(crate) fn protocol_matches(page_protocol: Option<&str>, endpoint: &str) -> bool {
    match page_protocol {
        None => true,
        Some(protocol) => endpoint
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.scheme_str().map(|s| s.eq_ignore_ascii_case(protocol)))
            .unwrap_or(false),
    }
}

pub(crate) fn full_request(
    endpoint: &str,
    body: String,
    line_delimited: bool,
) -> Result<Request<Bytes>, http::Error> {
    let content_type = if line_delimited {
        "application/x-json-stream"
    } else {
        "application/json"
    };
    let mut builder = Request::post(endpoint).header(CONTENT_TYPE, content_type);
    if is_internal_endpoint(endpoint) {
        builder = builder.header(SDK_CONTEXT_HEADER, SDK_CONTEXT_HEADER_APP_ID_REQUEST);
    }
    builder.body(Bytes::from(body))
}

pub(crate) fn legacy_request(endpoint: &str, body: String) -> Result<Request<Bytes>, http::Error> {
    Request::post(endpoint).body(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::Response;
    use opentelemetry_http::HttpError;
    use test_case::test_case;

    #[derive(Debug)]
    struct NoopClient;

    #[async_trait]
    impl HttpClient for NoopClient {
        async fn send_bytes(&self, _request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            Ok(Response::new(Bytes::new()))
        }
    }

    #[derive(Debug)]
    struct NoopBeacon;

    impl BeaconSender for NoopBeacon {
        fn send_beacon(&self, _url: &str, _body: Bytes) -> bool {
            true
        }
    }

    fn environment() -> SenderEnvironment {
        SenderEnvironment::new()
            .with_beacon(Arc::new(NoopBeacon))
            .with_client(Arc::new(NoopClient))
            .with_legacy_client(Arc::new(NoopClient))
    }

    #[test]
    fn selection_prefers_beacon_unless_disabled() {
        assert!(matches!(select(&environment(), false), Some(Transport::Beacon(_))));
        assert!(matches!(select(&environment(), true), Some(Transport::Full(_))));
    }

    #[test]
    fn selection_falls_back_to_legacy() {
        let environment = SenderEnvironment::new().with_legacy_client(Arc::new(NoopClient));
        assert!(matches!(select(&environment, true), Some(Transport::Legacy(_))));
        assert!(select(&SenderEnvironment::new(), false).is_none());
    }

    #[test_case("https://dc.services.visualstudio.com/v2/track", true ; "default endpoint")]
    #[test_case("https://breeze.aimon.applicationinsights.io/v2/track", true ; "breeze")]
    #[test_case("https://westus2-0.in.applicationinsights.azure.com/v2/track", false ; "regional")]
    fn internal_endpoints(endpoint: &str, expected: bool) {
        assert_eq!(expected, is_internal_endpoint(endpoint));
    }

    #[test]
    fn full_request_headers() {
        let request = full_request("https://dc.services.visualstudio.com/v2/track", "[]".into(), false).unwrap();
        assert_eq!("application/json", request.headers()[CONTENT_TYPE]);
        assert_eq!("appId", request.headers()[SDK_CONTEXT_HEADER]);

        let request = full_request("https://example.com/v2/track", "{}".into(), true).unwrap();
        assert_eq!("application/x-json-stream", request.headers()[CONTENT_TYPE]);
        assert!(request.headers().get(SDK_CONTEXT_HEADER).is_none());
    }

    #[test_case(None, "http://example.com", true ; "unknown page")]
    #[test_case(Some("https"), "https://example.com", true ; "same")]
    #[test_case(Some("http"), "https://example.com", false ; "mismatch")]
    fn legacy_protocol(page: Option<&str>, endpoint: &str, expected: bool) {
        assert_eq!(expected, protocol_matches(page, endpoint));
    }
}
