use std::str::FromStr;

pub(crate) const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com";
const TRACK_PATH: &str = "/v2/track";

/// Instrumentation key and ingestion endpoint extracted from a connection string such as
/// `InstrumentationKey=...;IngestionEndpoint=https://westus2-0.in.applicationinsights.azure.com/`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConnectionString {
    pub(crate) instrumentation_key: String,
    pub(crate) ingestion_endpoint: String,
}

/// Reasons a connection string is rejected.
#[derive(thiserror::Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// A field is not of the form `key=value`.
    #[error("invalid format")]
    InvalidFormat,
    /// No `InstrumentationKey` field.
    #[error("missing instrumentation key")]
    MissingInstrumentationKey,
    /// `Authorization` is set to something other than `ikey`.
    #[error("unsupported authorization; only \"ikey\" is supported")]
    UnsupportedAuthorization,
    /// The endpoint is not an absolute http(s) URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ConnectionString {
    /// URL telemetry batches are posted to.
    pub(crate) fn track_endpoint(&self) -> String {
        format!("{}{}", self.ingestion_endpoint, TRACK_PATH)
    }
}

impl FromStr for ConnectionString {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut instrumentation_key = None;
        let mut ingestion_endpoint = None;
        let mut endpoint_suffix = None;
        let mut location = None;

        for field in s.split(';').map(str::trim).filter(|f| !f.is_empty()) {
            let (key, value) = match field.split_once('=') {
                Some((key, value)) if !value.contains('=') => (key.trim(), value.trim()),
                _ => return Err(ParseError::InvalidFormat),
            };
            match key.to_ascii_lowercase().as_str() {
                "instrumentationkey" => instrumentation_key = Some(value.to_string()),
                "ingestionendpoint" => ingestion_endpoint = Some(value.to_string()),
                "endpointsuffix" => endpoint_suffix = Some(value.to_string()),
                "location" => location = Some(value.to_string()),
                "authorization" if !value.eq_ignore_ascii_case("ikey") => {
                    return Err(ParseError::UnsupportedAuthorization)
                }
                _ => {}
            }
        }

        let ingestion_endpoint = match (ingestion_endpoint, endpoint_suffix) {
            (Some(endpoint), _) => sanitize_url(&endpoint)?,
            (None, Some(suffix)) => {
                let prefix = location.map(|l| format!("{}.", l)).unwrap_or_default();
                sanitize_url(&format!("https://{}dc.{}", prefix, suffix))?
            }
            (None, None) => DEFAULT_INGESTION_ENDPOINT.to_string(),
        };

        Ok(ConnectionString {
            instrumentation_key: instrumentation_key
                .filter(|k| !k.is_empty())
                .ok_or(ParseError::MissingInstrumentationKey)?,
            ingestion_endpoint,
        })
    }
}

fn sanitize_url(url: &str) -> Result<String, ParseError> {
    let url = url.trim().trim_end_matches('/');
    let url = match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    };
    match url.parse::<http::Uri>() {
        Ok(uri) if uri.scheme_str() == Some("https") && uri.authority().is_some() => Ok(url),
        _ => Err(ParseError::InvalidEndpoint(url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        "Authorization=ikey;InstrumentationKey=instr_key;IngestionEndpoint=https://ingest",
        "https://ingest",
        "instr_key" ; "default")]
    #[test_case(
        "InstrumentationKey=instr_key;IngestionEndpoint= http://ingest/  ",
        "https://ingest",
        "instr_key" ; "sanitize url")]
    #[test_case(
        "Foo=1;InstrumentationKey=instr_key;Bar=2;IngestionEndpoint=https://ingest;",
        "https://ingest",
        "instr_key" ; "ignore unknown fields")]
    #[test_case(
        "InstrumentationKey=instr_key",
        DEFAULT_INGESTION_ENDPOINT,
        "instr_key" ; "default endpoint")]
    #[test_case(
        "InstrumentationKey=instr_key;EndpointSuffix=ai.contoso.com;Location=westus2",
        "https://westus2.dc.ai.contoso.com",
        "instr_key" ; "endpoint suffix & location")]
    fn parse_succeeds(
        connection_string: &'static str,
        expected_ingestion_endpoint: &'static str,
        expected_instrumentation_key: &'static str,
    ) {
        let result: ConnectionString = connection_string.parse().unwrap();
        assert_eq!(expected_ingestion_endpoint, result.ingestion_endpoint);
        assert_eq!(expected_instrumentation_key, result.instrumentation_key);
    }

    #[test_case("Authorization=foo;InstrumentationKey=instr_key" ; "authorization != ikey")]
    #[test_case("InstrumentationKey=instr_key;NoValue" ; "field without value")]
    #[test_case("InstrumentationKey=instr_key;InvalidValue=foo=bar" ; "2 equals signs")]
    #[test_case("IngestionEndpoint=https://ingest" ; "no instrumentation key")]
    #[test_case("InstrumentationKey=instr_key;IngestionEndpoint=ftp:/foo" ; "invalid endpoint uri")]
    fn parse_fails(connection_string: &'static str) {
        connection_string.parse::<ConnectionString>().unwrap_err();
    }

    #[test]
    fn track_endpoint_appends_path() {
        let cs: ConnectionString = "InstrumentationKey=k;IngestionEndpoint=https://ingest/"
            .parse()
            .unwrap();
        assert_eq!("https://ingest/v2/track", cs.track_endpoint());
    }
}
