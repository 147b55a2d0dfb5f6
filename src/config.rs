use crate::{
    connection_string::{ConnectionString, DEFAULT_INGESTION_ENDPOINT},
    plugin::Extension,
    Error,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, time::Duration};

/// Pipeline configuration.
///
/// Deserializes from the usual camelCase JSON configuration. Every field has a default, so a
/// configuration only needs an instrumentation key or a connection string.
///
/// Channel settings can be overridden per extension through `extensionConfig`, keyed by the
/// extension identifier:
///
/// ```
/// let config: appinsights_channel::Config = serde_json::from_str(r#"{
///     "instrumentationKey": "00000000-0000-0000-0000-000000000000",
///     "maxBatchInterval": 5000,
///     "extensionConfig": {
///         "AppInsightsChannelPlugin": { "maxBatchInterval": 1000 }
///     }
/// }"#).unwrap();
/// assert_eq!(5000, config.max_batch_interval);
/// ```
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Instrumentation key telemetry is sent with.
    pub instrumentation_key: Option<String>,
    /// Connection string, e.g. `InstrumentationKey=...;IngestionEndpoint=https://...`. Provides
    /// the instrumentation key and the endpoint when they are not set directly.
    pub connection_string: Option<String>,
    /// URL batches are posted to.
    pub endpoint_url: Option<String>,
    /// Send batches as newline delimited JSON instead of a JSON array.
    pub emit_line_delimited_json: bool,
    /// Maximum time in milliseconds telemetry waits in the buffer before it is sent.
    pub max_batch_interval: u64,
    /// Maximum size of a batch. Adding an item that would exceed it sends the current batch
    /// first.
    pub max_batch_size_in_bytes: usize,
    /// Kill switch. Telemetry is dropped and nothing is sent.
    pub disable_telemetry: bool,
    /// Mirror the buffer into durable storage so telemetry survives a reload.
    pub enable_session_storage_buffer: bool,
    /// Never retry failed batches.
    pub is_retry_disabled: bool,
    /// Do not use the beacon transport for regular sends.
    pub is_beacon_api_disabled: bool,
    /// Do not use the beacon transport for the final flush on unload.
    pub onunload_disable_beacon: bool,
    /// Namespace for durable storage keys.
    pub name_prefix: Option<String>,
    /// Percentage of telemetry represented by each sent item.
    pub sampling_percentage: f64,
    /// Per extension overrides of the settings above, keyed by extension identifier.
    pub extension_config: BTreeMap<String, Value>,
    /// Extensions added to the ones passed to `initialize`.
    #[serde(skip)]
    pub extensions: Vec<Extension>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instrumentation_key: None,
            connection_string: None,
            endpoint_url: None,
            emit_line_delimited_json: false,
            max_batch_interval: 15_000,
            max_batch_size_in_bytes: 102_400,
            disable_telemetry: false,
            enable_session_storage_buffer: true,
            is_retry_disabled: false,
            is_beacon_api_disabled: true,
            onunload_disable_beacon: false,
            name_prefix: None,
            sampling_percentage: 100.0,
            extension_config: BTreeMap::new(),
            extensions: Vec::new(),
        }
    }
}

impl Config {
    /// Config with the given instrumentation key and defaults for everything else.
    pub fn with_instrumentation_key(instrumentation_key: impl Into<String>) -> Self {
        Config {
            instrumentation_key: Some(instrumentation_key.into()),
            ..Config::default()
        }
    }

    fn connection_string(&self) -> Result<Option<ConnectionString>, Error> {
        match self.connection_string.as_deref() {
            Some(cs) if !cs.trim().is_empty() => Ok(Some(cs.parse()?)),
            _ => Ok(None),
        }
    }

    /// Instrumentation key, taken from the connection string when not set directly.
    pub(crate) fn resolve_instrumentation_key(&self) -> Result<String, Error> {
        match self.instrumentation_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => self
                .connection_string()?
                .map(|cs| cs.instrumentation_key)
                .ok_or(Error::MissingInstrumentationKey),
        }
    }

    fn resolve_endpoint(&self) -> Result<String, Error> {
        match self.endpoint_url.as_deref() {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => Ok(self
                .connection_string()?
                .map(|cs| cs.track_endpoint())
                .unwrap_or_else(|| format!("{}/v2/track", DEFAULT_INGESTION_ENDPOINT))),
        }
    }

    /// This config with `extensionConfig[identifier]` applied on top.
    fn for_extension(&self, identifier: &str) -> Result<Config, Error> {
        let overrides = match self.extension_config.get(identifier) {
            Some(Value::Object(overrides)) => overrides,
            _ => return Ok(self.shallow_clone()),
        };
        let mut merged = serde_json::to_value(self)?;
        if let Value::Object(merged) = &mut merged {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    fn shallow_clone(&self) -> Config {
        Config {
            instrumentation_key: self.instrumentation_key.clone(),
            connection_string: self.connection_string.clone(),
            endpoint_url: self.endpoint_url.clone(),
            emit_line_delimited_json: self.emit_line_delimited_json,
            max_batch_interval: self.max_batch_interval,
            max_batch_size_in_bytes: self.max_batch_size_in_bytes,
            disable_telemetry: self.disable_telemetry,
            enable_session_storage_buffer: self.enable_session_storage_buffer,
            is_retry_disabled: self.is_retry_disabled,
            is_beacon_api_disabled: self.is_beacon_api_disabled,
            onunload_disable_beacon: self.onunload_disable_beacon,
            name_prefix: self.name_prefix.clone(),
            sampling_percentage: self.sampling_percentage,
            extension_config: self.extension_config.clone(),
            extensions: Vec::new(),
        }
    }
}

/// Channel settings after defaults and per extension overrides are applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SenderConfig {
    pub(crate) instrumentation_key: String,
    pub(crate) endpoint_url: String,
    pub(crate) emit_line_delimited_json: bool,
    pub(crate) max_batch_interval: Duration,
    pub(crate) max_batch_size_in_bytes: usize,
    pub(crate) disable_telemetry: bool,
    pub(crate) enable_session_storage_buffer: bool,
    pub(crate) is_retry_disabled: bool,
    pub(crate) is_beacon_api_disabled: bool,
    pub(crate) onunload_disable_beacon: bool,
    pub(crate) name_prefix: Option<String>,
    pub(crate) sample_rate: f64,
}

impl SenderConfig {
    pub(crate) fn resolve(config: &Config, identifier: &str) -> Result<SenderConfig, Error> {
        let config = config.for_extension(identifier)?;
        Ok(SenderConfig {
            instrumentation_key: config.resolve_instrumentation_key()?,
            endpoint_url: config.resolve_endpoint()?,
            emit_line_delimited_json: config.emit_line_delimited_json,
            max_batch_interval: Duration::from_millis(config.max_batch_interval),
            max_batch_size_in_bytes: config.max_batch_size_in_bytes,
            disable_telemetry: config.disable_telemetry,
            enable_session_storage_buffer: config.enable_session_storage_buffer,
            is_retry_disabled: config.is_retry_disabled,
            is_beacon_api_disabled: config.is_beacon_api_disabled,
            onunload_disable_beacon: config.onunload_disable_beacon,
            name_prefix: config.name_prefix.filter(|p| !p.is_empty()),
            sample_rate: config.sampling_percentage,
        })
    }
}
