//! The transmission channel.
//!
//! [`Sender`] turns telemetry items into envelopes, buffers them and sends them in batches. A
//! batch goes out when the batch interval elapses, when the next item would make it too large,
//! on [`flush`](TelemetryPlugin::flush) and on unload. Rejected batches are retried with
//! exponential backoff; partially accepted batches are split and only the retriable remainder is
//! sent again.

use crate::{
    clock::Clock,
    config::SenderConfig,
    convert::system_time_to_datetime,
    diagnostics::{DiagnosticLogger, MessageId, Severity},
    envelope_creator::create_envelope,
    error::DeliveryError,
    notification::{NotificationManager, SendRequestReason},
    plugin::{CoreContext, Plugin, ProcessContext, TelemetryPlugin},
    send_buffer::{ArraySendBuffer, SendBuffer, SessionStorageSendBuffer},
    serializer::Serializer,
    telemetry::TelemetryItem,
    transport::{self, BeaconSender, SenderEnvironment, Transport},
    uploader::{self, Transmission, STATUS_PARTIAL_CONTENT},
    Config, Error,
};
use async_trait::async_trait;
use bytes::Bytes;
use opentelemetry_http::HttpClient;
use serde_json::json;
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

/// Identifier of the channel unless changed with [`Sender::with_identifier`].
pub const SENDER_IDENTIFIER: &str = "AppInsightsChannelPlugin";

const SENDER_PRIORITY: u32 = 1001;
const DEFAULT_BASE_TYPE: &str = "EventData";

/// Lifecycle of a [`Sender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Created, not yet initialized.
    Uninitialized,
    /// Ready, no batch in flight.
    Idle,
    /// A batch is being sent.
    Flushing,
    /// Torn down. Telemetry is dropped.
    TornDown,
}

/// Channel delivering telemetry to the ingestion endpoint.
#[derive(Debug)]
pub struct Sender {
    identifier: String,
    environment: SenderEnvironment,
    state: SenderState,
    channel: Option<Channel>,
}

impl Sender {
    /// Create a channel sending through the transports available in `environment`.
    pub fn new(environment: SenderEnvironment) -> Self {
        Sender {
            identifier: SENDER_IDENTIFIER.to_string(),
            environment,
            state: SenderState::Uninitialized,
            channel: None,
        }
    }

    /// Use a different identifier. Needed when several channels are registered; the identifier
    /// also selects the `extensionConfig` section and namespaces the durable buffer.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Number of payloads waiting to be sent.
    pub fn buffered(&self) -> usize {
        self.channel.as_ref().map_or(0, |c| c.buffer.count())
    }

    /// Number of failed sends in a row.
    pub fn consecutive_errors(&self) -> u32 {
        self.channel.as_ref().map_or(0, |c| c.consecutive_errors)
    }

    async fn trigger_send(&mut self, reason: SendRequestReason, use_beacon: bool) {
        if self.state == SenderState::TornDown {
            return;
        }
        if let Some(channel) = self.channel.as_mut() {
            self.state = SenderState::Flushing;
            channel.trigger_send(reason, use_beacon).await;
            self.state = SenderState::Idle;
        }
    }
}

impl Plugin for Sender {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn priority(&self) -> u32 {
        SENDER_PRIORITY
    }

    fn initialize(&mut self, config: &Config, ctx: &CoreContext) -> Result<(), Error> {
        if self.state != SenderState::Uninitialized {
            return Err(Error::AlreadyInitialized);
        }
        let config = SenderConfig::resolve(config, &self.identifier)?;
        self.channel = Some(Channel::new(config, &self.identifier, &self.environment, ctx));
        self.state = SenderState::Idle;
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.timer = None;
        }
        self.state = SenderState::TornDown;
    }
}

#[async_trait]
impl TelemetryPlugin for Sender {
    async fn process_telemetry(&mut self, item: TelemetryItem, ctx: &mut ProcessContext<'_>) {
        if self.state == SenderState::TornDown {
            if let Some(channel) = self.channel.as_ref() {
                channel.logger.warning(
                    MessageId::SenderTornDown,
                    "Channel was torn down. Telemetry dropped",
                );
            }
            return;
        }
        let channel = match self.channel.as_mut() {
            Some(channel) => channel,
            None => {
                #[cfg(feature = "internal-logs")]
                tracing::error!(
                    target: "appinsights_channel",
                    identifier = %self.identifier,
                    "Telemetry sent to a channel that is not initialized"
                );
                return;
            }
        };

        if channel.config.disable_telemetry {
            return;
        }

        let item = match channel.prepare(item) {
            Some(item) => item,
            None => return,
        };
        let payload = channel.serialize(&item);

        let pending = channel.buffer.batch_size();
        if pending > 0 && pending + payload.len() > channel.config.max_batch_size_in_bytes {
            self.trigger_send(SendRequestReason::MaxBatchSize, false).await;
        }

        if let Some(channel) = self.channel.as_mut() {
            channel.buffer.enqueue(payload);
            channel.setup_timer();
        }

        ctx.process_next(item).await;
    }

    async fn flush(&mut self) {
        if self.channel.as_ref().map_or(false, |c| !c.paused) {
            self.trigger_send(SendRequestReason::ManualFlush, false).await;
        }
    }

    async fn unload_flush(&mut self) {
        let use_beacon = match self.channel.as_ref() {
            Some(channel) if !channel.paused => channel.unload_uses_beacon(),
            _ => return,
        };
        self.trigger_send(SendRequestReason::Unload, use_beacon).await;
    }

    async fn poll_timer(&mut self) {
        let due = match self.channel.as_mut() {
            Some(channel) if !channel.paused => match channel.timer {
                Some(deadline) if channel.clock.now() >= deadline => {
                    channel.timer = None;
                    true
                }
                _ => false,
            },
            _ => false,
        };
        if due {
            self.trigger_send(SendRequestReason::NormalSchedule, false).await;
        }
    }

    fn next_deadline(&self) -> Option<SystemTime> {
        self.channel
            .as_ref()
            .filter(|c| !c.paused && self.state != SenderState::TornDown)
            .and_then(|c| c.timer)
    }

    fn pause(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.paused = true;
        }
    }

    fn resume(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.paused = false;
            channel.setup_timer();
        }
    }
}

/// Runtime state of an initialized [`Sender`].
#[derive(Debug)]
struct Channel {
    config: SenderConfig,
    logger: Arc<DiagnosticLogger>,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationManager>,
    buffer: Box<dyn SendBuffer>,
    transport: Option<Transport>,
    client: Option<Arc<dyn HttpClient>>,
    beacon: Option<Arc<dyn BeaconSender>>,
    page_protocol: Option<String>,
    consecutive_errors: u32,
    retry_at: Option<SystemTime>,
    last_send: Option<SystemTime>,
    timer: Option<SystemTime>,
    paused: bool,
}

impl Channel {
    fn new(
        config: SenderConfig,
        identifier: &str,
        environment: &SenderEnvironment,
        ctx: &CoreContext,
    ) -> Self {
        let buffer: Box<dyn SendBuffer> = match environment.storage.as_ref() {
            Some(storage) if config.enable_session_storage_buffer && storage.is_available() => {
                Box::new(SessionStorageSendBuffer::new(
                    storage.clone(),
                    ctx.logger.clone(),
                    identifier,
                    config.name_prefix.as_deref(),
                    config.emit_line_delimited_json,
                ))
            }
            _ => Box::new(ArraySendBuffer::new(
                ctx.logger.clone(),
                config.emit_line_delimited_json,
            )),
        };
        let transport = transport::select(environment, config.is_beacon_api_disabled);

        Channel {
            logger: ctx.logger.clone(),
            clock: ctx.clock.clone(),
            notifications: ctx.notifications.clone(),
            buffer,
            transport,
            client: environment.client.clone(),
            beacon: environment.beacon.clone(),
            page_protocol: environment.page_protocol.clone(),
            consecutive_errors: 0,
            retry_at: None,
            last_send: None,
            timer: None,
            paused: false,
            config,
        }
    }

    /// Validates an item and fills in channel defaults. `None` if it has to be dropped.
    fn prepare(&self, mut item: TelemetryItem) -> Option<TelemetryItem> {
        if self.transport.is_none() {
            self.logger.critical(
                MessageId::SenderNotInitialized,
                "Sender was not initialized with a transport",
            );
            return None;
        }
        if item.base_data.is_some() && item.base_type.is_none() {
            self.logger.critical(
                MessageId::InvalidEvent,
                "Cannot send telemetry without baseData and baseType",
            );
            return None;
        }
        if item.base_type.is_none() {
            item.base_type = Some(DEFAULT_BASE_TYPE.to_string());
        }
        if item.instrumentation_key.is_none() {
            item.instrumentation_key = Some(self.config.instrumentation_key.clone());
        }
        if item.time.map_or(false, |time| system_time_to_datetime(time).is_none()) {
            self.logger.warning(
                MessageId::InvalidEvent,
                "Telemetry time is out of range. Current time used instead",
            );
            item.time = Some(self.clock.now());
        }
        Some(item)
    }

    fn serialize(&self, item: &TelemetryItem) -> String {
        let envelope = create_envelope(item, self.config.sample_rate, self.clock.now());
        Serializer::new(&self.logger).serialize(&envelope)
    }

    fn unload_uses_beacon(&self) -> bool {
        self.beacon.is_some()
            && (!self.config.onunload_disable_beacon || !self.config.is_beacon_api_disabled)
    }

    /// Sends everything buffered as one batch. The timer and retry time are reset before the
    /// request is made, so a failed send can schedule its own retry.
    async fn trigger_send(&mut self, reason: SendRequestReason, use_beacon: bool) {
        self.timer = None;
        self.retry_at = None;

        if self.config.disable_telemetry {
            self.buffer.clear();
            return;
        }

        if self.buffer.count() > 0 {
            let payloads = self.buffer.items();
            self.notifications.events_send_request(reason);
            let transport = match (use_beacon, self.beacon.clone()) {
                (true, Some(beacon)) => Some(Transport::Beacon(beacon)),
                _ => self.transport.clone(),
            };
            if let Some(transport) = transport {
                self.send(payloads, transport).await;
            }
        }
        self.last_send = Some(self.clock.now());
    }

    async fn send(&mut self, payloads: Vec<String>, transport: Transport) {
        if let Transport::Legacy(_) = transport {
            if !transport::protocol_matches(self.page_protocol.as_deref(), &self.config.endpoint_url) {
                self.logger.log(
                    Severity::Warning,
                    MessageId::TransmissionFailed,
                    "Cannot send request. The endpoint URL protocol doesn't match the hosting page protocol".into(),
                    Some(json!({ "endpoint": self.config.endpoint_url })),
                );
                self.buffer.clear();
                return;
            }
        }

        let body = match self.buffer.batch_payloads(&payloads) {
            Some(body) => body,
            None => return,
        };
        self.buffer.mark_as_sent(&payloads);

        match transport {
            Transport::Beacon(beacon) => {
                if beacon.send_beacon(&self.config.endpoint_url, Bytes::from(body.clone())) {
                    self.consecutive_errors = 0;
                    self.on_success(&payloads);
                } else if let Some(client) = self.client.clone() {
                    self.send_full(client, payloads, body).await;
                } else {
                    self.on_error(&payloads, "beacon rejected the payload");
                }
            }
            Transport::Full(client) => self.send_full(client, payloads, body).await,
            Transport::Legacy(client) => self.send_legacy(client, payloads, body).await,
        }
    }

    async fn send_full(&mut self, client: Arc<dyn HttpClient>, payloads: Vec<String>, body: String) {
        let request = match transport::full_request(
            &self.config.endpoint_url,
            body,
            self.config.emit_line_delimited_json,
        ) {
            Ok(request) => request,
            Err(err) => return self.on_error(&payloads, &err.to_string()),
        };
        let response = match client.send_bytes(request).await {
            Ok(response) => response,
            Err(err) => return self.on_error(&payloads, &DeliveryError::Connection(err).to_string()),
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            if !self.config.is_retry_disabled && uploader::is_retriable(status) {
                self.logger.warning(
                    MessageId::TransmissionFailed,
                    format!("{}. Will retry to send {} items", DeliveryError::Status(status), payloads.len()),
                );
                self.resend_payload(payloads);
            } else {
                self.on_error(&payloads, &DeliveryError::Status(status).to_string());
            }
            return;
        }

        let partial = if status == STATUS_PARTIAL_CONTENT {
            match Transmission::parse(response.body()) {
                Ok(transmission) => Some(transmission),
                Err(err) => return self.on_invalid_response(&payloads, err),
            }
        } else {
            Transmission::parse(response.body())
                .ok()
                .filter(Transmission::is_partial)
        };

        match partial {
            Some(_) if self.config.is_retry_disabled => {
                self.on_error(&payloads, "partial success and retry is disabled")
            }
            Some(transmission) => self.on_partial_success(payloads, transmission),
            None => {
                self.consecutive_errors = 0;
                self.on_success(&payloads);
            }
        }
    }

    /// The legacy client exposes the response body only: empty or `200` means success, anything
    /// else has to be a partial success report.
    async fn send_legacy(&mut self, client: Arc<dyn HttpClient>, payloads: Vec<String>, body: String) {
        let request = match transport::legacy_request(&self.config.endpoint_url, body) {
            Ok(request) => request,
            Err(err) => return self.on_error(&payloads, &err.to_string()),
        };
        let response = match client.send_bytes(request).await {
            Ok(response) => response,
            Err(err) => return self.on_error(&payloads, &DeliveryError::Connection(err).to_string()),
        };

        let text = String::from_utf8_lossy(response.body());
        let text = text.trim();
        if text.is_empty() || text == "200" {
            self.consecutive_errors = 0;
            self.on_success(&payloads);
            return;
        }
        match Transmission::parse(text.as_bytes()) {
            Ok(transmission) if transmission.is_partial() && !self.config.is_retry_disabled => {
                self.on_partial_success(payloads, transmission)
            }
            Ok(_) => self.on_error(&payloads, text),
            Err(err) => self.on_invalid_response(&payloads, err),
        }
    }

    fn on_success(&mut self, payloads: &[String]) {
        self.buffer.clear_sent(payloads);
    }

    fn on_error(&mut self, payloads: &[String], message: &str) {
        self.logger.log(
            Severity::Warning,
            MessageId::OnError,
            "Failed to send telemetry".into(),
            Some(json!({ "message": message, "items": payloads.len() })),
        );
        self.buffer.clear_sent(payloads);
    }

    fn on_invalid_response(&mut self, payloads: &[String], err: DeliveryError) {
        self.logger.log(
            Severity::Critical,
            MessageId::InvalidBackendResponse,
            "Cannot parse the response".into(),
            Some(json!({ "error": err.to_string() })),
        );
        self.on_error(payloads, &err.to_string());
    }

    fn on_partial_success(&mut self, payloads: Vec<String>, transmission: Transmission) {
        let received = transmission.items_received;
        let accepted = transmission.items_accepted;
        let outcome = uploader::split_partial(&payloads, transmission.errors);

        for error in &outcome.out_of_range {
            self.logger.log(
                Severity::Warning,
                MessageId::InvalidBackendResponse,
                "Response refers to an item that was not sent".into(),
                Some(json!({ "index": error.index, "statusCode": error.status_code })),
            );
        }
        if !outcome.accepted.is_empty() {
            self.on_success(&outcome.accepted);
        }
        if !outcome.failed.is_empty() {
            let failed: Vec<String> = outcome.failed.into_iter().map(|(p, _)| p).collect();
            let message = format!(
                "{}. Accepted: {}, failed: {}, will retry: {}",
                DeliveryError::PartialSuccess { accepted, received },
                outcome.accepted.len(),
                failed.len(),
                outcome.retry.len()
            );
            self.on_error(&failed, &message);
        }
        if !outcome.retry.is_empty() {
            self.logger.warning(
                MessageId::TransmissionFailed,
                format!(
                    "Partial success. Delivered: {}, will retry to send {} of {} items",
                    outcome.accepted.len(),
                    outcome.retry.len(),
                    received
                ),
            );
            self.resend_payload(outcome.retry);
        }
    }

    fn resend_payload(&mut self, payloads: Vec<String>) {
        if payloads.is_empty() {
            return;
        }
        self.buffer.clear_sent(&payloads);
        self.consecutive_errors += 1;
        for payload in payloads {
            self.buffer.enqueue(payload);
        }
        self.set_retry_time();
        self.setup_timer();
    }

    fn set_retry_time(&mut self) {
        let delay = uploader::retry_delay(self.consecutive_errors, rand::random::<f64>());
        self.retry_at = Some(self.clock.now() + delay);
    }

    /// Arms the timer unless one is armed already. It fires after the batch interval, or at the
    /// retry time if that is later.
    fn setup_timer(&mut self) {
        if self.timer.is_some() {
            return;
        }
        let now = self.clock.now();
        let retry_interval = self
            .retry_at
            .and_then(|at| at.duration_since(now).ok())
            .unwrap_or(Duration::ZERO);
        self.timer = Some(now + self.config.max_batch_interval.max(retry_interval));
    }
}
