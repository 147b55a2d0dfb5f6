//! Client-side telemetry pipeline for [Azure Application Insights].
//!
//! [Azure Application Insights]: https://docs.microsoft.com/en-us/azure/azure-monitor/app/app-insights-overview
//!
//! **Disclaimer**: This is not an official Microsoft product.
//!
//! Telemetry items are tracked on an [`AppInsightsCore`], run through a chain of processors and
//! handed to one or more channels. The [`Sender`] channel turns them into envelopes, buffers them
//! (optionally in [durable storage](DurableStorage), so a restarted host picks up where it left
//! off), and delivers them in batches with retries and partial-success handling.
//!
//! # Usage
//!
//! ```no_run
//! use appinsights_channel::{
//!     AppInsightsCore, Bag, Config, Extension, MemoryStorage, Sender, SenderEnvironment,
//!     TelemetryItem, TelemetryKind,
//! };
//! use opentelemetry_http::HttpClient;
//! use std::sync::Arc;
//!
//! async fn run(client: Arc<dyn HttpClient>) -> Result<(), Box<dyn std::error::Error>> {
//!     let environment = SenderEnvironment::new()
//!         .with_client(client)
//!         .with_storage(Arc::new(MemoryStorage::new()));
//!
//!     let mut core = AppInsightsCore::new();
//!     core.initialize(
//!         Config {
//!             connection_string: Some("InstrumentationKey=...".into()),
//!             ..Config::default()
//!         },
//!         vec![Extension::Channel(Box::new(Sender::new(environment)))],
//!     )?;
//!
//!     let mut base = Bag::new();
//!     base.insert("name".into(), "checkout".into());
//!     core.track(TelemetryItem::of_kind(TelemetryKind::Event, "checkout", base)).await?;
//!
//!     core.on_page_unload().await;
//!     Ok(())
//! }
//! ```
//!
//! With the `reqwest-client` feature, `reqwest::Client` implements [`HttpClient`] and can be
//! passed as the client.
//!
//! [`HttpClient`]: opentelemetry_http::HttpClient
//!
//! # Driving timers
//!
//! Nothing runs in the background. Channels arm a timer whenever they hold telemetry; the host
//! sleeps until [`AppInsightsCore::next_deadline`] and then calls
//! [`AppInsightsCore::poll_timers`].
//!
//! # Telemetry kinds
//!
//! The base type of an item selects how it is mapped to an envelope:
//!
//! | Base type                  | Envelope name suffix  | Notable base data fields                          |
//! | -------------------------- | --------------------- | ------------------------------------------------- |
//! | `EventData`                | `Event`               | `name`                                            |
//! | `MessageData`              | `Message`             | `message`, `severityLevel`                        |
//! | `ExceptionData`            | `Exception`           | `exceptions`, `severityLevel`, `problemGroup`     |
//! | `MetricData`               | `Metric`              | `metrics`, or `name` + `average` and friends      |
//! | `PageviewData`             | `Pageview`            | `name`, `uri`, `id`, `duration`                   |
//! | `PageviewPerformanceData`  | `PageviewPerformance` | `perfTotal`, `networkConnect`, `sentRequest`, ... |
//! | `RemoteDependencyData`     | `RemoteDependency`    | `id`, `target`, `duration`, `success`, `type`, ... |
//!
//! Unknown base types are sent as events; their base data becomes custom properties and
//! measurements. Numbers in an item's `data` become measurements, everything else becomes a
//! property.
//!
//! # Configuration
//!
//! [`Config`] deserializes from the usual camelCase JSON. Settings under
//! `extensionConfig.<identifier>` override the top level ones for that extension only.
//!
//! # Internal logs
//!
//! Problems that do not fail a call are recorded in the [`DiagnosticLogger`]. With the default
//! `internal-logs` feature they are also emitted as [`tracing`](https://docs.rs/tracing) events
//! with the target `appinsights_channel`.
#![doc(html_root_url = "https://docs.rs/appinsights-channel/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs, unreachable_pub, missing_debug_implementations)]

mod channel_controller;
mod clock;
mod config;
mod connection_string;
mod convert;
mod diagnostics;
mod envelope_creator;
mod error;
mod models;
mod notification;
mod pipeline;
mod plugin;
mod send_buffer;
mod sender;
mod serializer;
mod storage;
mod tags;
mod telemetry;
mod transport;
mod uploader;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use connection_string::ParseError;
pub use diagnostics::{DiagnosticLogger, InternalMessage, MessageId, Severity};
pub use error::Error;
pub use models::SeverityLevel;
pub use notification::{
    DiscardReason, NotificationListener, NotificationManager, SendRequestReason,
};
pub use pipeline::AppInsightsCore;
pub use plugin::{CoreContext, Extension, Plugin, ProcessContext, TelemetryPlugin};
pub use sender::{Sender, SenderState, SENDER_IDENTIFIER};
pub use serializer::{
    Contract, Field, FieldValue, Getter, Requirement, Rule, Serializable, Serializer,
};
pub use storage::{DurableStorage, FileStorage, MemoryStorage, StorageError};
pub use telemetry::{Bag, TelemetryItem, TelemetryKind};
pub use transport::{BeaconSender, SenderEnvironment};
