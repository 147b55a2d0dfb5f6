//! Turns telemetry items into wire envelopes, one mapping per telemetry kind.

use crate::{
    convert::{time_to_string, value_to_f64, value_to_time_span},
    models::{
        context_tag_keys, sanitize, BaseData, Data, DataPoint, Envelope, EventData,
        ExceptionData, ExceptionDetails, MessageData, MetricData, PageViewData, PageViewPerfData,
        RemoteDependencyData, Sanitize, SeverityLevel,
    },
    tags::get_tags_for_item,
    telemetry::{Bag, TelemetryItem, TelemetryKind},
};
use http::Uri;
use serde_json::Value;
use std::time::SystemTime;

const ENVELOPE_VERSION: i64 = 1;
const DATA_VERSION: i64 = 2;
const DEFAULT_DEPENDENCY_METHOD: &str = "GET";

/// Build the envelope of an item. Unknown base types are sent as custom events.
pub(crate) fn create_envelope(item: &TelemetryItem, sample_rate: f64, now: SystemTime) -> Envelope {
    let base = item.base_data.clone().unwrap_or_default();
    let (kind, base_data) = match item.kind() {
        Some(kind) => (kind, create_base_data(kind, item, base)),
        None => (TelemetryKind::Event, BaseData::Event(create_fallback_event(item, base))),
    };
    let tags = get_tags_for_item(item);

    let i_key = item.instrumentation_key.clone().unwrap_or_default();
    Envelope {
        ver: ENVELOPE_VERSION,
        name: kind.envelope_name().replace("{0}", &i_key.replace('-', "")),
        time: time_to_string(item.time.unwrap_or(now)),
        i_key,
        sample_rate,
        tags,
        data: Data { base_data },
    }
}

fn create_base_data(kind: TelemetryKind, item: &TelemetryItem, base: Bag) -> BaseData {
    match kind {
        TelemetryKind::Event => BaseData::Event(create_event(item, base)),
        TelemetryKind::Trace => BaseData::Message(create_message(item, base)),
        TelemetryKind::Exception => BaseData::Exception(create_exception(item, base)),
        TelemetryKind::Metric => BaseData::Metric(create_metric(item, base)),
        TelemetryKind::PageView => BaseData::PageView(create_page_view(item, base)),
        TelemetryKind::PageViewPerformance => {
            BaseData::PageViewPerformance(create_page_view_performance(item, base))
        }
        TelemetryKind::RemoteDependency => {
            BaseData::RemoteDependency(create_remote_dependency(item, base))
        }
    }
}

/// Numbers become measurements, strings properties and everything else its JSON text.
fn extract_props_and_measurements(data: &Bag, properties: &mut Bag, measurements: &mut Bag) {
    for (key, value) in data {
        match value {
            Value::Number(_) => {
                measurements.insert(key.clone(), value.clone());
            }
            Value::String(_) => {
                properties.insert(key.clone(), value.clone());
            }
            other => {
                properties.insert(key.clone(), Value::String(other.to_string()));
            }
        }
    }
}

/// `properties` and `measurements` of the base data merged with the item's custom data.
fn custom_fields(base: &mut Bag, data: &Bag) -> (Bag, Bag) {
    let mut properties = take_bag(base, "properties");
    let mut measurements = take_bag(base, "measurements");
    extract_props_and_measurements(data, &mut properties, &mut measurements);
    properties.sanitize();
    measurements.sanitize();
    (properties, measurements)
}

fn take_bag(base: &mut Bag, key: &str) -> Bag {
    match base.remove(key) {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => Bag::new(),
    }
}

fn string_field(base: &Bag, key: &str) -> Option<String> {
    match base.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    }
}

fn limited(value: Option<String>, max: usize) -> Option<String> {
    value.map(|v| sanitize::truncated(v, max))
}

/// Time span of a field given either as milliseconds or as a preformatted span.
fn span_field(base: &Bag, key: &str) -> Option<String> {
    match base.get(key) {
        Some(Value::String(s)) if s.trim().parse::<f64>().is_err() => Some(s.clone()),
        Some(value @ (Value::Number(_) | Value::String(_))) => Some(value_to_time_span(value)),
        _ => None,
    }
}

fn severity_field(base: &Bag) -> Option<SeverityLevel> {
    base.get("severityLevel")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn create_event(item: &TelemetryItem, mut base: Bag) -> EventData {
    let (properties, measurements) = custom_fields(&mut base, &item.data);
    EventData {
        ver: DATA_VERSION,
        name: sanitize::name(string_field(&base, "name").as_deref()),
        properties,
        measurements,
    }
}

/// Custom event carrying an item of a type that has no mapping of its own. The original base
/// type is kept in `baseTypeSource` and the base data is flattened into the custom fields.
fn create_fallback_event(item: &TelemetryItem, base: Bag) -> EventData {
    let mut properties = Bag::new();
    let mut measurements = Bag::new();
    if let Some(base_type) = &item.base_type {
        properties.insert("baseTypeSource".into(), Value::String(base_type.clone()));
    }
    let name = string_field(&base, "name").unwrap_or_else(|| item.name.clone());
    extract_props_and_measurements(&base, &mut properties, &mut measurements);
    extract_props_and_measurements(&item.data, &mut properties, &mut measurements);
    properties.sanitize();
    measurements.sanitize();
    EventData {
        ver: DATA_VERSION,
        name: sanitize::name(Some(&name)),
        properties,
        measurements,
    }
}

fn create_message(item: &TelemetryItem, mut base: Bag) -> MessageData {
    let (properties, measurements) = custom_fields(&mut base, &item.data);
    let message = match string_field(&base, "message") {
        Some(m) if !m.is_empty() => sanitize::truncated(m, sanitize::MAX_MESSAGE_LENGTH),
        _ => sanitize::NOT_SPECIFIED.to_string(),
    };
    MessageData {
        ver: DATA_VERSION,
        message,
        severity_level: severity_field(&base),
        properties,
        measurements,
    }
}

fn create_exception(item: &TelemetryItem, mut base: Bag) -> ExceptionData {
    let (properties, measurements) = custom_fields(&mut base, &item.data);
    let mut exceptions: Vec<ExceptionDetails> = base
        .get("exceptions")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    for exception in &mut exceptions {
        exception.sanitize();
    }
    ExceptionData {
        ver: DATA_VERSION,
        exceptions,
        severity_level: severity_field(&base),
        properties,
        measurements,
    }
}

fn create_metric(item: &TelemetryItem, mut base: Bag) -> MetricData {
    let (properties, measurements) = custom_fields(&mut base, &item.data);
    let metrics = match base.get("metrics") {
        Some(points @ Value::Array(_)) => serde_json::from_value(points.clone()).unwrap_or_default(),
        _ => vec![DataPoint {
            name: limited(string_field(&base, "name"), sanitize::MAX_STRING_LENGTH),
            value: base.get("average").and_then(value_to_f64),
            count: base
                .get("sampleCount")
                .and_then(Value::as_i64)
                .filter(|c| *c > 0),
            min: base.get("min").and_then(value_to_f64),
            max: base.get("max").and_then(value_to_f64),
            ..DataPoint::default()
        }],
    };
    MetricData {
        ver: DATA_VERSION,
        metrics,
        properties,
        measurements,
    }
}

/// Id of the page view instance: explicit, or the operation the item belongs to.
fn page_view_id(item: &TelemetryItem, base: &Bag) -> Option<String> {
    string_field(base, "id")
        .or_else(|| item.ctx.get(context_tag_keys::OPERATION_ID).and_then(|v| v.as_str().map(String::from)))
        .map(|id| sanitize::truncated(id, sanitize::MAX_ID_LENGTH))
}

fn create_page_view(item: &TelemetryItem, mut base: Bag) -> PageViewData {
    let mut data = item.data.clone();
    let mut base_properties = take_bag(&mut base, "properties");
    let duration = base_properties
        .remove("duration")
        .or_else(|| data.remove("duration"))
        .map(|d| value_to_time_span(&d));

    let mut properties = Bag::new();
    let mut measurements = take_bag(&mut base, "measurements");
    if let Some(ref_uri) = string_field(&base, "refUri") {
        properties.insert("refUri".into(), Value::String(ref_uri));
    }
    if let Some(page_type) = string_field(&base, "pageType") {
        properties.insert("pageType".into(), Value::String(page_type));
    }
    if let Some(is_logged_in) = string_field(&base, "isLoggedIn") {
        properties.insert("isLoggedIn".into(), Value::String(is_logged_in));
    }
    properties.extend(base_properties);
    extract_props_and_measurements(&data, &mut properties, &mut measurements);
    properties.sanitize();
    measurements.sanitize();

    PageViewData {
        ver: DATA_VERSION,
        name: sanitize::name(string_field(&base, "name").as_deref()),
        url: limited(
            string_field(&base, "uri").or_else(|| string_field(&base, "url")),
            sanitize::MAX_URL_LENGTH,
        ),
        duration,
        id: page_view_id(item, &base),
        properties,
        measurements,
    }
}

fn create_page_view_performance(item: &TelemetryItem, mut base: Bag) -> PageViewPerfData {
    let (properties, measurements) = custom_fields(&mut base, &item.data);
    PageViewPerfData {
        ver: DATA_VERSION,
        name: sanitize::name(string_field(&base, "name").as_deref()),
        url: limited(
            string_field(&base, "uri").or_else(|| string_field(&base, "url")),
            sanitize::MAX_URL_LENGTH,
        ),
        duration: span_field(&base, "duration"),
        id: page_view_id(item, &base),
        perf_total: span_field(&base, "perfTotal"),
        network_connect: span_field(&base, "networkConnect"),
        sent_request: span_field(&base, "sentRequest"),
        received_response: span_field(&base, "receivedResponse"),
        dom_processing: span_field(&base, "domProcessing"),
        properties,
        measurements,
    }
}

/// Target host and operation name of a dependency call.
///
/// With a URL target the host becomes the target and, unless a name is given, the name is
/// `METHOD /path`. Without one the name doubles as the target.
fn parse_dependency_path(
    absolute_url: Option<&str>,
    method: &str,
    command_name: Option<&str>,
) -> (Option<String>, Option<String>) {
    match absolute_url.filter(|u| !u.is_empty()) {
        Some(url) => match url.parse::<Uri>() {
            Ok(uri) if uri.host().is_some() => {
                let target = uri.authority().map(|a| a.to_string());
                let name = match command_name.filter(|n| !n.is_empty()) {
                    Some(name) => name.to_string(),
                    None => {
                        let path = match uri.path() {
                            "" => "/",
                            path => path,
                        };
                        format!("{} {}", method, path)
                    }
                };
                (target, Some(name))
            }
            _ => (
                Some(url.to_string()),
                Some(command_name.unwrap_or(url).to_string()),
            ),
        },
        None => (
            command_name.map(String::from),
            command_name.map(String::from),
        ),
    }
}

fn create_remote_dependency(item: &TelemetryItem, mut base: Bag) -> RemoteDependencyData {
    let (properties, measurements) = custom_fields(&mut base, &item.data);
    let method = string_field(&base, "method")
        .or_else(|| properties.get("HttpMethod").and_then(|v| v.as_str().map(String::from)))
        .unwrap_or_else(|| DEFAULT_DEPENDENCY_METHOD.to_string());
    let command_name = string_field(&base, "name");
    let (mut target, name) = parse_dependency_path(
        string_field(&base, "target").as_deref(),
        &method,
        command_name.as_deref(),
    );
    if let (Some(target), Some(correlation)) =
        (target.as_mut(), string_field(&base, "correlationContext"))
    {
        target.push_str(" | ");
        target.push_str(&correlation);
    }

    RemoteDependencyData {
        ver: DATA_VERSION,
        name: sanitize::name(name.as_deref()),
        id: limited(string_field(&base, "id"), sanitize::MAX_ID_LENGTH),
        result_code: string_field(&base, "responseCode")
            .or_else(|| string_field(&base, "resultCode")),
        duration: Some(value_to_time_span(base.get("duration").unwrap_or(&Value::Null))),
        success: base.get("success").and_then(Value::as_bool),
        data: limited(command_name, sanitize::MAX_URL_LENGTH),
        target: limited(target, sanitize::MAX_STRING_LENGTH),
        type_: limited(string_field(&base, "type"), sanitize::MAX_STRING_LENGTH),
        properties,
        measurements,
    }
}
