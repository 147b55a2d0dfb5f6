//! Snapshot tests for generated HTTP requests
//!
//! # Update snapshots
//!
//! ```
//! INSTA_UPDATE=always cargo test
//! ```

use appinsights_channel::{
    AppInsightsCore, Bag, Clock, Config, Extension, Sender, SenderEnvironment, TelemetryItem,
    TelemetryKind,
};
use format::requests_to_string;
use recording_client::RecordingClient;
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

// Fake instrumentation key (this is a random uuid)
const CONNECTION_STRING: &str = "InstrumentationKey=0fdcec70-0ce5-4085-89d9-9ae8ead9af66";

#[derive(Debug)]
struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(1_596_665_700_123)
    }
}

fn bag(value: Value) -> Bag {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => panic!("expected an object"),
    }
}

#[tokio::test]
async fn batch_of_mixed_telemetry() {
    let client = Arc::new(RecordingClient::default());
    let mut core = AppInsightsCore::with_clock(Arc::new(FixedClock));
    core.initialize(
        Config {
            connection_string: Some(CONNECTION_STRING.into()),
            ..Config::default()
        },
        vec![Extension::Channel(Box::new(Sender::new(
            SenderEnvironment::new().with_client(client.clone()),
        )))],
    )
    .expect("config is valid");

    core.track(
        TelemetryItem::of_kind(TelemetryKind::Event, "clicked", bag(json!({"name": "clicked"})))
            .with_data("button", "ok")
            .with_data("count", 3),
    )
    .await
    .expect("item is valid");
    core.track(TelemetryItem::of_kind(
        TelemetryKind::Trace,
        "trace",
        bag(json!({"message": "hello", "severityLevel": 1})),
    ))
    .await
    .expect("item is valid");
    core.track(TelemetryItem::of_kind(
        TelemetryKind::RemoteDependency,
        "dependency",
        bag(json!({
            "id": "|abc.1",
            "target": "https://api.contoso.com/users?id=1",
            "duration": 120,
            "success": true,
            "responseCode": 200,
            "type": "Fetch",
        })),
    ))
    .await
    .expect("item is valid");
    core.flush().await;

    let batch_of_mixed_telemetry = requests_to_string(client.requests());
    insta::assert_snapshot!(batch_of_mixed_telemetry, @r###"
    POST /v2/track HTTP/1.1
    host: dc.services.visualstudio.com
    content-type: application/json
    sdk-context: appId

    [
      {
        "data": {
          "baseData": {
            "measurements": {
              "count": 3.0
            },
            "name": "clicked",
            "properties": {
              "button": "ok"
            },
            "ver": 2
          },
          "baseType": "EventData"
        },
        "iKey": "0fdcec70-0ce5-4085-89d9-9ae8ead9af66",
        "name": "Microsoft.ApplicationInsights.0fdcec700ce5408589d99ae8ead9af66.Event",
        "tags": {
          "ai.internal.sdkVersion": "STRIPPED"
        },
        "time": "2020-08-05T22:15:00.123Z",
        "ver": 1
      },
      {
        "data": {
          "baseData": {
            "measurements": {},
            "message": "hello",
            "properties": {},
            "severityLevel": 1,
            "ver": 2
          },
          "baseType": "MessageData"
        },
        "iKey": "0fdcec70-0ce5-4085-89d9-9ae8ead9af66",
        "name": "Microsoft.ApplicationInsights.0fdcec700ce5408589d99ae8ead9af66.Message",
        "tags": {
          "ai.internal.sdkVersion": "STRIPPED"
        },
        "time": "2020-08-05T22:15:00.123Z",
        "ver": 1
      },
      {
        "data": {
          "baseData": {
            "duration": "0.00:00:00.120000",
            "id": "|abc.1",
            "measurements": {},
            "name": "GET /users",
            "properties": {},
            "resultCode": "200",
            "success": true,
            "target": "api.contoso.com",
            "type": "Fetch",
            "ver": 2
          },
          "baseType": "RemoteDependencyData"
        },
        "iKey": "0fdcec70-0ce5-4085-89d9-9ae8ead9af66",
        "name": "Microsoft.ApplicationInsights.0fdcec700ce5408589d99ae8ead9af66.RemoteDependency",
        "tags": {
          "ai.internal.sdkVersion": "STRIPPED"
        },
        "time": "2020-08-05T22:15:00.123Z",
        "ver": 1
      }
    ]
    "###);
}

#[tokio::test]
async fn line_delimited_batch_to_custom_endpoint() {
    let client = Arc::new(RecordingClient::default());
    let mut core = AppInsightsCore::with_clock(Arc::new(FixedClock));
    let config: Config = serde_json::from_value(json!({
        "instrumentationKey": "0fdcec70-0ce5-4085-89d9-9ae8ead9af66",
        "extensionConfig": {
            "AppInsightsChannelPlugin": {
                "endpointUrl": "https://westus2-0.in.applicationinsights.azure.com/v2/track",
                "emitLineDelimitedJson": true,
                "samplingPercentage": 50.0,
            }
        }
    }))
    .expect("config is valid");
    core.initialize(
        config,
        vec![Extension::Channel(Box::new(Sender::new(
            SenderEnvironment::new().with_client(client.clone()),
        )))],
    )
    .expect("config is valid");

    for name in ["first", "second"] {
        core.track(TelemetryItem::of_kind(
            TelemetryKind::Event,
            name,
            bag(json!({ "name": name })),
        ))
        .await
        .expect("item is valid");
    }
    core.flush().await;

    let line_delimited_batch_to_custom_endpoint = requests_to_string(client.requests());
    insta::assert_snapshot!(line_delimited_batch_to_custom_endpoint, @r###"
    POST /v2/track HTTP/1.1
    host: westus2-0.in.applicationinsights.azure.com
    content-type: application/x-json-stream

    {
      "data": {
        "baseData": {
          "measurements": {},
          "name": "first",
          "properties": {},
          "ver": 2
        },
        "baseType": "EventData"
      },
      "iKey": "0fdcec70-0ce5-4085-89d9-9ae8ead9af66",
      "name": "Microsoft.ApplicationInsights.0fdcec700ce5408589d99ae8ead9af66.Event",
      "sampleRate": 50.0,
      "tags": {
        "ai.internal.sdkVersion": "STRIPPED"
      },
      "time": "2020-08-05T22:15:00.123Z",
      "ver": 1
    }
    {
      "data": {
        "baseData": {
          "measurements": {},
          "name": "second",
          "properties": {},
          "ver": 2
        },
        "baseType": "EventData"
      },
      "iKey": "0fdcec70-0ce5-4085-89d9-9ae8ead9af66",
      "name": "Microsoft.ApplicationInsights.0fdcec700ce5408589d99ae8ead9af66.Event",
      "sampleRate": 50.0,
      "tags": {
        "ai.internal.sdkVersion": "STRIPPED"
      },
      "time": "2020-08-05T22:15:00.123Z",
      "ver": 1
    }
    "###);
}

mod recording_client {
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{Request, Response};
    use opentelemetry_http::{HttpClient, HttpError};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecordingClient {
        requests: Mutex<Vec<Request<Bytes>>>,
    }

    impl RecordingClient {
        pub fn requests(&self) -> Vec<Request<Bytes>> {
            std::mem::take(&mut *self.requests.lock().expect("requests mutex is healthy"))
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_bytes(&self, req: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            self.requests
                .lock()
                .expect("requests mutex is healthy")
                .push(req);
            Ok(Response::builder()
                .status(200)
                .body(Bytes::new())
                .expect("response is well formed"))
        }
    }
}

mod format {
    use bytes::Bytes;
    use http::Request;
    use serde_json::Value;

    pub fn requests_to_string(requests: Vec<Request<Bytes>>) -> String {
        requests
            .into_iter()
            .map(request_to_string)
            .collect::<Vec<_>>()
            .join("\n\n\n")
    }

    fn request_to_string(req: Request<Bytes>) -> String {
        let method = req.method();
        let path = req.uri().path_and_query().expect("path exists");
        let version = format!("{:?}", req.version());
        let host = req.uri().authority().expect("authority exists");
        let mut headers = req
            .headers()
            .into_iter()
            .map(|(name, value)| {
                let value = value.to_str().expect("header value is valid string");
                format!("{}: {}", name, value)
            })
            .collect::<Vec<_>>();
        headers.sort();
        let headers = headers.join("\n");
        let body = pretty_print_json(req.body());
        format!("{method} {path} {version}\nhost: {host}\n{headers}\n\n{body}")
    }

    /// Pretty prints a JSON array or newline delimited JSON objects. The SDK version changes with
    /// every release and is stripped.
    fn pretty_print_json(body: &[u8]) -> String {
        let body = std::str::from_utf8(body).expect("body is valid utf-8");
        let values: Vec<Value> = match serde_json::from_str(body) {
            Ok(Value::Array(items)) => vec![Value::Array(items)],
            _ => body
                .lines()
                .map(|line| serde_json::from_str(line).expect("line is valid json"))
                .collect(),
        };
        values
            .into_iter()
            .map(|mut value| {
                strip_changing_values(&mut value);
                serde_json::to_string_pretty(&value).expect("value serializes")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn strip_changing_values(value: &mut Value) {
        match value {
            Value::Array(items) => items.iter_mut().for_each(strip_changing_values),
            Value::Object(map) => {
                if let Some(version) = map.get_mut("ai.internal.sdkVersion") {
                    *version = Value::String("STRIPPED".into());
                }
                map.values_mut().for_each(strip_changing_values);
            }
            _ => {}
        }
    }
}
