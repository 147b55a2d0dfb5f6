use serde_json::Value;
use std::{collections::BTreeMap, time::SystemTime};

/// Free-form string keyed values: custom properties, measurements and context tags.
pub type Bag = BTreeMap<String, Value>;

/// The kinds of telemetry the channel knows how to turn into envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    /// Custom event.
    Event,
    /// Trace message.
    Trace,
    /// Handled or unhandled exception.
    Exception,
    /// Metric aggregate.
    Metric,
    /// Page view.
    PageView,
    /// Page load performance timings.
    PageViewPerformance,
    /// Outgoing call to a remote dependency.
    RemoteDependency,
}

impl TelemetryKind {
    /// All kinds in dispatch order.
    pub const ALL: [TelemetryKind; 7] = [
        TelemetryKind::Event,
        TelemetryKind::Trace,
        TelemetryKind::Exception,
        TelemetryKind::Metric,
        TelemetryKind::PageView,
        TelemetryKind::PageViewPerformance,
        TelemetryKind::RemoteDependency,
    ];

    /// The `baseType` discriminator of this kind.
    pub fn base_type(self) -> &'static str {
        match self {
            TelemetryKind::Event => "EventData",
            TelemetryKind::Trace => "MessageData",
            TelemetryKind::Exception => "ExceptionData",
            TelemetryKind::Metric => "MetricData",
            TelemetryKind::PageView => "PageviewData",
            TelemetryKind::PageViewPerformance => "PageviewPerformanceData",
            TelemetryKind::RemoteDependency => "RemoteDependencyData",
        }
    }

    /// Envelope name template; `{0}` is replaced by the instrumentation key without dashes.
    pub fn envelope_name(self) -> &'static str {
        match self {
            TelemetryKind::Event => "Microsoft.ApplicationInsights.{0}.Event",
            TelemetryKind::Trace => "Microsoft.ApplicationInsights.{0}.Message",
            TelemetryKind::Exception => "Microsoft.ApplicationInsights.{0}.Exception",
            TelemetryKind::Metric => "Microsoft.ApplicationInsights.{0}.Metric",
            TelemetryKind::PageView => "Microsoft.ApplicationInsights.{0}.Pageview",
            TelemetryKind::PageViewPerformance => {
                "Microsoft.ApplicationInsights.{0}.PageviewPerformance"
            }
            TelemetryKind::RemoteDependency => "Microsoft.ApplicationInsights.{0}.RemoteDependency",
        }
    }

    /// Look up the kind for a `baseType` discriminator.
    pub fn from_base_type(base_type: &str) -> Option<TelemetryKind> {
        Self::ALL.into_iter().find(|k| k.base_type() == base_type)
    }
}

/// One telemetry record as it flows through the pipeline, before it is turned into a wire
/// envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryItem {
    /// Item name. Required.
    pub name: String,
    /// When the item was recorded. Defaults to the time it is tracked.
    pub time: Option<SystemTime>,
    /// Instrumentation key. Defaults to the pipeline's key.
    pub instrumentation_key: Option<String>,
    /// Discriminator for `base_data`. Defaults to `"EventData"`.
    pub base_type: Option<String>,
    /// Domain payload of the item ("Part B").
    pub base_data: Option<Bag>,
    /// Context tags ("Part A"). Only recognized tag keys are sent.
    pub ctx: Bag,
    /// Additional tag maps applied in order after `ctx`.
    pub tags: Vec<Bag>,
    /// Custom properties and measurements ("Part C").
    pub data: Bag,
}

impl TelemetryItem {
    /// Create an item with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create an item of a known kind.
    pub fn of_kind(kind: TelemetryKind, name: impl Into<String>, base_data: Bag) -> Self {
        Self::new(name).with_base(kind.base_type(), base_data)
    }

    /// Set base type and base data.
    pub fn with_base(mut self, base_type: impl Into<String>, base_data: Bag) -> Self {
        self.base_type = Some(base_type.into());
        self.base_data = Some(base_data);
        self
    }

    /// Add a custom property or measurement.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add a context tag.
    pub fn with_ctx(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ctx.insert(key.into(), value.into());
        self
    }

    /// Append a tag map.
    pub fn with_tags(mut self, tags: Bag) -> Self {
        self.tags.push(tags);
        self
    }

    /// Set the time.
    pub fn with_time(mut self, time: SystemTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the instrumentation key.
    pub fn with_instrumentation_key(mut self, key: impl Into<String>) -> Self {
        self.instrumentation_key = Some(key.into());
        self
    }

    pub(crate) fn kind(&self) -> Option<TelemetryKind> {
        self.base_type.as_deref().and_then(TelemetryKind::from_base_type)
    }
}
