use crate::{
    serializer::{Contract, Field, FieldValue},
    telemetry::Bag,
};

/// Instances of Event represent structured event records that can be grouped and searched by their
/// properties. Event data item also creates a metric of event count by name.
#[derive(Debug, Default)]
pub(crate) struct EventData {
    /// Schema version
    pub(crate) ver: i64,

    /// Event name. Keep it low cardinality to allow proper grouping and useful metrics.
    pub(crate) name: String,

    /// Collection of custom properties.
    pub(crate) properties: Bag,

    /// Collection of custom measurements.
    pub(crate) measurements: Bag,
}

impl Contract for EventData {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |d| FieldValue::Int(d.ver)),
        Field::required("name", |d| FieldValue::Str(&d.name)),
        Field::optional("properties", |d| FieldValue::Map(&d.properties)),
        Field::optional("measurements", |d| FieldValue::Map(&d.measurements)),
    ];
}
