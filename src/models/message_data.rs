use crate::{
    models::SeverityLevel,
    serializer::{Contract, Field, FieldValue},
    telemetry::Bag,
};

/// Instances of Message represent printf-like trace statements that are text-searched.
#[derive(Debug, Default)]
pub(crate) struct MessageData {
    /// Schema version
    pub(crate) ver: i64,

    /// Trace message
    pub(crate) message: String,

    /// Trace severity level.
    pub(crate) severity_level: Option<SeverityLevel>,

    /// Collection of custom properties.
    pub(crate) properties: Bag,

    /// Collection of custom measurements.
    pub(crate) measurements: Bag,
}

impl Contract for MessageData {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |d| FieldValue::Int(d.ver)),
        Field::required("message", |d| FieldValue::Str(&d.message)),
        Field::optional("severityLevel", |d| {
            FieldValue::int(d.severity_level.map(SeverityLevel::value))
        }),
        Field::optional("properties", |d| FieldValue::Map(&d.properties)),
        Field::optional("measurements", |d| FieldValue::Map(&d.measurements)),
    ];
}
