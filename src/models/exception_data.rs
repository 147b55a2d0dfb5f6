use crate::{
    models::{ExceptionDetails, SeverityLevel},
    serializer::{Contract, Field, FieldValue, Serializable},
    telemetry::Bag,
};

/// An instance of Exception represents a handled or unhandled exception that occurred during
/// execution of the monitored application.
#[derive(Debug, Default)]
pub(crate) struct ExceptionData {
    /// Schema version
    pub(crate) ver: i64,

    /// Exception chain - list of inner exceptions.
    pub(crate) exceptions: Vec<ExceptionDetails>,

    /// Severity level.
    pub(crate) severity_level: Option<SeverityLevel>,

    /// Collection of custom properties.
    pub(crate) properties: Bag,

    /// Collection of custom measurements.
    pub(crate) measurements: Bag,
}

impl Contract for ExceptionData {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |d| FieldValue::Int(d.ver)),
        Field::required_array("exceptions", |d| {
            FieldValue::Array(d.exceptions.iter().map(|e| e as &dyn Serializable).collect())
        }),
        Field::optional("severityLevel", |d| {
            FieldValue::int(d.severity_level.map(SeverityLevel::value))
        }),
        Field::optional("properties", |d| FieldValue::Map(&d.properties)),
        Field::optional("measurements", |d| FieldValue::Map(&d.measurements)),
    ];
}
