use crate::{
    models::DataPoint,
    serializer::{Contract, Field, FieldValue, Serializable},
    telemetry::Bag,
};

/// An instance of the Metric item is a list of measurements (single data points) and/or
/// aggregations.
#[derive(Debug, Default)]
pub(crate) struct MetricData {
    /// Schema version
    pub(crate) ver: i64,

    /// List of metrics. Only one metric in the list is currently supported by Application Insights
    /// storage. If multiple data points were sent only the first one will be used.
    pub(crate) metrics: Vec<DataPoint>,

    /// Collection of custom properties.
    pub(crate) properties: Bag,

    /// Collection of custom measurements.
    pub(crate) measurements: Bag,
}

impl Contract for MetricData {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |d| FieldValue::Int(d.ver)),
        Field::required_array("metrics", |d| {
            FieldValue::Array(d.metrics.iter().map(|m| m as &dyn Serializable).collect())
        }),
        Field::optional("properties", |d| FieldValue::Map(&d.properties)),
        Field::optional("measurements", |d| FieldValue::Map(&d.measurements)),
    ];
}
