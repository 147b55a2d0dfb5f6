use crate::serializer::{Contract, Field, FieldValue};
use serde::Deserialize;
use serde_repr::Deserialize_repr;

/// Metric data single measurement.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct DataPoint {
    /// Namespace of the metric.
    pub(crate) ns: Option<String>,

    /// Name of the metric.
    pub(crate) name: Option<String>,

    /// Metric type. Single measurement or the aggregated value.
    pub(crate) kind: DataPointType,

    /// Single value for measurement. Sum of individual measurements for the aggregation.
    pub(crate) value: Option<f64>,

    /// Metric weight of the aggregated metric. Should not be set for a measurement.
    pub(crate) count: Option<i64>,

    /// Minimum value of the aggregated metric. Should not be set for a measurement.
    pub(crate) min: Option<f64>,

    /// Maximum value of the aggregated metric. Should not be set for a measurement.
    pub(crate) max: Option<f64>,

    /// Standard deviation of the aggregated metric. Should not be set for a measurement.
    pub(crate) std_dev: Option<f64>,
}

/// Type of the metric data measurement.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize_repr)]
#[repr(u8)]
pub(crate) enum DataPointType {
    #[default]
    Measurement = 0,
    Aggregation = 1,
}

impl Contract for DataPoint {
    const FIELDS: &'static [Field<Self>] = &[
        Field::optional("ns", |p| FieldValue::text(p.ns.as_deref())),
        Field::required("name", |p| FieldValue::text(p.name.as_deref())),
        Field::optional("kind", |p| FieldValue::Int(p.kind as i64)),
        Field::required("value", |p| FieldValue::number(p.value)),
        Field::optional("count", |p| FieldValue::int(p.count)),
        Field::optional("min", |p| FieldValue::number(p.min)),
        Field::optional("max", |p| FieldValue::number(p.max)),
        Field::optional("stdDev", |p| FieldValue::number(p.std_dev)),
    ];
}
