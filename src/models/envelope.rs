use crate::{
    models::Data,
    serializer::{Contract, Field, FieldValue, Requirement},
    telemetry::Bag,
};

/// System variables for a telemetry item.
#[derive(Debug)]
pub(crate) struct Envelope {
    /// Envelope version.
    pub(crate) ver: i64,
    /// `Microsoft.ApplicationInsights.<ikey>.<kind>`.
    pub(crate) name: String,
    /// ISO-8601 event time.
    pub(crate) time: String,
    pub(crate) i_key: String,
    /// Percentage of items represented by this one. Not sent when 100.
    pub(crate) sample_rate: f64,
    pub(crate) tags: Bag,
    pub(crate) data: Data,
}

fn sample_rate_requirement(envelope: &Envelope) -> Requirement {
    if envelope.sample_rate == 100.0 {
        Requirement::Hidden
    } else {
        Requirement::Required
    }
}

impl Contract for Envelope {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |e| FieldValue::Int(e.ver)),
        Field::required("name", |e| FieldValue::Str(&e.name)),
        Field::required("time", |e| FieldValue::Str(&e.time)),
        Field::computed("sampleRate", sample_rate_requirement, |e| {
            FieldValue::Number(e.sample_rate)
        }),
        Field::required("iKey", |e| FieldValue::Str(&e.i_key)),
        Field::required("tags", |e| FieldValue::Map(&e.tags)),
        Field::required("data", |e| FieldValue::Object(&e.data)),
    ];
}
