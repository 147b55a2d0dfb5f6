use crate::{
    serializer::{Contract, Field, FieldValue},
    telemetry::Bag,
};

/// An instance of Remote Dependency represents an interaction of the monitored component with a
/// remote component/service like SQL or an HTTP endpoint.
#[derive(Debug, Default)]
pub(crate) struct RemoteDependencyData {
    pub(crate) ver: i64,
    pub(crate) name: String,
    pub(crate) id: Option<String>,
    pub(crate) result_code: Option<String>,
    pub(crate) duration: Option<String>,
    pub(crate) success: Option<bool>,
    pub(crate) data: Option<String>,
    pub(crate) target: Option<String>,
    pub(crate) type_: Option<String>,
    pub(crate) properties: Bag,
    pub(crate) measurements: Bag,
}

impl Contract for RemoteDependencyData {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |d| FieldValue::Int(d.ver)),
        Field::optional("name", |d| FieldValue::Str(&d.name)),
        Field::required("id", |d| FieldValue::text(d.id.as_deref())),
        Field::optional("resultCode", |d| FieldValue::text(d.result_code.as_deref())),
        Field::required("duration", |d| FieldValue::text(d.duration.as_deref())),
        Field::optional("success", |d| FieldValue::flag(d.success)),
        Field::optional("data", |d| FieldValue::text(d.data.as_deref())),
        Field::optional("target", |d| FieldValue::text(d.target.as_deref())),
        Field::optional("type", |d| FieldValue::text(d.type_.as_deref())),
        Field::optional("properties", |d| FieldValue::Map(&d.properties)),
        Field::optional("measurements", |d| FieldValue::Map(&d.measurements)),
    ];
}
