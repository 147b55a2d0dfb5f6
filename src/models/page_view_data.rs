use crate::{
    serializer::{Contract, Field, FieldValue},
    telemetry::Bag,
};

/// An instance of PageView represents a generic action on a page like a button click.
#[derive(Debug, Default)]
pub(crate) struct PageViewData {
    /// Schema version
    pub(crate) ver: i64,

    /// Event name.
    pub(crate) name: String,

    /// Request URL with all query string parameters.
    pub(crate) url: Option<String>,

    /// Request duration in format `DD.HH:MM:SS.MMMMMM`.
    pub(crate) duration: Option<String>,

    /// Identifier of a page view instance.
    pub(crate) id: Option<String>,

    /// Collection of custom properties.
    pub(crate) properties: Bag,

    /// Collection of custom measurements.
    pub(crate) measurements: Bag,
}

impl Contract for PageViewData {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |d| FieldValue::Int(d.ver)),
        Field::required("name", |d| FieldValue::Str(&d.name)),
        Field::optional("url", |d| FieldValue::text(d.url.as_deref())),
        Field::optional("duration", |d| FieldValue::text(d.duration.as_deref())),
        Field::optional("id", |d| FieldValue::text(d.id.as_deref())),
        Field::optional("properties", |d| FieldValue::Map(&d.properties)),
        Field::optional("measurements", |d| FieldValue::Map(&d.measurements)),
    ];
}
