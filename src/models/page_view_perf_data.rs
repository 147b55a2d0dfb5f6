use crate::{
    serializer::{Contract, Field, FieldValue},
    telemetry::Bag,
};

/// Page load performance timings of a page view. All timings are time spans in format
/// `DD.HH:MM:SS.MMMMMM`.
#[derive(Debug, Default)]
pub(crate) struct PageViewPerfData {
    pub(crate) ver: i64,
    pub(crate) name: String,
    pub(crate) url: Option<String>,
    pub(crate) duration: Option<String>,
    pub(crate) id: Option<String>,

    /// Overall page load time.
    pub(crate) perf_total: Option<String>,

    /// Time to establish the network connection.
    pub(crate) network_connect: Option<String>,

    /// Time until the request was sent.
    pub(crate) sent_request: Option<String>,

    /// Time until the last byte of the response was received.
    pub(crate) received_response: Option<String>,

    /// Time spent processing the document.
    pub(crate) dom_processing: Option<String>,

    pub(crate) properties: Bag,
    pub(crate) measurements: Bag,
}

impl Contract for PageViewPerfData {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("ver", |d| FieldValue::Int(d.ver)),
        Field::required("name", |d| FieldValue::Str(&d.name)),
        Field::optional("url", |d| FieldValue::text(d.url.as_deref())),
        Field::optional("duration", |d| FieldValue::text(d.duration.as_deref())),
        Field::optional("id", |d| FieldValue::text(d.id.as_deref())),
        Field::optional("perfTotal", |d| FieldValue::text(d.perf_total.as_deref())),
        Field::optional("networkConnect", |d| FieldValue::text(d.network_connect.as_deref())),
        Field::optional("sentRequest", |d| FieldValue::text(d.sent_request.as_deref())),
        Field::optional("receivedResponse", |d| {
            FieldValue::text(d.received_response.as_deref())
        }),
        Field::optional("domProcessing", |d| FieldValue::text(d.dom_processing.as_deref())),
        Field::optional("properties", |d| FieldValue::Map(&d.properties)),
        Field::optional("measurements", |d| FieldValue::Map(&d.measurements)),
    ];
}
