use crate::{
    models::{
        EventData, ExceptionData, MessageData, MetricData, PageViewData, PageViewPerfData,
        RemoteDependencyData,
    },
    serializer::{Contract, Field, FieldValue, Serializable},
};

/// Data struct to contain both B and C sections.
#[derive(Debug)]
pub(crate) struct Data {
    /// Kind specific payload. Also decides the `baseType` sent alongside it.
    pub(crate) base_data: BaseData,
}

#[derive(Debug)]
pub(crate) enum BaseData {
    Event(EventData),
    Message(MessageData),
    Exception(ExceptionData),
    Metric(MetricData),
    PageView(PageViewData),
    PageViewPerformance(PageViewPerfData),
    RemoteDependency(RemoteDependencyData),
}

impl BaseData {
    pub(crate) fn base_type(&self) -> &'static str {
        match self {
            BaseData::Event(_) => "EventData",
            BaseData::Message(_) => "MessageData",
            BaseData::Exception(_) => "ExceptionData",
            BaseData::Metric(_) => "MetricData",
            BaseData::PageView(_) => "PageviewData",
            BaseData::PageViewPerformance(_) => "PageviewPerformanceData",
            BaseData::RemoteDependency(_) => "RemoteDependencyData",
        }
    }

    fn as_serializable(&self) -> &dyn Serializable {
        match self {
            BaseData::Event(d) => d,
            BaseData::Message(d) => d,
            BaseData::Exception(d) => d,
            BaseData::Metric(d) => d,
            BaseData::PageView(d) => d,
            BaseData::PageViewPerformance(d) => d,
            BaseData::RemoteDependency(d) => d,
        }
    }
}

impl Contract for Data {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("baseType", |d| FieldValue::Str(d.base_data.base_type())),
        Field::required("baseData", |d| FieldValue::Object(d.base_data.as_serializable())),
    ];
}
