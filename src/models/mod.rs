pub(crate) mod context_tag_keys;
mod data;
mod data_point;
mod envelope;
mod event_data;
mod exception_data;
mod exception_details;
mod message_data;
mod metric_data;
mod page_view_data;
mod page_view_perf_data;
mod remote_dependency_data;
pub(crate) mod sanitize;
mod severity_level;

pub(crate) use data::*;
pub(crate) use data_point::*;
pub(crate) use envelope::*;
pub(crate) use event_data::*;
pub(crate) use exception_data::*;
pub(crate) use exception_details::*;
pub(crate) use message_data::*;
pub(crate) use metric_data::*;
pub(crate) use page_view_data::*;
pub(crate) use page_view_perf_data::*;
pub(crate) use remote_dependency_data::*;
pub(crate) use sanitize::Sanitize;
pub use severity_level::SeverityLevel;
