use crate::{
    models::{context_tag_keys as tags, sanitize::filter_tags},
    telemetry::{Bag, TelemetryItem},
};
use serde_json::Value;

/// SDK version sent as `ai.internal.sdkVersion` unless the item carries its own.
pub(crate) const SDK_VERSION: &str = concat!("rust:", env!("CARGO_PKG_VERSION"));

/// Envelope tags of an item: recognized keys of `ctx` first, then every map in `tags` in order,
/// later values overriding earlier ones.
pub(crate) fn get_tags_for_item(item: &TelemetryItem) -> Bag {
    let mut envelope_tags = Bag::new();
    envelope_tags.insert(
        tags::INTERNAL_SDK_VERSION.to_string(),
        Value::String(SDK_VERSION.to_string()),
    );

    filter_tags(&mut envelope_tags, &item.ctx);
    for tag_map in &item.tags {
        filter_tags(&mut envelope_tags, tag_map);
    }

    envelope_tags
}
