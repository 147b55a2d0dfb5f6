use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Application version. Information in the application context fields is always about the
/// application that is sending the telemetry.
pub(crate) const APPLICATION_VERSION: &str = "ai.application.ver";

/// A unique identifier for the operation instance. The operation.id is created by either a request
/// or a page view. All other telemetry sets this to the value for the containing request or page
/// view.
pub(crate) const OPERATION_ID: &str = "ai.operation.id";

/// The name (group) of the operation. The operation.name is created by either a request or a page
/// view. All other telemetry items set this to the value for the containing request or page view.
pub(crate) const OPERATION_NAME: &str = "ai.operation.name";

/// Session ID - the instance of the user's interaction with the app.
pub(crate) const SESSION_ID: &str = "ai.session.id";

/// Anonymous user id. Represents the end user of the application.
pub(crate) const USER_ID: &str = "ai.user.id";

/// SDK version. See
/// https://github.com/Microsoft/ApplicationInsights-Home/blob/master/SDK-AUTHORING.md#sdk-version-specification
/// for information.
pub(crate) const INTERNAL_SDK_VERSION: &str = "ai.internal.sdkVersion";

/// Limit for tags the ingestion endpoint does not document one for.
const DEFAULT_TAG_LENGTH: usize = 1024;

/// Every context tag key the ingestion endpoint understands with the maximum length of its value.
/// Tags not in this list are not sent.
static TAG_KEY_LOOKUP: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    [
        (APPLICATION_VERSION, 1024),
        ("ai.application.build", DEFAULT_TAG_LENGTH),
        ("ai.application.typeId", DEFAULT_TAG_LENGTH),
        ("ai.application.applicationId", DEFAULT_TAG_LENGTH),
        ("ai.application.layer", DEFAULT_TAG_LENGTH),
        ("ai.device.id", 1024),
        ("ai.device.ip", 46),
        ("ai.device.language", 64),
        ("ai.device.locale", 64),
        ("ai.device.model", 256),
        ("ai.device.friendlyName", 256),
        ("ai.device.network", DEFAULT_TAG_LENGTH),
        ("ai.device.networkName", DEFAULT_TAG_LENGTH),
        ("ai.device.oemName", 256),
        ("ai.device.os", 256),
        ("ai.device.osVersion", 256),
        ("ai.device.roleInstance", 256),
        ("ai.device.roleName", 256),
        ("ai.device.screenResolution", 64),
        ("ai.device.type", 64),
        ("ai.device.machineName", 256),
        ("ai.device.vmName", 256),
        ("ai.device.browser", 256),
        ("ai.device.browserVersion", 256),
        ("ai.location.ip", 46),
        ("ai.location.country", 256),
        ("ai.location.province", 256),
        ("ai.location.city", 256),
        (OPERATION_ID, 128),
        (OPERATION_NAME, 1024),
        ("ai.operation.parentId", 128),
        ("ai.operation.rootId", 128),
        ("ai.operation.syntheticSource", 1024),
        ("ai.operation.correlationVector", 64),
        (SESSION_ID, 64),
        ("ai.session.isFirst", 5),
        ("ai.session.isNew", 5),
        ("ai.user.accountAcquisitionDate", DEFAULT_TAG_LENGTH),
        ("ai.user.accountId", 1024),
        ("ai.user.userAgent", DEFAULT_TAG_LENGTH),
        (USER_ID, 128),
        ("ai.user.storeRegion", DEFAULT_TAG_LENGTH),
        ("ai.user.authUserId", 1024),
        ("ai.user.anonUserAcquisitionDate", DEFAULT_TAG_LENGTH),
        ("ai.user.authUserAcquisitionDate", DEFAULT_TAG_LENGTH),
        ("ai.cloud.name", DEFAULT_TAG_LENGTH),
        ("ai.cloud.role", 256),
        ("ai.cloud.roleVer", DEFAULT_TAG_LENGTH),
        ("ai.cloud.roleInstance", 256),
        ("ai.cloud.environment", DEFAULT_TAG_LENGTH),
        ("ai.cloud.location", DEFAULT_TAG_LENGTH),
        ("ai.cloud.deploymentUnit", DEFAULT_TAG_LENGTH),
        ("ai.internal.nodeName", 256),
        (INTERNAL_SDK_VERSION, 64),
        ("ai.internal.agentVersion", 64),
        ("ai.internal.snippet", DEFAULT_TAG_LENGTH),
        ("ai.internal.sdkSrc", DEFAULT_TAG_LENGTH),
    ]
    .into_iter()
    .collect()
});

/// Maximum value length of a known context tag, `None` for keys that are not sent.
pub(crate) fn max_length(key: &str) -> Option<usize> {
    TAG_KEY_LOOKUP.get(key).copied()
}
