//! Internal diagnostics.
//!
//! Every recoverable problem in the pipeline (storage failures, serialization contract
//! violations, rejected batches) ends up here instead of being returned to the instrumentation
//! call site. The core owns one [`DiagnosticLogger`] and hands it to every plugin at
//! initialization.

use serde_json::Value;
use std::sync::Mutex;

/// Maximum number of messages kept in the queue. Older messages are dropped first.
const MAX_QUEUED_MESSAGES: usize = 200;

/// Severity of an internal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The pipeline recovered, some telemetry may be delayed or lost.
    Warning,
    /// Telemetry was certainly lost or the pipeline is misused.
    Critical,
}

/// Identifies the kind of problem an internal message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MessageId {
    /// Several processors share the same priority.
    DuplicatePriority,
    /// An item with base data but no base type reached a channel.
    InvalidEvent,
    /// A channel has no transport to send with.
    SenderNotInitialized,
    /// The item was handed to a channel that is torn down.
    SenderTornDown,
    /// A transmission failed and may be retried.
    TransmissionFailed,
    /// A batch was rejected and dropped.
    OnError,
    /// The server response did not match the expected accounting.
    InvalidBackendResponse,
    /// The delivery buffer reached its capacity.
    BufferFull,
    /// Reading a durable buffer slot failed.
    FailedToRestoreStorageBuffer,
    /// Writing a durable buffer slot failed.
    FailedToSetStorageBuffer,
    /// An object could not be serialized.
    CannotSerializeObject,
    /// An object without a field contract was serialized as-is.
    CannotSerializeObjectNonSerializable,
    /// An object was reached again while it was being serialized.
    CircularReferenceDetected,
    /// A required field is absent.
    MissingRequiredFieldSpecification,
    /// A field declared as an array holds something else.
    ItemNotInArray,
}

/// A message recorded by the [`DiagnosticLogger`].
#[derive(Debug, Clone, PartialEq)]
pub struct InternalMessage {
    /// Severity.
    pub severity: Severity,
    /// Kind of problem.
    pub id: MessageId,
    /// Human readable description.
    pub message: String,
    /// Additional structured context.
    pub details: Option<Value>,
}

/// Collects internal messages and forwards them to `tracing` when the `internal-logs` feature is
/// enabled.
#[derive(Debug, Default)]
pub struct DiagnosticLogger {
    queue: Mutex<Vec<InternalMessage>>,
}

impl DiagnosticLogger {
    /// Create an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn warning(&self, id: MessageId, message: impl Into<String>) {
        self.log(Severity::Warning, id, message.into(), None);
    }

    /// Record a critical message.
    pub fn critical(&self, id: MessageId, message: impl Into<String>) {
        self.log(Severity::Critical, id, message.into(), None);
    }

    /// Record a message with structured details.
    pub fn log(&self, severity: Severity, id: MessageId, message: String, details: Option<Value>) {
        #[cfg(feature = "internal-logs")]
        match severity {
            Severity::Warning => {
                tracing::warn!(target: "appinsights_channel", ?id, details = ?details, "{}", message)
            }
            Severity::Critical => {
                tracing::error!(target: "appinsights_channel", ?id, details = ?details, "{}", message)
            }
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUED_MESSAGES {
            queue.remove(0);
        }
        queue.push(InternalMessage {
            severity,
            id,
            message,
            details,
        });
    }

    /// Snapshot of the recorded messages, oldest first.
    pub fn messages(&self) -> Vec<InternalMessage> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of recorded messages with the given id.
    pub fn count(&self, id: MessageId) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.id == id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_bounded_queue() {
        let logger = DiagnosticLogger::new();
        for i in 0..MAX_QUEUED_MESSAGES + 5 {
            logger.warning(MessageId::TransmissionFailed, format!("message {}", i));
        }
        let messages = logger.messages();
        assert_eq!(MAX_QUEUED_MESSAGES, messages.len());
        assert_eq!("message 5", messages[0].message);
    }

    #[test]
    fn counts_by_id() {
        let logger = DiagnosticLogger::new();
        logger.warning(MessageId::BufferFull, "full");
        logger.critical(MessageId::OnError, "dropped");
        logger.warning(MessageId::BufferFull, "full again");
        assert_eq!(2, logger.count(MessageId::BufferFull));
        assert_eq!(Severity::Critical, logger.messages()[1].severity);
    }
}
