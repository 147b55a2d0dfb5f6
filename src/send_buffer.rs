//! Buffers holding serialized envelopes until the channel sends them.

use crate::{
    diagnostics::{DiagnosticLogger, MessageId, Severity},
    storage::DurableStorage,
};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};

/// Hard cap on the number of payloads a buffer holds. Payloads beyond it are dropped.
pub(crate) const MAX_BUFFER_SIZE: usize = 2000;

const BUFFER_KEY: &str = "AI_buffer";
const SENT_BUFFER_KEY: &str = "AI_sentBuffer";

/// Holds serialized envelopes. Persistent implementations additionally track which payloads are in
/// flight so they can be recovered after a reload.
pub(crate) trait SendBuffer: Debug + Send {
    /// Add a payload. Dropped when the buffer is full.
    fn enqueue(&mut self, payload: String);

    /// Number of pending payloads.
    fn count(&self) -> usize;

    /// Drop every pending and in-flight payload.
    fn clear(&mut self);

    /// Snapshot of the pending payloads.
    fn items(&self) -> Vec<String>;

    /// Join payloads into a request body. `None` if there is nothing to send.
    fn batch_payloads(&self, payloads: &[String]) -> Option<String>;

    /// Length in bytes of the body the pending payloads would form, 0 when empty.
    fn batch_size(&self) -> usize;

    /// Payloads are about to be sent.
    fn mark_as_sent(&mut self, payloads: &[String]);

    /// Payloads were acknowledged (or given up on) by the endpoint.
    fn clear_sent(&mut self, payloads: &[String]);
}

fn batch(payloads: &[String], line_delimited: bool) -> Option<String> {
    if payloads.is_empty() {
        None
    } else if line_delimited {
        Some(payloads.join("\n"))
    } else {
        Some(format!("[{}]", payloads.join(",")))
    }
}

fn batch_size(count: usize, payload_bytes: usize, line_delimited: bool) -> usize {
    // One separator between payloads, plus the brackets of a JSON array.
    match count {
        0 => 0,
        n if line_delimited => payload_bytes + n - 1,
        n => payload_bytes + n - 1 + 2,
    }
}

fn total_len(payloads: &[String]) -> usize {
    payloads.iter().map(String::len).sum()
}

/// Removes one occurrence per payload, keeping duplicates that were not sent.
fn remove_payloads(payloads: &[String], buffer: Vec<String>) -> Vec<String> {
    let mut pending: Vec<&String> = payloads.iter().collect();
    buffer
        .into_iter()
        .filter(|item| match pending.iter().position(|p| *p == item) {
            Some(index) => {
                pending.swap_remove(index);
                false
            }
            None => true,
        })
        .collect()
}

/// In-memory buffer. Payloads are forgotten once sent.
#[derive(Debug)]
pub(crate) struct ArraySendBuffer {
    buffer: Vec<String>,
    payload_bytes: usize,
    line_delimited: bool,
    logger: Arc<DiagnosticLogger>,
    buffer_full_logged: bool,
}

impl ArraySendBuffer {
    pub(crate) fn new(logger: Arc<DiagnosticLogger>, line_delimited: bool) -> Self {
        ArraySendBuffer {
            buffer: Vec::new(),
            payload_bytes: 0,
            line_delimited,
            logger,
            buffer_full_logged: false,
        }
    }
}

impl SendBuffer for ArraySendBuffer {
    fn enqueue(&mut self, payload: String) {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            if !self.buffer_full_logged {
                self.logger.warning(
                    MessageId::BufferFull,
                    format!("Maximum buffer size reached: {}", self.buffer.len()),
                );
                self.buffer_full_logged = true;
            }
            return;
        }
        self.payload_bytes += payload.len();
        self.buffer.push(payload);
    }

    fn count(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.payload_bytes = 0;
        self.buffer_full_logged = false;
    }

    fn items(&self) -> Vec<String> {
        self.buffer.clone()
    }

    fn batch_payloads(&self, payloads: &[String]) -> Option<String> {
        batch(payloads, self.line_delimited)
    }

    fn batch_size(&self) -> usize {
        batch_size(self.buffer.len(), self.payload_bytes, self.line_delimited)
    }

    fn mark_as_sent(&mut self, _payloads: &[String]) {
        self.clear();
    }

    fn clear_sent(&mut self, _payloads: &[String]) {}
}

/// Buffer mirrored into [`DurableStorage`].
///
/// Pending payloads live under `[<prefix>_]<identifier>_AI_buffer`, in-flight ones under
/// `..._AI_sentBuffer`. A new buffer picks up both slots, so telemetry that was pending or
/// unacknowledged when the previous pipeline went away is sent again.
#[derive(Debug)]
pub(crate) struct SessionStorageSendBuffer {
    buffer: Vec<String>,
    payload_bytes: usize,
    line_delimited: bool,
    logger: Arc<DiagnosticLogger>,
    storage: Arc<dyn DurableStorage>,
    buffer_key: String,
    sent_key: String,
    buffer_full_logged: bool,
}

impl SessionStorageSendBuffer {
    pub(crate) fn new(
        storage: Arc<dyn DurableStorage>,
        logger: Arc<DiagnosticLogger>,
        identifier: &str,
        name_prefix: Option<&str>,
        line_delimited: bool,
    ) -> Self {
        let prefix = match name_prefix {
            Some(name_prefix) if !name_prefix.is_empty() => {
                format!("{}_{}_", name_prefix, identifier)
            }
            _ => format!("{}_", identifier),
        };
        let mut this = SessionStorageSendBuffer {
            buffer: Vec::new(),
            payload_bytes: 0,
            line_delimited,
            logger,
            storage,
            buffer_key: format!("{}{}", prefix, BUFFER_KEY),
            sent_key: format!("{}{}", prefix, SENT_BUFFER_KEY),
            buffer_full_logged: false,
        };

        let mut restored = this.get_buffer(&this.buffer_key);
        restored.extend(this.get_buffer(&this.sent_key));
        restored.truncate(MAX_BUFFER_SIZE);
        this.payload_bytes = total_len(&restored);
        this.buffer = restored;
        this.set_buffer(&this.buffer_key, &this.buffer);
        this.set_buffer(&this.sent_key, &[]);

        this
    }

    fn get_buffer(&self, key: &str) -> Vec<String> {
        let restored = self.storage.get(key).map_err(|e| e.to_string()).and_then(|v| {
            v.map(|s| serde_json::from_str::<Vec<String>>(&s).map_err(|e| e.to_string()))
                .transpose()
        });
        match restored {
            Ok(items) => items.unwrap_or_default(),
            Err(err) => {
                self.logger.log(
                    Severity::Critical,
                    MessageId::FailedToRestoreStorageBuffer,
                    format!("Failed to get client buffer from storage: {}", err),
                    Some(json!({ "key": key })),
                );
                Vec::new()
            }
        }
    }

    fn set_buffer(&self, key: &str, items: &[String]) {
        let result = serde_json::to_string(items)
            .map_err(|e| e.to_string())
            .and_then(|s| self.storage.set(key, &s).map_err(|e| e.to_string()));
        if let Err(err) = result {
            // The in-memory buffer stays authoritative.
            let _ = self.storage.set(key, "[]");
            self.logger.log(
                Severity::Warning,
                MessageId::FailedToSetStorageBuffer,
                format!("Failed to set client buffer in storage: {}. Buffer cleared", err),
                Some(json!({ "key": key })),
            );
        }
    }
}

impl SendBuffer for SessionStorageSendBuffer {
    fn enqueue(&mut self, payload: String) {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            if !self.buffer_full_logged {
                self.logger.warning(
                    MessageId::BufferFull,
                    format!("Maximum buffer size reached: {}", self.buffer.len()),
                );
                self.buffer_full_logged = true;
            }
            return;
        }
        self.payload_bytes += payload.len();
        self.buffer.push(payload);
        self.set_buffer(&self.buffer_key, &self.buffer);
    }

    fn count(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.payload_bytes = 0;
        self.set_buffer(&self.buffer_key, &[]);
        self.set_buffer(&self.sent_key, &[]);
        self.buffer_full_logged = false;
    }

    fn items(&self) -> Vec<String> {
        self.buffer.clone()
    }

    fn batch_payloads(&self, payloads: &[String]) -> Option<String> {
        batch(payloads, self.line_delimited)
    }

    fn batch_size(&self) -> usize {
        batch_size(self.buffer.len(), self.payload_bytes, self.line_delimited)
    }

    fn mark_as_sent(&mut self, payloads: &[String]) {
        self.buffer = remove_payloads(payloads, std::mem::take(&mut self.buffer));
        self.payload_bytes = total_len(&self.buffer);
        self.set_buffer(&self.buffer_key, &self.buffer);

        let mut sent = self.get_buffer(&self.sent_key);
        sent.extend(payloads.iter().cloned());
        if sent.len() > MAX_BUFFER_SIZE {
            self.logger.critical(
                MessageId::BufferFull,
                format!("Sent buffer reached its maximum size: {}", sent.len()),
            );
            sent.truncate(MAX_BUFFER_SIZE);
        }
        self.set_buffer(&self.sent_key, &sent);
    }

    fn clear_sent(&mut self, payloads: &[String]) {
        let sent = remove_payloads(payloads, self.get_buffer(&self.sent_key));
        self.set_buffer(&self.sent_key, &sent);
    }
}
