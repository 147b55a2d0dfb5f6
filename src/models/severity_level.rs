use serde_repr::{Deserialize_repr, Serialize_repr};

/// Severity of a trace or exception, sent as its numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SeverityLevel {
    /// Verbose.
    Verbose = 0,
    /// Information.
    Information = 1,
    /// Warning.
    Warning = 2,
    /// Error.
    Error = 3,
    /// Critical.
    Critical = 4,
}

impl SeverityLevel {
    pub(crate) fn value(self) -> i64 {
        self as i64
    }
}
