use crate::{
    models::sanitize::{self, MAX_MESSAGE_LENGTH, MAX_STRING_LENGTH},
    serializer::{Contract, Field, FieldValue, Serializable},
};
use serde::Deserialize;

/// Exception details of the exception in a chain.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ExceptionDetails {
    /// Exception type name.
    pub(crate) type_name: Option<String>,

    /// Exception message.
    pub(crate) message: Option<String>,

    /// Indicates if full exception stack is provided in the exception.
    pub(crate) has_full_stack: Option<bool>,

    /// Text describing the stack. Either stack or parsedStack should have a value.
    pub(crate) stack: Option<String>,

    /// List of stack frames. Either stack or parsedStack should have a value.
    pub(crate) parsed_stack: Vec<StackFrame>,
}

impl ExceptionDetails {
    pub(crate) fn sanitize(&mut self) {
        if let Some(type_name) = self.type_name.as_mut() {
            sanitize::truncate(type_name, MAX_STRING_LENGTH);
        }
        if let Some(message) = self.message.as_mut() {
            sanitize::truncate(message, MAX_MESSAGE_LENGTH);
        }
        if let Some(stack) = self.stack.as_mut() {
            sanitize::truncate(stack, MAX_MESSAGE_LENGTH);
        }
    }
}

impl Contract for ExceptionDetails {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("typeName", |d| FieldValue::text(d.type_name.as_deref())),
        Field::required("message", |d| FieldValue::text(d.message.as_deref())),
        Field::optional("hasFullStack", |d| FieldValue::flag(d.has_full_stack)),
        Field::optional("stack", |d| FieldValue::text(d.stack.as_deref())),
        Field::optional_array("parsedStack", |d| {
            if d.parsed_stack.is_empty() {
                FieldValue::Absent
            } else {
                FieldValue::Array(d.parsed_stack.iter().map(|f| f as &dyn Serializable).collect())
            }
        }),
    ];
}

/// Stack frame information.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StackFrame {
    /// Level in the call stack. For the long stacks SDK may not report every function in a call
    /// stack.
    pub(crate) level: Option<i64>,

    /// Method name.
    pub(crate) method: Option<String>,

    /// Name of the assembly (dll, jar, etc.) containing this function.
    pub(crate) assembly: Option<String>,

    /// File name or URL of the method implementation.
    pub(crate) file_name: Option<String>,

    /// Line number of the code implementation.
    pub(crate) line: Option<i64>,
}

impl Contract for StackFrame {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required("level", |f| FieldValue::int(f.level)),
        Field::required("method", |f| FieldValue::text(f.method.as_deref())),
        Field::optional("assembly", |f| FieldValue::text(f.assembly.as_deref())),
        Field::optional("fileName", |f| FieldValue::text(f.file_name.as_deref())),
        Field::optional("line", |f| FieldValue::int(f.line)),
    ];
}
