//! Contract driven envelope serialization.
//!
//! Every wire type declares a static table of [`Field`]s describing which fields exist, whether
//! they are required, hidden or arrays, and how to read them. The [`Serializer`] walks those
//! tables to build the JSON sent to the ingestion endpoint. Problems are reported to the
//! [`DiagnosticLogger`] and never abort serialization of the surrounding object.

use crate::{
    convert::{value_to_f64, value_to_string},
    diagnostics::{DiagnosticLogger, MessageId, Severity},
    telemetry::Bag,
};
use serde_json::{json, Map, Value};
use std::{any::TypeId, fmt};

/// Whether a field must, may or must not be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Emitted when present.
    Default,
    /// Must be present. Absence is reported and the field is skipped.
    Required,
    /// Never emitted.
    Hidden,
}

/// Requirement of a field, fixed or computed from the object being serialized.
pub enum Rule<T> {
    /// Same requirement for every instance.
    Fixed(Requirement),
    /// Requirement depends on the instance.
    Computed(fn(&T) -> Requirement),
}

/// Reads a field's value from an instance.
pub type Getter<T> = for<'a> fn(&'a T) -> FieldValue<'a>;

/// One entry of a type's field contract.
pub struct Field<T> {
    /// Wire name of the field.
    pub name: &'static str,
    /// Requirement of the field.
    pub rule: Rule<T>,
    /// The field holds a list of contract objects.
    pub array: bool,
    /// Reads the value.
    pub value: Getter<T>,
}

impl<T> Field<T> {
    /// A field that is emitted when present.
    pub const fn optional(name: &'static str, value: Getter<T>) -> Self {
        Field {
            name,
            rule: Rule::Fixed(Requirement::Default),
            array: false,
            value,
        }
    }

    /// A field that has to be present.
    pub const fn required(name: &'static str, value: Getter<T>) -> Self {
        Field {
            name,
            rule: Rule::Fixed(Requirement::Required),
            array: false,
            value,
        }
    }

    /// A required list of contract objects.
    pub const fn required_array(name: &'static str, value: Getter<T>) -> Self {
        Field {
            name,
            rule: Rule::Fixed(Requirement::Required),
            array: true,
            value,
        }
    }

    /// An optional list of contract objects.
    pub const fn optional_array(name: &'static str, value: Getter<T>) -> Self {
        Field {
            name,
            rule: Rule::Fixed(Requirement::Default),
            array: true,
            value,
        }
    }

    /// A field whose requirement is decided per instance.
    pub const fn computed(
        name: &'static str,
        requirement: fn(&T) -> Requirement,
        value: Getter<T>,
    ) -> Self {
        Field {
            name,
            rule: Rule::Computed(requirement),
            array: false,
            value,
        }
    }
}

/// Value of a field as seen by the serializer.
pub enum FieldValue<'a> {
    /// Not set.
    Absent,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number. Non-finite numbers cannot be serialized.
    Number(f64),
    /// String.
    Str(&'a str),
    /// Nested contract object.
    Object(&'a dyn Serializable),
    /// List of contract objects.
    Array(Vec<&'a dyn Serializable>),
    /// Flat map. `properties`, `tags` and `measurements` get coerced values.
    Map(&'a Bag),
    /// Value without a contract.
    Raw(&'a Value),
}

impl<'a> FieldValue<'a> {
    /// `Str` if set.
    pub fn text(value: Option<&'a str>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Str)
    }

    /// `Number` if set.
    pub fn number(value: Option<f64>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Number)
    }

    /// `Int` if set.
    pub fn int(value: Option<i64>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Int)
    }

    /// `Bool` if set.
    pub fn flag(value: Option<bool>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Bool)
    }

    /// `Map` if set.
    pub fn map(value: Option<&'a Bag>) -> Self {
        value.map_or(FieldValue::Absent, FieldValue::Map)
    }

    fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

impl<T> fmt::Debug for Rule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Fixed(requirement) => f.debug_tuple("Fixed").field(requirement).finish(),
            Rule::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .field("array", &self.array)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Absent => f.write_str("Absent"),
            FieldValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            FieldValue::Int(i) => f.debug_tuple("Int").field(i).finish(),
            FieldValue::Number(n) => f.debug_tuple("Number").field(n).finish(),
            FieldValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            FieldValue::Object(_) => f.write_str("Object(..)"),
            FieldValue::Array(items) => write!(f, "Array(len = {})", items.len()),
            FieldValue::Map(bag) => f.debug_tuple("Map").field(bag).finish(),
            FieldValue::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
        }
    }
}

/// A type with a declared field contract.
pub trait Contract: Sized + 'static {
    /// The field table walked by the serializer, in emission order.
    const FIELDS: &'static [Field<Self>];
}

/// Object safe view of a [`Contract`] type. Implemented for every contract type.
pub trait Serializable {
    /// Serialize the fields of this object.
    fn serialize_fields(&self, serializer: &mut Serializer<'_>, name: &str) -> Value;
}

impl<T: Contract> Serializable for T {
    fn serialize_fields(&self, serializer: &mut Serializer<'_>, name: &str) -> Value {
        serializer.serialize_contract(self, name)
    }
}

/// Walks field contracts and produces the wire JSON.
#[derive(Debug)]
pub struct Serializer<'l> {
    logger: &'l DiagnosticLogger,
    visiting: Vec<(usize, TypeId)>,
}

impl<'l> Serializer<'l> {
    /// Create a serializer reporting to `logger`.
    pub fn new(logger: &'l DiagnosticLogger) -> Self {
        Serializer {
            logger,
            visiting: Vec::new(),
        }
    }

    /// Serialize an object to its JSON text.
    pub fn serialize(&mut self, input: &dyn Serializable) -> String {
        self.to_value(input).to_string()
    }

    /// Serialize an object to a JSON tree.
    pub fn to_value(&mut self, input: &dyn Serializable) -> Value {
        input.serialize_fields(self, "root")
    }

    fn serialize_contract<T: Contract>(&mut self, source: &T, name: &str) -> Value {
        let marker = (source as *const T as usize, TypeId::of::<T>());
        if self.visiting.contains(&marker) {
            self.logger.log(
                Severity::Warning,
                MessageId::CircularReferenceDetected,
                "Circular reference detected while serializing object".into(),
                Some(json!({ "name": name })),
            );
            return Value::Object(Map::new());
        }

        self.visiting.push(marker);
        let mut output = Map::new();
        for field in T::FIELDS {
            let requirement = match field.rule {
                Rule::Fixed(requirement) => requirement,
                Rule::Computed(requirement) => requirement(source),
            };
            let value = (field.value)(source);
            if requirement == Requirement::Required && value.is_absent() && !field.array {
                self.logger.log(
                    Severity::Critical,
                    MessageId::MissingRequiredFieldSpecification,
                    "Missing required field specification. The field is required but not present on source".into(),
                    Some(json!({ "field": field.name, "name": name })),
                );
                continue;
            }
            if requirement == Requirement::Hidden {
                continue;
            }
            if let Some(value) = self.serialize_value(value, field.name, field.array) {
                output.insert(field.name.to_string(), value);
            }
        }
        self.visiting.pop();

        Value::Object(output)
    }

    fn serialize_value(&mut self, value: FieldValue<'_>, name: &str, array: bool) -> Option<Value> {
        match value {
            FieldValue::Absent => None,
            FieldValue::Bool(b) => Some(Value::Bool(b)),
            FieldValue::Int(i) => Some(Value::from(i)),
            FieldValue::Str(s) => Some(Value::String(s.to_string())),
            FieldValue::Number(n) => match serde_json::Number::from_f64(n) {
                Some(n) => Some(Value::Number(n)),
                None => {
                    self.logger.critical(
                        MessageId::CannotSerializeObject,
                        format!("Cannot serialize non-finite number in field {}", name),
                    );
                    None
                }
            },
            FieldValue::Object(_) if array => {
                self.logger.critical(
                    MessageId::ItemNotInArray,
                    format!(
                        "This field was specified as an array in the contract but the item is not an array: {}",
                        name
                    ),
                );
                None
            }
            FieldValue::Object(object) => Some(object.serialize_fields(self, name)),
            FieldValue::Array(items) => Some(Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| item.serialize_fields(self, &format!("{}[{}]", name, i)))
                    .collect(),
            )),
            FieldValue::Map(bag) => Some(self.serialize_map(bag, name)),
            FieldValue::Raw(value) => Some(self.serialize_raw(value, name)),
        }
    }

    fn serialize_map(&mut self, bag: &Bag, name: &str) -> Value {
        match name {
            "properties" | "tags" => Value::Object(
                bag.iter()
                    .map(|(k, v)| (k.clone(), Value::String(value_to_string(v))))
                    .collect(),
            ),
            "measurements" => Value::Object(
                bag.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::Null => Value::String("null".into()),
                            v => value_to_f64(v)
                                .and_then(serde_json::Number::from_f64)
                                .map(Value::Number)
                                .unwrap_or_else(|| Value::String("NaN".into())),
                        };
                        (k.clone(), value)
                    })
                    .collect(),
            ),
            _ => {
                self.non_conformant(name);
                Value::Object(bag.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
        }
    }

    fn serialize_raw(&mut self, value: &Value, name: &str) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.serialize_raw(item, &format!("{}[{}]", name, i)))
                    .collect(),
            ),
            Value::Object(_) => {
                self.non_conformant(name);
                value.clone()
            }
            other => other.clone(),
        }
    }

    fn non_conformant(&self, name: &str) {
        self.logger.log(
            Severity::Warning,
            MessageId::CannotSerializeObjectNonSerializable,
            "Attempting to serialize an object which does not implement a field contract".into(),
            Some(json!({ "name": name })),
        );
    }
}
