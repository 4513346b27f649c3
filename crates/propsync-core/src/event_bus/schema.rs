//! Event type catalog and payload schemas.
//!
//! Every event flowing over the bus is built by [`EventTypeRegistry::create`],
//! which fills defaults for optional fields and validates required ones before
//! a listener ever sees the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::SchemaError;

/// Identifiers of the standard event types.
pub mod event_types {
    /// A view edit proposes a new value for a model slot.
    pub const VIEW_TO_MODEL_PROPERTY_CHANGED: &str = "VIEW_TO_MODEL_PROPERTY_CHANGED";
    /// The model changed a slot; views bound to it should refresh.
    pub const MODEL_TO_VIEW_PROPERTY_CHANGED: &str = "MODEL_TO_VIEW_PROPERTY_CHANGED";
    /// The model owner refused a proposed value.
    pub const PROPERTY_CHANGE_REJECTED: &str = "PROPERTY_CHANGE_REJECTED";
    /// Error raised on the client side.
    pub const CLIENT_ERROR: &str = "CLIENT_ERROR";
    /// Error reported by the host.
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    /// Warning raised on the client side.
    pub const CLIENT_WARNING: &str = "CLIENT_WARNING";
    /// Warning reported by the host.
    pub const SERVER_WARNING: &str = "SERVER_WARNING";
}

/// Payload field names used by the standard event types.
pub mod fields {
    pub const OBJECT_PATH: &str = "ObjectPath";
    pub const PROPERTY: &str = "Property";
    pub const PATH: &str = "Path";
    pub const VALUE: &str = "Value";
    pub const OLD_VALUE: &str = "OldValue";
    pub const SOURCE: &str = "Source";
    pub const SOURCE_VIEW: &str = "SourceView";
    pub const PROPERTY_PATH: &str = "PropertyPath";
    pub const REJECTED_VALUE: &str = "RejectedValue";
    pub const VALIDATION_ERRORS: &str = "ValidationErrors";
    pub const CURRENT_VALUE: &str = "CurrentValue";
    pub const ID: &str = "ID";
    pub const MESSAGE: &str = "Message";
    pub const ERROR: &str = "Error";
}

/// Declared runtime type of a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// Anything, including null. Type checking is skipped.
    Any,
}

impl FieldType {
    /// The value used for a missing optional field of this type
    pub fn zero_value(self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Number => Value::from(0),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Object => Value::Object(Map::new()),
            FieldType::Array => Value::Array(Vec::new()),
            FieldType::Any => Value::Null,
        }
    }

    /// Whether `value` satisfies this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }

    /// Runtime type name of a JSON value, as used in diagnostics
    pub fn name_of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Number => write!(f, "number"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Object => write!(f, "object"),
            FieldType::Array => write!(f, "array"),
            FieldType::Any => write!(f, "any"),
        }
    }
}

/// An optional field: its type and an explicit default (zero value otherwise)
#[derive(Debug, Clone, PartialEq)]
pub struct OptionalField {
    pub field_type: FieldType,
    pub default: Option<Value>,
}

impl OptionalField {
    /// The value filled in when the field is absent
    pub fn default_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.field_type.zero_value())
    }
}

/// Required and optional fields of one event type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    required: Vec<(String, FieldType)>,
    optional: Vec<(String, OptionalField)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field
    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.required.push((name.into(), field_type));
        self
    }

    /// Add an optional field defaulting to the type's zero value
    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.optional.push((
            name.into(),
            OptionalField {
                field_type,
                default: None,
            },
        ));
        self
    }

    /// Add an optional field with an explicit default
    pub fn optional_with_default(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        default: Value,
    ) -> Self {
        self.optional.push((
            name.into(),
            OptionalField {
                field_type,
                default: Some(default),
            },
        ));
        self
    }

    pub fn required_fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.required.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = (&str, &OptionalField)> {
        self.optional.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Whether the schema declares `name` at all
    pub fn declares(&self, name: &str) -> bool {
        self.required.iter().any(|(n, _)| n == name) || self.optional.iter().any(|(n, _)| n == name)
    }
}

#[derive(Debug, Clone)]
enum SchemaEntry {
    Schema(Schema),
    Alias(String),
}

/// Sequence number of an event, unique per bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A validated event, created per dispatch
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    id: EventId,
    event_type: String,
    timestamp: DateTime<Utc>,
    fields: Map<String, Value>,
}

impl Event {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String field, `None` when absent or not a string
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Field value, `Null` when absent
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub(crate) fn assign_id(&mut self, id: EventId) {
        self.id = id;
    }
}

/// Immutable catalog of event types and their schemas
#[derive(Debug, Clone)]
pub struct EventTypeRegistry {
    declared: HashSet<String>,
    entries: HashMap<String, SchemaEntry>,
    warn_on_unexpected_fields: bool,
}

/// Builder for [`EventTypeRegistry`]
#[derive(Debug, Default)]
pub struct EventTypeRegistryBuilder {
    declared: HashSet<String>,
    entries: HashMap<String, SchemaEntry>,
    warn_on_unexpected_fields: bool,
}

impl EventTypeRegistryBuilder {
    /// Declare an identifier without attaching a schema to it
    pub fn declare(mut self, event_type: impl Into<String>) -> Self {
        self.declared.insert(event_type.into());
        self
    }

    /// Declare an event type with its schema
    pub fn schema(mut self, event_type: impl Into<String>, schema: Schema) -> Self {
        let event_type = event_type.into();
        self.declared.insert(event_type.clone());
        self.entries.insert(event_type, SchemaEntry::Schema(schema));
        self
    }

    /// Declare an event type that reuses another type's schema
    pub fn alias(mut self, event_type: impl Into<String>, target: impl Into<String>) -> Self {
        let event_type = event_type.into();
        self.declared.insert(event_type.clone());
        self.entries
            .insert(event_type, SchemaEntry::Alias(target.into()));
        self
    }

    /// Log unexpected payload fields at warn level instead of debug
    pub fn warn_on_unexpected_fields(mut self, warn: bool) -> Self {
        self.warn_on_unexpected_fields = warn;
        self
    }

    pub fn build(self) -> EventTypeRegistry {
        EventTypeRegistry {
            declared: self.declared,
            entries: self.entries,
            warn_on_unexpected_fields: self.warn_on_unexpected_fields,
        }
    }
}

impl EventTypeRegistry {
    pub fn builder() -> EventTypeRegistryBuilder {
        EventTypeRegistryBuilder {
            warn_on_unexpected_fields: true,
            ..Default::default()
        }
    }

    /// The standard catalog of binding and diagnostic events
    pub fn standard() -> Self {
        Self::standard_builder().build()
    }

    /// Builder preloaded with the standard catalog, for extension
    pub fn standard_builder() -> EventTypeRegistryBuilder {
        use event_types::*;
        use fields::*;

        Self::builder()
            .schema(
                VIEW_TO_MODEL_PROPERTY_CHANGED,
                Schema::new()
                    .required(OBJECT_PATH, FieldType::String)
                    .required(PROPERTY, FieldType::String)
                    .required(VALUE, FieldType::Any)
                    .optional(PATH, FieldType::String)
                    .optional_with_default(SOURCE, FieldType::String, Value::from("binding"))
                    .optional(SOURCE_VIEW, FieldType::String),
            )
            .schema(
                MODEL_TO_VIEW_PROPERTY_CHANGED,
                Schema::new()
                    .required(OBJECT_PATH, FieldType::String)
                    .required(PROPERTY, FieldType::String)
                    .required(VALUE, FieldType::Any)
                    .optional(OLD_VALUE, FieldType::Any)
                    .optional(SOURCE, FieldType::String),
            )
            .schema(
                PROPERTY_CHANGE_REJECTED,
                Schema::new()
                    .required(PROPERTY_PATH, FieldType::String)
                    .required(REJECTED_VALUE, FieldType::Any)
                    .required(VALIDATION_ERRORS, FieldType::Array)
                    .required(CURRENT_VALUE, FieldType::Any)
                    .required(SOURCE_VIEW, FieldType::String),
            )
            .schema(
                CLIENT_ERROR,
                Schema::new()
                    .required(ID, FieldType::String)
                    .required(MESSAGE, FieldType::String)
                    .optional(ERROR, FieldType::Any),
            )
            .alias(SERVER_ERROR, CLIENT_ERROR)
            .schema(
                CLIENT_WARNING,
                Schema::new()
                    .required(ID, FieldType::String)
                    .required(MESSAGE, FieldType::String),
            )
            .alias(SERVER_WARNING, CLIENT_WARNING)
    }

    /// Whether `event_type` is a declared identifier
    pub fn is_declared(&self, event_type: &str) -> bool {
        self.declared.contains(event_type)
    }

    /// All declared identifiers, sorted
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.declared.iter().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Resolve the schema of `event_type`, following at most one alias
    pub fn get_schema(&self, event_type: &str) -> Result<&Schema, SchemaError> {
        if !self.declared.contains(event_type) {
            return Err(SchemaError::UnknownEventType {
                event_type: event_type.to_string(),
            });
        }

        let missing = || SchemaError::SchemaMissing {
            event_type: event_type.to_string(),
        };

        match self.entries.get(event_type).ok_or_else(missing)? {
            SchemaEntry::Schema(schema) => Ok(schema),
            SchemaEntry::Alias(target) => match self.entries.get(target) {
                Some(SchemaEntry::Schema(schema)) => Ok(schema),
                _ => Err(missing()),
            },
        }
    }

    /// Build an event: fill defaults, stamp the time, then validate
    pub fn create(&self, event_type: &str, data: Map<String, Value>) -> Result<Event, SchemaError> {
        let schema = self.get_schema(event_type)?;
        let mut fields = data;

        for (name, field) in schema.optional_fields() {
            if !fields.contains_key(name) {
                fields.insert(name.to_string(), field.default_value());
            }
        }

        let event = Event {
            id: EventId(0),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            fields,
        };

        self.validate(schema, &event)?;
        Ok(event)
    }

    fn validate(&self, schema: &Schema, event: &Event) -> Result<(), SchemaError> {
        let event_type = event.event_type();

        for (name, expected) in schema.required_fields() {
            let value = event
                .get(name)
                .ok_or_else(|| SchemaError::MissingRequiredField {
                    event_type: event_type.to_string(),
                    field: name.to_string(),
                    expected,
                })?;

            // `Any` admits null; a typed required field does not.
            if value.is_null() && expected != FieldType::Any {
                return Err(SchemaError::NullRequiredField {
                    event_type: event_type.to_string(),
                    field: name.to_string(),
                    expected,
                });
            }

            check_type(event_type, name, expected, value)?;
        }

        for (name, field) in schema.optional_fields() {
            if let Some(value) = event.get(name) {
                if !value.is_null() {
                    check_type(event_type, name, field.field_type, value)?;
                }
            }
        }

        for name in event.fields().keys() {
            if !schema.declares(name) {
                if self.warn_on_unexpected_fields {
                    tracing::warn!("{}: unexpected field '{}' tolerated", event_type, name);
                } else {
                    tracing::debug!("{}: unexpected field '{}' tolerated", event_type, name);
                }
            }
        }

        Ok(())
    }
}

impl Default for EventTypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn check_type(
    event_type: &str,
    field: &str,
    expected: FieldType,
    value: &Value,
) -> Result<(), SchemaError> {
    if expected.accepts(value) {
        Ok(())
    } else {
        Err(SchemaError::TypeMismatch {
            event_type: event_type.to_string(),
            field: field.to_string(),
            expected,
            actual: FieldType::name_of(value).to_string(),
        })
    }
}

/// Build a payload map from `(field, value)` pairs
///
/// ```rust,ignore
/// let data = payload([("ObjectPath", json!("user")), ("Property", json!("name"))]);
/// ```
pub fn payload<K, I>(pairs: I) -> Map<String, Value>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
