//! The scalar type registry.
//!
//! Every primitive conversion between entity-side values and storage values
//! goes through a [`TypeConverter`] registered here under a string tag. The
//! registry dispatches by tag; asking for an unregistered tag is the only
//! error condition and raises [`BindError::UnknownType`].
//!
//! The built-in tags are [`tags::ID`], [`tags::BOOLEAN`], [`tags::INTEGER`],
//! [`tags::DECIMAL`], [`tags::STRING`], [`tags::DATE`], [`tags::ARRAY`] and
//! [`tags::DOCUMENT`]. The `reference` tag exists only as a field kind and
//! is never registered here.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use bson::{Bson, Document};
use chrono::FixedOffset;

use crate::{
    entity::{EntityRegistry, reflect},
    error::{BindError, BindResult},
    value::{Elements, FieldMap, Value, date_from_seconds, date_from_storage},
};

/// Reserved document key carrying the entity's identifier.
pub const KEY_ID: &str = "_id";
/// Reserved document key carrying the fully qualified entity class name.
pub const KEY_CLASS: &str = "_class";

/// String tags the scalar type registry dispatches on.
pub mod tags {
    pub const ID: &str = "id";
    pub const BOOLEAN: &str = "boolean";
    pub const INTEGER: &str = "integer";
    pub const DECIMAL: &str = "decimal";
    pub const STRING: &str = "string";
    pub const DATE: &str = "date";
    pub const ARRAY: &str = "array";
    pub const DOCUMENT: &str = "document";
    /// Consumed only by field dispatch; never registered in the registry.
    pub const REFERENCE: &str = "reference";
}

/// A pure two-way conversion between entity-side and storage values.
///
/// Both directions must be deterministic and total over the declared input
/// domain of the tag.
pub trait TypeConverter: Send + Sync {
    /// The tag this converter is registered under.
    fn tag(&self) -> &'static str;

    /// Converts an entity-side value into its storage representation.
    fn to_storage(&self, value: Value) -> BindResult<Bson>;

    /// Converts a storage value into its entity-side representation.
    fn to_entity(&self, value: Bson) -> BindResult<Value>;
}

impl std::fmt::Debug for dyn TypeConverter + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConverter").field("tag", &self.tag()).finish()
    }
}

/// Tag-indexed collection of type converters.
pub struct TypeRegistry {
    types: HashMap<&'static str, Box<dyn TypeConverter>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { types: HashMap::new() }
    }

    /// Creates a registry with the eight built-in converters.
    ///
    /// `entities` backs the generic sub-document converter; `tz`, when set,
    /// normalizes decoded dates to that offset.
    pub fn standard(entities: Arc<EntityRegistry>, tz: Option<FixedOffset>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(IdType));
        registry.register(Box::new(BooleanType));
        registry.register(Box::new(IntegerType));
        registry.register(Box::new(DecimalType));
        registry.register(Box::new(StringType));
        registry.register(Box::new(DateType::new(tz)));
        registry.register(Box::new(ArrayType::new(tz)));
        registry.register(Box::new(DocumentType::new(entities, tz)));
        registry
    }

    /// Registers a converter under its tag, replacing any previous one.
    pub fn register(&mut self, converter: Box<dyn TypeConverter>) {
        self.types.insert(converter.tag(), converter);
    }

    /// Returns the converter for a tag.
    ///
    /// # Errors
    ///
    /// Fails with [`BindError::UnknownType`] when no converter is
    /// registered for the tag.
    pub fn get(&self, tag: &str) -> BindResult<&dyn TypeConverter> {
        self.types
            .get(tag)
            .map(Box::as_ref)
            .ok_or_else(|| BindError::UnknownType(tag.to_string()))
    }

    /// Dispatches an entity-to-storage conversion by tag.
    pub fn to_storage(&self, value: Value, tag: &str) -> BindResult<Bson> {
        self.get(tag)?.to_storage(value)
    }

    /// Dispatches a storage-to-entity conversion by tag.
    pub fn to_entity(&self, value: Bson, tag: &str) -> BindResult<Value> {
        self.get(tag)?.to_entity(value)
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<&str> = self.types.keys().copied().collect();
        registered.sort_unstable();
        f.debug_struct("TypeRegistry")
            .field("tags", &registered)
            .finish()
    }
}

/// Identifier converter. Null and canonical identifiers pass through; hex
/// strings are parsed into the canonical form.
struct IdType;

impl IdType {
    fn convert(value_kind: &str, parsed: Option<Bson>) -> BindResult<Bson> {
        parsed.ok_or_else(|| {
            BindError::InvalidEntity(format!("value of kind \"{value_kind}\" is not a valid identifier"))
        })
    }
}

impl TypeConverter for IdType {
    fn tag(&self) -> &'static str {
        tags::ID
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        match value {
            Value::Null => Ok(Bson::Null),
            Value::Id(oid) => Ok(Bson::ObjectId(oid)),
            Value::String(s) => Self::convert(
                "string",
                bson::oid::ObjectId::parse_str(&s).ok().map(Bson::ObjectId),
            ),
            other => Self::convert(other.kind(), None),
        }
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        match value {
            Bson::Null => Ok(Value::Null),
            Bson::ObjectId(oid) => Ok(Value::Id(oid)),
            Bson::String(s) => bson::oid::ObjectId::parse_str(&s)
                .map(Value::Id)
                .map_err(|_| {
                    BindError::InvalidEntity(format!("\"{s}\" is not a valid identifier"))
                }),
            other => Err(BindError::InvalidEntity(format!(
                "{other:?} is not a valid identifier"
            ))),
        }
    }
}

/// Boolean converter. Coercive cast; null maps to `false`.
struct BooleanType;

impl TypeConverter for BooleanType {
    fn tag(&self) -> &'static str {
        tags::BOOLEAN
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        Ok(Bson::Boolean(truthy(&value)))
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        let truth = match value {
            Bson::Null | Bson::Undefined => false,
            Bson::Boolean(b) => b,
            Bson::Int32(i) => i != 0,
            Bson::Int64(i) => i != 0,
            Bson::Double(d) => d != 0.0,
            Bson::String(s) => !s.is_empty() && s != "0",
            Bson::Array(items) => !items.is_empty(),
            _ => true,
        };
        Ok(Value::Boolean(truth))
    }
}

/// Integer converter. Coercive cast; null maps to `0`; stores 64-bit.
struct IntegerType;

impl TypeConverter for IntegerType {
    fn tag(&self) -> &'static str {
        tags::INTEGER
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        let n = match value {
            Value::Null => 0,
            Value::Boolean(b) => i64::from(b),
            Value::Integer(i) => i,
            Value::Decimal(d) => d as i64,
            Value::String(s) => parse_i64(&s),
            _ => 0,
        };
        Ok(Bson::Int64(n))
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        let n = match value {
            Bson::Null | Bson::Undefined => 0,
            Bson::Boolean(b) => i64::from(b),
            Bson::Int32(i) => i64::from(i),
            Bson::Int64(i) => i,
            Bson::Double(d) => d as i64,
            Bson::String(s) => parse_i64(&s),
            _ => 0,
        };
        Ok(Value::Integer(n))
    }
}

/// Decimal converter. Coercive cast to a floating value; non-numeric inputs
/// coerce to `0.0`.
struct DecimalType;

impl TypeConverter for DecimalType {
    fn tag(&self) -> &'static str {
        tags::DECIMAL
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        let d = match value {
            Value::Null => 0.0,
            Value::Boolean(b) => f64::from(u8::from(b)),
            Value::Integer(i) => i as f64,
            Value::Decimal(d) => d,
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(Bson::Double(d))
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        let d = match value {
            Bson::Null | Bson::Undefined => 0.0,
            Bson::Boolean(b) => f64::from(u8::from(b)),
            Bson::Int32(i) => f64::from(i),
            Bson::Int64(i) => i as f64,
            Bson::Double(d) => d,
            Bson::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(Value::Decimal(d))
    }
}

/// String converter. Coercive cast; null maps to the empty string.
struct StringType;

impl TypeConverter for StringType {
    fn tag(&self) -> &'static str {
        tags::STRING
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        let s = match value {
            Value::Null => String::new(),
            Value::Boolean(b) => if b { "1".to_string() } else { String::new() },
            Value::Integer(i) => i.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => s,
            Value::Date(dt) => dt.to_rfc3339(),
            Value::Id(oid) => oid.to_hex(),
            other => {
                return Err(BindError::InvalidEntity(format!(
                    "cannot cast a value of kind \"{}\" to a string",
                    other.kind()
                )));
            }
        };
        Ok(Bson::String(s))
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        let s = match value {
            Bson::Null | Bson::Undefined => String::new(),
            Bson::Boolean(b) => if b { "1".to_string() } else { String::new() },
            Bson::Int32(i) => i.to_string(),
            Bson::Int64(i) => i.to_string(),
            Bson::Double(d) => d.to_string(),
            Bson::String(s) => s,
            Bson::ObjectId(oid) => oid.to_hex(),
            other => {
                return Err(BindError::InvalidEntity(format!(
                    "cannot cast {other:?} to a string"
                )));
            }
        };
        Ok(Value::String(s))
    }
}

/// Date converter. Null maps to null in both directions; decoded dates are
/// normalized to the configured offset, stored dates are plain timestamps.
struct DateType {
    tz: Option<FixedOffset>,
}

impl DateType {
    fn new(tz: Option<FixedOffset>) -> Self {
        Self { tz }
    }
}

impl TypeConverter for DateType {
    fn tag(&self) -> &'static str {
        tags::DATE
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        match value {
            Value::Null => Ok(Bson::Null),
            Value::Date(dt) => Ok(Bson::DateTime(bson::DateTime::from_chrono(dt))),
            Value::Integer(seconds) => Ok(date_from_seconds(seconds)
                .map(|dt| Bson::DateTime(bson::DateTime::from_chrono(dt)))
                .unwrap_or(Bson::Null)),
            _ => Ok(Bson::Null),
        }
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        match value {
            Bson::Null | Bson::Undefined => Ok(Value::Null),
            Bson::DateTime(dt) => Ok(Value::Date(date_from_storage(dt, self.tz))),
            Bson::Int32(seconds) => Ok(date_from_seconds(i64::from(seconds))
                .map(Value::Date)
                .unwrap_or(Value::Null)),
            Bson::Int64(seconds) => Ok(date_from_seconds(seconds)
                .map(Value::Date)
                .unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }
}

/// Untyped array converter. Shallow cast to an ordered sequence; scalar
/// inputs become single-element sequences, keyed maps keep their keys.
struct ArrayType {
    tz: Option<FixedOffset>,
}

impl ArrayType {
    fn new(tz: Option<FixedOffset>) -> Self {
        Self { tz }
    }
}

impl TypeConverter for ArrayType {
    fn tag(&self) -> &'static str {
        tags::ARRAY
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        match value.materialized()?.into_elements() {
            Elements::Seq(items) => Ok(Bson::Array(
                items
                    .iter()
                    .map(Value::to_bson)
                    .collect::<BindResult<Vec<Bson>>>()?,
            )),
            Elements::Keyed(map) => {
                let mut doc = Document::new();
                for (key, item) in map {
                    doc.insert(key, item.to_bson()?);
                }
                Ok(Bson::Document(doc))
            }
        }
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        match value {
            Bson::Null | Bson::Undefined => Ok(Value::Array(Vec::new())),
            Bson::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| Value::from_bson(item, self.tz))
                    .collect(),
            )),
            Bson::Document(doc) => Ok(Value::from_bson(&Bson::Document(doc), self.tz)),
            scalar => Ok(Value::Array(vec![Value::from_bson(&scalar, self.tz)])),
        }
    }
}

/// Generic sub-document converter.
///
/// Reflects an entity into a flat document carrying the class discriminator
/// (null fields omitted), or rebuilds an entity of the discriminated class
/// from such a document. Documents without a discriminator decode into an
/// untyped map.
struct DocumentType {
    entities: Arc<EntityRegistry>,
    tz: Option<FixedOffset>,
}

impl DocumentType {
    fn new(entities: Arc<EntityRegistry>, tz: Option<FixedOffset>) -> Self {
        Self { entities, tz }
    }
}

impl TypeConverter for DocumentType {
    fn tag(&self) -> &'static str {
        tags::DOCUMENT
    }

    fn to_storage(&self, value: Value) -> BindResult<Bson> {
        let value = value.materialized()?;
        match value {
            Value::Null => Ok(Bson::Null),
            Value::Entity(entity) => {
                let mut doc = Document::new();
                for (name, field) in reflect(entity.as_ref()) {
                    let converted = field.to_bson()?;
                    if !matches!(converted, Bson::Null) {
                        doc.insert(name, converted);
                    }
                }
                Ok(Bson::Document(doc))
            }
            Value::Map(map) => {
                let mut doc = Document::new();
                for (name, field) in map {
                    let converted = field.to_bson()?;
                    if !matches!(converted, Bson::Null) {
                        doc.insert(name, converted);
                    }
                }
                Ok(Bson::Document(doc))
            }
            other => Err(BindError::InvalidEntity(format!(
                "expected an entity, got a value of kind \"{}\"",
                other.kind()
            ))),
        }
    }

    fn to_entity(&self, value: Bson) -> BindResult<Value> {
        let doc = match value {
            Bson::Null | Bson::Undefined => return Ok(Value::Null),
            Bson::Document(doc) => doc,
            other => {
                return Err(BindError::InvalidEntity(format!(
                    "expected a document, got {other:?}"
                )));
            }
        };

        let class = match doc.get(KEY_CLASS) {
            Some(Bson::String(class)) => Some(class.clone()),
            _ => None,
        };

        let mut fields = FieldMap::with_capacity(doc.len());
        for (name, raw) in doc {
            if name == KEY_CLASS {
                continue;
            }
            fields.insert(name, Value::from_bson(&raw, self.tz));
        }

        match class {
            Some(class) => Ok(Value::Entity(self.entities.instantiate(&class, fields)?)),
            None => Ok(Value::Map(fields)),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Integer(i) => *i != 0,
        Value::Decimal(d) => *d != 0.0,
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Map(map) => !map.is_empty(),
        Value::Date(_) | Value::Id(_) | Value::Entity(_) | Value::Proxy(_) => true,
    }
}

fn parse_i64(s: &str) -> i64 {
    let trimmed = s.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(|d| d as i64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    fn registry() -> TypeRegistry {
        TypeRegistry::standard(Arc::new(EntityRegistry::new()), None)
    }

    #[test]
    fn unknown_tag_is_exactly_an_unknown_type_error() {
        let err = registry().get("bogus").unwrap_err();
        assert_eq!(err, BindError::UnknownType("bogus".to_string()));
    }

    #[test]
    fn null_maps_to_type_specific_zero_values() {
        let registry = registry();
        assert_eq!(
            registry.to_storage(Value::Null, tags::BOOLEAN).unwrap(),
            Bson::Boolean(false)
        );
        assert_eq!(
            registry.to_storage(Value::Null, tags::INTEGER).unwrap(),
            Bson::Int64(0)
        );
        assert_eq!(
            registry.to_storage(Value::Null, tags::STRING).unwrap(),
            Bson::String(String::new())
        );
        assert_eq!(
            registry.to_storage(Value::Null, tags::DECIMAL).unwrap(),
            Bson::Double(0.0)
        );
        assert_eq!(registry.to_storage(Value::Null, tags::DATE).unwrap(), Bson::Null);
    }

    #[test]
    fn scalar_casts_are_idempotent_on_storage_typed_input() {
        let registry = registry();
        for (bson, tag) in [
            (Bson::Boolean(true), tags::BOOLEAN),
            (Bson::Int64(42), tags::INTEGER),
            (Bson::String("ok".to_string()), tags::STRING),
            (Bson::Double(2.5), tags::DECIMAL),
        ] {
            let entity = registry.to_entity(bson.clone(), tag).unwrap();
            assert_eq!(registry.to_storage(entity, tag).unwrap(), bson);
        }
    }

    #[test]
    fn coercions_follow_cast_semantics() {
        let registry = registry();
        assert_eq!(
            registry
                .to_storage(Value::String("0".to_string()), tags::BOOLEAN)
                .unwrap(),
            Bson::Boolean(false)
        );
        assert_eq!(
            registry
                .to_storage(Value::String("12".to_string()), tags::INTEGER)
                .unwrap(),
            Bson::Int64(12)
        );
        assert_eq!(
            registry
                .to_storage(Value::String("nope".to_string()), tags::DECIMAL)
                .unwrap(),
            Bson::Double(0.0)
        );
        assert_eq!(
            registry.to_storage(Value::Boolean(true), tags::STRING).unwrap(),
            Bson::String("1".to_string())
        );
    }

    #[test]
    fn id_passes_canonical_values_and_parses_hex() {
        let registry = registry();
        let oid = ObjectId::new();

        assert_eq!(
            registry.to_storage(Value::Id(oid), tags::ID).unwrap(),
            Bson::ObjectId(oid)
        );
        assert_eq!(
            registry
                .to_storage(Value::String(oid.to_hex()), tags::ID)
                .unwrap(),
            Bson::ObjectId(oid)
        );
        assert_eq!(registry.to_storage(Value::Null, tags::ID).unwrap(), Bson::Null);

        let err = registry
            .to_storage(Value::String("not-hex".to_string()), tags::ID)
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidEntity(_)));
    }

    #[test]
    fn date_round_trips_through_storage() {
        let registry = registry();
        let stored = Bson::DateTime(bson::DateTime::from_millis(1_700_000_000_000));
        let entity = registry.to_entity(stored.clone(), tags::DATE).unwrap();
        assert_eq!(registry.to_storage(entity, tags::DATE).unwrap(), stored);
    }

    #[test]
    fn array_promotes_scalars_to_single_element_sequences() {
        let registry = registry();
        assert_eq!(
            registry.to_storage(Value::Integer(3), tags::ARRAY).unwrap(),
            Bson::Array(vec![Bson::Int64(3)])
        );
        assert_eq!(
            registry.to_entity(Bson::Boolean(true), tags::ARRAY).unwrap(),
            Value::Array(vec![Value::Boolean(true)])
        );
    }

    #[test]
    fn document_without_discriminator_decodes_untyped() {
        let registry = registry();
        let doc = bson::doc! { "a": 1_i64, "b": "two" };
        let Value::Map(map) = registry.to_entity(Bson::Document(doc), tags::DOCUMENT).unwrap()
        else {
            panic!("expected an untyped map");
        };
        assert_eq!(map.get("a"), Some(&Value::Integer(1)));
        assert_eq!(map.get("b"), Some(&Value::String("two".to_string())));
    }
}
