//! Entity-side dynamic values.
//!
//! This module defines [`Value`], the vocabulary of values an entity field
//! can hold before it is converted into its storage representation. It is
//! the in-memory mirror of the BSON vocabulary: scalars, calendar
//! timestamps, identifiers, ordered sequences and keyed maps, plus two
//! variants BSON has no equivalent for: typed entity instances and lazy
//! proxies.
//!
//! Structural conversions to and from [`Bson`] live here as well. They are
//! the "untyped" fallback the converter uses for fields no model describes:
//! every BSON value has a natural `Value` shape and vice versa, with dates
//! and identifiers mapped to their entity-side forms.

use bson::{Bson, Document, oid::ObjectId};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    entity::{Entity, reflect},
    error::BindResult,
    proxy::Proxy,
    types::KEY_CLASS,
};

/// Insertion-ordered mapping from document field names to values.
///
/// Key order is observable and round-trips through conversion, matching the
/// ordered nature of BSON documents.
pub type FieldMap = IndexMap<String, Value>;

/// A dynamically typed entity-side value.
///
/// `Value` is what entity accessors produce and consume; the conversion
/// engine translates between this vocabulary and [`Bson`] according to the
/// registered models and scalar types.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent/unset. Null-valued fields are dropped from written documents.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value, stored as a 64-bit BSON integer.
    Integer(i64),
    /// Floating point value, stored as a BSON double.
    Decimal(f64),
    /// String value.
    String(String),
    /// Calendar timestamp. Carries an offset so decode-side timezone
    /// normalization is representable; equality compares instants.
    Date(DateTime<FixedOffset>),
    /// Canonical document identifier.
    Id(ObjectId),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Keyed, insertion-ordered map of values.
    Map(FieldMap),
    /// A typed entity instance.
    Entity(Box<dyn Entity>),
    /// A lazily materialized value; see [`Proxy`].
    Proxy(Proxy),
}

/// The shapes a value can take after the shallow sequence cast used by
/// array field dispatch.
pub(crate) enum Elements {
    Seq(Vec<Value>),
    Keyed(FieldMap),
}

impl Value {
    /// Returns a short name for the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Id(_) => "id",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Entity(_) => "entity",
            Value::Proxy(_) => "proxy",
        }
    }

    /// Returns `true` when this value is a not-necessarily-resolved proxy.
    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Proxy(_))
    }

    /// Unwraps proxies to their concrete value, forcing materialization if
    /// needed. Non-proxy values are returned unchanged.
    pub fn materialized(mut self) -> BindResult<Value> {
        while let Value::Proxy(proxy) = self {
            self = proxy.value()?;
        }
        Ok(self)
    }

    /// Structurally converts a BSON value into its entity-side shape.
    ///
    /// Dates are normalized to `tz` when one is configured; documents become
    /// ordered [`Value::Map`]s. BSON types outside the supported vocabulary
    /// map to [`Value::Null`].
    pub fn from_bson(bson: &Bson, tz: Option<FixedOffset>) -> Value {
        match bson {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(value) => Value::Boolean(*value),
            Bson::Int32(value) => Value::Integer(i64::from(*value)),
            Bson::Int64(value) => Value::Integer(*value),
            Bson::Double(value) => Value::Decimal(*value),
            Bson::String(value) => Value::String(value.clone()),
            Bson::ObjectId(oid) => Value::Id(*oid),
            Bson::DateTime(dt) => Value::Date(date_from_storage(*dt, tz)),
            Bson::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Value::from_bson(item, tz))
                    .collect(),
            ),
            Bson::Document(doc) => Value::Map(
                doc.iter()
                    .map(|(key, value)| (key.clone(), Value::from_bson(value, tz)))
                    .collect(),
            ),
            _ => Value::Null,
        }
    }

    /// Structurally converts this value into BSON.
    ///
    /// Entities serialize as generic sub-documents carrying the class
    /// discriminator, with null fields dropped; proxies are materialized
    /// first. This is the write-side fallback for fields no model describes.
    pub fn to_bson(&self) -> BindResult<Bson> {
        match self {
            Value::Null => Ok(Bson::Null),
            Value::Boolean(value) => Ok(Bson::Boolean(*value)),
            Value::Integer(value) => Ok(Bson::Int64(*value)),
            Value::Decimal(value) => Ok(Bson::Double(*value)),
            Value::String(value) => Ok(Bson::String(value.clone())),
            Value::Date(dt) => Ok(Bson::DateTime(bson::DateTime::from_chrono(*dt))),
            Value::Id(oid) => Ok(Bson::ObjectId(*oid)),
            Value::Array(items) => Ok(Bson::Array(
                items
                    .iter()
                    .map(Value::to_bson)
                    .collect::<BindResult<Vec<Bson>>>()?,
            )),
            Value::Map(map) => {
                let mut doc = Document::new();
                for (key, value) in map {
                    doc.insert(key.clone(), value.to_bson()?);
                }
                Ok(Bson::Document(doc))
            }
            Value::Entity(entity) => {
                let mut doc = Document::new();
                for (name, value) in reflect(entity.as_ref()) {
                    let converted = value.to_bson()?;
                    if !matches!(converted, Bson::Null) {
                        doc.insert(name, converted);
                    }
                }
                Ok(Bson::Document(doc))
            }
            Value::Proxy(proxy) => proxy.value()?.to_bson(),
        }
    }

    /// Converts this value into a JSON tree.
    ///
    /// Dates render as RFC 3339 strings, identifiers as their hex form,
    /// entities as objects. Unresolved proxies render as `null`; force them
    /// first when their content matters.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Shallow cast to a sequence, as the untyped array conversion defines
    /// it: sequences and keyed maps pass through, null becomes the empty
    /// sequence, any scalar becomes a single-element sequence.
    pub(crate) fn into_elements(self) -> Elements {
        match self {
            Value::Null => Elements::Seq(Vec::new()),
            Value::Array(items) => Elements::Seq(items),
            Value::Map(map) => Elements::Keyed(map),
            Value::Entity(entity) => {
                let mut map = FieldMap::new();
                for (name, value) in reflect(entity.as_ref()) {
                    if name != KEY_CLASS {
                        map.insert(name, value);
                    }
                }
                Elements::Keyed(map)
            }
            other => Elements::Seq(vec![other]),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Id(a), Value::Id(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Entity(a), Value::Entity(b)) => a.eq_entity(b.as_ref()),
            // Proxies compare equal only through their materialized values.
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Date(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            Value::Id(oid) => serializer.serialize_str(&oid.to_hex()),
            Value::Array(items) => items.serialize(serializer),
            Value::Map(map) => {
                let mut state = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    state.serialize_entry(key, value)?;
                }
                state.end()
            }
            Value::Entity(entity) => {
                let fields = reflect(entity.as_ref());
                let mut state = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in &fields {
                    state.serialize_entry(name, value)?;
                }
                state.end()
            }
            Value::Proxy(_) => serializer.serialize_unit(),
        }
    }
}

/// Converts a storage timestamp into an entity-side timestamp, applying the
/// configured decode timezone when one is set.
pub(crate) fn date_from_storage(dt: bson::DateTime, tz: Option<FixedOffset>) -> DateTime<FixedOffset> {
    let utc: DateTime<Utc> = dt.to_chrono();
    match tz {
        Some(offset) => utc.with_timezone(&offset),
        None => utc.fixed_offset(),
    }
}

/// Builds an entity-side timestamp from epoch seconds, UTC.
pub(crate) fn date_from_seconds(seconds: i64) -> Option<DateTime<FixedOffset>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(|dt| dt.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn from_bson_maps_scalars() {
        assert_eq!(Value::from_bson(&Bson::Null, None), Value::Null);
        assert_eq!(
            Value::from_bson(&Bson::Int32(7), None),
            Value::Integer(7)
        );
        assert_eq!(
            Value::from_bson(&Bson::String("x".to_string()), None),
            Value::String("x".to_string())
        );
    }

    #[test]
    fn from_bson_preserves_document_order() {
        let doc = doc! { "b": 1_i64, "a": 2_i64, "c": 3_i64 };
        let Value::Map(map) = Value::from_bson(&Bson::Document(doc), None) else {
            panic!("expected a map");
        };
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn to_bson_round_trips_structural_values() {
        let value = Value::Array(vec![
            Value::Integer(1),
            Value::String("two".to_string()),
            Value::Boolean(true),
        ]);
        let bson = value.to_bson().unwrap();
        assert_eq!(Value::from_bson(&bson, None), value);
    }

    #[test]
    fn dates_honor_decode_timezone() {
        let stored = bson::DateTime::from_millis(86_400_000);
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = date_from_storage(stored, Some(offset));
        assert_eq!(local.offset(), &offset);
        assert_eq!(local.timestamp(), 86_400);
    }

    #[test]
    fn into_elements_promotes_scalars() {
        match Value::Integer(5).into_elements() {
            Elements::Seq(items) => assert_eq!(items, vec![Value::Integer(5)]),
            Elements::Keyed(_) => panic!("expected a sequence"),
        }
        match Value::Null.into_elements() {
            Elements::Seq(items) => assert!(items.is_empty()),
            Elements::Keyed(_) => panic!("expected a sequence"),
        }
    }

    #[test]
    fn to_json_renders_dates_and_ids_as_strings() {
        let oid = ObjectId::new();
        let mut map = FieldMap::new();
        map.insert("id".to_string(), Value::Id(oid));
        map.insert("flag".to_string(), Value::Boolean(true));
        let json = Value::Map(map).to_json().unwrap();
        assert_eq!(json["id"], serde_json::json!(oid.to_hex()));
        assert_eq!(json["flag"], serde_json::json!(true));
    }
}
