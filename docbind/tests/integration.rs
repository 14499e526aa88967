//! Integration tests over the memory backend: storing entities through
//! collections, identifier write-back, and lazy reference resolution
//! including circular graphs.

use std::{any::Any, sync::Arc};

use bson::{Bson, doc, oid::ObjectId};

use docbind::memory::MemoryBackend;
use docbind::prelude::*;

#[derive(Debug, Clone, PartialEq, Default)]
struct Account {
    id: Option<ObjectId>,
    name: String,
}

impl Entity for Account {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["_id", "name"]
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "_id" => Some(self.id.map_or(Value::Null, Value::Id)),
            "name" => Some(Value::String(self.name.clone())),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> bool {
        match (field, value) {
            ("_id", Value::Id(oid)) => self.id = Some(oid),
            ("_id", Value::Null) => self.id = None,
            ("name", Value::String(name)) => self.name = name,
            _ => return false,
        }
        true
    }

    fn clone_entity(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }

    fn eq_entity(&self, other: &dyn Entity) -> bool {
        other.downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EntityType for Account {
    const CLASS: &'static str = "fixtures.Account";

    fn from_fields(mut fields: FieldMap) -> BindResult<Self> {
        let mut account = Account::default();
        for (name, value) in fields.drain(..) {
            account.set(&name, value);
        }
        Ok(account)
    }
}

/// A person referencing another person. Identifiers are plain integers and
/// the model declares no descriptor for `_id`, so they pass through the
/// structural conversion unchanged.
#[derive(Debug, Clone, Default)]
struct Person {
    id: Option<i64>,
    name: String,
    friend: Value,
}

impl Entity for Person {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["_id", "name", "friend"]
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "_id" => Some(self.id.map_or(Value::Null, Value::Integer)),
            "name" => Some(Value::String(self.name.clone())),
            "friend" => Some(self.friend.clone()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> bool {
        match (field, value) {
            ("_id", Value::Integer(id)) => self.id = Some(id),
            ("_id", Value::Null) => self.id = None,
            ("name", Value::String(name)) => self.name = name,
            ("friend", value @ (Value::Entity(_) | Value::Proxy(_) | Value::Null)) => {
                self.friend = value;
            }
            _ => return false,
        }
        true
    }

    fn clone_entity(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }

    fn eq_entity(&self, other: &dyn Entity) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|p| p.id == self.id && p.name == self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EntityType for Person {
    const CLASS: &'static str = "fixtures.Person";

    fn from_fields(mut fields: FieldMap) -> BindResult<Self> {
        let mut person = Person::default();
        for (name, value) in fields.drain(..) {
            person.set(&name, value);
        }
        Ok(person)
    }
}

/// An entity type with no identifier field at all.
#[derive(Debug, Clone, PartialEq, Default)]
struct Draft {
    body: String,
}

impl Entity for Draft {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["body"]
    }

    fn get(&self, field: &str) -> Option<Value> {
        (field == "body").then(|| Value::String(self.body.clone()))
    }

    fn set(&mut self, field: &str, value: Value) -> bool {
        if let ("body", Value::String(body)) = (field, value) {
            self.body = body;
            true
        } else {
            false
        }
    }

    fn clone_entity(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }

    fn eq_entity(&self, other: &dyn Entity) -> bool {
        other.downcast_ref::<Self>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EntityType for Draft {
    const CLASS: &'static str = "fixtures.Draft";

    fn from_fields(mut fields: FieldMap) -> BindResult<Self> {
        let mut draft = Draft::default();
        for (name, value) in fields.drain(..) {
            draft.set(&name, value);
        }
        Ok(draft)
    }
}

fn converter() -> DocumentConverter {
    let mut models = ModelRegistry::new();
    models.register(
        Model::new(
            Account::CLASS,
            [
                FieldDescriptor::id(),
                FieldDescriptor::scalar("name", tags::STRING).unwrap(),
            ],
        )
        .with_collection("accounts"),
    );
    models.register(
        Model::new(
            Person::CLASS,
            [
                FieldDescriptor::scalar("name", tags::STRING).unwrap(),
                FieldDescriptor::reference("friend"),
            ],
        )
        .with_collection("people"),
    );
    models.register(Model::new(
        Draft::CLASS,
        [FieldDescriptor::scalar("body", tags::STRING).unwrap()],
    ));

    let mut entities = EntityRegistry::new();
    entities.register::<Account>();
    entities.register::<Person>();
    entities.register::<Draft>();

    DocumentConverter::new(models, entities)
}

fn connection() -> Connection {
    Connection::new(Arc::new(MemoryBackend::new()), converter())
}

#[test]
fn insert_assigns_the_generated_identifier() {
    let connection = connection();
    let accounts = connection.collection("accounts");

    let mut account = Account { id: None, name: "alice".to_string() };
    accounts.insert(&mut account).unwrap();

    let id = account.id.expect("identifier assigned after insert");

    let loaded = accounts
        .find_by_id(&Bson::ObjectId(id))
        .unwrap()
        .materialized()
        .unwrap();
    let Value::Entity(entity) = loaded else {
        panic!("expected an entity");
    };
    assert_eq!(entity.downcast_ref::<Account>(), Some(&account));
}

#[test]
fn entities_cannot_be_saved_into_a_foreign_collection() {
    let connection = connection();
    let people = connection.collection("people");

    let mut account = Account { id: None, name: "alice".to_string() };
    let err = people.insert(&mut account).unwrap_err();
    assert!(matches!(err, BindError::InvalidEntity(_)));
}

#[test]
fn storing_a_reference_yields_a_token_not_a_document() {
    let converter = converter();
    let person = Person {
        id: Some(2),
        name: "bob".to_string(),
        friend: Value::Null,
    };

    let token = converter
        .resolver()
        .store(&Value::Entity(person.clone_entity()))
        .unwrap();

    assert_eq!(token, Bson::Document(doc! { "$ref": "people", "$id": 2_i64 }));
}

#[test]
fn circular_references_round_trip_lazily() {
    let connection = connection();
    let people = connection.collection("people");

    let mut a = Person { id: Some(1), name: "a".to_string(), friend: Value::Null };
    let mut b = Person { id: Some(2), name: "b".to_string(), friend: Value::Null };
    a.friend = Value::Entity(b.clone_entity());
    b.friend = Value::Entity(a.clone_entity());

    // Writing never chases the cycle: each side collapses to a token.
    people.save(&mut a).unwrap();
    people.save(&mut b).unwrap();

    let loaded = people
        .find_by_id(&Bson::Int64(1))
        .unwrap()
        .materialized()
        .unwrap();
    let Value::Entity(entity) = loaded else {
        panic!("expected an entity");
    };
    let a1 = entity.downcast_ref::<Person>().unwrap();
    assert_eq!(a1.name, "a");
    assert!(a1.friend.is_proxy(), "the friend stays lazy until accessed");

    let friend = a1.friend.clone().materialized().unwrap();
    let Value::Entity(entity) = friend else {
        panic!("expected an entity");
    };
    let b1 = entity.downcast_ref::<Person>().unwrap();
    assert_eq!(b1.name, "b");

    let back = b1.friend.clone().materialized().unwrap();
    let Value::Entity(entity) = back else {
        panic!("expected an entity");
    };
    let a2 = entity.downcast_ref::<Person>().unwrap();
    assert_eq!(a2.id, Some(1));
    assert_eq!(a2.name, "a");
}

#[test]
fn resolving_before_connecting_fails() {
    let converter = converter();
    let token = Bson::Document(doc! { "$ref": "people", "$id": 1_i64 });

    let err = converter.resolver().resolve(&token).unwrap_err();
    assert_eq!(
        err,
        BindError::InvalidReference("unable to resolve reference, not connected".to_string())
    );
}

#[test]
fn malformed_tokens_are_rejected() {
    let converter = converter();

    let err = converter
        .resolver()
        .resolve(&Bson::Document(doc! { "$id": 1_i64 }))
        .unwrap_err();
    assert!(matches!(err, BindError::InvalidReference(_)));

    let err = converter
        .resolver()
        .resolve(&Bson::String("people:1".to_string()))
        .unwrap_err();
    assert!(matches!(err, BindError::InvalidReference(_)));
}

#[test]
fn references_to_missing_documents_resolve_to_null() {
    let connection = connection();
    let token = Bson::Document(doc! { "$ref": "people", "$id": 404_i64 });

    let resolved = connection
        .converter()
        .resolver()
        .resolve(&token)
        .unwrap()
        .materialized()
        .unwrap();
    assert_eq!(resolved, Value::Null);
}

#[test]
fn entities_without_an_identifier_field_cannot_be_referenced() {
    let converter = converter();
    let draft = Draft { body: "wip".to_string() };

    let err = converter
        .resolver()
        .store(&Value::Entity(draft.clone_entity()))
        .unwrap_err();
    assert!(matches!(err, BindError::InvalidEntity(_)));
}

#[test]
fn unsaved_entities_cannot_be_referenced() {
    let converter = converter();
    let person = Person { id: None, name: "nobody".to_string(), friend: Value::Null };

    let err = converter
        .resolver()
        .store(&Value::Entity(person.clone_entity()))
        .unwrap_err();
    assert_eq!(
        err,
        BindError::InvalidEntity("entity identifier is empty".to_string())
    );
}

#[test]
fn save_replaces_an_existing_document() {
    let connection = connection();
    let accounts = connection.collection("accounts");

    let mut account = Account { id: None, name: "alice".to_string() };
    accounts.insert(&mut account).unwrap();

    account.name = "alice v2".to_string();
    accounts.save(&mut account).unwrap();

    let id = account.id.unwrap();
    let loaded = accounts
        .find_by_id(&Bson::ObjectId(id))
        .unwrap()
        .materialized()
        .unwrap();
    let Value::Entity(entity) = loaded else {
        panic!("expected an entity");
    };
    assert_eq!(entity.downcast_ref::<Account>().unwrap().name, "alice v2");
}
