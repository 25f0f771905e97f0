//! Document shapes and the pre-create / pre-update transforms.
//!
//! A [`Document`] exposes a static projection of its fields: the storage key of
//! every field, its BSON value, whether it holds the zero value of its type and
//! which role it plays (identifier, creation timestamp, update timestamp or plain
//! data). The store layer never inspects documents at runtime beyond that
//! projection.
//!
//! Two shapes are supported out of the box:
//!
//! - typed records, normally through `#[derive(Document)]` from `svckit-macros`
//! - map-shaped documents ([`bson::Document`])
//!
//! # Example
//!
//! ```ignore
//! use bson::oid::ObjectId;
//! use serde::{Deserialize, Serialize};
//! use svckit::Document;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! pub struct Setting {
//!     #[serde(rename = "_id")]
//!     pub id: String,
//!     pub language: String,
//!     #[serde(rename = "create_time")]
//!     pub created_at: i64,
//!     #[serde(rename = "update_time")]
//!     pub updated_at: i64,
//! }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    rc::Rc,
    sync::Arc,
};

use bson::{Bson, DateTime, oid::ObjectId, ser::serialize_to_bson};
use serde::Serialize;

use crate::error::DocumentStoreResult;

/// Storage key of the identifier field.
pub const ID_KEY: &str = "_id";
/// Default storage key of the creation timestamp.
pub const CREATED_AT_KEY: &str = "create_time";
/// Default storage key of the update timestamp.
pub const UPDATED_AT_KEY: &str = "update_time";

/// How a fresh identifier is generated for an identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// A native binary object id.
    ObjectId,
    /// A hex-encoded object id stored as a string.
    Hex,
}

impl IdKind {
    /// Generates a new identifier of this kind.
    pub fn generate(self) -> Bson {
        match self {
            IdKind::ObjectId => Bson::ObjectId(ObjectId::new()),
            IdKind::Hex => Bson::String(ObjectId::new().to_hex()),
        }
    }
}

/// Types that may back an identifier field.
pub trait IdValue {
    const KIND: IdKind;
}

impl IdValue for ObjectId {
    const KIND: IdKind = IdKind::ObjectId;
}

impl IdValue for String {
    const KIND: IdKind = IdKind::Hex;
}

impl<T: IdValue> IdValue for Option<T> {
    const KIND: IdKind = T::KIND;
}

/// The role a projected field plays in the transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Data,
    Id(IdKind),
    CreatedAt,
    UpdatedAt,
}

/// One projected field of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// The storage key (the serialization name of the field).
    pub key: String,
    /// The serialized value.
    pub value: Bson,
    /// Whether the value is the zero value of its type.
    pub zero: bool,
    /// The role of the field.
    pub role: FieldRole,
}

impl Field {
    /// Creates a data field.
    pub fn new(key: impl Into<String>, value: Bson, zero: bool) -> Self {
        Self {
            key: key.into(),
            value,
            zero,
            role: FieldRole::Data,
        }
    }

    /// Serializes a typed value into a field, recording its zero-ness.
    ///
    /// This is what `#[derive(Document)]` emits for every field.
    pub fn project<T>(key: &str, value: &T, role: FieldRole) -> DocumentStoreResult<Self>
    where
        T: Serialize + IsZero + ?Sized,
    {
        Ok(Self {
            key: key.to_string(),
            value: serialize_to_bson(value)?,
            zero: value.is_zero(),
            role,
        })
    }

    /// Sets the role of this field.
    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }
}

/// A record that can be persisted through the store layer.
///
/// Implementors only have to provide [`Document::fields`]; the transforms are
/// derived from it. Map-shaped documents override [`Document::before_update`]
/// because a map is an explicit patch rather than a full record.
pub trait Document: Send + Sync {
    /// Returns the static field projection of this document.
    fn fields(&self) -> DocumentStoreResult<Vec<Field>>;

    /// Builds the document stored on insert.
    ///
    /// Every field is copied under its storage key. The identifier is generated
    /// when it holds the zero value (or when the document has no identifier
    /// field at all), and both timestamps are stamped when absent or zero.
    fn before_create(&self, millis: i64) -> DocumentStoreResult<bson::Document> {
        Ok(create_projection(self.fields()?, millis))
    }

    /// Builds the `$set` patch applied on update.
    ///
    /// Zero-valued fields are omitted, so the patch only touches fields the
    /// caller actually set. The update timestamp is stamped unless supplied.
    fn before_update(&self, millis: i64) -> DocumentStoreResult<bson::Document> {
        Ok(update_projection(self.fields()?, millis))
    }
}

fn create_projection(fields: Vec<Field>, millis: i64) -> bson::Document {
    let mut document = bson::Document::new();
    let mut has_id = false;
    let mut created_key = CREATED_AT_KEY.to_string();
    let mut updated_key = UPDATED_AT_KEY.to_string();

    for field in fields {
        match field.role {
            FieldRole::Id(kind) => {
                has_id = true;
                let value = if field.zero { kind.generate() } else { field.value };
                document.insert(field.key, value);
                continue;
            }
            FieldRole::CreatedAt => created_key = field.key.clone(),
            FieldRole::UpdatedAt => updated_key = field.key.clone(),
            FieldRole::Data => {}
        }
        document.insert(field.key, field.value);
    }

    if !has_id {
        document.insert(ID_KEY, IdKind::ObjectId.generate());
    }
    stamp(&mut document, &created_key, millis);
    stamp(&mut document, &updated_key, millis);

    document
}

fn update_projection(fields: Vec<Field>, millis: i64) -> bson::Document {
    let mut document = bson::Document::new();
    let mut updated_key = UPDATED_AT_KEY.to_string();

    for field in fields {
        if field.role == FieldRole::UpdatedAt {
            updated_key = field.key.clone();
        }
        if !field.zero {
            document.insert(field.key, field.value);
        }
    }
    stamp(&mut document, &updated_key, millis);

    document
}

fn stamp(document: &mut bson::Document, key: &str, millis: i64) {
    if document.get(key).is_none_or(IsZero::is_zero) {
        document.insert(key, Bson::Int64(millis));
    }
}

fn map_role(key: &str, value: &Bson) -> FieldRole {
    match key {
        ID_KEY => match value {
            Bson::String(_) => FieldRole::Id(IdKind::Hex),
            _ => FieldRole::Id(IdKind::ObjectId),
        },
        CREATED_AT_KEY => FieldRole::CreatedAt,
        UPDATED_AT_KEY => FieldRole::UpdatedAt,
        _ => FieldRole::Data,
    }
}

impl Document for bson::Document {
    fn fields(&self) -> DocumentStoreResult<Vec<Field>> {
        Ok(self
            .iter()
            .map(|(key, value)| {
                Field::new(key.as_str(), value.clone(), value.is_zero())
                    .with_role(map_role(key, value))
            })
            .collect())
    }

    fn before_update(&self, millis: i64) -> DocumentStoreResult<bson::Document> {
        let mut document = self.clone();
        stamp(&mut document, UPDATED_AT_KEY, millis);
        Ok(document)
    }
}

impl<D: Document + ?Sized> Document for &D {
    fn fields(&self) -> DocumentStoreResult<Vec<Field>> {
        (**self).fields()
    }

    fn before_create(&self, millis: i64) -> DocumentStoreResult<bson::Document> {
        (**self).before_create(millis)
    }

    fn before_update(&self, millis: i64) -> DocumentStoreResult<bson::Document> {
        (**self).before_update(millis)
    }
}

impl<D: Document + ?Sized> Document for Box<D> {
    fn fields(&self) -> DocumentStoreResult<Vec<Field>> {
        (**self).fields()
    }

    fn before_create(&self, millis: i64) -> DocumentStoreResult<bson::Document> {
        (**self).before_create(millis)
    }

    fn before_update(&self, millis: i64) -> DocumentStoreResult<bson::Document> {
        (**self).before_update(millis)
    }
}

/// Type-directed zero-value check used to build sparse update patches.
///
/// Strings are zero when empty, booleans when `false`, numbers when `0`,
/// options when `None` and collections when empty. Records deriving
/// `Document` are zero when every field is zero. For other types with a
/// meaningful `Default`, use [`impl_is_zero_by_default!`](crate::impl_is_zero_by_default).
pub trait IsZero {
    fn is_zero(&self) -> bool;
}

macro_rules! zero_when_eq {
    ($zero:expr => $($ty:ty),* $(,)?) => {
        $(
            impl IsZero for $ty {
                fn is_zero(&self) -> bool {
                    *self == $zero
                }
            }
        )*
    };
}

zero_when_eq!(0 => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
zero_when_eq!(0.0 => f32, f64);
zero_when_eq!(false => bool);
zero_when_eq!('\0' => char);

/// Implements [`IsZero`] by comparing against `Default::default()`.
///
/// ```ignore
/// #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
/// enum Status { #[default] Unknown, Active }
///
/// svckit_core::impl_is_zero_by_default!(Status);
/// ```
#[macro_export]
macro_rules! impl_is_zero_by_default {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::document::IsZero for $ty {
                fn is_zero(&self) -> bool {
                    *self == <$ty as ::core::default::Default>::default()
                }
            }
        )*
    };
}

impl IsZero for str {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl IsZero for String {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsZero for Option<T> {
    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

impl<T> IsZero for Vec<T> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsZero for [T] {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> IsZero for HashMap<K, V, S> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> IsZero for BTreeMap<K, V> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T, S> IsZero for HashSet<T, S> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsZero for BTreeSet<T> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T: IsZero + ?Sized> IsZero for &T {
    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

impl<T: IsZero + ?Sized> IsZero for Box<T> {
    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

impl<T: IsZero + ?Sized> IsZero for Arc<T> {
    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

impl<T: IsZero + ?Sized> IsZero for Rc<T> {
    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

impl IsZero for ObjectId {
    fn is_zero(&self) -> bool {
        self.bytes() == [0u8; 12]
    }
}

impl IsZero for DateTime {
    fn is_zero(&self) -> bool {
        self.timestamp_millis() == 0
    }
}

impl IsZero for uuid::Uuid {
    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

impl IsZero for bson::Document {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl IsZero for Bson {
    fn is_zero(&self) -> bool {
        match self {
            Bson::Null | Bson::Undefined => true,
            Bson::String(value) => value.is_empty(),
            Bson::Boolean(value) => !value,
            Bson::Int32(value) => *value == 0,
            Bson::Int64(value) => *value == 0,
            Bson::Double(value) => *value == 0.0,
            Bson::Array(values) => values.is_empty(),
            Bson::Document(document) => document.is_empty(),
            Bson::ObjectId(oid) => oid.is_zero(),
            Bson::DateTime(datetime) => datetime.is_zero(),
            Bson::Binary(binary) => binary.bytes.is_empty(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Profile {
        #[serde(rename = "_id")]
        id: String,
        nickname: String,
        level: u8,
        verified: bool,
        tags: Vec<String>,
        #[serde(rename = "create_time")]
        created_at: i64,
        #[serde(rename = "update_time")]
        updated_at: i64,
    }

    impl Document for Profile {
        fn fields(&self) -> DocumentStoreResult<Vec<Field>> {
            Ok(vec![
                Field::project("_id", &self.id, FieldRole::Id(<String as IdValue>::KIND))?,
                Field::project("nickname", &self.nickname, FieldRole::Data)?,
                Field::project("level", &self.level, FieldRole::Data)?,
                Field::project("verified", &self.verified, FieldRole::Data)?,
                Field::project("tags", &self.tags, FieldRole::Data)?,
                Field::project("create_time", &self.created_at, FieldRole::CreatedAt)?,
                Field::project("update_time", &self.updated_at, FieldRole::UpdatedAt)?,
            ])
        }
    }

    #[derive(Debug, Clone, Serialize)]
    struct Event {
        #[serde(rename = "_id")]
        id: ObjectId,
        kind: String,
    }

    impl Document for Event {
        fn fields(&self) -> DocumentStoreResult<Vec<Field>> {
            Ok(vec![
                Field::project("_id", &self.id, FieldRole::Id(<ObjectId as IdValue>::KIND))?,
                Field::project("kind", &self.kind, FieldRole::Data)?,
            ])
        }
    }

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn create_generates_hex_id_and_stamps_timestamps() {
        let profile = Profile {
            nickname: "neo".into(),
            ..Default::default()
        };

        let stored = profile.before_create(NOW).unwrap();

        let id = stored.get_str("_id").unwrap();
        assert_eq!(id.len(), 24);
        assert!(ObjectId::parse_str(id).is_ok());
        assert_eq!(stored.get_i64("create_time").unwrap(), NOW);
        assert_eq!(stored.get_i64("update_time").unwrap(), NOW);
        assert_eq!(stored.get_str("nickname").unwrap(), "neo");
        // zero-valued data fields are still copied on create
        assert_eq!(stored.get_i32("level").unwrap(), 0);
    }

    #[test]
    fn create_keeps_caller_supplied_values() {
        let profile = Profile {
            id: "custom-id".into(),
            created_at: 42,
            ..Default::default()
        };

        let stored = profile.before_create(NOW).unwrap();

        assert_eq!(stored.get_str("_id").unwrap(), "custom-id");
        assert_eq!(stored.get_i64("create_time").unwrap(), 42);
        assert_eq!(stored.get_i64("update_time").unwrap(), NOW);
    }

    #[test]
    fn create_generates_binary_id_for_object_id_fields() {
        let event = Event {
            id: ObjectId::from_bytes([0; 12]),
            kind: "login".into(),
        };

        let stored = event.before_create(NOW).unwrap();

        let id = stored.get_object_id("_id").unwrap();
        assert!(!id.is_zero());
    }

    #[test]
    fn update_omits_zero_fields() {
        let profile = Profile {
            id: "abc".into(),
            nickname: "trinity".into(),
            verified: true,
            ..Default::default()
        };

        let patch = profile.before_update(NOW).unwrap();

        assert_eq!(
            patch,
            doc! {
                "_id": "abc",
                "nickname": "trinity",
                "verified": true,
                "update_time": NOW,
            }
        );
    }

    #[test]
    fn update_keeps_supplied_update_time() {
        let profile = Profile {
            level: 3,
            updated_at: 7,
            ..Default::default()
        };

        let patch = profile.before_update(NOW).unwrap();

        assert_eq!(patch, doc! { "level": 3, "update_time": 7_i64 });
    }

    #[test]
    fn map_documents_keep_their_own_id() {
        let map = doc! { "_id": "given", "name": "x" };

        let stored = map.before_create(NOW).unwrap();

        assert_eq!(stored.get_str("_id").unwrap(), "given");
        assert_eq!(stored.get_i64("create_time").unwrap(), NOW);
    }

    #[test]
    fn map_documents_without_id_get_object_id() {
        let stored = doc! { "name": "x" }.before_create(NOW).unwrap();

        assert!(stored.get_object_id("_id").is_ok());
    }

    #[test]
    fn map_updates_keep_explicit_zero_values() {
        let patch = doc! { "count": 0, "name": "" }.before_update(NOW).unwrap();

        assert_eq!(patch, doc! { "count": 0, "name": "", "update_time": NOW });
    }

    #[test]
    fn zero_checks_follow_the_type() {
        assert!("".is_zero());
        assert!(!"a".is_zero());
        assert!(0u64.is_zero());
        assert!(0.0f64.is_zero());
        assert!(!(-1i32).is_zero());
        assert!(Option::<u8>::None.is_zero());
        assert!(!Some(0u8).is_zero());
        assert!(Vec::<u8>::new().is_zero());
        assert!(ObjectId::from_bytes([0; 12]).is_zero());
        assert!(!ObjectId::new().is_zero());
        assert!(Bson::Null.is_zero());
        assert!(!Bson::Int32(1).is_zero());
    }
}
