//! Entity schemas.
//!
//! An entity is a plain `Default` struct. Its [`Schema`] lists the fields the
//! binder fills, each with a semantic type, an annotation (see
//! [`meta`](crate::meta)) and a typed setter:
//!
//! ```rust
//! use bindery::{Entity, File, Schema};
//!
//! #[derive(Default)]
//! struct SignUp {
//!     name: String,
//!     age: i64,
//!     avatar: File,
//! }
//!
//! impl Entity for SignUp {
//!     fn schema() -> Schema<Self> {
//!         Schema::<Self>::new()
//!             .string("Name", "name|body!", |e, v| e.name = v)
//!             .int("Age", "", |e, v| e.age = v)
//!             .file("Avatar", "form", |e, v| e.avatar = v)
//!     }
//! }
//! ```
//!
//! A schema is compiled into a descriptor list once, when its route is
//! registered; requests only walk that list.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::SchemaError;
use crate::meta::{self, FieldMeta};
use crate::transport::{FilePart, Transport};

/// A destination type the binder can populate.
///
/// `Default` provides the zero value every field starts from.
pub trait Entity: Default + Send + 'static {
    fn schema() -> Schema<Self>;
}

/// The blank entity, used by routes that declare no schema.
impl Entity for () {
    fn schema() -> Schema<Self> {
        Schema::new()
    }
}

// ── File ──────────────────────────────────────────────────────────────────────

/// One uploaded file, fully read into memory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct File {
    pub raw: Vec<u8>,
    pub name: Option<String>,
}

impl From<&FilePart> for File {
    fn from(part: &FilePart) -> Self {
        Self { raw: part.data.to_vec(), name: part.file_name.clone() }
    }
}

// ── Semantic types ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SemanticType {
    String,
    Int,
    Float32,
    Float64,
    Bool,
    File,
    FileList,
    /// Nested records are declared but never bound.
    Struct,
    /// Generic lists are declared but never bound.
    List,
}

impl SemanticType {
    fn is_file(self) -> bool {
        matches!(self, Self::File | Self::FileList)
    }

    fn is_scalar(self) -> bool {
        matches!(self, Self::String | Self::Int | Self::Float32 | Self::Float64 | Self::Bool)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String   => "string",
            Self::Int      => "int",
            Self::Float32  => "float32",
            Self::Float64  => "float64",
            Self::Bool     => "bool",
            Self::File     => "file",
            Self::FileList => "file-list",
            Self::Struct   => "struct",
            Self::List     => "list",
        })
    }
}

/// Writes a coerced value into its field.
pub(crate) enum Setter<E> {
    String(fn(&mut E, String)),
    Int(fn(&mut E, i64)),
    Float32(fn(&mut E, f32)),
    Float64(fn(&mut E, f64)),
    Bool(fn(&mut E, bool)),
    File(fn(&mut E, File)),
    FileList(fn(&mut E, Vec<File>)),
    Unhandled(SemanticType),
}

impl<E> Setter<E> {
    pub(crate) fn kind(&self) -> SemanticType {
        match self {
            Self::String(_)   => SemanticType::String,
            Self::Int(_)      => SemanticType::Int,
            Self::Float32(_)  => SemanticType::Float32,
            Self::Float64(_)  => SemanticType::Float64,
            Self::Bool(_)     => SemanticType::Bool,
            Self::File(_)     => SemanticType::File,
            Self::FileList(_) => SemanticType::FileList,
            Self::Unhandled(kind) => *kind,
        }
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

struct Field<E> {
    name: &'static str,
    annotation: &'static str,
    setter: Setter<E>,
}

/// The declared fields of an entity, in binding order.
pub struct Schema<E> {
    entity: &'static str,
    fields: Vec<Field<E>>,
}

impl<E> Default for Schema<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Schema<E> {
    pub fn new() -> Self {
        Self { entity: std::any::type_name::<E>(), fields: Vec::new() }
    }

    fn push(mut self, name: &'static str, annotation: &'static str, setter: Setter<E>) -> Self {
        self.fields.push(Field { name, annotation, setter });
        self
    }

    pub fn string(self, name: &'static str, annotation: &'static str, set: fn(&mut E, String)) -> Self {
        self.push(name, annotation, Setter::String(set))
    }

    pub fn int(self, name: &'static str, annotation: &'static str, set: fn(&mut E, i64)) -> Self {
        self.push(name, annotation, Setter::Int(set))
    }

    pub fn float32(self, name: &'static str, annotation: &'static str, set: fn(&mut E, f32)) -> Self {
        self.push(name, annotation, Setter::Float32(set))
    }

    pub fn float64(self, name: &'static str, annotation: &'static str, set: fn(&mut E, f64)) -> Self {
        self.push(name, annotation, Setter::Float64(set))
    }

    pub fn bool(self, name: &'static str, annotation: &'static str, set: fn(&mut E, bool)) -> Self {
        self.push(name, annotation, Setter::Bool(set))
    }

    pub fn file(self, name: &'static str, annotation: &'static str, set: fn(&mut E, File)) -> Self {
        self.push(name, annotation, Setter::File(set))
    }

    pub fn files(self, name: &'static str, annotation: &'static str, set: fn(&mut E, Vec<File>)) -> Self {
        self.push(name, annotation, Setter::FileList(set))
    }

    /// A nested record. Its metadata is resolved (and a required one is
    /// enforced) but nothing is written into it.
    pub fn nested(self, name: &'static str, annotation: &'static str) -> Self {
        self.push(name, annotation, Setter::Unhandled(SemanticType::Struct))
    }

    /// A generic list; same treatment as [`nested`](Self::nested).
    pub fn list(self, name: &'static str, annotation: &'static str) -> Self {
        self.push(name, annotation, Setter::Unhandled(SemanticType::List))
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves every annotation and checks the schema's structure.
    pub(crate) fn compile(self) -> Result<Compiled<E>, SchemaError> {
        let entity = self.entity;
        let mut names = HashSet::new();
        let mut keys: HashMap<(Transport, String), &'static str> = HashMap::new();
        let mut fields = Vec::with_capacity(self.fields.len());

        for field in self.fields {
            let kind = field.setter.kind();
            let FieldMeta { transport, key, required } = meta::resolve(field.name, field.annotation)
                .map_err(|e| SchemaError::UnknownTransport {
                    entity,
                    field: field.name,
                    transport: e.0,
                })?;

            if !names.insert(field.name) {
                return Err(SchemaError::DuplicateField { entity, field: field.name });
            }
            if kind.is_file() && transport != Transport::Form {
                return Err(SchemaError::FileOutsideForm { entity, field: field.name, kind, transport });
            }
            if kind.is_scalar() && transport == Transport::Form {
                return Err(SchemaError::ScalarOnForm { entity, field: field.name, kind });
            }
            let lookup = match transport {
                Transport::Param => crate::transport::canonical_param(&key),
                _ => key.clone(),
            };
            if let Some(first) = keys.insert((transport, lookup), field.name) {
                return Err(SchemaError::DuplicateKey {
                    entity,
                    first,
                    second: field.name,
                    key,
                    transport,
                });
            }

            fields.push((
                FieldDescriptor { name: field.name, kind, transport, key, required },
                field.setter,
            ));
        }

        Ok(Compiled { entity, fields })
    }
}

// ── Compiled form ─────────────────────────────────────────────────────────────

/// One resolved field: exactly one transport, one key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: SemanticType,
    pub transport: Transport,
    pub key: String,
    pub required: bool,
}

pub(crate) struct Compiled<E> {
    pub(crate) entity: &'static str,
    pub(crate) fields: Vec<(FieldDescriptor, Setter<E>)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Profile {
        name: String,
        age: i64,
        avatar: File,
    }

    fn profile() -> Schema<Profile> {
        Schema::<Profile>::new()
            .string("Name", "name|body!", |e, v| e.name = v)
            .int("Age", "", |e, v| e.age = v)
            .file("Avatar", "form", |e, v| e.avatar = v)
    }

    #[test]
    fn compiles_into_descriptors_in_declaration_order() {
        let compiled = profile().compile().unwrap();
        let descriptors: Vec<_> = compiled.fields.iter().map(|(d, _)| d.clone()).collect();
        assert_eq!(
            descriptors,
            vec![
                FieldDescriptor {
                    name: "Name",
                    kind: SemanticType::String,
                    transport: Transport::Body,
                    key: "name".into(),
                    required: true,
                },
                FieldDescriptor {
                    name: "Age",
                    kind: SemanticType::Int,
                    transport: Transport::Query,
                    key: "age".into(),
                    required: false,
                },
                FieldDescriptor {
                    name: "Avatar",
                    kind: SemanticType::File,
                    transport: Transport::Form,
                    key: "avatar".into(),
                    required: false,
                },
            ]
        );
    }

    #[test]
    fn entity_name_defaults_to_type_name() {
        assert!(profile().entity_name().ends_with("Profile"));
    }

    #[test]
    fn blank_entity_has_no_fields() {
        assert!(<() as Entity>::schema().is_empty());
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let err = Schema::<Profile>::new()
            .string("Name", "name|cookie", |e, v| e.name = v)
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, SchemaError::UnknownTransport { field: "Name", .. }));
    }

    #[test]
    fn duplicate_field_is_rejected() {
        let err = Schema::<Profile>::new()
            .string("Name", "", |e, v| e.name = v)
            .string("Name", "nick", |e, v| e.name = v)
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, SchemaError::DuplicateField { field: "Name", .. }));
    }

    #[test]
    fn duplicate_param_key_is_rejected_case_insensitively() {
        let err = Schema::<Profile>::new()
            .string("Name", "userId|param", |e, v| e.name = v)
            .int("Age", "USERID|param", |e, v| e.age = v)
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, SchemaError::DuplicateKey { first: "Name", second: "Age", .. }));
    }

    #[test]
    fn same_key_on_different_transports_is_fine() {
        let compiled = Schema::<Profile>::new()
            .string("Name", "id|query", |e, v| e.name = v)
            .int("Age", "id|param", |e, v| e.age = v)
            .compile();
        assert!(compiled.is_ok());
    }

    #[test]
    fn file_fields_must_use_form() {
        let err = Schema::<Profile>::new()
            .file("Avatar", "avatar|body", |e, v| e.avatar = v)
            .compile()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SchemaError::FileOutsideForm { kind: SemanticType::File, transport: Transport::Body, .. }
        ));
    }

    #[test]
    fn scalar_fields_cannot_use_form() {
        let err = Schema::<Profile>::new()
            .int("Age", "form", |e, v| e.age = v)
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, SchemaError::ScalarOnForm { kind: SemanticType::Int, .. }));
    }

    #[test]
    fn nested_and_list_fields_compile_without_restrictions() {
        let compiled = Schema::<Profile>::new().nested("Address", "body").list("Tags", "").compile().unwrap();
        let kinds: Vec<_> = compiled.fields.iter().map(|(d, _)| d.kind).collect();
        assert_eq!(kinds, vec![SemanticType::Struct, SemanticType::List]);
    }
}
