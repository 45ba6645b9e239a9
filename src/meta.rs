//! Field annotation parsing.
//!
//! An annotation is a short string attached to an entity field:
//!
//! | Annotation     | Transport | Key            | Required |
//! |----------------|-----------|----------------|----------|
//! | `""`           | query     | field name     | no       |
//! | `"!"`          | query     | field name     | yes      |
//! | `"body"`       | body      | field name     | no       |
//! | `"nick"`       | query     | `nick`         | no       |
//! | `"name\|body!"` | body      | `name`         | yes      |
//! | `"\|param"`     | param     | field name     | no       |
//!
//! The default key is the field name with its first character lowercased:
//! `UserName` reads `userName`.
//!
//! Resolution is pure: the same annotation and field name always resolve to
//! the same [`FieldMeta`].

use thiserror::Error;

use crate::transport::Transport;

const REQUIRED_MARKER: char = '!';
const SEPARATOR: char = '|';

/// Where a field is read from, under which key, and whether it must be present.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMeta {
    pub transport: Transport,
    pub key: String,
    pub required: bool,
}

/// The transport half of a `key|transport` annotation is not one of the four
/// known transports.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown transport `{0}`")]
pub struct UnknownTransport(pub String);

/// Resolves one field's annotation.
pub fn resolve(field_name: &str, annotation: &str) -> Result<FieldMeta, UnknownTransport> {
    let required = annotation.contains(REQUIRED_MARKER);
    let annotation = annotation.replace(REQUIRED_MARKER, "");

    let mut meta = FieldMeta {
        transport: Transport::Query,
        key: uncapitalize(field_name),
        required,
    };

    if annotation.is_empty() {
        return Ok(meta);
    }

    if annotation.contains(SEPARATOR) {
        let mut parts = annotation.split(SEPARATOR);
        let key = parts.next().unwrap_or_default();
        let transport = parts.next().unwrap_or_default();
        if !key.is_empty() {
            meta.key = key.to_owned();
        }
        if !transport.is_empty() {
            meta.transport = transport
                .parse()
                .map_err(|()| UnknownTransport(transport.to_owned()))?;
        }
    } else {
        match annotation.parse() {
            Ok(transport) => meta.transport = transport,
            Err(()) => meta.key = annotation,
        }
    }

    Ok(meta)
}

/// Lowercases the first character only.
fn uncapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
