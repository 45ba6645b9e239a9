//! The entity binder.
//!
//! Per field, in declaration order:
//!
//! 1. fetch the raw value from the field's transport;
//! 2. fail if the field is required and the value is empty;
//! 3. run the caller's validation rule for the field, if any;
//! 4. coerce the raw value into the field's type and write it.
//!
//! Binding either produces a complete entity or the first error; a handler
//! never sees a half-bound entity.

use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::config::{CoercionPolicy, Config};
use crate::error::{BindError, SchemaError};
use crate::reply::HandlerError;
use crate::request::Request;
use crate::schema::{Entity, FieldDescriptor, File, SemanticType, Setter};
use crate::transport::{self, Extracted, FilePart, Transport};

/// Validation rules keyed by field name.
pub type Rules = HashMap<String, String>;

// ── Raw values ────────────────────────────────────────────────────────────────

/// A value as found on its transport, before coercion.
#[derive(Clone, Copy, Debug)]
pub enum RawValue<'a> {
    Absent,
    Text(&'a str),
    Json(&'a Value),
    Files(&'a [FilePart]),
}

impl<'a> RawValue<'a> {
    fn fetch(data: &'a Extracted, transport: Transport, key: &str) -> Self {
        match transport {
            Transport::Query => data.query(key).map_or(Self::Absent, Self::Text),
            Transport::Body => data.body(key).map_or(Self::Absent, Self::Json),
            Transport::Form => Self::Files(data.files(key)),
            Transport::Param => data.param(key).map_or(Self::Absent, Self::Text),
        }
    }

    /// Absent, empty text, JSON `null` / `""`, or no file parts.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Text(s) => s.is_empty(),
            Self::Json(Value::Null) => true,
            Self::Json(Value::String(s)) => s.is_empty(),
            Self::Json(_) => false,
            Self::Files(parts) => parts.is_empty(),
        }
    }

    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            Self::Text(s) => Some(s),
            Self::Json(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The textual form used for numeric and boolean parsing. JSON numbers
    /// and booleans are rendered; objects, arrays and files have none.
    fn scalar_text(&self) -> Option<Cow<'a, str>> {
        match *self {
            Self::Json(Value::Number(n)) => Some(Cow::Owned(n.to_string())),
            Self::Json(Value::Bool(b)) => Some(Cow::Owned(b.to_string())),
            _ => self.as_str().map(Cow::Borrowed),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// The destination slot a validation rule is checked against.
///
/// The field has not been written yet; `raw` is what is about to be coerced
/// into it.
#[derive(Clone, Copy, Debug)]
pub struct Slot<'a> {
    pub field: &'a str,
    pub kind: SemanticType,
    pub raw: RawValue<'a>,
}

/// Runs one validation rule against one field.
///
/// Rule implementations live outside this crate. Returning a
/// [`RestError`](crate::RestError) lets the rule choose the response.
pub trait Checker: Send + Sync + 'static {
    fn check(&self, slot: &Slot<'_>, rule: &str) -> Result<(), HandlerError>;
}

impl<F> Checker for F
where
    F: Fn(&Slot<'_>, &str) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn check(&self, slot: &Slot<'_>, rule: &str) -> Result<(), HandlerError> {
        self(slot, rule)
    }
}

/// Accepts every rule. Installed when no checker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl Checker for AcceptAll {
    fn check(&self, _slot: &Slot<'_>, _rule: &str) -> Result<(), HandlerError> {
        Ok(())
    }
}

// ── Binder ────────────────────────────────────────────────────────────────────

/// A compiled schema, ready to bind requests into `E`.
pub struct Binder<E> {
    entity: &'static str,
    fields: Vec<(FieldDescriptor, Setter<E>)>,
}

impl<E: Entity> Binder<E> {
    /// Compiles `E::schema()`, rejecting structurally invalid schemas.
    pub fn new() -> Result<Self, SchemaError> {
        let compiled = E::schema().compile()?;
        Ok(Self { entity: compiled.entity, fields: compiled.fields })
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().map(|(d, _)| d)
    }

    /// Every rule must name a declared field.
    pub fn check_rules(&self, rules: &Rules) -> Result<(), SchemaError> {
        match rules.keys().find(|name| !self.descriptors().any(|d| d.name == name.as_str())) {
            Some(field) => Err(SchemaError::UnknownRuleField { entity: self.entity, field: field.clone() }),
            None => Ok(()),
        }
    }

    /// Extracts `req` and binds it. An entity without fields skips extraction.
    pub async fn bind(
        &self,
        req: &Request,
        rules: &Rules,
        checker: &dyn Checker,
        config: &Config,
    ) -> Result<E, BindError> {
        if self.fields.is_empty() {
            return Ok(E::default());
        }
        let data = transport::extract(req, config.multipart_limit).await?;
        self.bind_extracted(&data, rules, checker, config.policy.coercion)
    }

    /// Binds already-extracted request data.
    pub fn bind_extracted(
        &self,
        data: &Extracted,
        rules: &Rules,
        checker: &dyn Checker,
        coercion: CoercionPolicy,
    ) -> Result<E, BindError> {
        let mut entity = E::default();

        for (descriptor, setter) in &self.fields {
            let raw = RawValue::fetch(data, descriptor.transport, &descriptor.key);

            if descriptor.required && raw.is_empty() {
                return Err(BindError::Required {
                    key: descriptor.key.clone(),
                    transport: descriptor.transport,
                });
            }

            if let Some(rule) = rules.get(descriptor.name).filter(|r| !r.is_empty()) {
                let slot = Slot { field: descriptor.name, kind: descriptor.kind, raw };
                checker.check(&slot, rule).map_err(|source| BindError::Validation {
                    field: descriptor.name.to_owned(),
                    source,
                })?;
            }

            if let Err(value) = coerce(setter, raw, &mut entity) {
                match coercion {
                    CoercionPolicy::Lenient => {
                        debug!(entity = self.entity, field = descriptor.name, %value, "coercion failed, field left unset");
                    }
                    CoercionPolicy::Strict => {
                        return Err(BindError::Coercion {
                            field: descriptor.name,
                            kind: descriptor.kind,
                            value,
                        });
                    }
                }
            }
        }

        Ok(entity)
    }
}

// ── Coercion ──────────────────────────────────────────────────────────────────

/// Writes `raw` through `setter`.
///
/// Empty values and values of the wrong shape (a file where text is expected,
/// a JSON object for an int) leave the field untouched. Only text that fails
/// to parse is reported, as `Err(text)`.
fn coerce<E>(setter: &Setter<E>, raw: RawValue<'_>, entity: &mut E) -> Result<(), String> {
    match *setter {
        Setter::String(set) => {
            if let Some(s) = raw.as_str() {
                set(entity, s.to_owned());
            }
            Ok(())
        }
        Setter::Int(set) => parse_into(raw, entity, set, |s| s.parse().ok()),
        Setter::Float32(set) => parse_into(raw, entity, set, parse_float::<f32>),
        Setter::Float64(set) => parse_into(raw, entity, set, parse_float::<f64>),
        Setter::Bool(set) => parse_into(raw, entity, set, parse_bool),
        Setter::File(set) => {
            if let RawValue::Files([first, ..]) = raw {
                set(entity, File::from(first));
            }
            Ok(())
        }
        Setter::FileList(set) => {
            if let RawValue::Files(parts) = raw {
                if !parts.is_empty() {
                    set(entity, parts.iter().map(File::from).collect());
                }
            }
            Ok(())
        }
        Setter::Unhandled(_) => Ok(()),
    }
}

fn parse_into<E, T>(
    raw: RawValue<'_>,
    entity: &mut E,
    set: fn(&mut E, T),
    parse: fn(&str) -> Option<T>,
) -> Result<(), String> {
    let Some(text) = raw.scalar_text() else {
        return Ok(());
    };
    if text.is_empty() {
        return Ok(());
    }
    let value = parse(&text).ok_or_else(|| text.into_owned())?;
    set(entity, value);
    Ok(())
}

/// Parses a float, rejecting finite text that overflows the target width.
/// `inf` and `infinity` spelled out still parse.
fn parse_float<T>(s: &str) -> Option<T>
where
    T: std::str::FromStr + Into<f64> + Copy,
{
    let value: T = s.parse().ok()?;
    let spelled = s.trim_start_matches(['+', '-']);
    let overflowed = value.into().is_infinite()
        && !spelled.eq_ignore_ascii_case("inf")
        && !spelled.eq_ignore_ascii_case("infinity");
    (!overflowed).then_some(value)
}

/// `1 t T TRUE true True` / `0 f F FALSE false False`.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
