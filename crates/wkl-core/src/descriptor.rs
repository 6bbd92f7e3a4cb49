#![forbid(unsafe_code)]

//! Shared-value descriptors decoded from boundary values.
//!
//! The script side describes a shared value either as a scalar or as an object
//! flagged with one of `isWorklet`, `isFunction`, `isArray` or `isObject`.
//! Those flags are inspected exactly once, here, and turned into a closed
//! [`SharedValueDescriptor`]. Everything downstream matches on the enum.
//!
//! | Boundary shape                                | Descriptor         |
//! |-----------------------------------------------|--------------------|
//! | number                                        | `Double`           |
//! | string                                        | `String`           |
//! | `{ isWorklet, workletId, argIds }`            | `WorkletStarter`   |
//! | `{ isFunction, workletId }`                   | `Function`         |
//! | `{ isArray, argIds }`                         | `Array`            |
//! | `{ isObject, ids, propNames }`                | `Object`           |
//!
//! An object carrying several flags decodes by the first of `isObject`,
//! `isArray`, `isFunction`, `isWorklet` that it has.

use crate::error::DecodeError;
use crate::id::{SharedValueId, WorkletId, raw_id_from_number};
use crate::value::{Value, ValueKind};

/// What a shared value should be built from, before dependencies are resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SharedValueDescriptor {
    Double(f64),
    String(String),
    Array(Vec<SharedValueId>),
    Object {
        ids: Vec<SharedValueId>,
        names: Vec<String>,
    },
    Function(WorkletId),
    WorkletStarter {
        worklet: WorkletId,
        args: Vec<SharedValueId>,
    },
}

impl SharedValueDescriptor {
    /// Every shared-value id this descriptor depends on, in declared order.
    #[must_use]
    pub fn dependencies(&self) -> &[SharedValueId] {
        match self {
            Self::Array(ids) | Self::Object { ids, .. } => ids,
            Self::WorkletStarter { args, .. } => args,
            Self::Double(_) | Self::String(_) | Self::Function(_) => &[],
        }
    }

    /// The worklet this descriptor depends on, if any.
    #[must_use]
    pub fn worklet(&self) -> Option<WorkletId> {
        match self {
            Self::Function(worklet) | Self::WorkletStarter { worklet, .. } => Some(*worklet),
            _ => None,
        }
    }
}

impl TryFrom<&Value> for SharedValueDescriptor {
    type Error = DecodeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(n) => Ok(Self::Double(*n)),
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Object(_) => decode_marked_object(value),
            other => Err(DecodeError::UnsupportedKind { kind: other.kind() }),
        }
    }
}

fn decode_marked_object(obj: &Value) -> Result<SharedValueDescriptor, DecodeError> {
    if obj.has_field("isObject") {
        let ids: Vec<SharedValueId> = id_list(obj, "ids")?
            .into_iter()
            .map(SharedValueId::new)
            .collect();
        let names = string_list(obj, "propNames")?;
        if ids.len() != names.len() {
            return Err(DecodeError::FieldCountMismatch {
                ids: ids.len(),
                names: names.len(),
            });
        }
        return Ok(SharedValueDescriptor::Object { ids, names });
    }
    if obj.has_field("isArray") {
        return Ok(SharedValueDescriptor::Array(
            id_list(obj, "argIds")?
                .into_iter()
                .map(SharedValueId::new)
                .collect(),
        ));
    }
    if obj.has_field("isFunction") {
        return Ok(SharedValueDescriptor::Function(WorkletId::new(id_field(
            obj,
            "workletId",
        )?)));
    }
    if obj.has_field("isWorklet") {
        return Ok(SharedValueDescriptor::WorkletStarter {
            worklet: WorkletId::new(id_field(obj, "workletId")?),
            args: id_list(obj, "argIds")?
                .into_iter()
                .map(SharedValueId::new)
                .collect(),
        });
    }
    Err(DecodeError::UnknownMarker)
}

/// Decode a bare list of shared-value ids, such as applier inputs.
///
/// `field` names the argument in errors.
pub fn decode_id_list(value: &Value, field: &'static str) -> Result<Vec<SharedValueId>, DecodeError> {
    let items = value.as_array().ok_or(DecodeError::WrongFieldKind {
        field,
        expected: ValueKind::Array,
        found: value.kind(),
    })?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_number()
                .and_then(raw_id_from_number)
                .map(SharedValueId::new)
                .ok_or(DecodeError::InvalidId { field, index })
        })
        .collect()
}

fn field<'a>(obj: &'a Value, field: &'static str) -> Result<&'a Value, DecodeError> {
    obj.get(field).ok_or(DecodeError::MissingField { field })
}

fn array_field<'a>(obj: &'a Value, name: &'static str) -> Result<&'a [Value], DecodeError> {
    let value = field(obj, name)?;
    value.as_array().ok_or(DecodeError::WrongFieldKind {
        field: name,
        expected: ValueKind::Array,
        found: value.kind(),
    })
}

fn id_field(obj: &Value, name: &'static str) -> Result<u32, DecodeError> {
    let value = field(obj, name)?;
    let n = value.as_number().ok_or(DecodeError::WrongFieldKind {
        field: name,
        expected: ValueKind::Number,
        found: value.kind(),
    })?;
    raw_id_from_number(n).ok_or(DecodeError::InvalidId {
        field: name,
        index: 0,
    })
}

fn id_list(obj: &Value, name: &'static str) -> Result<Vec<u32>, DecodeError> {
    array_field(obj, name)?
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_number()
                .and_then(raw_id_from_number)
                .ok_or(DecodeError::InvalidId { field: name, index })
        })
        .collect()
}

fn string_list(obj: &Value, name: &'static str) -> Result<Vec<String>, DecodeError> {
    array_field(obj, name)?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or(DecodeError::WrongFieldKind {
                    field: name,
                    expected: ValueKind::String,
                    found: item.kind(),
                })
        })
        .collect()
}
