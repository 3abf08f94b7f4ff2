//! Objects stored in a value heap.
//!
//! [`Object`] is the node weight of the heap graph. Containers carry no
//! children inline: their members are outgoing edges labelled with a
//! [`Slot`], so a container may hold itself and the heap can represent the
//! cyclic graphs that synthesis has to refuse.

use serde::{Deserialize, Serialize};

use crate::routine::{CompiledRoutine, Signature};

/// A scalar with an unambiguous literal form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
    Text(String),
    Bytes(Vec<u8>),
}

/// A class-like callable, always referenced through its defining module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub module: String,
    /// Dotted qualified name reflecting lexical nesting.
    pub qualname: String,
    /// Constructor signature. `None` when the host could not provide one.
    pub signature: Option<Signature>,
}

/// An instance with no literal form. Its attribute state lives on
/// [`Slot::Attribute`] edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueInfo {
    /// Module defining the instance's class.
    pub module: String,
    /// Qualified name of the instance's class.
    pub class_name: String,
}

/// One object in the heap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Object {
    Module { name: String },
    Callable(CompiledRoutine),
    Class(ClassInfo),
    Tuple,
    List,
    Set,
    Dict,
    Scalar(Scalar),
    /// Text emitted as an f-string; its replacement fields reference names.
    FormatText(String),
    Opaque(OpaqueInfo),
}

impl Object {
    /// Returns `true` for tuples, lists, sets and dicts.
    pub fn is_container(&self) -> bool {
        matches!(self, Object::Tuple | Object::List | Object::Set | Object::Dict)
    }

    /// Returns `true` if the object can be called.
    pub fn is_callable(&self) -> bool {
        matches!(self, Object::Callable(_) | Object::Class(_))
    }

    /// The `(module, qualname)` pair through which the object can be
    /// imported, if it has one.
    pub fn import_path(&self) -> Option<(&str, &str)> {
        match self {
            Object::Callable(r) => Some((r.module.as_str(), r.qualname.as_str())),
            Object::Class(c) => Some((c.module.as_str(), c.qualname.as_str())),
            _ => None,
        }
    }

    /// The name the object carries itself, used when a request gives none.
    pub fn intrinsic_name(&self) -> Option<&str> {
        match self {
            Object::Module { name } => Some(name),
            Object::Callable(r) => Some(&r.name),
            Object::Class(c) => c.qualname.rsplit('.').next(),
            _ => None,
        }
    }

    /// Short human-readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::Module { .. } => "module",
            Object::Callable(_) => "function",
            Object::Class(_) => "class",
            Object::Tuple => "tuple",
            Object::List => "list",
            Object::Set => "set",
            Object::Dict => "dict",
            Object::Scalar(_) => "scalar",
            Object::FormatText(_) => "f-string",
            Object::Opaque(_) => "object",
        }
    }
}

/// Edge label locating a member inside its container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// Element of a tuple, list or set.
    Element(u32),
    /// Key of the dict entry at this position.
    Key(u32),
    /// Value of the dict entry at this position.
    Value(u32),
    /// Named attribute of an opaque instance.
    Attribute { position: u32, name: String },
}

impl Slot {
    /// Position used to order members of one container.
    pub fn position(&self) -> u32 {
        match self {
            Slot::Element(p) | Slot::Key(p) | Slot::Value(p) => *p,
            Slot::Attribute { position, .. } => *position,
        }
    }
}
