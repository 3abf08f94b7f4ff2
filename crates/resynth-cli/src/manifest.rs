//! JSON request manifests.
//!
//! A manifest lists heap objects in id order (the object at index `n` gets
//! `ValueId(n)`; members and defaults refer to other objects by that index),
//! the scopes to resolve names through, the values to render and the
//! rendering options.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use resynth_core::{
    ClassInfo, CompiledRoutine, ContextScope, Object, OpaqueInfo, Scalar, SynthError, ValueHeap,
    ValueId,
};
use resynth_emit::{RenderOptions, SourceItem};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid heap: {0}")]
    Heap(#[from] SynthError),
}

/// What to render.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mode {
    /// Source binding every item.
    #[default]
    Source,
    /// An expression for one value plus the statements it needs.
    Expression {
        value: ValueId,
        #[serde(default)]
        invoke: bool,
    },
    /// Only the bindings the given routines read.
    Context { routines: Vec<CompiledRoutine> },
}

/// One heap object as written in a manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectSpec {
    None,
    Ellipsis,
    Bool { value: bool },
    Int { value: i64 },
    Float { value: f64 },
    Complex { re: f64, im: f64 },
    Text { value: String },
    Bytes { value: Vec<u8> },
    FormatText { value: String },
    Module { name: String },
    Function(CompiledRoutine),
    Class(ClassInfo),
    Tuple { items: Vec<ValueId> },
    List { items: Vec<ValueId> },
    Set { items: Vec<ValueId> },
    Dict { entries: Vec<(ValueId, ValueId)> },
    Object {
        module: String,
        class_name: String,
        #[serde(default)]
        attributes: IndexMap<String, ValueId>,
    },
}

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub heap: Vec<ObjectSpec>,
    #[serde(default)]
    pub scopes: Vec<ContextScope>,
    #[serde(default)]
    pub items: Vec<SourceItem>,
    #[serde(default)]
    pub options: RenderOptions,
    #[serde(default)]
    pub mode: Mode,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds the heap in two passes: every object first, so members may
    /// refer forward (or to their own container), then the member edges.
    pub fn build_heap(&self) -> Result<ValueHeap, ManifestError> {
        let mut heap = ValueHeap::new();
        for spec in &self.heap {
            heap.add(object_of(spec));
        }

        for (index, spec) in self.heap.iter().enumerate() {
            let id = ValueId(index as u32);
            match spec {
                ObjectSpec::Tuple { items } | ObjectSpec::List { items } | ObjectSpec::Set { items } => {
                    for item in items {
                        heap.push(id, *item)?;
                    }
                }
                ObjectSpec::Dict { entries } => {
                    for (key, value) in entries {
                        heap.insert(id, *key, *value)?;
                    }
                }
                ObjectSpec::Object { attributes, .. } => {
                    for (name, value) in attributes {
                        heap.set_attr(id, name.clone(), *value)?;
                    }
                }
                _ => {}
            }
        }
        Ok(heap)
    }
}

fn object_of(spec: &ObjectSpec) -> Object {
    match spec {
        ObjectSpec::None => Object::Scalar(Scalar::None),
        ObjectSpec::Ellipsis => Object::Scalar(Scalar::Ellipsis),
        ObjectSpec::Bool { value } => Object::Scalar(Scalar::Bool(*value)),
        ObjectSpec::Int { value } => Object::Scalar(Scalar::Int(*value)),
        ObjectSpec::Float { value } => Object::Scalar(Scalar::Float(*value)),
        ObjectSpec::Complex { re, im } => Object::Scalar(Scalar::Complex { re: *re, im: *im }),
        ObjectSpec::Text { value } => Object::Scalar(Scalar::Text(value.clone())),
        ObjectSpec::Bytes { value } => Object::Scalar(Scalar::Bytes(value.clone())),
        ObjectSpec::FormatText { value } => Object::FormatText(value.clone()),
        ObjectSpec::Module { name } => Object::Module { name: name.clone() },
        ObjectSpec::Function(routine) => Object::Callable(routine.clone()),
        ObjectSpec::Class(class) => Object::Class(class.clone()),
        ObjectSpec::Tuple { .. } => Object::Tuple,
        ObjectSpec::List { .. } => Object::List,
        ObjectSpec::Set { .. } => Object::Set,
        ObjectSpec::Dict { .. } => Object::Dict,
        ObjectSpec::Object {
            module, class_name, ..
        } => Object::Opaque(OpaqueInfo {
            module: module.clone(),
            class_name: class_name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "heap": [
            {"kind": "int", "value": 7},
            {"kind": "list", "items": [0, 1]},
            {"kind": "dict", "entries": [[2, 0]]},
            {"kind": "text", "value": "k"},
            {"kind": "function", "name": "run", "qualname": "run", "module": "jobs", "file": "/srv/jobs.py",
             "first_line": 3, "global_names": ["X"]},
            {"kind": "object", "module": "jobs", "class_name": "Cfg", "attributes": {"n": 0}}
        ],
        "scopes": [{"kind": "bound", "label": "jobs", "bindings": {"X": 0}}],
        "items": [{"value": 4}],
        "mode": {"kind": "expression", "value": 4, "invoke": true}
    }"#;

    #[test]
    fn parses_and_builds_heap() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(
            manifest.mode,
            Mode::Expression {
                value: ValueId(4),
                invoke: true
            }
        );
        assert_eq!(manifest.options, RenderOptions::default());

        let heap = manifest.build_heap().unwrap();
        assert_eq!(heap.len(), 6);
        assert_eq!(heap.elements(ValueId(1)).unwrap(), vec![ValueId(0), ValueId(1)]);
        assert_eq!(heap.entries(ValueId(2)).unwrap(), vec![(ValueId(2), ValueId(0))]);
        assert_eq!(heap.attributes(ValueId(5)).unwrap(), vec![("n".to_string(), ValueId(0))]);
        assert!(matches!(heap.get(ValueId(4)).unwrap(), Object::Callable(r) if r.name == "run"));
    }

    #[test]
    fn mode_defaults_to_source() {
        let manifest = Manifest::parse(r#"{"heap": []}"#).unwrap();
        assert_eq!(manifest.mode, Mode::Source);
        assert!(manifest.items.is_empty());
    }

    #[test]
    fn dangling_member_is_rejected() {
        let manifest = Manifest::parse(r#"{"heap": [{"kind": "list", "items": [9]}]}"#).unwrap();
        assert!(matches!(
            manifest.build_heap(),
            Err(ManifestError::Heap(SynthError::UnknownValue { .. }))
        ));
    }

    #[test]
    fn unknown_kind_is_a_json_error() {
        let err = Manifest::parse(r#"{"heap": [{"kind": "frobnicate"}]}"#).unwrap_err();
        assert!(matches!(err, ManifestError::Json(_)));
    }
}
