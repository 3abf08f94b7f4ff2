//! Source synthesis for value heaps.
//!
//! Turns values held in a [`ValueHeap`] into source text that rebuilds them
//! when executed by a fresh interpreter: functions are relocated from their
//! defining files, importable objects are imported, data becomes literals
//! and anything else falls back to a pickle stream.
//!
//! # Modules
//!
//! - [`literal`] -- Literal expressions for scalars and containers
//! - [`fstring`] -- f-string quoting and replacement field names
//! - [`pickle`] -- Protocol 0 pickle encoding for opaque values
//! - [`assembler`] -- Statement collection, name bindings, debug entries
//! - [`session`] -- Placement strategy and free name resolution

pub mod assembler;
pub mod fstring;
pub mod literal;
pub mod pickle;
pub mod session;

pub use assembler::DebugEntry;
pub use session::Session;

use std::collections::BTreeSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use resynth_core::{CompiledRoutine, ContextScope, SynthError, ValueHeap, ValueId};
use resynth_source::SourceCache;
use serde::{Deserialize, Serialize};

/// Options shared by every rendering entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Modules whose objects must be copied by value rather than imported.
    pub excluded_modules: BTreeSet<String>,

    /// Copy the requested values themselves by value. Their dependencies may
    /// still be imported.
    pub force_by_value: bool,

    /// Rebinds every relocated function as `name = decorator(name)`.
    pub decorator: Option<String>,

    /// Makes debug entry paths relative to this directory.
    pub relative_root: Option<PathBuf>,
}

/// One entry of a [`render_source`] request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceItem {
    /// A value bound to an explicit name.
    Named { name: String, value: ValueId },
    /// A value bound to the name it carries itself.
    Value(ValueId),
    /// Every entry bound to its key.
    Mapping(IndexMap<String, ValueId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSource {
    pub source: String,
    /// Names resolved through existence scopes; the target must supply them.
    pub existence_only: BTreeSet<String>,
    pub debug_entries: Vec<DebugEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedExpression {
    pub expression: String,
    /// Statements to run before evaluating the expression.
    pub context: String,
    pub existence_only: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedContext {
    pub source: String,
    pub existence_only: BTreeSet<String>,
}

/// Renders source that binds every requested value.
pub fn render_source(
    heap: &ValueHeap,
    cache: &SourceCache,
    items: &[SourceItem],
    scopes: &[ContextScope],
    options: &RenderOptions,
) -> Result<RenderedSource, SynthError> {
    let force = options.force_by_value;
    let mut session = Session::new(heap, cache, scopes, options.clone());

    for item in items {
        match item {
            SourceItem::Named { name, value } => session.place(name, *value, force)?,
            SourceItem::Value(value) => match heap.get(*value)?.intrinsic_name() {
                Some(name) => session.place(name, *value, force)?,
                None => tracing::warn!(
                    value = %heap.describe(*value),
                    "skipping unnamed value with no name of its own"
                ),
            },
            SourceItem::Mapping(bindings) => {
                for (name, value) in bindings {
                    session.place(name, *value, force)?;
                }
            }
        }
    }

    let (source, existence_only, debug_entries) = session.into_emission().finish();
    Ok(RenderedSource {
        source,
        existence_only,
        debug_entries,
    })
}

/// Renders an expression for `value` plus the statements it relies on.
///
/// With `invoke`, callables are called with no arguments; one that requires
/// arguments fails with [`SynthError::UnsupportedArity`].
pub fn render_expression(
    heap: &ValueHeap,
    cache: &SourceCache,
    value: ValueId,
    scopes: &[ContextScope],
    options: &RenderOptions,
    invoke: bool,
) -> Result<RenderedExpression, SynthError> {
    let mut session = Session::new(heap, cache, scopes, context_options(options));
    let expression = session.expression(value, options.force_by_value, invoke)?;
    let (context, existence_only, _) = session.into_emission().finish();
    Ok(RenderedExpression {
        expression,
        context,
        existence_only,
    })
}

/// Renders only the bindings `routines` read, not the routines themselves.
pub fn render_context(
    heap: &ValueHeap,
    cache: &SourceCache,
    routines: &[CompiledRoutine],
    scopes: &[ContextScope],
    options: &RenderOptions,
) -> Result<RenderedContext, SynthError> {
    let mut session = Session::new(heap, cache, scopes, context_options(options));
    for routine in routines {
        session.resolve_routine_names(routine)?;
    }
    let (source, existence_only, _) = session.into_emission().finish();
    Ok(RenderedContext {
        source,
        existence_only,
    })
}

/// Expression and context rendering carry no decorator and report absolute
/// debug paths.
fn context_options(options: &RenderOptions) -> RenderOptions {
    RenderOptions {
        decorator: None,
        relative_root: None,
        ..options.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resynth_core::{ClassInfo, Param, Signature};

    const JOB: &str = "\
def greet(who):
    return GREETING + who

def main():
    print(greet('x'))
";

    fn seeded_cache() -> SourceCache {
        let cache = SourceCache::new();
        cache.insert_text("/virtual/job.py", JOB);
        cache
    }

    fn greet() -> CompiledRoutine {
        CompiledRoutine::new("greet", "job", "/virtual/job.py", 1)
            .with_signature(Signature::new(vec![Param::regular("who")]))
            .with_global_names(["GREETING"])
    }

    #[test]
    fn default_options() {
        let opts = RenderOptions::default();
        assert!(opts.excluded_modules.is_empty());
        assert!(!opts.force_by_value);
        assert!(opts.decorator.is_none());
        assert!(opts.relative_root.is_none());
    }

    #[test]
    fn options_deserialize_with_missing_fields() {
        let opts: RenderOptions =
            serde_json::from_str(r#"{"excluded_modules": ["job"], "decorator": "traced"}"#).unwrap();
        assert!(opts.excluded_modules.contains("job"));
        assert_eq!(opts.decorator.as_deref(), Some("traced"));
        assert!(!opts.force_by_value);
    }

    #[test]
    fn source_item_serde_shape() {
        let item: SourceItem = serde_json::from_str(r#"{"named": {"name": "f", "value": 3}}"#).unwrap();
        assert_eq!(
            item,
            SourceItem::Named {
                name: "f".into(),
                value: ValueId(3)
            }
        );
        let item: SourceItem = serde_json::from_str(r#"{"value": 4}"#).unwrap();
        assert_eq!(item, SourceItem::Value(ValueId(4)));
    }

    #[test]
    fn unnamed_values_use_their_own_name() {
        let mut heap = ValueHeap::new();
        let f = heap.callable(greet());
        let greeting = heap.text("hi ");
        let data = heap.int(3);
        let cache = seeded_cache();
        let scopes = [ContextScope::bound("job", [("GREETING", greeting)])];
        let options = RenderOptions {
            excluded_modules: BTreeSet::from(["job".to_string()]),
            ..RenderOptions::default()
        };

        let out = render_source(
            &heap,
            &cache,
            &[SourceItem::Value(f), SourceItem::Value(data)],
            &scopes,
            &options,
        )
        .unwrap();
        assert_eq!(
            out.source,
            "GREETING = 'hi '\ndef greet(who) :\n    return GREETING + who\n"
        );
        assert_eq!(out.debug_entries.len(), 1);
        assert_eq!(out.debug_entries[0].file, PathBuf::from("/virtual/job.py"));
    }

    #[test]
    fn empty_request_renders_nothing() {
        let heap = ValueHeap::new();
        let cache = SourceCache::new();
        let out = render_source(&heap, &cache, &[], &[], &RenderOptions::default()).unwrap();
        assert_eq!(out.source, "");
        assert!(out.existence_only.is_empty());
    }

    #[test]
    fn expression_of_importable_class_call() {
        let mut heap = ValueHeap::new();
        let class = heap.class(ClassInfo {
            module: "collections".into(),
            qualname: "Counter".into(),
            signature: Some(Signature::default()),
        });
        let cache = SourceCache::new();
        let out =
            render_expression(&heap, &cache, class, &[], &RenderOptions::default(), true).unwrap();
        assert_eq!(out.expression, "collections.Counter()");
        assert_eq!(out.context, "import collections\n");
    }

    #[test]
    fn context_only_covers_free_names() {
        let mut heap = ValueHeap::new();
        let greeting = heap.text("hi ");
        let cache = seeded_cache();
        let routine = greet().with_globals(ContextScope::bound("job", [("GREETING", greeting)]));

        let out = render_context(&heap, &cache, &[routine], &[], &RenderOptions::default()).unwrap();
        assert_eq!(out.source, "GREETING = 'hi '\n");
        assert!(out.existence_only.is_empty());
    }
}
