//! One synthesis pass.
//!
//! A [`Session`] threads the emission state through the placement of every
//! requested value and of everything those values depend on. It decides how
//! each value reaches the output (import, relocated definition, literal or
//! pickle) and resolves the names relocated code reads through the ordered
//! scope list.

use std::path::{Component, Path, PathBuf};

use resynth_core::{
    resolve_in, CompiledRoutine, ContextScope, Lookup, Object, SynthError, ValueHeap, ValueId,
};
use resynth_source::{extract, SourceCache};
use tracing::{debug, trace};

use crate::assembler::{DebugEntry, Emission};
use crate::fstring::{format_literal, referenced_names};
use crate::literal::{join_dict, join_sequence, literal, text_repr, HeapLiterals};
use crate::{pickle, RenderOptions};

pub struct Session<'a> {
    heap: &'a ValueHeap,
    cache: &'a SourceCache,
    scopes: Vec<ContextScope>,
    options: RenderOptions,
    emission: Emission,
    /// Containers whose expression is being built.
    active: Vec<ValueId>,
}

impl<'a> Session<'a> {
    pub fn new(
        heap: &'a ValueHeap,
        cache: &'a SourceCache,
        scopes: &[ContextScope],
        options: RenderOptions,
    ) -> Self {
        Session {
            heap,
            cache,
            scopes: scopes.to_vec(),
            options,
            emission: Emission::new(),
            active: Vec::new(),
        }
    }

    pub fn into_emission(self) -> Emission {
        self.emission
    }

    /// Binds `name` to `id` in the output.
    ///
    /// Modules are imported, importable functions and classes are imported
    /// by path unless `force` is set or their module is excluded, other
    /// functions are relocated as source and anything else is assigned from
    /// its expression.
    pub fn place(&mut self, name: &str, id: ValueId, force: bool) -> Result<(), SynthError> {
        if !self.emission.claim(self.heap, name, id)? {
            trace!(name, "already bound to an equal value");
            return Ok(());
        }
        let heap = self.heap;
        let object = heap.get(id)?;

        if let Object::Module { name: module } = object {
            debug!(name, module = %module, "placing module import");
            if name == module {
                self.emission.push_import(format!("import {module}"));
            } else {
                self.emission.push_import(format!("import {module} as {name}"));
            }
            return Ok(());
        }
        if let Some((module, qualname)) = self.importable(object, force) {
            debug!(name, module, qualname, "placing import by path");
            if qualname.contains('.') {
                // The bound name holds the module until it is rebound.
                self.emission
                    .push(format!("import {module} as {name} ; {name} = {name}.{qualname}"));
            } else if name == qualname {
                self.emission.push(format!("from {module} import {qualname}"));
            } else {
                self.emission
                    .push(format!("from {module} import {qualname} as {name}"));
            }
            return Ok(());
        }
        if let Object::Callable(routine) = object {
            debug!(name, qualname = %routine.qualname, "relocating function by value");
            return self.define(name, routine);
        }

        debug!(name, kind = object.kind_name(), "placing value by expression");
        let expr = self.expression(id, force, false)?;
        self.emission.push(format!("{name} = {expr}"));
        Ok(())
    }

    /// Builds an expression evaluating to `id`, emitting whatever statements
    /// it needs first. With `invoke`, callables are called with no arguments.
    pub fn expression(&mut self, id: ValueId, force: bool, invoke: bool) -> Result<String, SynthError> {
        let heap = self.heap;
        let object = heap.get(id)?;

        if let Object::Module { name } = object {
            self.emission.push_import(format!("import {name}"));
            return Ok(name.clone());
        }
        let suffix = if invoke && object.is_callable() {
            check_no_arguments(object)?;
            "()"
        } else {
            ""
        };
        if let Some((module, qualname)) = self.importable(object, force) {
            self.emission.push_import(format!("import {module}"));
            return Ok(format!("{module}.{qualname}{suffix}"));
        }
        if let Object::Callable(routine) = object {
            if self.emission.claim(heap, &routine.name, id)? {
                self.define(&routine.name, routine)?;
            }
            return Ok(format!("{}{suffix}", routine.name));
        }
        if let Some(text) = literal(heap, id)? {
            return Ok(text);
        }

        match object {
            container if container.is_container() => {
                if self.active.contains(&id) {
                    return Err(SynthError::CyclicValue { id });
                }
                self.active.push(id);
                let text = self.container_expression(id, container, force, invoke);
                self.active.pop();
                text
            }
            Object::FormatText(body) => {
                for name in referenced_names(body) {
                    self.resolve(&name)?;
                }
                Ok(format_literal(body))
            }
            _ => {
                let stream = pickle::encode(heap, id, &self.options.excluded_modules)?;
                self.emission.push_import("import pickle");
                Ok(format!("pickle.loads({}.encode()){suffix}", text_repr(&stream)))
            }
        }
    }

    fn container_expression(
        &mut self,
        id: ValueId,
        object: &Object,
        force: bool,
        invoke: bool,
    ) -> Result<String, SynthError> {
        if let Object::Dict = object {
            let mut entries = Vec::new();
            for (key, value) in self.heap.entries(id)? {
                let key = self.expression(key, force, invoke)?;
                let value = self.expression(value, force, invoke)?;
                entries.push((key, value));
            }
            return Ok(join_dict(entries));
        }
        let mut items = Vec::new();
        for member in self.heap.elements(id)? {
            items.push(self.expression(member, force, invoke)?);
        }
        Ok(join_sequence(object, items))
    }

    /// Supplies `name` from the first scope that knows it. Names no scope
    /// knows are left to the target's builtins.
    pub fn resolve(&mut self, name: &str) -> Result<(), SynthError> {
        match resolve_in(&self.scopes, name) {
            Some((Lookup::Bound(id), scope)) => {
                debug!(name, scope, "resolved from bound scope");
                self.place(name, id, false)
            }
            Some((Lookup::Present, scope)) => {
                debug!(name, scope, "name present in target environment");
                self.emission.mark_present(name);
                Ok(())
            }
            None => {
                trace!(name, "unresolved, assumed builtin");
                Ok(())
            }
        }
    }

    /// Resolves the free names of `routine`, after adding its module scope.
    pub fn resolve_routine_names(&mut self, routine: &CompiledRoutine) -> Result<(), SynthError> {
        if let Some(globals) = &routine.globals {
            if !self.scopes.iter().any(|s| s.label() == globals.label()) {
                self.scopes.push(globals.clone());
            }
        }
        for name in routine.free_names() {
            self.resolve(&name)?;
        }
        Ok(())
    }

    /// Emits the relocated definition of `routine` under `name`, preceded by
    /// everything it references.
    fn define(&mut self, name: &str, routine: &CompiledRoutine) -> Result<(), SynthError> {
        let extracted = extract(self.cache, routine, name, &HeapLiterals(self.heap))?;
        self.resolve_routine_names(routine)?;

        self.emission.push(extracted.signature_line);
        self.emission.extend(extracted.body_lines);
        if let Some(decorator) = &self.options.decorator {
            // A separate statement keeps the body's line numbers intact.
            self.emission.push(format!("{name} = {decorator}({name})"));
        }

        let file = match &self.options.relative_root {
            Some(root) => {
                let root = std::path::absolute(root).map_err(|e| SynthError::io(root, e))?;
                relative_path(&extracted.file, &root)
            }
            None => extracted.file,
        };
        self.emission.record_debug(DebugEntry {
            name: name.to_string(),
            module: routine.module.clone(),
            qualname: routine.qualname.clone(),
            file,
            first_line: extracted.first_line,
        });
        Ok(())
    }

    /// Import path of `object` if it may be referenced rather than copied.
    fn importable<'o>(&self, object: &'o Object, force: bool) -> Option<(&'o str, &'o str)> {
        if force {
            return None;
        }
        object
            .import_path()
            .filter(|(module, _)| !self.options.excluded_modules.contains(*module))
    }
}

/// Fails unless a call with no arguments binds. A class without a known
/// signature is assumed to accept one.
fn check_no_arguments(object: &Object) -> Result<(), SynthError> {
    let (name, required) = match object {
        Object::Callable(routine) => (&routine.qualname, routine.signature.required_count()),
        Object::Class(class) => (
            &class.qualname,
            class.signature.as_ref().map_or(0, |s| s.required_count()),
        ),
        _ => return Ok(()),
    };
    if required == 0 {
        Ok(())
    } else {
        Err(SynthError::UnsupportedArity {
            name: name.clone(),
            required,
        })
    }
}

/// `path` relative to `root`, climbing with `..` where they diverge. Both
/// are expected to be absolute.
pub fn relative_path(path: &Path, root: &Path) -> PathBuf {
    let path_parts: Vec<Component> = path.components().collect();
    let root_parts: Vec<Component> = root.components().collect();
    let common = path_parts
        .iter()
        .zip(&root_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..root_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}
