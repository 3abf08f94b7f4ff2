//! Compiled routines: the identity of a callable defined in a source file.
//!
//! A [`CompiledRoutine`] is what the host reflection layer knows about a
//! function: where it was defined, what its signature is, and which global
//! names its body (and the bodies of functions nested in it) refer to.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::id::ValueId;
use crate::scope::ContextScope;

/// Kind of a parameter, in declaration-order groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Before the `/` separator.
    PositionalOnly,
    /// Standard positional-or-keyword parameter.
    Regular,
    /// `*args`.
    VarArgs,
    /// After `*` or `*args`.
    KeywordOnly,
    /// `**kwargs`.
    KwArgs,
}

/// A parameter in a routine signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    /// Default value, stored in the heap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ValueId>,
    /// Annotation as source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl Param {
    /// Create a new parameter with the given name and kind.
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Param {
            name: name.into(),
            kind,
            default: None,
            annotation: None,
        }
    }

    /// Create a regular parameter (most common case).
    pub fn regular(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Regular)
    }

    /// Set the default value.
    pub fn with_default(mut self, default: ValueId) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the annotation text.
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    /// Returns `true` if a call must supply this parameter.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
            && matches!(
                self.kind,
                ParamKind::PositionalOnly | ParamKind::Regular | ParamKind::KeywordOnly
            )
    }
}

/// A routine signature: parameters in declaration order plus an optional
/// return annotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
}

impl Signature {
    /// Create a signature from its parameters.
    pub fn new(params: Vec<Param>) -> Self {
        Signature {
            params,
            returns: None,
        }
    }

    /// Set the return annotation.
    pub fn with_returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = Some(returns.into());
        self
    }

    pub fn has_defaults(&self) -> bool {
        self.params.iter().any(|p| p.default.is_some())
    }

    pub fn has_annotations(&self) -> bool {
        self.returns.is_some() || self.params.iter().any(|p| p.annotation.is_some())
    }

    /// Number of parameters a call must supply.
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.is_required()).count()
    }

    /// Renders the parenthesized parameter list, `/` and `*` separators
    /// included, followed by ` -> ret` when annotated.
    ///
    /// `render_default` turns each default value into source text.
    pub fn render<E>(
        &self,
        mut render_default: impl FnMut(ValueId) -> Result<String, E>,
    ) -> Result<String, E> {
        let mut parts: Vec<String> = Vec::with_capacity(self.params.len() + 2);
        let mut pending_slash = false;
        let mut star_allowed = true;

        for param in &self.params {
            if param.kind == ParamKind::PositionalOnly {
                pending_slash = true;
            } else if pending_slash {
                parts.push("/".to_string());
                pending_slash = false;
            }
            match param.kind {
                ParamKind::VarArgs => star_allowed = false,
                ParamKind::KeywordOnly if star_allowed => {
                    parts.push("*".to_string());
                    star_allowed = false;
                }
                _ => {}
            }

            let mut formatted = param.name.clone();
            if let Some(annotation) = &param.annotation {
                formatted = format!("{formatted}: {annotation}");
            }
            if let Some(default) = param.default {
                let text = render_default(default)?;
                if param.annotation.is_some() {
                    formatted = format!("{formatted} = {text}");
                } else {
                    formatted = format!("{formatted}={text}");
                }
            }
            match param.kind {
                ParamKind::VarArgs => formatted.insert(0, '*'),
                ParamKind::KwArgs => formatted.insert_str(0, "**"),
                _ => {}
            }
            parts.push(formatted);
        }
        if pending_slash {
            parts.push("/".to_string());
        }

        let mut rendered = format!("({})", parts.join(", "));
        if let Some(returns) = &self.returns {
            rendered.push_str(" -> ");
            rendered.push_str(returns);
        }
        Ok(rendered)
    }
}

/// Everything synthesis needs to know about a function defined in source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRoutine {
    /// Simple name (`__name__`).
    pub name: String,
    /// Defining module name.
    pub module: String,
    /// Dotted qualified name reflecting lexical nesting.
    pub qualname: String,
    /// File the routine was defined in.
    pub file: std::path::PathBuf,
    /// 1-based line of the `def`.
    pub first_line: usize,
    /// Names the routine's own body loads, stores or deletes at global
    /// scope, in first-seen order.
    #[serde(default)]
    pub global_names: Vec<String>,
    /// Routines defined lexically inside this one.
    #[serde(default)]
    pub nested: Vec<CompiledRoutine>,
    #[serde(default)]
    pub signature: Signature,
    /// Namespace of the defining module, consulted after the caller's scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globals: Option<ContextScope>,
}

impl CompiledRoutine {
    /// Creates a routine with no global references, no nested routines, an
    /// empty signature and no globals scope.
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        file: impl Into<std::path::PathBuf>,
        first_line: usize,
    ) -> Self {
        let name = name.into();
        CompiledRoutine {
            qualname: name.clone(),
            name,
            module: module.into(),
            file: file.into(),
            first_line,
            global_names: Vec::new(),
            nested: Vec::new(),
            signature: Signature::default(),
            globals: None,
        }
    }

    pub fn with_qualname(mut self, qualname: impl Into<String>) -> Self {
        self.qualname = qualname.into();
        self
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_global_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nested(mut self, nested: CompiledRoutine) -> Self {
        self.nested.push(nested);
        self
    }

    pub fn with_globals(mut self, globals: ContextScope) -> Self {
        self.globals = Some(globals);
        self
    }

    /// Global names referenced by this routine and every routine nested in
    /// it, depth first, in first-seen order.
    pub fn free_names(&self) -> IndexSet<String> {
        let mut names = IndexSet::new();
        self.gather_names(&mut names);
        names
    }

    fn gather_names(&self, names: &mut IndexSet<String>) {
        for name in &self.global_names {
            if !names.contains(name) {
                names.insert(name.clone());
            }
        }
        for inner in &self.nested {
            inner.gather_names(names);
        }
    }

    /// Returns `true` if a call with no arguments binds.
    pub fn accepts_no_arguments(&self) -> bool {
        self.signature.required_count() == 0
    }

    /// Identity used when comparing two callables for equality.
    pub fn same_definition(&self, other: &CompiledRoutine) -> bool {
        self.module == other.module
            && self.qualname == other.qualname
            && self.file == other.file
            && self.first_line == other.first_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(id: ValueId) -> Result<String, ()> {
        Ok(format!("<{}>", id.0))
    }

    #[test]
    fn render_plain_params() {
        let sig = Signature::new(vec![Param::regular("a"), Param::regular("b")]);
        assert_eq!(sig.render(literal).unwrap(), "(a, b)");
        assert_eq!(Signature::default().render(literal).unwrap(), "()");
    }

    #[test]
    fn render_defaults_and_annotations() {
        let sig = Signature::new(vec![
            Param::regular("a").with_default(ValueId(1)),
            Param::regular("b")
                .with_annotation("int")
                .with_default(ValueId(2)),
            Param::regular("c").with_annotation("str"),
        ])
        .with_returns("bool");
        insta::assert_snapshot!(
            sig.render(literal).unwrap(),
            @"(a=<1>, b: int = <2>, c: str) -> bool"
        );
    }

    #[test]
    fn render_separators() {
        let sig = Signature::new(vec![
            Param::new("p", ParamKind::PositionalOnly),
            Param::regular("r"),
            Param::new("k", ParamKind::KeywordOnly),
            Param::new("kw", ParamKind::KwArgs),
        ]);
        assert_eq!(sig.render(literal).unwrap(), "(p, /, r, *, k, **kw)");

        let sig = Signature::new(vec![
            Param::new("args", ParamKind::VarArgs),
            Param::new("k", ParamKind::KeywordOnly),
        ]);
        assert_eq!(sig.render(literal).unwrap(), "(*args, k)");

        let sig = Signature::new(vec![Param::new("p", ParamKind::PositionalOnly)]);
        assert_eq!(sig.render(literal).unwrap(), "(p, /)");
    }

    #[test]
    fn render_propagates_default_errors() {
        let sig = Signature::new(vec![Param::regular("a").with_default(ValueId(9))]);
        let res: Result<String, String> = sig.render(|id| Err(format!("bad {}", id.0)));
        assert_eq!(res.unwrap_err(), "bad 9");
    }

    #[test]
    fn free_names_include_nested_first_seen() {
        let inner = CompiledRoutine::new("inner", "jobs", "/j.py", 3)
            .with_qualname("outer.<locals>.inner")
            .with_global_names(["Y", "X", "Z"]);
        let outer = CompiledRoutine::new("outer", "jobs", "/j.py", 1)
            .with_global_names(["X", "len"])
            .with_nested(inner);
        let names: Vec<_> = outer.free_names().into_iter().collect();
        assert_eq!(names, vec!["X", "len", "Y", "Z"]);
    }

    #[test]
    fn arity() {
        let two = CompiledRoutine::new("f", "m", "/m.py", 1).with_signature(Signature::new(vec![
            Param::regular("a"),
            Param::regular("b"),
            Param::new("rest", ParamKind::VarArgs),
        ]));
        assert_eq!(two.signature.required_count(), 2);
        assert!(!two.accepts_no_arguments());

        let defaults = CompiledRoutine::new("g", "m", "/m.py", 5).with_signature(Signature::new(
            vec![
                Param::regular("a").with_default(ValueId(0)),
                Param::new("kw", ParamKind::KwArgs),
            ],
        ));
        assert!(defaults.accepts_no_arguments());
    }

    #[test]
    fn serde_roundtrip_routine() {
        let r = CompiledRoutine::new("f", "jobs", "/src/jobs.py", 10)
            .with_global_names(["X"])
            .with_signature(Signature::new(vec![Param::regular("a").with_default(ValueId(2))]));
        let json = serde_json::to_string(&r).unwrap();
        let back: CompiledRoutine = serde_json::from_str(&json).unwrap();
        assert!(back.same_definition(&r));
        assert_eq!(back.global_names, vec!["X"]);
        assert_eq!(back.signature, r.signature);
    }
}
