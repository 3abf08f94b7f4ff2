//! Context scopes consulted when resolving a routine's free names.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::id::ValueId;

/// A namespace consulted during name resolution.
///
/// Scopes are tried in list order and the first one containing a name wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextScope {
    /// Names bound to values that are captured into the output.
    Bound {
        label: String,
        bindings: IndexMap<String, ValueId>,
    },
    /// Names known to exist where the code will run. Their values are never
    /// captured; the target environment must supply them.
    Existence {
        label: String,
        names: IndexSet<String>,
    },
}

/// What a scope knows about a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Bound(ValueId),
    Present,
}

impl ContextScope {
    pub fn bound<I, S>(label: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = (S, ValueId)>,
        S: Into<String>,
    {
        ContextScope::Bound {
            label: label.into(),
            bindings: bindings.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn existence<I, S>(label: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContextScope::Existence {
            label: label.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Identifies the scope; two scopes with the same label are the same
    /// namespace.
    pub fn label(&self) -> &str {
        match self {
            ContextScope::Bound { label, .. } | ContextScope::Existence { label, .. } => label,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Lookup> {
        match self {
            ContextScope::Bound { bindings, .. } => bindings.get(name).copied().map(Lookup::Bound),
            ContextScope::Existence { names, .. } => names.contains(name).then_some(Lookup::Present),
        }
    }

    /// Adds or replaces a binding. Returns `false` on an existence scope.
    pub fn bind(&mut self, name: impl Into<String>, value: ValueId) -> bool {
        match self {
            ContextScope::Bound { bindings, .. } => {
                bindings.insert(name.into(), value);
                true
            }
            ContextScope::Existence { .. } => false,
        }
    }
}

/// Looks a name up through an ordered scope list; first match wins.
pub fn resolve_in<'a>(
    scopes: impl IntoIterator<Item = &'a ContextScope>,
    name: &str,
) -> Option<(Lookup, &'a str)> {
    scopes
        .into_iter()
        .find_map(|scope| scope.lookup(name).map(|hit| (hit, scope.label())))
}
