//! Output assembly.
//!
//! [`Emission`] collects statements in the order they are produced, tracks
//! which value each output name is bound to, and remembers where every
//! synthesized function came from.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use indexmap::IndexMap;
use resynth_core::{SynthError, ValueHeap, ValueId};
use serde::{Deserialize, Serialize};

/// Origin of one synthesized function, for mapping relocated code back to
/// its source in a debugger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEntry {
    /// Name the function is bound to in the output.
    pub name: String,
    pub module: String,
    pub qualname: String,
    /// Defining file; relative to the configured root when one is set.
    pub file: PathBuf,
    /// 1-based line of the original `def`.
    pub first_line: usize,
}

/// What an output name stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    /// Bound to a value emitted (or imported) in this output.
    Bound(ValueId),
    /// Known to exist in the target environment; nothing emitted.
    Present,
}

#[derive(Debug, Default)]
pub struct Emission {
    lines: Vec<String>,
    imports: HashSet<String>,
    seen: IndexMap<String, Seen>,
    debug: IndexMap<String, DebugEntry>,
}

impl Emission {
    pub fn new() -> Self {
        Emission::default()
    }

    /// Binds `name` to `id`.
    ///
    /// Returns `Ok(true)` if the name is new and the caller must emit it,
    /// `Ok(false)` if it is already bound to an equal value.
    pub fn claim(&mut self, heap: &ValueHeap, name: &str, id: ValueId) -> Result<bool, SynthError> {
        match self.seen.get(name) {
            None => {
                self.seen.insert(name.to_string(), Seen::Bound(id));
                Ok(true)
            }
            Some(Seen::Bound(existing)) if heap.equals(*existing, id) => Ok(false),
            Some(Seen::Bound(existing)) => Err(SynthError::NameConflict {
                name: name.to_string(),
                existing: heap.describe(*existing),
                incoming: heap.describe(id),
            }),
            Some(Seen::Present) => Err(SynthError::NameConflict {
                name: name.to_string(),
                existing: "a name supplied by the target environment".to_string(),
                incoming: heap.describe(id),
            }),
        }
    }

    /// Records `name` as supplied by the target environment. A name that is
    /// already bound keeps its binding.
    pub fn mark_present(&mut self, name: &str) {
        self.seen.entry(name.to_string()).or_insert(Seen::Present);
    }

    pub fn seen(&self, name: &str) -> Option<Seen> {
        self.seen.get(name).copied()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn extend<I>(&mut self, lines: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
    }

    /// Pushes an import statement unless the identical line was already
    /// emitted.
    pub fn push_import(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.imports.insert(line.clone()) {
            self.lines.push(line);
        }
    }

    pub fn record_debug(&mut self, entry: DebugEntry) {
        self.debug.insert(entry.name.clone(), entry);
    }

    /// Names that resolved only through existence scopes.
    pub fn existence_only(&self) -> BTreeSet<String> {
        self.seen
            .iter()
            .filter(|(_, seen)| matches!(seen, Seen::Present))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Joined statements, ending with exactly one newline; empty if nothing
    /// was emitted.
    pub fn source_text(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    /// Consumes the emission into `(source, existence_only, debug_entries)`.
    pub fn finish(self) -> (String, BTreeSet<String>, Vec<DebugEntry>) {
        let source = self.source_text();
        let existence_only = self.existence_only();
        (source, existence_only, self.debug.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_rules() {
        let mut heap = ValueHeap::new();
        let seven = heap.int(7);
        let also_seven = heap.int(7);
        let eight = heap.int(8);

        let mut emission = Emission::new();
        assert!(emission.claim(&heap, "X", seven).unwrap());
        assert!(!emission.claim(&heap, "X", also_seven).unwrap());
        let err = emission.claim(&heap, "X", eight).unwrap_err();
        assert!(matches!(err, SynthError::NameConflict { ref name, .. } if name == "X"));
    }

    #[test]
    fn present_names() {
        let mut heap = ValueHeap::new();
        let v = heap.int(1);
        let mut emission = Emission::new();

        emission.claim(&heap, "bound", v).unwrap();
        emission.mark_present("bound");
        emission.mark_present("env");
        emission.mark_present("env");
        assert_eq!(emission.seen("bound"), Some(Seen::Bound(v)));
        assert_eq!(emission.existence_only(), BTreeSet::from(["env".to_string()]));

        assert!(matches!(
            emission.claim(&heap, "env", v),
            Err(SynthError::NameConflict { .. })
        ));
    }

    #[test]
    fn imports_are_deduplicated_in_place() {
        let mut emission = Emission::new();
        emission.push_import("import os");
        emission.push("x = os.sep");
        emission.push_import("import os");
        emission.push_import("import pickle");
        assert_eq!(emission.lines(), ["import os", "x = os.sep", "import pickle"]);
    }

    #[test]
    fn source_text_ends_with_one_newline() {
        let mut emission = Emission::new();
        assert_eq!(emission.source_text(), "");
        emission.extend(["def f() :", "    return 1"]);
        assert_eq!(emission.source_text(), "def f() :\n    return 1\n");
    }
}
