//! Function text extraction.
//!
//! Given a [`CompiledRoutine`], finds its definition through the
//! [`SourceCache`] and rebuilds a `def` line from the routine's own
//! signature plus whatever follows the signature's colon on the original
//! first line. Cases the line heuristic cannot split safely are refused.

use std::path::{Component, Path, PathBuf};

use resynth_core::{CompiledRoutine, SynthError, ValueId};

use crate::cache::SourceCache;

/// Renders default-argument values as source literals.
pub trait DefaultRenderer {
    /// Literal text for `value`, or `None` if it has no literal form.
    fn render_default(&self, value: ValueId) -> Result<Option<String>, SynthError>;
}

/// Signature line and body lines of one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFunction {
    /// Rebuilt `def` line, bound to the requested name.
    pub signature_line: String,
    /// Original body lines, indentation untouched, trailing blank and
    /// comment lines excluded.
    pub body_lines: Vec<String>,
    /// Absolute path of the defining file.
    pub file: PathBuf,
    /// 1-based line of the `def`.
    pub first_line: usize,
}

/// Extracts the definition of `routine`, rebinding it to `name`.
pub fn extract(
    cache: &SourceCache,
    routine: &CompiledRoutine,
    name: &str,
    defaults: &dyn DefaultRenderer,
) -> Result<ExtractedFunction, SynthError> {
    let file = std::path::absolute(&routine.file)
        .map(|path| normalize(&path))
        .map_err(|e| SynthError::io(&routine.file, e))?;
    let analysis = cache.analyze(&file)?;

    let missing = || SynthError::MissingDefinition {
        name: name.to_string(),
        file: file.clone(),
        line: routine.first_line,
    };
    let start = routine.first_line.checked_sub(1).ok_or_else(missing)?;

    if analysis
        .code_line_before(start)
        .is_some_and(|prev| prev.trim_start().starts_with('@'))
    {
        return Err(SynthError::UndecoratableFunction {
            name: name.to_string(),
            file,
            line: routine.first_line,
        });
    }
    let end = match analysis.definition_end(start) {
        None => return Err(missing()),
        Some(None) => {
            return Err(SynthError::UndecoratableFunction {
                name: name.to_string(),
                file,
                line: routine.first_line,
            })
        }
        Some(Some(end)) => end,
    };
    let first = analysis.line(start).ok_or_else(missing)?;

    let unanalyzable = |reason: &str| SynthError::UnanalyzableSignature {
        qualname: routine.qualname.clone(),
        reason: reason.to_string(),
    };
    let params = routine.signature.render(|id| {
        defaults
            .render_default(id)
            .map_err(|e| unanalyzable(&format!("default value cannot be rendered: {e}")))?
            .ok_or_else(|| unanalyzable("default value has no literal form"))
    })?;
    let signature = &routine.signature;
    let core = split_core(first, signature.has_defaults() || signature.has_annotations())
        .map_err(unanalyzable)?;

    let keyword = if first.trim_start().starts_with("async") {
        "async def"
    } else {
        "def"
    };
    Ok(ExtractedFunction {
        signature_line: format!("{keyword} {name}{params} :{core}"),
        body_lines: analysis.lines()[start + 1..end].to_vec(),
        file,
        first_line: routine.first_line,
    })
}

/// Folds `.` and `..` components without touching the filesystem, so one
/// file always maps to one cache key.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Returns the part of a `def` line that follows the signature's colon.
///
/// A line ending with `:` is all signature. A single colon is unambiguous.
/// With several colons the first one is only trusted when there are no
/// defaults or annotations, which are the only other places a colon can
/// appear in a signature.
pub fn split_core(first_line: &str, has_defaults_or_annotations: bool) -> Result<&str, &'static str> {
    if first_line.trim_end().ends_with(':') {
        return Ok("");
    }
    let Some(colon) = first_line.find(':') else {
        return Err("signature continues past its first line");
    };
    if first_line.matches(':').count() == 1 || !has_defaults_or_annotations {
        Ok(&first_line[colon + 1..])
    } else {
        Err("several ':' on the first line alongside defaults or annotations")
    }
}
