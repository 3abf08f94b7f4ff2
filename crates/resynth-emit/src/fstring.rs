//! f-string literals.
//!
//! A [`FormatText`](resynth_core::Object::FormatText) body is emitted as an
//! f-string, quoted with the first form that can hold it, and the names its
//! replacement fields read are reported so they can be resolved like a
//! routine's free names.

use std::collections::HashSet;

use indexmap::IndexSet;

use crate::literal::text_repr;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

const STRING_PREFIXES: &[&str] = &["r", "b", "f", "u", "rb", "br", "fr", "rf"];

/// Quotes an f-string body.
pub fn format_literal(body: &str) -> String {
    let single_line = !body.contains('\n');
    if body.is_empty() {
        return "f''".to_string();
    }
    if !body.contains('\'') && single_line {
        return format!("f'{body}'");
    }
    if !body.contains('"') && single_line {
        return format!("f\"{body}\"");
    }
    let ends_single = body.ends_with('\'');
    let ends_double = body.ends_with('"');
    if !body.contains("'''") && !ends_single {
        return format!("f'''{body}'''");
    }
    if !body.contains("\"\"\"") && !ends_double {
        return format!("f\"\"\"{body}\"\"\"");
    }
    // The escaped final quote sits outside any replacement field.
    if !body.contains("'''") && ends_single {
        return format!("f'''{}\\''''", &body[..body.len() - 1]);
    }
    if !body.contains("\"\"\"") && ends_double {
        return format!("f\"\"\"{}\\\"\"\"\"", &body[..body.len() - 1]);
    }
    format!("f{}", text_repr(body))
}

/// Names read by the replacement fields of an f-string body, first-seen
/// order. Attribute names, keywords, keyword-argument names and
/// comprehension or lambda variables are left out.
pub fn referenced_names(body: &str) -> IndexSet<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut fields = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => i += 2,
            '{' => i = field(&chars, i + 1, &mut fields),
            _ => i += 1,
        }
    }

    let mut names = IndexSet::new();
    for expr in &fields {
        names_in(expr, &mut names);
    }
    names
}

/// Reads one replacement field starting after its `{` and returns the index
/// just past its closing `}`.
fn field(chars: &[char], mut i: usize, out: &mut Vec<String>) -> usize {
    let mut expr = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            expr.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                expr.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                expr.push(c);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                expr.push(c);
            }
            '}' if depth > 0 => {
                depth -= 1;
                expr.push(c);
            }
            '}' => {
                out.push(expr);
                return i + 1;
            }
            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => {
                out.push(expr);
                return spec(chars, i + 1, out);
            }
            ':' if depth == 0 => {
                out.push(expr);
                return spec(chars, i + 1, out);
            }
            _ => expr.push(c),
        }
        i += 1;
    }
    out.push(expr);
    i
}

/// Skips a conversion or format spec up to the field's `}`, reading any
/// nested fields it holds.
fn spec(chars: &[char], mut i: usize, out: &mut Vec<String>) -> usize {
    while i < chars.len() {
        match chars[i] {
            '{' => i = field(chars, i + 1, out),
            '}' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Binder {
    /// Between `for` and `in`.
    For,
    /// Between `lambda` and `:`.
    Lambda,
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Names seen inside one bracket group, and the names a comprehension or
/// lambda binds there.
#[derive(Default)]
struct Frame {
    found: Vec<String>,
    locals: HashSet<String>,
}

/// Pops the innermost group, handing its free names to the enclosing one.
fn close_frame(frames: &mut Vec<Frame>) {
    if frames.len() < 2 {
        return;
    }
    if let Some(Frame { found, locals }) = frames.pop() {
        if let Some(parent) = frames.last_mut() {
            parent
                .found
                .extend(found.into_iter().filter(|name| !locals.contains(name)));
        }
    }
}

fn names_in(expr: &str, names: &mut IndexSet<String>) {
    let chars: Vec<char> = expr.chars().collect();
    let mut frames = vec![Frame::default()];
    // Binder in progress and the group whose names it binds.
    let mut binder: Option<(Binder, usize)> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let depth = frames.len() - 1;
        if c == '\'' || c == '"' {
            i = skip_string(&chars, i);
            continue;
        }
        if c.is_ascii_digit() {
            while i < chars.len() && (is_ident_char(chars[i]) || chars[i] == '.') {
                i += 1;
            }
            continue;
        }
        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            let prev = chars[..start].iter().rev().find(|c| !c.is_whitespace()).copied();
            let mut rest = chars[i..].iter().filter(|c| !c.is_whitespace()).copied();
            let next = rest.next();
            let next2 = rest.next();

            let is_prefix = matches!(chars.get(i), Some('\'') | Some('"'))
                && STRING_PREFIXES.contains(&ident.to_ascii_lowercase().as_str());
            if is_prefix || prev == Some('.') {
                continue;
            }
            match ident.as_str() {
                "for" => binder = Some((Binder::For, depth)),
                "in" if matches!(binder, Some((Binder::For, _))) => binder = None,
                "lambda" => binder = Some((Binder::Lambda, depth)),
                kw if KEYWORDS.contains(&kw) => {}
                _ if binder.is_some() => {
                    if let Some(frame) = binder.and_then(|(_, at)| frames.get_mut(at)) {
                        frame.locals.insert(ident);
                    }
                }
                _ if depth > 0 && next == Some('=') && next2 != Some('=') => {}
                _ => {
                    if let Some(frame) = frames.last_mut() {
                        frame.found.push(ident);
                    }
                }
            }
            continue;
        }
        match c {
            '(' | '[' | '{' => frames.push(Frame::default()),
            ')' | ']' | '}' => {
                close_frame(&mut frames);
                if binder.is_some_and(|(_, at)| at >= frames.len()) {
                    binder = None;
                }
            }
            ':' if binder == Some((Binder::Lambda, depth)) => binder = None,
            _ => {}
        }
        i += 1;
    }

    while frames.len() > 1 {
        close_frame(&mut frames);
    }
    if let Some(Frame { found, locals }) = frames.pop() {
        for name in found {
            if !locals.contains(&name) {
                names.insert(name);
            }
        }
    }
}

/// Index just past the string literal opening at `i`.
fn skip_string(chars: &[char], i: usize) -> usize {
    let quote = chars[i];
    let mut j = i + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(body: &str) -> Vec<String> {
        referenced_names(body).into_iter().collect()
    }

    #[test]
    fn quoting_cascade() {
        assert_eq!(format_literal(""), "f''");
        assert_eq!(format_literal("{x}"), "f'{x}'");
        assert_eq!(format_literal("it's {x}"), "f\"it's {x}\"");
        assert_eq!(format_literal("a'b\"c"), "f'''a'b\"c'''");
        assert_eq!(format_literal("x'''y\"z'"), "f\"\"\"x'''y\"z'\"\"\"");
        assert_eq!(format_literal("a\"\"\"b\"'"), "f'''a\"\"\"b\"\\''''");
    }

    #[test]
    fn simple_fields() {
        assert_eq!(names("{a} and {b.attr} {{literal}}"), vec!["a", "b"]);
        assert_eq!(names("{x!r:>{width}}"), vec!["x", "width"]);
        assert_eq!(names("{a}{a}{b=}"), vec!["a", "b"]);
    }

    #[test]
    fn calls_and_keywords() {
        assert_eq!(names("{fmt(v, sep='-', end=END)}"), vec!["fmt", "v", "END"]);
        assert_eq!(names("{x if cond else None}"), vec!["x", "cond"]);
        assert_eq!(names("{d['key']:{spec}}"), vec!["d", "spec"]);
        assert_eq!(names("{a != b}"), vec!["a", "b"]);
    }

    #[test]
    fn comprehension_and_lambda_variables_are_local() {
        assert_eq!(names("{[i * k for i in items]}"), vec!["k", "items"]);
        assert_eq!(names("{(lambda y: y + z)(1)}"), vec!["z"]);
    }

    #[test]
    fn bound_variables_stay_inside_their_brackets() {
        assert_eq!(names("{[y for y in ys] + [y]}"), vec!["ys", "y"]);
        assert_eq!(names("{(lambda y: y)(y)}"), vec!["y"]);
        assert_eq!(names("{[f(i) for i in xs]}"), vec!["f", "xs"]);
        assert_eq!(names("{[(a, b) for (a, b) in pairs]}"), vec!["pairs"]);
        assert_eq!(names("{ {k: v for k, v in kv.items()} }"), vec!["kv"]);
    }

    #[test]
    fn nested_strings_and_numbers_are_skipped() {
        assert_eq!(names("{'{not_a_name}' + s}"), vec!["s"]);
        assert_eq!(names("{1e5 + n:.2f}"), vec!["n"]);
        assert_eq!(names("{r'raw' + t}"), vec!["t"]);
    }
}
