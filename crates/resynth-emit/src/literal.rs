//! Literal synthesis for scalars and containers.
//!
//! Produces the same text Python's `repr` gives for the value, except that
//! non-finite floats become `float('inf')`-style calls since they have no
//! literal form. A container graph that reaches itself is refused with
//! [`SynthError::CyclicValue`].

use resynth_core::{Object, Scalar, SynthError, ValueHeap, ValueId};
use resynth_source::DefaultRenderer;

/// Literal expression for `id`, or `None` if some reachable member has no
/// literal form (modules, callables, classes, f-strings, opaque objects).
pub fn literal(heap: &ValueHeap, id: ValueId) -> Result<Option<String>, SynthError> {
    let mut active = Vec::new();
    literal_inner(heap, id, &mut active)
}

fn literal_inner(
    heap: &ValueHeap,
    id: ValueId,
    active: &mut Vec<ValueId>,
) -> Result<Option<String>, SynthError> {
    let object = heap.get(id)?;
    match object {
        Object::Scalar(s) => Ok(Some(scalar_literal(s))),
        Object::Tuple | Object::List | Object::Set => {
            if active.contains(&id) {
                return Err(SynthError::CyclicValue { id });
            }
            active.push(id);
            let mut items = Vec::new();
            for member in heap.elements(id)? {
                match literal_inner(heap, member, active)? {
                    Some(text) => items.push(text),
                    None => {
                        active.pop();
                        return Ok(None);
                    }
                }
            }
            active.pop();
            Ok(Some(join_sequence(object, items)))
        }
        Object::Dict => {
            if active.contains(&id) {
                return Err(SynthError::CyclicValue { id });
            }
            active.push(id);
            let mut entries = Vec::new();
            for (key, value) in heap.entries(id)? {
                let key = literal_inner(heap, key, active)?;
                let value = match key {
                    Some(_) => literal_inner(heap, value, active)?,
                    None => None,
                };
                match (key, value) {
                    (Some(k), Some(v)) => entries.push((k, v)),
                    _ => {
                        active.pop();
                        return Ok(None);
                    }
                }
            }
            active.pop();
            Ok(Some(join_dict(entries)))
        }
        _ => Ok(None),
    }
}

/// Joins already-rendered members of a tuple, list or set.
pub fn join_sequence(kind: &Object, items: Vec<String>) -> String {
    match kind {
        Object::Tuple if items.len() == 1 => format!("({},)", items[0]),
        Object::Tuple => format!("({})", items.join(", ")),
        Object::Set if items.is_empty() => "set()".to_string(),
        Object::Set => format!("{{{}}}", items.join(", ")),
        _ => format!("[{}]", items.join(", ")),
    }
}

/// Joins already-rendered dict entries.
pub fn join_dict(entries: Vec<(String, String)>) -> String {
    let parts: Vec<String> = entries.into_iter().map(|(k, v)| format!("{k}: {v}")).collect();
    format!("{{{}}}", parts.join(", "))
}

pub fn scalar_literal(scalar: &Scalar) -> String {
    match scalar {
        Scalar::None => "None".to_string(),
        Scalar::Ellipsis => "...".to_string(),
        Scalar::Bool(true) => "True".to_string(),
        Scalar::Bool(false) => "False".to_string(),
        Scalar::Int(v) => v.to_string(),
        Scalar::Float(v) => float_literal(*v),
        Scalar::Complex { re, im } => complex_literal(*re, *im),
        Scalar::Text(s) => text_repr(s),
        Scalar::Bytes(b) => bytes_repr(b),
    }
}

/// Python `repr` of a float: shortest round-trip digits, exponent with an
/// explicit sign and at least two digits. Non-finite values give `inf`,
/// `-inf` and `nan`.
pub fn float_repr(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // Debug switches to exponent form at the same thresholds as Python.
    let s = format!("{v:?}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

/// Float as an evaluable expression.
pub fn float_literal(v: f64) -> String {
    if v.is_finite() {
        float_repr(v)
    } else {
        format!("float('{}')", float_repr(v))
    }
}

fn complex_part(v: f64) -> String {
    let repr = float_repr(v);
    match repr.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_string(),
        None => repr,
    }
}

pub fn complex_literal(re: f64, im: f64) -> String {
    if !re.is_finite() || !im.is_finite() {
        return format!("complex({}, {})", float_literal(re), float_literal(im));
    }
    let imag = complex_part(im);
    if re == 0.0 && re.is_sign_positive() {
        return format!("{imag}j");
    }
    let sign = if im.is_sign_negative() { "" } else { "+" };
    format!("({}{sign}{imag}j)", complex_part(re))
}

fn pick_quote(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double {
        '"'
    } else {
        '\''
    }
}

/// Python `repr` of a `str`.
pub fn text_repr(s: &str) -> String {
    let quote = pick_quote(s.contains('\''), s.contains('"'));
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() || (c.is_whitespace() && c != ' ') => {
                let code = c as u32;
                if code < 0x100 {
                    out.push_str(&format!("\\x{code:02x}"));
                } else if code < 0x10000 {
                    out.push_str(&format!("\\u{code:04x}"));
                } else {
                    out.push_str(&format!("\\U{code:08x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python `repr` of a `bytes`.
pub fn bytes_repr(bytes: &[u8]) -> String {
    let quote = pick_quote(bytes.contains(&b'\''), bytes.contains(&b'"'));
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(quote);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b as char == quote => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            b => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push(quote);
    out
}

/// Renders routine defaults from a heap, for the function text extractor.
pub struct HeapLiterals<'a>(pub &'a ValueHeap);

impl DefaultRenderer for HeapLiterals<'_> {
    fn render_default(&self, value: ValueId) -> Result<Option<String>, SynthError> {
        literal(self.0, value)
    }
}
