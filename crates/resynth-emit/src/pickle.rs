//! Opaque value encoding as a pickle protocol 0 stream.
//!
//! Protocol 0 uses only printable text opcodes, so the stream can sit in a
//! quoted literal and stays somewhat readable. The target decodes it with
//! `pickle.loads(stream.encode())`. Functions and classes are stored as
//! global references; everything else is rebuilt member by member. No memo
//! is written: shared members are encoded once per occurrence, and a value
//! that reaches itself is refused.

use std::collections::BTreeSet;

use resynth_core::{Object, Scalar, SynthError, ValueHeap, ValueId};

use crate::literal::float_repr;

/// Encodes `id` as a protocol 0 pickle stream.
///
/// Fails with [`SynthError::CyclicValue`] on self-reference and with
/// [`SynthError::UnrepresentableValue`] on modules or on globals whose module
/// is in `excluded` (the target could not import them).
pub fn encode(heap: &ValueHeap, id: ValueId, excluded: &BTreeSet<String>) -> Result<String, SynthError> {
    let mut pickler = Pickler {
        heap,
        excluded,
        out: String::new(),
        active: Vec::new(),
    };
    pickler.save(id)?;
    pickler.out.push('.');
    Ok(pickler.out)
}

struct Pickler<'a> {
    heap: &'a ValueHeap,
    excluded: &'a BTreeSet<String>,
    out: String,
    active: Vec<ValueId>,
}

impl Pickler<'_> {
    fn save(&mut self, id: ValueId) -> Result<(), SynthError> {
        let heap = self.heap;
        match heap.get(id)? {
            Object::Scalar(s) => {
                self.save_scalar(s);
                Ok(())
            }
            Object::FormatText(body) => {
                self.save_text(body);
                Ok(())
            }
            Object::Module { name } => Err(SynthError::UnrepresentableValue {
                id,
                reason: format!("module {name} has no pickle form"),
            }),
            Object::Callable(r) => self.save_global(id, &r.module, &r.qualname),
            Object::Class(c) => self.save_global(id, &c.module, &c.qualname),
            Object::Tuple => self.nested(id, |p| {
                p.out.push('(');
                for member in heap.elements(id)? {
                    p.save(member)?;
                }
                p.out.push('t');
                Ok(())
            }),
            Object::List => self.nested(id, |p| {
                p.out.push_str("(l");
                for member in heap.elements(id)? {
                    p.save(member)?;
                    p.out.push('a');
                }
                Ok(())
            }),
            Object::Set => self.nested(id, |p| {
                p.out.push_str("c__builtin__\nset\n((l");
                for member in heap.elements(id)? {
                    p.save(member)?;
                    p.out.push('a');
                }
                p.out.push_str("tR");
                Ok(())
            }),
            Object::Dict => self.nested(id, |p| {
                p.out.push_str("(d");
                for (key, value) in heap.entries(id)? {
                    p.save(key)?;
                    p.save(value)?;
                    p.out.push('s');
                }
                Ok(())
            }),
            Object::Opaque(info) => self.nested(id, |p| {
                p.out.push_str("ccopy_reg\n_reconstructor\n(");
                p.save_global(id, &info.module, &info.class_name)?;
                p.out.push_str("c__builtin__\nobject\nNtR");
                let attributes = heap.attributes(id)?;
                if !attributes.is_empty() {
                    p.out.push_str("(d");
                    for (name, value) in attributes {
                        p.save_text(&name);
                        p.save(value)?;
                        p.out.push('s');
                    }
                    p.out.push('b');
                }
                Ok(())
            }),
        }
    }

    /// Runs `body` with `id` marked as being encoded.
    fn nested(
        &mut self,
        id: ValueId,
        body: impl FnOnce(&mut Self) -> Result<(), SynthError>,
    ) -> Result<(), SynthError> {
        if self.active.contains(&id) {
            return Err(SynthError::CyclicValue { id });
        }
        self.active.push(id);
        let result = body(self);
        self.active.pop();
        result
    }

    fn save_scalar(&mut self, scalar: &Scalar) {
        match scalar {
            Scalar::None => self.out.push('N'),
            Scalar::Ellipsis => self.out.push_str("c__builtin__\nEllipsis\n"),
            Scalar::Bool(b) => self.out.push_str(if *b { "I01\n" } else { "I00\n" }),
            Scalar::Int(v) => {
                if i32::try_from(*v).is_ok() {
                    self.out.push_str(&format!("I{v}\n"));
                } else {
                    self.out.push_str(&format!("L{v}L\n"));
                }
            }
            Scalar::Float(v) => self.out.push_str(&format!("F{}\n", float_repr(*v))),
            Scalar::Complex { re, im } => self.out.push_str(&format!(
                "c__builtin__\ncomplex\n(F{}\nF{}\ntR",
                float_repr(*re),
                float_repr(*im)
            )),
            Scalar::Text(s) => self.save_text(s),
            Scalar::Bytes(b) if b.is_empty() => self.out.push_str("c__builtin__\nbytes\n(tR"),
            Scalar::Bytes(b) => {
                let latin1: String = b.iter().map(|&byte| char::from(byte)).collect();
                self.out.push_str("c_codecs\nencode\n(");
                self.save_text(&latin1);
                self.out.push_str("Vlatin1\ntR");
            }
        }
    }

    /// `UNICODE` opcode with raw-unicode-escape content, kept pure ASCII.
    fn save_text(&mut self, s: &str) {
        self.out.push('V');
        for c in s.chars() {
            match c {
                '\\' | '\0' | '\n' | '\r' | '\x1a' => {
                    self.out.push_str(&format!("\\u{:04x}", c as u32))
                }
                c if c.is_ascii() => self.out.push(c),
                c if (c as u32) < 0x10000 => self.out.push_str(&format!("\\u{:04x}", c as u32)),
                c => self.out.push_str(&format!("\\U{:08x}", c as u32)),
            }
        }
        self.out.push('\n');
    }

    /// `GLOBAL` reference; nested qualnames are reached through `getattr`.
    fn save_global(&mut self, id: ValueId, module: &str, qualname: &str) -> Result<(), SynthError> {
        if self.excluded.contains(module) {
            return Err(SynthError::UnrepresentableValue {
                id,
                reason: format!("{module}.{qualname} belongs to a module serialized by value"),
            });
        }
        let mut parts = qualname.split('.');
        let head = parts.next().unwrap_or(qualname);
        let tail: Vec<&str> = parts.collect();
        for _ in &tail {
            self.out.push_str("c__builtin__\ngetattr\n(");
        }
        self.out.push_str(&format!("c{module}\n{head}\n"));
        for part in tail {
            self.save_text(part);
            self.out.push_str("tR");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resynth_core::{ClassInfo, CompiledRoutine};

    fn none_excluded() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn scalars() {
        let mut heap = ValueHeap::new();
        let n = heap.none();
        let i = heap.int(5);
        let big = heap.int(1 << 40);
        let t = heap.text("a\\b\né");
        let b = heap.bytes(b"\xffA".to_vec());
        let ex = none_excluded();
        assert_eq!(encode(&heap, n, &ex).unwrap(), "N.");
        assert_eq!(encode(&heap, i, &ex).unwrap(), "I5\n.");
        assert_eq!(encode(&heap, big, &ex).unwrap(), "L1099511627776L\n.");
        assert_eq!(encode(&heap, t, &ex).unwrap(), "Va\\u005cb\\u000a\\u00e9\n.");
        assert_eq!(
            encode(&heap, b, &ex).unwrap(),
            "c_codecs\nencode\n(V\\u00ffA\nVlatin1\ntR."
        );
    }

    #[test]
    fn containers() {
        let mut heap = ValueHeap::new();
        let one = heap.int(1);
        let k = heap.text("k");
        let list = heap.list([one, one]).unwrap();
        let tuple = heap.tuple([list]).unwrap();
        let dict = heap.dict([(k, tuple)]).unwrap();
        let set = heap.set([one]).unwrap();
        let ex = none_excluded();
        assert_eq!(encode(&heap, dict, &ex).unwrap(), "(dVk\n((lI1\naI1\nats.");
        assert_eq!(encode(&heap, set, &ex).unwrap(), "c__builtin__\nset\n((lI1\natR.");
    }

    #[test]
    fn opaque_instance_with_state() {
        let mut heap = ValueHeap::new();
        let obj = heap.opaque("jobs.config", "Settings");
        let v = heap.int(3);
        heap.set_attr(obj, "retries", v).unwrap();
        let stream = encode(&heap, obj, &none_excluded()).unwrap();
        assert_eq!(
            stream,
            "ccopy_reg\n_reconstructor\n(cjobs.config\nSettings\nc__builtin__\nobject\nNtR(dVretries\nI3\nsb."
        );
    }

    #[test]
    fn nested_qualname_uses_getattr() {
        let mut heap = ValueHeap::new();
        let class = heap.class(ClassInfo {
            module: "jobs".into(),
            qualname: "Outer.Inner".into(),
            signature: None,
        });
        assert_eq!(
            encode(&heap, class, &none_excluded()).unwrap(),
            "c__builtin__\ngetattr\n(cjobs\nOuter\nVInner\ntR."
        );
    }

    #[test]
    fn refusals() {
        let mut heap = ValueHeap::new();
        let module = heap.module("os");
        assert!(matches!(
            encode(&heap, module, &none_excluded()),
            Err(SynthError::UnrepresentableValue { .. })
        ));

        let f = heap.callable(CompiledRoutine::new("f", "__main__", "/job.py", 1));
        let excluded: BTreeSet<String> = ["__main__".to_string()].into();
        assert!(matches!(
            encode(&heap, f, &excluded),
            Err(SynthError::UnrepresentableValue { .. })
        ));

        let obj = heap.opaque("m", "C");
        heap.set_attr(obj, "me", obj).unwrap();
        assert!(matches!(
            encode(&heap, obj, &none_excluded()),
            Err(SynthError::CyclicValue { .. })
        ));
    }
}
