//! ValueHeap: the arena of live values handed to the synthesizer.
//!
//! The heap is a `StableGraph` whose nodes are [`Object`]s and whose edges
//! are container memberships labelled by [`Slot`]. Identity is the node's
//! [`ValueId`], so aliasing and self-reference are expressed exactly as the
//! host saw them. Members are always read back sorted by slot position,
//! which keeps every traversal deterministic.

use std::collections::HashSet;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::SynthError;
use crate::id::ValueId;
use crate::routine::CompiledRoutine;
use crate::value::{ClassInfo, Object, OpaqueInfo, Scalar, Slot};

/// Arena of objects with container membership edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueHeap {
    graph: StableGraph<Object, Slot, Directed, u32>,
}

impl ValueHeap {
    pub fn new() -> Self {
        ValueHeap {
            graph: StableGraph::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: ValueId) -> bool {
        self.graph.contains_node(id.into())
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Adds an object with no members.
    pub fn add(&mut self, object: Object) -> ValueId {
        self.graph.add_node(object).into()
    }

    pub fn scalar(&mut self, scalar: Scalar) -> ValueId {
        self.add(Object::Scalar(scalar))
    }

    pub fn none(&mut self) -> ValueId {
        self.scalar(Scalar::None)
    }

    pub fn boolean(&mut self, value: bool) -> ValueId {
        self.scalar(Scalar::Bool(value))
    }

    pub fn int(&mut self, value: i64) -> ValueId {
        self.scalar(Scalar::Int(value))
    }

    pub fn float(&mut self, value: f64) -> ValueId {
        self.scalar(Scalar::Float(value))
    }

    pub fn text(&mut self, value: impl Into<String>) -> ValueId {
        self.scalar(Scalar::Text(value.into()))
    }

    pub fn bytes(&mut self, value: impl Into<Vec<u8>>) -> ValueId {
        self.scalar(Scalar::Bytes(value.into()))
    }

    pub fn format_text(&mut self, value: impl Into<String>) -> ValueId {
        self.add(Object::FormatText(value.into()))
    }

    pub fn module(&mut self, name: impl Into<String>) -> ValueId {
        self.add(Object::Module { name: name.into() })
    }

    pub fn callable(&mut self, routine: CompiledRoutine) -> ValueId {
        self.add(Object::Callable(routine))
    }

    pub fn class(&mut self, info: ClassInfo) -> ValueId {
        self.add(Object::Class(info))
    }

    pub fn opaque(&mut self, module: impl Into<String>, class_name: impl Into<String>) -> ValueId {
        self.add(Object::Opaque(OpaqueInfo {
            module: module.into(),
            class_name: class_name.into(),
        }))
    }

    pub fn tuple(&mut self, items: impl IntoIterator<Item = ValueId>) -> Result<ValueId, SynthError> {
        self.sequence(Object::Tuple, items)
    }

    pub fn list(&mut self, items: impl IntoIterator<Item = ValueId>) -> Result<ValueId, SynthError> {
        self.sequence(Object::List, items)
    }

    pub fn set(&mut self, items: impl IntoIterator<Item = ValueId>) -> Result<ValueId, SynthError> {
        self.sequence(Object::Set, items)
    }

    pub fn dict(
        &mut self,
        entries: impl IntoIterator<Item = (ValueId, ValueId)>,
    ) -> Result<ValueId, SynthError> {
        let id = self.add(Object::Dict);
        for (key, value) in entries {
            self.insert(id, key, value)?;
        }
        Ok(id)
    }

    fn sequence(
        &mut self,
        kind: Object,
        items: impl IntoIterator<Item = ValueId>,
    ) -> Result<ValueId, SynthError> {
        let id = self.add(kind);
        for item in items {
            self.push(id, item)?;
        }
        Ok(id)
    }

    /// Appends `item` to a tuple, list or set.
    pub fn push(&mut self, container: ValueId, item: ValueId) -> Result<(), SynthError> {
        match self.get(container)? {
            Object::Tuple | Object::List | Object::Set => {}
            other => {
                return Err(SynthError::InvalidEdit {
                    id: container,
                    reason: format!("cannot append to a {}", other.kind_name()),
                })
            }
        }
        self.get(item)?;
        let position = self.member_count(container);
        self.graph
            .add_edge(container.into(), item.into(), Slot::Element(position));
        Ok(())
    }

    /// Appends a `key: value` entry to a dict.
    pub fn insert(&mut self, dict: ValueId, key: ValueId, value: ValueId) -> Result<(), SynthError> {
        if !matches!(self.get(dict)?, Object::Dict) {
            return Err(SynthError::InvalidEdit {
                id: dict,
                reason: "entries can only be inserted into a dict".into(),
            });
        }
        self.get(key)?;
        self.get(value)?;
        let position = self.member_count(dict) / 2;
        self.graph.add_edge(dict.into(), key.into(), Slot::Key(position));
        self.graph
            .add_edge(dict.into(), value.into(), Slot::Value(position));
        Ok(())
    }

    /// Records an attribute of an opaque instance.
    pub fn set_attr(
        &mut self,
        object: ValueId,
        name: impl Into<String>,
        value: ValueId,
    ) -> Result<(), SynthError> {
        if !matches!(self.get(object)?, Object::Opaque(_)) {
            return Err(SynthError::InvalidEdit {
                id: object,
                reason: "attributes can only be set on opaque objects".into(),
            });
        }
        self.get(value)?;
        let position = self.member_count(object);
        self.graph.add_edge(
            object.into(),
            value.into(),
            Slot::Attribute {
                position,
                name: name.into(),
            },
        );
        Ok(())
    }

    fn member_count(&self, id: ValueId) -> u32 {
        self.graph.edges(NodeIndex::from(id)).count() as u32
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: ValueId) -> Result<&Object, SynthError> {
        self.graph
            .node_weight(id.into())
            .ok_or(SynthError::UnknownValue { id })
    }

    /// Every member of `id` with its slot, in slot order.
    fn slots(&self, id: ValueId) -> Result<SmallVec<[(Slot, ValueId); 8]>, SynthError> {
        self.get(id)?;
        let mut slots: SmallVec<[(Slot, ValueId); 8]> = self
            .graph
            .edges(id.into())
            .map(|e| (e.weight().clone(), ValueId::from(e.target())))
            .collect();
        // Key sorts before Value at the same position.
        slots.sort_by_key(|(slot, _)| (slot.position(), matches!(slot, Slot::Value(_))));
        Ok(slots)
    }

    /// Elements of a tuple, list or set in insertion order.
    pub fn elements(&self, id: ValueId) -> Result<Vec<ValueId>, SynthError> {
        Ok(self
            .slots(id)?
            .into_iter()
            .filter_map(|(slot, v)| matches!(slot, Slot::Element(_)).then_some(v))
            .collect())
    }

    /// Entries of a dict in insertion order.
    pub fn entries(&self, id: ValueId) -> Result<Vec<(ValueId, ValueId)>, SynthError> {
        let slots = self.slots(id)?;
        let mut entries = Vec::with_capacity(slots.len() / 2);
        let mut pending_key = None;
        for (slot, v) in slots {
            match slot {
                Slot::Key(_) => pending_key = Some(v),
                Slot::Value(_) => {
                    if let Some(key) = pending_key.take() {
                        entries.push((key, v));
                    }
                }
                _ => {}
            }
        }
        Ok(entries)
    }

    /// Attributes of an opaque instance in insertion order.
    pub fn attributes(&self, id: ValueId) -> Result<Vec<(String, ValueId)>, SynthError> {
        Ok(self
            .slots(id)?
            .into_iter()
            .filter_map(|(slot, v)| match slot {
                Slot::Attribute { name, .. } => Some((name, v)),
                _ => None,
            })
            .collect())
    }

    /// Short description of a value for diagnostics.
    pub fn describe(&self, id: ValueId) -> String {
        match self.get(id) {
            Ok(Object::Scalar(s)) => format!("{s:?}"),
            Ok(Object::Module { name }) => format!("module {name}"),
            Ok(Object::Callable(r)) => format!("function {}.{}", r.module, r.qualname),
            Ok(Object::Class(c)) => format!("class {}.{}", c.module, c.qualname),
            Ok(other) => format!("{} {id}", other.kind_name()),
            Err(_) => format!("missing {id}"),
        }
    }

    // -----------------------------------------------------------------------
    // Equality
    // -----------------------------------------------------------------------

    /// Value equality as used by the name-conflict rule.
    ///
    /// Identical ids are equal. Scalars compare by value with matching tags,
    /// containers structurally (sets and dicts ignore order), routines and
    /// classes by definition site, modules by name, opaque objects only by
    /// identity. A pair revisited while still being compared is equal only
    /// if identical.
    pub fn equals(&self, a: ValueId, b: ValueId) -> bool {
        let mut active = HashSet::new();
        self.equals_inner(a, b, &mut active)
    }

    fn equals_inner(&self, a: ValueId, b: ValueId, active: &mut HashSet<(ValueId, ValueId)>) -> bool {
        if a == b {
            return true;
        }
        let (Ok(oa), Ok(ob)) = (self.get(a), self.get(b)) else {
            return false;
        };
        let equal = match (oa, ob) {
            (Object::Scalar(x), Object::Scalar(y)) => return x == y,
            (Object::FormatText(x), Object::FormatText(y)) => return x == y,
            (Object::Module { name: x }, Object::Module { name: y }) => return x == y,
            (Object::Callable(x), Object::Callable(y)) => return x.same_definition(y),
            (Object::Class(x), Object::Class(y)) => {
                return x.module == y.module && x.qualname == y.qualname
            }
            (Object::Tuple, Object::Tuple) | (Object::List, Object::List) => {
                if !active.insert((a, b)) {
                    return false;
                }
                match (self.elements(a), self.elements(b)) {
                    (Ok(xs), Ok(ys)) => {
                        xs.len() == ys.len()
                            && xs
                                .iter()
                                .zip(&ys)
                                .all(|(&x, &y)| self.equals_inner(x, y, active))
                    }
                    _ => false,
                }
            }
            (Object::Set, Object::Set) => {
                if !active.insert((a, b)) {
                    return false;
                }
                match (self.elements(a), self.elements(b)) {
                    (Ok(xs), Ok(ys)) => {
                        xs.len() == ys.len()
                            && xs
                                .iter()
                                .all(|&x| ys.iter().any(|&y| self.equals_inner(x, y, active)))
                    }
                    _ => false,
                }
            }
            (Object::Dict, Object::Dict) => {
                if !active.insert((a, b)) {
                    return false;
                }
                match (self.entries(a), self.entries(b)) {
                    (Ok(xs), Ok(ys)) => {
                        xs.len() == ys.len()
                            && xs.iter().all(|&(xk, xv)| {
                                ys.iter().any(|&(yk, yv)| {
                                    self.equals_inner(xk, yk, active)
                                        && self.equals_inner(xv, yv, active)
                                })
                            })
                    }
                    _ => false,
                }
            }
            _ => return false,
        };
        active.remove(&(a, b));
        equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_come_back_in_insertion_order() {
        let mut heap = ValueHeap::new();
        let a = heap.int(1);
        let b = heap.int(2);
        let c = heap.int(3);
        let list = heap.list([c, a, b]).unwrap();
        assert_eq!(heap.elements(list).unwrap(), vec![c, a, b]);
    }

    #[test]
    fn dict_entries_pair_keys_and_values() {
        let mut heap = ValueHeap::new();
        let k1 = heap.text("a");
        let v1 = heap.int(1);
        let k2 = heap.text("b");
        let v2 = heap.int(2);
        let d = heap.dict([(k1, v1), (k2, v2)]).unwrap();
        assert_eq!(heap.entries(d).unwrap(), vec![(k1, v1), (k2, v2)]);
    }

    #[test]
    fn self_reference_is_representable() {
        let mut heap = ValueHeap::new();
        let list = heap.list([]).unwrap();
        heap.push(list, list).unwrap();
        assert_eq!(heap.elements(list).unwrap(), vec![list]);
    }

    #[test]
    fn edits_check_kinds_and_ids() {
        let mut heap = ValueHeap::new();
        let n = heap.int(1);
        assert!(matches!(
            heap.push(n, n),
            Err(SynthError::InvalidEdit { .. })
        ));
        let list = heap.list([]).unwrap();
        assert!(matches!(
            heap.push(list, ValueId(99)),
            Err(SynthError::UnknownValue { id: ValueId(99) })
        ));
        assert!(matches!(
            heap.set_attr(list, "x", n),
            Err(SynthError::InvalidEdit { .. })
        ));
    }

    #[test]
    fn opaque_attributes() {
        let mut heap = ValueHeap::new();
        let obj = heap.opaque("jobs", "Config");
        let v = heap.int(4);
        heap.set_attr(obj, "retries", v).unwrap();
        assert_eq!(heap.attributes(obj).unwrap(), vec![("retries".to_string(), v)]);
    }

    #[test]
    fn structural_equality() {
        let mut heap = ValueHeap::new();
        let a1 = heap.int(1);
        let a2 = heap.int(1);
        let l1 = heap.list([a1]).unwrap();
        let l2 = heap.list([a2]).unwrap();
        let t1 = heap.tuple([a1]).unwrap();
        assert!(heap.equals(l1, l2));
        assert!(!heap.equals(l1, t1));

        let x = heap.int(1);
        let y = heap.int(2);
        let s1 = heap.set([x, y]).unwrap();
        let s2 = heap.set([y, x]).unwrap();
        assert!(heap.equals(s1, s2));

        let f = heap.float(1.0);
        assert!(!heap.equals(a1, f));
    }

    #[test]
    fn cyclic_equality_terminates() {
        let mut heap = ValueHeap::new();
        let l1 = heap.list([]).unwrap();
        heap.push(l1, l1).unwrap();
        let l2 = heap.list([]).unwrap();
        heap.push(l2, l2).unwrap();
        assert!(heap.equals(l1, l1));
        assert!(!heap.equals(l1, l2));
    }

    #[test]
    fn opaque_compares_by_identity() {
        let mut heap = ValueHeap::new();
        let a = heap.opaque("m", "C");
        let b = heap.opaque("m", "C");
        assert!(heap.equals(a, a));
        assert!(!heap.equals(a, b));
    }

    #[test]
    fn serde_roundtrip_heap() {
        let mut heap = ValueHeap::new();
        let a = heap.int(1);
        let l = heap.list([a, a]).unwrap();
        let json = serde_json::to_string(&heap).unwrap();
        let back: ValueHeap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.elements(l).unwrap(), vec![a, a]);
    }
}
