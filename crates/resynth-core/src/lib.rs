//! Value model for the resynth source synthesizer.
//!
//! Live values to be relocated are described by a [`ValueHeap`]: an arena of
//! [`Object`]s addressed by [`ValueId`], where container membership is an
//! edge. Callables carry a [`CompiledRoutine`] describing where their text
//! lives and which names they need. [`ContextScope`]s supply the values those
//! names resolve to.

pub mod error;
pub mod heap;
pub mod id;
pub mod routine;
pub mod scope;
pub mod value;

// Re-export commonly used types
pub use error::SynthError;
pub use heap::ValueHeap;
pub use id::ValueId;
pub use routine::{CompiledRoutine, Param, ParamKind, Signature};
pub use scope::{resolve_in, ContextScope, Lookup};
pub use value::{ClassInfo, Object, OpaqueInfo, Scalar, Slot};
