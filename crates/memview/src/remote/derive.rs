//! Remote-type derivation: a local [`StructType`] becomes a descriptor whose
//! accessors round-trip through a foreign-memory accessor.
//!
//! Derivation is memoized process-wide, keyed by the source type's identity.
//! The cache is append-only and never invalidated, which is sound because
//! layouts are immutable after finalization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::error::Result;
use crate::layout::{Scalar, StructType, TypeDesc};

/// Access plan for one derived field.
#[derive(Debug, Clone)]
pub(crate) enum RemoteKind {
    /// Scalar, bitfield, enum, or char-like array: one read/write of the
    /// exact span plus the local decode/encode logic.
    Inline { size: usize },
    /// Nested structure: a nested view rooted at the field offset, no I/O
    /// until its own fields are touched.
    Struct(Arc<RemoteStructType>),
    /// Array of plain scalars: one bulk read per access, indexed locally.
    ScalarArray { elem: Scalar, len: usize },
    /// Array of struct/array/pointer elements: one element-sized read per
    /// index.
    ElementArray {
        elem: TypeDesc,
        elem_size: usize,
        len: usize,
    },
    /// Pointer slot; the target type is resolved at dereference time so
    /// self-referential layouts can link late.
    Pointer { elem: TypeDesc },
}

/// Derived counterpart of a [`StructType`]. Field order and offsets come
/// from the source; `kinds` holds the per-field access plans in the same
/// order.
#[derive(Debug)]
pub struct RemoteStructType {
    source: StructType,
    kinds: Vec<RemoteKind>,
}

impl RemoteStructType {
    pub fn source(&self) -> &StructType {
        &self.source
    }

    pub fn size(&self) -> usize {
        self.source.size()
    }

    pub(crate) fn kind(&self, index: usize) -> &RemoteKind {
        &self.kinds[index]
    }
}

fn cache() -> &'static Mutex<HashMap<u64, Arc<RemoteStructType>>> {
    static CACHE: OnceLock<Mutex<HashMap<u64, Arc<RemoteStructType>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Derive (or fetch the memoized) remote counterpart of a structure type.
/// Two calls on the same source return the identical `Arc`.
pub fn derive_remote(ty: &StructType) -> Result<Arc<RemoteStructType>> {
    if let Ok(map) = cache().lock()
        && let Some(derived) = map.get(&ty.id())
    {
        return Ok(Arc::clone(derived));
    }

    let mut kinds = Vec::with_capacity(ty.fields().len());
    for field in ty.fields() {
        kinds.push(derive_kind(field.ty(), field.size())?);
    }
    let derived = Arc::new(RemoteStructType {
        source: ty.clone(),
        kinds,
    });

    let mut map = cache().lock().unwrap_or_else(|e| e.into_inner());
    // Lost race: keep the first derivation so identity stays stable.
    let entry = map
        .entry(ty.id())
        .or_insert_with(|| Arc::clone(&derived));
    debug!(name = ty.name(), id = ty.id(), "remote type derived");
    Ok(Arc::clone(entry))
}

fn derive_kind(ty: &TypeDesc, size: usize) -> Result<RemoteKind> {
    Ok(match ty {
        TypeDesc::Scalar(_) | TypeDesc::Bits { .. } | TypeDesc::Enum(_) => {
            RemoteKind::Inline { size }
        }
        TypeDesc::Struct(st) => RemoteKind::Struct(derive_remote(st)?),
        TypeDesc::Array { elem, len } => match &**elem {
            TypeDesc::Scalar(s) if s.is_char_like() => RemoteKind::Inline { size },
            TypeDesc::Scalar(s) => RemoteKind::ScalarArray {
                elem: *s,
                len: *len,
            },
            other => RemoteKind::ElementArray {
                elem: other.clone(),
                elem_size: other.layout_size()?,
                len: *len,
            },
        },
        TypeDesc::Pointer(elem) => RemoteKind::Pointer {
            elem: (**elem).clone(),
        },
        // Size-bearing deferred references were resolved at finalization.
        TypeDesc::Deferred(d) => RemoteKind::Struct(derive_remote(&d.resolved()?)?),
    })
}
