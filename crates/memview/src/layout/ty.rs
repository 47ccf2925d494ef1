//! Type descriptors for declarative structure layouts.
//!
//! A [`TypeDesc`] is a tagged description of a field's shape. Layouts are
//! finalized from these descriptors; both the local and the remote accessor
//! paths dispatch on them.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::layout::StructType;

/// Size of a pointer slot in the target address space.
pub const POINTER_SIZE: usize = 8;

/// Fixed-width machine scalar kinds. All values are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Scalar {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// One-byte character. Arrays of this kind decode as nul-terminated text.
    Char,
}

impl Scalar {
    pub fn size(&self) -> usize {
        match self {
            Scalar::U8 | Scalar::I8 | Scalar::Char => 1,
            Scalar::U16 | Scalar::I16 => 2,
            Scalar::U32 | Scalar::I32 | Scalar::F32 => 4,
            Scalar::U64 | Scalar::I64 | Scalar::F64 => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Scalar::I8 | Scalar::I16 | Scalar::I32 | Scalar::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F64)
    }

    pub fn is_char_like(&self) -> bool {
        matches!(self, Scalar::Char)
    }
}

/// Symbolic enum type: a backing scalar plus a name<->value mapping.
///
/// The layout size of an enum field is the backing scalar's size, regardless
/// of how many variants are declared.
#[derive(Debug, Clone)]
pub struct EnumType(Arc<EnumInner>);

#[derive(Debug)]
struct EnumInner {
    name: String,
    backing: Scalar,
    name_by_value: BTreeMap<i64, String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, backing: Scalar) -> Self {
        EnumType(Arc::new(EnumInner {
            name: name.into(),
            backing,
            name_by_value: BTreeMap::new(),
        }))
    }

    /// Add a variant. Builder-style; intended for declaration time only.
    pub fn variant(self, name: impl Into<String>, value: i64) -> Self {
        let mut name_by_value = self.0.name_by_value.clone();
        name_by_value.insert(value, name.into());
        EnumType(Arc::new(EnumInner {
            name: self.0.name.clone(),
            backing: self.0.backing,
            name_by_value,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn backing(&self) -> Scalar {
        self.0.backing
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.0.name_by_value.get(&value).map(String::as_str)
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.0
            .name_by_value
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(v, _)| *v)
    }
}

/// Indirection cell for a structure referenced before it is declared.
///
/// Declare the handle first, use it in field descriptors, then call
/// [`DeferredStruct::link`] once the target type is finalized. Size-bearing
/// uses (nested struct, array element) fail fast at finalization if the cell
/// was never linked; pointer targets resolve at first dereference so a type
/// may point at itself.
#[derive(Debug, Clone)]
pub struct DeferredStruct(Arc<DeferredInner>);

#[derive(Debug)]
struct DeferredInner {
    name: String,
    cell: OnceLock<StructType>,
}

impl DeferredStruct {
    pub fn new(name: impl Into<String>) -> Self {
        DeferredStruct(Arc::new(DeferredInner {
            name: name.into(),
            cell: OnceLock::new(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn link(&self, ty: StructType) -> Result<()> {
        self.0.cell.set(ty).map_err(|_| {
            Error::InvalidValue(format!("deferred type '{}' linked twice", self.0.name))
        })
    }

    pub fn resolved(&self) -> Result<StructType> {
        self.0
            .cell
            .get()
            .cloned()
            .ok_or_else(|| Error::UnlinkedType(self.0.name.clone()))
    }
}

/// Tagged type descriptor for a field.
#[derive(Debug, Clone)]
pub enum TypeDesc {
    Scalar(Scalar),
    /// Fixed-size inline array of `len` elements.
    Array { elem: Box<TypeDesc>, len: usize },
    /// Pointer slot holding the address of an `elem`. Never dereferenced
    /// eagerly; element addresses are computed on demand.
    Pointer(Box<TypeDesc>),
    Struct(StructType),
    Enum(EnumType),
    /// Sub-byte field: `width` bits starting at `bit_offset` within the byte
    /// at the field's offset.
    Bits { bit_offset: u8, width: u8 },
    Deferred(DeferredStruct),
}

impl TypeDesc {
    pub fn array(elem: TypeDesc, len: usize) -> Self {
        TypeDesc::Array {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn pointer(elem: TypeDesc) -> Self {
        TypeDesc::Pointer(Box::new(elem))
    }

    /// Byte footprint of this type inside a layout.
    ///
    /// Fails with [`Error::UnlinkedType`] if sizing requires a deferred type
    /// that was never linked.
    pub fn layout_size(&self) -> Result<usize> {
        match self {
            TypeDesc::Scalar(s) => Ok(s.size()),
            TypeDesc::Array { elem, len } => Ok(elem.layout_size()? * len),
            TypeDesc::Pointer(_) => Ok(POINTER_SIZE),
            TypeDesc::Struct(st) => Ok(st.size()),
            TypeDesc::Enum(e) => Ok(e.backing().size()),
            TypeDesc::Bits { .. } => Ok(1),
            TypeDesc::Deferred(d) => Ok(d.resolved()?.size()),
        }
    }

    /// Resolve deferred references in size-bearing positions, leaving pointer
    /// targets untouched. Called once per field during finalization.
    pub(crate) fn resolve_shallow(&self) -> Result<TypeDesc> {
        match self {
            TypeDesc::Deferred(d) => Ok(TypeDesc::Struct(d.resolved()?)),
            TypeDesc::Array { elem, len } => Ok(TypeDesc::Array {
                elem: Box::new(elem.resolve_shallow()?),
                len: *len,
            }),
            other => Ok(other.clone()),
        }
    }

    /// Resolve a pointer target or array element for dereference, failing if
    /// it is a deferred reference that was never linked.
    pub(crate) fn resolve_deep(&self) -> Result<TypeDesc> {
        match self {
            TypeDesc::Deferred(d) => Ok(TypeDesc::Struct(d.resolved()?)),
            other => Ok(other.clone()),
        }
    }
}
