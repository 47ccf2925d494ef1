//! Declarative field descriptors.

use crate::layout::ty::{DeferredStruct, EnumType, Scalar, TypeDesc};
use crate::layout::value::TextCodec;
use crate::layout::StructType;

/// A field as declared, before finalization assigns its final offset.
///
/// Offsets are byte-exact and optional; unset offsets are assigned from the
/// layout cursor. `priority` orders retrofitted fields relative to the
/// original declaration (lower first, declaration order within a tie).
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) ty: TypeDesc,
    pub(crate) offset: Option<usize>,
    pub(crate) priority: i32,
    pub(crate) codec: TextCodec,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        FieldDef {
            name: name.into(),
            ty,
            offset: None,
            priority: 0,
            codec: TextCodec::default(),
        }
    }

    pub fn scalar(name: impl Into<String>, scalar: Scalar) -> Self {
        FieldDef::new(name, TypeDesc::Scalar(scalar))
    }

    pub fn array(name: impl Into<String>, elem: TypeDesc, len: usize) -> Self {
        FieldDef::new(name, TypeDesc::array(elem, len))
    }

    /// Nul-terminated text buffer of `len` bytes.
    pub fn text(name: impl Into<String>, len: usize) -> Self {
        FieldDef::array(name, TypeDesc::Scalar(Scalar::Char), len)
    }

    pub fn pointer(name: impl Into<String>, elem: TypeDesc) -> Self {
        FieldDef::new(name, TypeDesc::pointer(elem))
    }

    pub fn nested(name: impl Into<String>, ty: StructType) -> Self {
        FieldDef::new(name, TypeDesc::Struct(ty))
    }

    pub fn enumeration(name: impl Into<String>, ty: EnumType) -> Self {
        FieldDef::new(name, TypeDesc::Enum(ty))
    }

    pub fn deferred(name: impl Into<String>, handle: DeferredStruct) -> Self {
        FieldDef::new(name, TypeDesc::Deferred(handle))
    }

    /// Pointer whose target may be declared later (or be the declaring type
    /// itself); the target resolves at first dereference.
    pub fn deferred_pointer(name: impl Into<String>, handle: DeferredStruct) -> Self {
        FieldDef::new(name, TypeDesc::pointer(TypeDesc::Deferred(handle)))
    }

    /// Sub-byte flag field. Requires an explicit byte offset (via [`at`]) to
    /// share storage with other fields; without one it claims the cursor byte.
    ///
    /// [`at`]: FieldDef::at
    pub fn bits(name: impl Into<String>, bit_offset: u8, width: u8) -> Self {
        FieldDef::new(name, TypeDesc::Bits { bit_offset, width })
    }

    /// Pin the field at an explicit byte offset.
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Text codec for char-like arrays; ignored for other kinds.
    pub fn codec(mut self, codec: TextCodec) -> Self {
        self.codec = codec;
        self
    }
}

/// A placed field inside a finalized layout.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) ty: TypeDesc,
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) codec: TextCodec,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeDesc {
        &self.ty
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte span this field occupies in the layout.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn codec(&self) -> TextCodec {
        self.codec
    }
}
