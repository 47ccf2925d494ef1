//! Layout finalization: declarative field lists become byte-exact,
//! immutable structure types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::layout::field::{Field, FieldDef};
use crate::layout::func::FuncSpec;
use crate::layout::ty::TypeDesc;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// An anonymous gap inserted to honor an explicitly declared field offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadSpan {
    pub offset: usize,
    pub len: usize,
}

/// A finalized structure layout.
///
/// Cheap to clone (shared); immutable once built. Instances of the type are
/// byte buffers of exactly [`StructType::size`] bytes. The numeric identity
/// keys the remote-view derivation cache.
#[derive(Debug, Clone)]
pub struct StructType(Arc<Layout>);

#[derive(Debug)]
struct Layout {
    id: u64,
    name: String,
    fields: Vec<Field>,
    padding: Vec<PadSpan>,
    funcs: Vec<FuncSpec>,
    size: usize,
}

impl StructType {
    pub fn builder(name: impl Into<String>) -> StructBuilder {
        StructBuilder {
            name: name.into(),
            fields: Vec::new(),
            funcs: Vec::new(),
            declared_size: 0,
        }
    }

    /// Identity of this finalized type. Two finalizations of the same field
    /// list produce equal layouts but distinct identities.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn size(&self) -> usize {
        self.0.size
    }

    pub fn fields(&self) -> &[Field] {
        &self.0.fields
    }

    pub fn padding(&self) -> &[PadSpan] {
        &self.0.padding
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.0
            .fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    pub fn funcs(&self) -> &[FuncSpec] {
        &self.0.funcs
    }

    pub fn func(&self, name: &str) -> Result<&FuncSpec> {
        self.0
            .funcs
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    /// This type as seen starting `delta` bytes into a larger record: every
    /// field shifted by `delta`, total size grown by `delta`.
    ///
    /// Composes additively: `t.offset(8).offset(4)` addresses fields exactly
    /// like `t.offset(12)`.
    pub fn offset(&self, delta: usize) -> StructType {
        let fields = self
            .0
            .fields
            .iter()
            .map(|f| Field {
                name: f.name.clone(),
                ty: f.ty.clone(),
                offset: f.offset + delta,
                size: f.size,
                codec: f.codec,
            })
            .collect();
        let padding = self
            .0
            .padding
            .iter()
            .map(|p| PadSpan {
                offset: p.offset + delta,
                len: p.len,
            })
            .collect();
        StructType(Arc::new(Layout {
            id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.0.name.clone(),
            fields,
            padding,
            funcs: self.0.funcs.clone(),
            size: self.0.size + delta,
        }))
    }
}

/// Builder collecting field declarations for one finalization pass.
pub struct StructBuilder {
    name: String,
    fields: Vec<FieldDef>,
    funcs: Vec<FuncSpec>,
    declared_size: usize,
}

impl StructBuilder {
    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    pub fn func(mut self, spec: FuncSpec) -> Self {
        self.funcs.push(spec);
        self
    }

    /// Declare a minimum total size. The final size is the larger of this and
    /// the end of the last placed field.
    pub fn size(mut self, size: usize) -> Self {
        self.declared_size = size;
        self
    }

    /// Run the cursor walk and freeze the layout.
    ///
    /// Fields are processed in priority order (declaration order within equal
    /// priority). An unset offset takes the cursor; an offset behind the
    /// cursor is a [`Error::LayoutConflict`]; an offset past it records an
    /// anonymous padding span. The cursor then advances by the field's layout
    /// size. Bit fields with an explicit offset alias already-placed storage
    /// and leave the cursor alone.
    pub fn finalize(mut self) -> Result<StructType> {
        self.fields
            .sort_by_key(|f| f.priority);

        let mut cursor = 0usize;
        let mut end = 0usize;
        let mut fields = Vec::with_capacity(self.fields.len());
        let mut padding = Vec::new();

        for def in self.fields {
            let ty = def.ty.resolve_shallow()?;
            let field_size = ty.layout_size()?;

            let (ty, declared_offset) = normalize_bits(ty, def.offset);
            let aliasing_bits = matches!(ty, TypeDesc::Bits { .. }) && declared_offset.is_some();

            let offset = match declared_offset {
                None => cursor,
                Some(off) if aliasing_bits => off,
                Some(off) if off < cursor => {
                    return Err(Error::LayoutConflict {
                        field: def.name,
                        offset: off,
                        cursor,
                    });
                }
                Some(off) => {
                    if off > cursor {
                        padding.push(PadSpan {
                            offset: cursor,
                            len: off - cursor,
                        });
                    }
                    off
                }
            };

            if !aliasing_bits {
                cursor = offset + field_size;
            }
            // Aliasing bits skip the cursor but still occupy storage the
            // type must cover.
            end = end.max(offset + field_size);

            fields.push(Field {
                name: def.name,
                ty,
                offset,
                size: field_size,
                codec: def.codec,
            });
        }

        let size = self.declared_size.max(end);
        let ty = StructType(Arc::new(Layout {
            id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            fields,
            padding,
            funcs: self.funcs,
            size,
        }));
        debug!(
            name = ty.name(),
            size = ty.size(),
            fields = ty.fields().len(),
            "layout finalized"
        );
        Ok(ty)
    }
}

/// Fold a bit offset of 8 or more into the byte offset.
fn normalize_bits(ty: TypeDesc, offset: Option<usize>) -> (TypeDesc, Option<usize>) {
    if let TypeDesc::Bits { bit_offset, width } = ty {
        let byte_carry = (bit_offset / 8) as usize;
        let ty = TypeDesc::Bits {
            bit_offset: bit_offset % 8,
            width,
        };
        return (ty, offset.map(|o| o + byte_carry));
    }
    (ty, offset)
}

/// Finalize a structure type from a field list. Shorthand for the builder.
pub fn define_struct(name: impl Into<String>, fields: Vec<FieldDef>) -> Result<StructType> {
    let mut builder = StructType::builder(name);
    for def in fields {
        builder = builder.field(def);
    }
    builder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ty::{DeferredStruct, EnumType, Scalar};

    fn two_fields() -> Vec<FieldDef> {
        vec![
            FieldDef::scalar("a", Scalar::U32),
            FieldDef::scalar("b", Scalar::U32).at(12),
        ]
    }

    #[test]
    fn test_finalize_is_deterministic() {
        let t1 = define_struct("T", two_fields()).unwrap();
        let t2 = define_struct("T", two_fields()).unwrap();
        assert_eq!(t1.size(), t2.size());
        for (f1, f2) in t1.fields().iter().zip(t2.fields()) {
            assert_eq!(f1.offset(), f2.offset());
        }
        assert_ne!(t1.id(), t2.id());
    }

    #[test]
    fn test_gap_inserts_padding() {
        let t = define_struct("T", two_fields()).unwrap();
        assert_eq!(t.field("a").unwrap().offset(), 0);
        assert_eq!(t.field("b").unwrap().offset(), 12);
        assert_eq!(t.padding(), &[PadSpan { offset: 4, len: 8 }]);
        assert_eq!(t.size(), 16);
    }

    #[test]
    fn test_offset_behind_cursor_conflicts() {
        let err = define_struct(
            "T",
            vec![
                FieldDef::scalar("a", Scalar::U64),
                FieldDef::scalar("b", Scalar::U32).at(4),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::LayoutConflict {
                offset: 4,
                cursor: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_declared_size_wins_when_larger() {
        let t = StructType::builder("T")
            .field(FieldDef::scalar("a", Scalar::U32))
            .size(0x40)
            .finalize()
            .unwrap();
        assert_eq!(t.size(), 0x40);
    }

    #[test]
    fn test_enum_layout_size_is_backing_size() {
        let e = EnumType::new("Mode", Scalar::U16)
            .variant("Off", 0)
            .variant("On", 1);
        let t = define_struct(
            "T",
            vec![
                FieldDef::enumeration("mode", e),
                FieldDef::scalar("after", Scalar::U8),
            ],
        )
        .unwrap();
        assert_eq!(t.field("after").unwrap().offset(), 2);
    }

    #[test]
    fn test_priority_orders_retrofitted_fields() {
        let t = define_struct(
            "T",
            vec![
                FieldDef::scalar("late", Scalar::U32).priority(1),
                FieldDef::scalar("early", Scalar::U32).priority(-1),
            ],
        )
        .unwrap();
        assert_eq!(t.field("early").unwrap().offset(), 0);
        assert_eq!(t.field("late").unwrap().offset(), 4);
    }

    #[test]
    fn test_aliasing_bitfields_share_a_byte() {
        let t = define_struct(
            "Flags",
            vec![
                FieldDef::scalar("raw", Scalar::U8),
                FieldDef::bits("lo", 0, 4).at(0),
                FieldDef::bits("hi", 4, 4).at(0),
                FieldDef::scalar("after", Scalar::U8),
            ],
        )
        .unwrap();
        assert_eq!(t.field("lo").unwrap().offset(), 0);
        assert_eq!(t.field("hi").unwrap().offset(), 0);
        assert_eq!(t.field("after").unwrap().offset(), 1);
        assert_eq!(t.size(), 2);
    }

    #[test]
    fn test_bit_offset_past_a_byte_carries() {
        let t = define_struct("T", vec![FieldDef::bits("f", 12, 2).at(4)]).unwrap();
        let f = t.field("f").unwrap();
        assert_eq!(f.offset(), 5);
        assert!(matches!(
            f.ty(),
            TypeDesc::Bits {
                bit_offset: 4,
                width: 2
            }
        ));
        assert_eq!(t.size(), 6);
    }

    #[test]
    fn test_aliasing_bits_extend_the_size() {
        // A bit field aliasing a byte past the cursor still counts toward
        // the end of the layout.
        let t = define_struct("T", vec![FieldDef::bits("f", 0, 1).at(5)]).unwrap();
        assert_eq!(t.size(), 6);

        let t = define_struct(
            "T",
            vec![
                FieldDef::scalar("a", Scalar::U8),
                FieldDef::bits("f", 0, 3).at(7),
            ],
        )
        .unwrap();
        assert_eq!(t.size(), 8);
    }

    #[test]
    fn test_offset_composes() {
        let t = define_struct("T", two_fields()).unwrap();
        let shifted = t.offset(8).offset(4);
        let direct = t.offset(12);
        assert_eq!(shifted.size(), direct.size());
        for (a, b) in shifted.fields().iter().zip(direct.fields()) {
            assert_eq!(a.offset(), b.offset());
        }
        assert_eq!(t.field("a").unwrap().offset(), 0);
    }

    #[test]
    fn test_funcs_are_attached_to_the_type() {
        use crate::layout::func::{FuncAddress, FuncSpec};
        let t = StructType::builder("Entity")
            .field(FieldDef::scalar("hp", Scalar::U32))
            .func(FuncSpec::new("reset", FuncAddress::Fixed(0x1000)))
            .finalize()
            .unwrap();
        assert_eq!(t.funcs().len(), 1);
        assert_eq!(t.func("reset").unwrap().name(), "reset");
        assert!(t.func("missing").is_err());
    }

    #[test]
    fn test_unlinked_deferred_fails_finalization() {
        let handle = DeferredStruct::new("Later");
        let err = define_struct("T", vec![FieldDef::deferred("inner", handle)]).unwrap_err();
        assert!(matches!(err, Error::UnlinkedType(name) if name == "Later"));
    }

    #[test]
    fn test_linked_deferred_resolves_eagerly() {
        let inner = define_struct("Inner", vec![FieldDef::scalar("x", Scalar::U64)]).unwrap();
        let handle = DeferredStruct::new("Inner");
        handle.link(inner).unwrap();
        let t = define_struct(
            "T",
            vec![
                FieldDef::deferred("inner", handle),
                FieldDef::scalar("after", Scalar::U8),
            ],
        )
        .unwrap();
        assert_eq!(t.field("after").unwrap().offset(), 8);
        assert!(matches!(t.field("inner").unwrap().ty(), TypeDesc::Struct(_)));
    }
}
