//! Live views over foreign memory.
//!
//! Every field access re-reads or re-writes through the accessor; nothing is
//! cached across calls. Staleness is therefore impossible, but each access
//! pays a full round trip; callers needing a consistent multi-field snapshot
//! should bulk-copy via [`RemoteView::snapshot`] instead of reading fields
//! one by one.

use crate::error::{Error, Result};
use crate::layout::{
    decode_enum, decode_scalar, encode_scalar, enum_raw_for, read_bits, write_bits, Field, Scalar,
    StructInstance, StructType, TextCodec, TypeDesc, Value,
};
use crate::remote::accessor::RemoteHandle;
use crate::remote::derive::{derive_remote, RemoteKind, RemoteStructType};
use std::sync::Arc;

/// Result of a remote field access.
#[derive(Debug)]
pub enum RemoteValue {
    /// Decoded leaf: scalar, bitfield, enum, or nul-terminated text.
    Value(Value<'static>),
    /// Nested view rooted inside the parent; no I/O performed yet.
    Struct(RemoteView),
    /// Per-element remote array (struct/array/pointer elements).
    Array(RemoteArray),
    /// Bulk-read snapshot of a plain scalar array.
    Snapshot(ArraySnapshot),
    /// Pointer view rooted at the slot; the shown address is the read
    /// performed by this access.
    Pointer(RemotePointer),
}

impl RemoteValue {
    pub fn into_value(self) -> Result<Value<'static>> {
        match self {
            RemoteValue::Value(v) => Ok(v),
            other => Err(Error::InvalidValue(format!(
                "expected leaf value, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_struct(self) -> Result<RemoteView> {
        match self {
            RemoteValue::Struct(v) => Ok(v),
            other => Err(Error::InvalidValue(format!(
                "expected struct view, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_array(self) -> Result<RemoteArray> {
        match self {
            RemoteValue::Array(v) => Ok(v),
            other => Err(Error::InvalidValue(format!(
                "expected remote array, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_snapshot(self) -> Result<ArraySnapshot> {
        match self {
            RemoteValue::Snapshot(v) => Ok(v),
            other => Err(Error::InvalidValue(format!(
                "expected array snapshot, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_pointer(self) -> Result<RemotePointer> {
        match self {
            RemoteValue::Pointer(v) => Ok(v),
            other => Err(Error::InvalidValue(format!(
                "expected pointer view, got {}",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RemoteValue::Value(_) => "value",
            RemoteValue::Struct(_) => "struct",
            RemoteValue::Array(_) => "array",
            RemoteValue::Snapshot(_) => "snapshot",
            RemoteValue::Pointer(_) => "pointer",
        }
    }
}

/// Live view of one structure inside a foreign address space.
#[derive(Debug, Clone)]
pub struct RemoteView {
    ty: Arc<RemoteStructType>,
    handle: RemoteHandle,
}

impl RemoteView {
    /// Build a view of `ty` rooted at the handle's base address. The derived
    /// remote type is memoized per source type.
    pub fn new(ty: &StructType, handle: RemoteHandle) -> Result<Self> {
        Ok(RemoteView {
            ty: derive_remote(ty)?,
            handle,
        })
    }

    pub(crate) fn from_derived(ty: Arc<RemoteStructType>, handle: RemoteHandle) -> Self {
        RemoteView { ty, handle }
    }

    pub fn ty(&self) -> &StructType {
        self.ty.source()
    }

    /// The memoized derived descriptor backing this view.
    pub fn derived(&self) -> &Arc<RemoteStructType> {
        &self.ty
    }

    pub fn address(&self) -> u64 {
        self.handle.address()
    }

    /// Read one field. Leaf fields perform exactly one read of the field's
    /// span; navigation fields perform the I/O documented on
    /// [`RemoteValue`].
    pub fn get(&self, name: &str) -> Result<RemoteValue> {
        let (index, field) = self.field_index(name)?;
        let addr = self.handle.address() + field.offset() as u64;
        match self.ty.kind(index) {
            RemoteKind::Inline { size } => {
                let bytes = self.handle.read_bytes(addr, *size)?;
                Ok(RemoteValue::Value(decode_inline(field, &bytes)?))
            }
            RemoteKind::Struct(derived) => Ok(RemoteValue::Struct(RemoteView::from_derived(
                Arc::clone(derived),
                self.handle.rebase(addr),
            ))),
            RemoteKind::ScalarArray { elem, len } => {
                let bytes = self.handle.read_bytes(addr, elem.size() * len)?;
                Ok(RemoteValue::Snapshot(ArraySnapshot {
                    elem: *elem,
                    bytes,
                }))
            }
            RemoteKind::ElementArray {
                elem,
                elem_size,
                len,
            } => Ok(RemoteValue::Array(RemoteArray {
                handle: self.handle.rebase(addr),
                elem: elem.clone(),
                elem_size: *elem_size,
                len: *len,
            })),
            RemoteKind::Pointer { elem } => {
                let address = self.handle.read_u64(addr)?;
                Ok(RemoteValue::Pointer(RemotePointer {
                    slot: self.handle.rebase(addr),
                    elem: elem.clone(),
                    address,
                }))
            }
        }
    }

    /// Write one field. Leaf fields perform exactly one write of the field's
    /// span (bitfields read-modify-write their byte). Pointer fields are
    /// read-only; nested structs accept only live views.
    pub fn set(&self, name: &str, value: Value<'_>) -> Result<()> {
        let (index, field) = self.field_index(name)?;
        let addr = self.handle.address() + field.offset() as u64;
        match self.ty.kind(index) {
            RemoteKind::Inline { size } => self.set_inline(field, addr, *size, value),
            RemoteKind::ScalarArray { elem, len } => {
                let span = elem.size() * len;
                let Value::Bytes(data) = value else {
                    return Err(Error::InvalidValue(format!(
                        "scalar array field '{}' takes bytes, got {}",
                        field.name(),
                        value.kind()
                    )));
                };
                if data.len() > span {
                    return Err(Error::InvalidValue(format!(
                        "{} bytes into array field '{}' of {} bytes",
                        data.len(),
                        field.name(),
                        span
                    )));
                }
                self.handle.write_at(addr, &data)
            }
            RemoteKind::Struct(derived) => {
                let Value::Struct(src) = value else {
                    return Err(Error::ReadOnlyViolation(format!(
                        "nested struct '{}' only accepts assignment from a live view",
                        field.name()
                    )));
                };
                if src.bytes().len() != derived.size() {
                    return Err(Error::ReadOnlyViolation(format!(
                        "nested struct assignment size mismatch: {} into {}",
                        src.bytes().len(),
                        derived.size()
                    )));
                }
                self.handle.write_at(addr, src.bytes())
            }
            RemoteKind::ElementArray { .. } => Err(Error::InvalidValue(format!(
                "element array field '{}' is not assignable as a whole",
                field.name()
            ))),
            RemoteKind::Pointer { .. } => Err(Error::ReadOnlyViolation(format!(
                "pointer field '{}' is read-only",
                field.name()
            ))),
        }
    }

    /// Assign a whole nested-struct field from another remote view: one bulk
    /// read of the source, one bulk write of the destination span.
    pub fn set_from_view(&self, name: &str, src: &RemoteView) -> Result<()> {
        let (index, field) = self.field_index(name)?;
        let RemoteKind::Struct(derived) = self.ty.kind(index) else {
            return Err(Error::InvalidValue(format!(
                "field '{}' is not a nested struct",
                field.name()
            )));
        };
        if src.ty.size() != derived.size() {
            return Err(Error::ReadOnlyViolation(format!(
                "nested struct assignment size mismatch: {} into {}",
                src.ty.size(),
                derived.size()
            )));
        }
        let bytes = src.handle.read_bytes(src.address(), src.ty.size())?;
        let addr = self.handle.address() + field.offset() as u64;
        self.handle.write_at(addr, &bytes)
    }

    /// Bulk-copy another view of the same size over this one: one read, one
    /// write, each spanning the whole struct.
    pub fn copy_from(&self, src: &RemoteView) -> Result<()> {
        if src.ty.size() != self.ty.size() {
            return Err(Error::ReadOnlyViolation(format!(
                "struct assignment size mismatch: {} into {}",
                src.ty.size(),
                self.ty.size()
            )));
        }
        let bytes = src.handle.read_bytes(src.address(), src.ty.size())?;
        self.handle.write_at(self.address(), &bytes)
    }

    /// One bulk read of the whole struct into a local instance, for callers
    /// needing a consistent multi-field snapshot.
    pub fn snapshot(&self) -> Result<StructInstance> {
        let bytes = self
            .handle
            .read_bytes(self.address(), self.ty.size())?;
        StructInstance::from_bytes(self.ty.source(), bytes)
    }

    pub(crate) fn read_u64(&self, address: u64) -> Result<u64> {
        self.handle.read_u64(address)
    }

    fn set_inline(&self, field: &Field, addr: u64, size: usize, value: Value<'_>) -> Result<()> {
        match field.ty() {
            TypeDesc::Scalar(s) => {
                let mut buf = vec![0u8; s.size()];
                encode_scalar(*s, &value, &mut buf)?;
                self.handle.write_at(addr, &buf)
            }
            TypeDesc::Bits { bit_offset, width } => {
                let mut byte = [0u8; 1];
                self.handle.read_at(addr, &mut byte)?;
                byte[0] = write_bits(byte[0], *bit_offset, *width, value.as_u64()?);
                self.handle.write_at(addr, &byte)
            }
            TypeDesc::Enum(e) => {
                let raw = enum_raw_for(e, &value)?;
                let backing = e.backing();
                let mut buf = vec![0u8; backing.size()];
                encode_scalar(backing, &Value::Int(raw), &mut buf)?;
                self.handle.write_at(addr, &buf)
            }
            // Char-like array: left-aligned, trailing remote bytes untouched.
            TypeDesc::Array { .. } => {
                let data = match value {
                    Value::Str(s) => field.codec().encode(&s)?,
                    Value::Bytes(b) => b,
                    other => {
                        return Err(Error::InvalidValue(format!(
                            "text field '{}' takes str or bytes, got {}",
                            field.name(),
                            other.kind()
                        )));
                    }
                };
                if data.len() > size {
                    return Err(Error::InvalidValue(format!(
                        "{} bytes into text field '{}' of {} bytes",
                        data.len(),
                        field.name(),
                        size
                    )));
                }
                self.handle.write_at(addr, &data)
            }
            other => Err(Error::InvalidValue(format!(
                "unexpected inline field type {other:?}"
            ))),
        }
    }

    fn field_index(&self, name: &str) -> Result<(usize, &Field)> {
        self.ty
            .source()
            .fields()
            .iter()
            .enumerate()
            .find(|(_, f)| f.name() == name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }
}

fn decode_inline(field: &Field, bytes: &[u8]) -> Result<Value<'static>> {
    match field.ty() {
        TypeDesc::Scalar(s) => Ok(decode_scalar(*s, bytes)),
        TypeDesc::Bits { bit_offset, width } => {
            Ok(Value::UInt(read_bits(bytes[0], *bit_offset, *width)))
        }
        TypeDesc::Enum(e) => Ok(Value::Enum(decode_enum(e, bytes)?)),
        TypeDesc::Array { .. } => Ok(Value::Str(field.codec().decode(bytes)?)),
        other => Err(Error::InvalidValue(format!(
            "unexpected inline field type {other:?}"
        ))),
    }
}

/// Remote array with struct/array/pointer elements: one element-sized read
/// per index.
#[derive(Debug, Clone)]
pub struct RemoteArray {
    handle: RemoteHandle,
    elem: TypeDesc,
    elem_size: usize,
    len: usize,
}

impl RemoteArray {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn address(&self) -> u64 {
        self.handle.address()
    }

    pub fn at(&self, index: usize) -> Result<RemoteValue> {
        if index >= self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        let elem = self.elem.resolve_deep()?;
        let addr = self.handle.address() + (index * self.elem_size) as u64;
        if matches!(elem, TypeDesc::Struct(_)) {
            // Element-sized touch read; the returned view re-reads per field.
            self.handle.read_bytes(addr, self.elem_size)?;
        }
        remote_element(self.handle.rebase(addr), &elem)
    }
}

/// Bulk-read snapshot of a plain scalar array. Indexing is local; re-read
/// the field for fresh data.
#[derive(Debug, Clone)]
pub struct ArraySnapshot {
    elem: Scalar,
    bytes: Vec<u8>,
}

impl ArraySnapshot {
    pub fn len(&self) -> usize {
        self.bytes.len() / self.elem.size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn at(&self, index: usize) -> Result<Value<'static>> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        let size = self.elem.size();
        Ok(decode_scalar(
            self.elem,
            &self.bytes[index * size..(index + 1) * size],
        ))
    }
}

/// Pointer view: the slot address plus the target address read when the
/// field was accessed. Indexing dereferences on demand and is read-only.
#[derive(Debug, Clone)]
pub struct RemotePointer {
    slot: RemoteHandle,
    elem: TypeDesc,
    address: u64,
}

impl RemotePointer {
    /// Target address as of this view's creating field access.
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    /// Re-read the pointer slot, yielding a view with the fresh target.
    pub fn reread(&self) -> Result<RemotePointer> {
        let address = self.slot.read_u64(self.slot.address())?;
        Ok(RemotePointer {
            slot: self.slot.clone(),
            elem: self.elem.clone(),
            address,
        })
    }

    /// Dereference element `index` at `address + index * sizeof(elem)`.
    ///
    /// A zero target fails with [`Error::NullPointerDeref`] before any
    /// accessor call. Bounds are caller-driven; there is no element count.
    pub fn at(&self, index: usize) -> Result<RemoteValue> {
        if self.address == 0 {
            return Err(Error::NullPointerDeref);
        }
        let elem = self.elem.resolve_deep()?;
        let elem_size = elem.layout_size()?;
        let addr = self.address + (index * elem_size) as u64;
        remote_element(self.slot.rebase(addr), &elem)
    }

    /// Bounded view of `len` elements starting at the target. The count is
    /// caller-supplied; the pointee carries none of its own.
    pub fn range(&self, len: usize) -> Result<RemoteArray> {
        if self.address == 0 {
            return Err(Error::NullPointerDeref);
        }
        let elem = self.elem.resolve_deep()?;
        Ok(RemoteArray {
            handle: self.slot.rebase(self.address),
            elem_size: elem.layout_size()?,
            elem,
            len,
        })
    }
}

/// Read or root a single element of type `ty` at the handle's address.
fn remote_element(handle: RemoteHandle, ty: &TypeDesc) -> Result<RemoteValue> {
    match ty {
        TypeDesc::Scalar(s) => {
            let bytes = handle.read_bytes(handle.address(), s.size())?;
            Ok(RemoteValue::Value(decode_scalar(*s, &bytes)))
        }
        TypeDesc::Enum(e) => {
            let bytes = handle.read_bytes(handle.address(), e.backing().size())?;
            Ok(RemoteValue::Value(Value::Enum(decode_enum(e, &bytes)?)))
        }
        TypeDesc::Bits { bit_offset, width } => {
            let bytes = handle.read_bytes(handle.address(), 1)?;
            Ok(RemoteValue::Value(Value::UInt(read_bits(
                bytes[0],
                *bit_offset,
                *width,
            ))))
        }
        TypeDesc::Struct(st) => Ok(RemoteValue::Struct(RemoteView::new(st, handle)?)),
        TypeDesc::Array { elem, len } => match &**elem {
            TypeDesc::Scalar(s) if s.is_char_like() => {
                let bytes = handle.read_bytes(handle.address(), *len)?;
                Ok(RemoteValue::Value(Value::Str(
                    TextCodec::default().decode(&bytes)?,
                )))
            }
            TypeDesc::Scalar(s) => {
                let bytes = handle.read_bytes(handle.address(), s.size() * len)?;
                Ok(RemoteValue::Snapshot(ArraySnapshot { elem: *s, bytes }))
            }
            other => Ok(RemoteValue::Array(RemoteArray {
                elem_size: other.layout_size()?,
                elem: other.clone(),
                handle,
                len: *len,
            })),
        },
        TypeDesc::Pointer(elem) => {
            let address = handle.read_u64(handle.address())?;
            Ok(RemoteValue::Pointer(RemotePointer {
                slot: handle,
                elem: (**elem).clone(),
                address,
            }))
        }
        TypeDesc::Deferred(d) => {
            let st = d.resolved()?;
            Ok(RemoteValue::Struct(RemoteView::new(&st, handle)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{define_struct, DeferredStruct, FieldDef};
    use crate::remote::accessor::{BufferAccessor, MemoryAccessor};
    use std::io;
    use std::sync::Mutex;

    /// Records every accessor call as (op, address, len).
    struct Counting {
        inner: BufferAccessor,
        calls: Mutex<Vec<(&'static str, u64, usize)>>,
    }

    impl Counting {
        fn new(base: u64, mem: Vec<u8>) -> Self {
            Counting {
                inner: BufferAccessor::new(base, mem),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn take(&self) -> Vec<(&'static str, u64, usize)> {
            std::mem::take(&mut self.calls.lock().unwrap())
        }
    }

    impl MemoryAccessor for Counting {
        fn read(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
            self.calls.lock().unwrap().push(("read", address, buf.len()));
            self.inner.read(address, buf)
        }

        fn write(&self, address: u64, data: &[u8]) -> io::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(("write", address, data.len()));
            self.inner.write(address, data)
        }
    }

    const BASE: u64 = 0x40_0000;

    fn player_type() -> StructType {
        define_struct(
            "Player",
            vec![
                FieldDef::scalar("hp", Scalar::U32),
                FieldDef::scalar("mp", Scalar::I16),
                FieldDef::text("name", 8).at(8),
                FieldDef::bits("poisoned", 0, 1).at(16),
                FieldDef::bits("stunned", 1, 2).at(16),
                FieldDef::array("scores", TypeDesc::Scalar(Scalar::U16), 4).at(24),
                FieldDef::pointer("next", TypeDesc::Scalar(Scalar::U32)).at(32),
            ],
        )
        .unwrap()
    }

    fn view_over(acc: Arc<Counting>, ty: &StructType) -> RemoteView {
        RemoteView::new(ty, RemoteHandle::new(acc, BASE)).unwrap()
    }

    #[test]
    fn test_scalar_roundtrip_is_one_write_one_read() {
        let ty = player_type();
        let acc = Arc::new(Counting::new(BASE, vec![0; 64]));
        let view = view_over(Arc::clone(&acc), &ty);

        view.set("hp", Value::UInt(1234)).unwrap();
        assert_eq!(acc.take(), vec![("write", BASE, 4)]);

        let v = view.get("hp").unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 1234);
        assert_eq!(acc.take(), vec![("read", BASE, 4)]);
    }

    #[test]
    fn test_field_access_is_never_cached() {
        let ty = player_type();
        let acc = Arc::new(Counting::new(BASE, vec![0; 64]));
        let view = view_over(Arc::clone(&acc), &ty);

        view.get("hp").unwrap();
        view.get("hp").unwrap();
        assert_eq!(acc.take().len(), 2);
    }

    #[test]
    fn test_text_field_decodes_and_left_aligns() {
        let ty = player_type();
        let mut mem = vec![0u8; 64];
        mem[8..16].copy_from_slice(b"old\0zzzz");
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &ty);

        let v = view.get("name").unwrap().into_value().unwrap();
        assert_eq!(v.as_str().unwrap(), "old");
        assert_eq!(acc.take(), vec![("read", BASE + 8, 8)]);

        view.set("name", Value::Str("ab\0".into())).unwrap();
        assert_eq!(acc.take(), vec![("write", BASE + 8, 3)]);
        let v = view.get("name").unwrap().into_value().unwrap();
        assert_eq!(v.as_str().unwrap(), "ab");
    }

    #[test]
    fn test_bitfield_set_is_read_modify_write() {
        let ty = player_type();
        let acc = Arc::new(Counting::new(BASE, vec![0; 64]));
        let view = view_over(Arc::clone(&acc), &ty);

        view.set("poisoned", Value::UInt(1)).unwrap();
        view.set("stunned", Value::UInt(0b10)).unwrap();
        assert_eq!(
            acc.take(),
            vec![
                ("read", BASE + 16, 1),
                ("write", BASE + 16, 1),
                ("read", BASE + 16, 1),
                ("write", BASE + 16, 1),
            ]
        );
        let v = view.get("stunned").unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 0b10);
        let v = view.get("poisoned").unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 1);
    }

    #[test]
    fn test_scalar_array_is_one_bulk_read() {
        let ty = player_type();
        let mut mem = vec![0u8; 64];
        mem[24..32].copy_from_slice(&[0x10, 0, 0x20, 0, 0x30, 0, 0x40, 0]);
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &ty);

        let snap = view.get("scores").unwrap().into_snapshot().unwrap();
        assert_eq!(acc.take(), vec![("read", BASE + 24, 8)]);
        assert_eq!(snap.len(), 4);
        assert_eq!(snap.at(2).unwrap().as_u64().unwrap(), 0x30);
        assert!(snap.at(4).is_err());
        // Indexing the snapshot touches no memory.
        assert!(acc.take().is_empty());
    }

    #[test]
    fn test_nested_struct_navigation_performs_no_io() {
        let inner = define_struct(
            "Inner",
            vec![
                FieldDef::scalar("x", Scalar::U32),
                FieldDef::scalar("y", Scalar::U32),
            ],
        )
        .unwrap();
        let outer = define_struct(
            "Outer",
            vec![
                FieldDef::scalar("tag", Scalar::U32),
                FieldDef::nested("pos", inner),
            ],
        )
        .unwrap();
        let mut mem = vec![0u8; 32];
        mem[8..12].copy_from_slice(&9u32.to_le_bytes());
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &outer);

        let pos = view.get("pos").unwrap().into_struct().unwrap();
        assert!(acc.take().is_empty());
        assert_eq!(pos.address(), BASE + 4);

        let v = pos.get("y").unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 9);
        assert_eq!(acc.take(), vec![("read", BASE + 8, 4)]);
    }

    #[test]
    fn test_struct_copy_is_one_read_one_write() {
        let inner = define_struct(
            "Inner",
            vec![
                FieldDef::scalar("x", Scalar::U32),
                FieldDef::scalar("y", Scalar::U32),
            ],
        )
        .unwrap();
        let outer = define_struct(
            "Outer",
            vec![
                FieldDef::nested("a", inner.clone()),
                FieldDef::nested("b", inner.clone()),
            ],
        )
        .unwrap();
        let mut mem = vec![0u8; 16];
        mem[0..4].copy_from_slice(&7u32.to_le_bytes());
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &outer);

        let a = view.get("a").unwrap().into_struct().unwrap();
        view.set_from_view("b", &a).unwrap();
        assert_eq!(acc.take(), vec![("read", BASE, 8), ("write", BASE + 8, 8)]);

        let b = view.get("b").unwrap().into_struct().unwrap();
        assert_eq!(b.get("x").unwrap().into_value().unwrap().as_u64().unwrap(), 7);
    }

    #[test]
    fn test_snapshot_is_one_bulk_read() {
        let ty = player_type();
        let mut mem = vec![0u8; 64];
        mem[0..4].copy_from_slice(&55u32.to_le_bytes());
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &ty);

        let inst = view.snapshot().unwrap();
        assert_eq!(acc.take(), vec![("read", BASE, ty.size())]);
        assert_eq!(inst.get("hp").unwrap().as_u64().unwrap(), 55);
    }

    #[test]
    fn test_pointer_field_is_read_only() {
        let ty = player_type();
        let acc = Arc::new(Counting::new(BASE, vec![0; 64]));
        let view = view_over(Arc::clone(&acc), &ty);
        assert!(matches!(
            view.set("next", Value::UInt(0x1234)),
            Err(Error::ReadOnlyViolation(_))
        ));
        assert!(acc.take().is_empty());
    }

    #[test]
    fn test_null_pointer_dereference_performs_no_io() {
        let ty = player_type();
        let acc = Arc::new(Counting::new(BASE, vec![0; 64]));
        let view = view_over(Arc::clone(&acc), &ty);

        let ptr = view.get("next").unwrap().into_pointer().unwrap();
        assert!(ptr.is_null());
        // The slot read happened at field-access time.
        assert_eq!(acc.take(), vec![("read", BASE + 32, 8)]);

        assert!(matches!(ptr.at(0), Err(Error::NullPointerDeref)));
        assert!(acc.take().is_empty());
    }

    #[test]
    fn test_pointer_chase_reads_target() {
        let ty = player_type();
        let mut mem = vec![0u8; 0x100];
        let target = BASE + 0x80;
        mem[32..40].copy_from_slice(&target.to_le_bytes());
        mem[0x84..0x88].copy_from_slice(&42u32.to_le_bytes());
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &ty);

        let ptr = view.get("next").unwrap().into_pointer().unwrap();
        assert_eq!(ptr.address(), target);
        let v = ptr.at(1).unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 42);
    }

    #[test]
    fn test_pointer_range_bounds_with_caller_count() {
        let ty = player_type();
        let mut mem = vec![0u8; 0x100];
        let target = BASE + 0x80;
        mem[32..40].copy_from_slice(&target.to_le_bytes());
        mem[0x80..0x84].copy_from_slice(&5u32.to_le_bytes());
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &ty);

        let ptr = view.get("next").unwrap().into_pointer().unwrap();
        let range = ptr.range(2).unwrap();
        assert_eq!(range.len(), 2);
        let v = range.at(0).unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 5);
        assert!(matches!(
            range.at(2),
            Err(Error::IndexOutOfBounds { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_pointer_reread_sees_new_target() {
        let ty = player_type();
        let acc = Arc::new(Counting::new(BASE, vec![0; 64]));
        let view = view_over(Arc::clone(&acc), &ty);

        let ptr = view.get("next").unwrap().into_pointer().unwrap();
        assert!(ptr.is_null());
        view.handle
            .write_at(BASE + 32, &0x5000u64.to_le_bytes())
            .unwrap();
        // The stale view keeps its address; reread picks up the new one.
        assert!(ptr.is_null());
        assert_eq!(ptr.reread().unwrap().address(), 0x5000);
    }

    #[test]
    fn test_element_array_reads_per_index() {
        let inner = define_struct(
            "Inner",
            vec![
                FieldDef::scalar("x", Scalar::U32),
                FieldDef::scalar("y", Scalar::U32),
            ],
        )
        .unwrap();
        let ty = define_struct(
            "T",
            vec![FieldDef::array("items", TypeDesc::Struct(inner), 3)],
        )
        .unwrap();
        let mut mem = vec![0u8; 64];
        mem[12..16].copy_from_slice(&11u32.to_le_bytes());
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &ty);

        let arr = view.get("items").unwrap().into_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert!(acc.take().is_empty());

        let item = arr.at(1).unwrap().into_struct().unwrap();
        assert_eq!(acc.take(), vec![("read", BASE + 8, 8)]);
        let v = item.get("y").unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 11);

        assert!(matches!(
            arr.at(3),
            Err(Error::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_self_referential_pointer_resolves_at_dereference() {
        let node_ref = DeferredStruct::new("Node");
        let node = define_struct(
            "Node",
            vec![
                FieldDef::scalar("value", Scalar::U32),
                FieldDef::deferred_pointer("next", node_ref.clone()).at(8),
            ],
        )
        .unwrap();
        node_ref.link(node.clone()).unwrap();

        let mut mem = vec![0u8; 0x100];
        mem[0..4].copy_from_slice(&1u32.to_le_bytes());
        let second = BASE + 0x40;
        mem[8..16].copy_from_slice(&second.to_le_bytes());
        mem[0x40..0x44].copy_from_slice(&2u32.to_le_bytes());
        let acc = Arc::new(Counting::new(BASE, mem));
        let view = view_over(Arc::clone(&acc), &node);

        let next = view.get("next").unwrap().into_pointer().unwrap();
        let second_view = next.at(0).unwrap().into_struct().unwrap();
        let v = second_view.get("value").unwrap().into_value().unwrap();
        assert_eq!(v.as_u64().unwrap(), 2);
    }

    #[test]
    fn test_remote_io_errors_carry_op_and_span() {
        let ty = player_type();
        // Buffer too small for the layout.
        let acc = Arc::new(Counting::new(BASE, vec![0; 8]));
        let view = view_over(Arc::clone(&acc), &ty);
        match view.get("next").unwrap_err() {
            Error::RemoteIo {
                op: crate::remote::MemOp::Read,
                address,
                len,
                ..
            } => {
                assert_eq!(address, BASE + 32);
                assert_eq!(len, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
