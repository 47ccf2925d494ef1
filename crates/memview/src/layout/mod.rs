//! Layout engine: declarative field lists become byte-exact structure types
//! with typed accessors over plain buffers.

mod field;
mod func;
mod instance;
mod struct_type;
mod ty;
mod value;

pub use field::{Field, FieldDef};
pub use func::{BoundFunc, FuncAddress, FuncSpec, HookEngine};
pub use instance::{ArrayRef, PointerRef, StructInstance, StructMut, StructRef};
pub use struct_type::{define_struct, PadSpan, StructBuilder, StructType};
pub use ty::{DeferredStruct, EnumType, Scalar, TypeDesc, POINTER_SIZE};
pub use value::{EnumValue, InvalidText, TextCodec, TextEncoding, Value};

pub(crate) use value::{
    decode_enum, decode_scalar, encode_scalar, enum_raw_for, read_bits, write_bits,
};
