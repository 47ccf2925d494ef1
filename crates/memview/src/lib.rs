//! # memview
//!
//! Typed views over raw memory for process-inspection tooling.
//!
//! This crate provides:
//! - A layout engine turning declarative field lists into byte-exact
//!   structure types with typed accessors
//! - Remote views that re-route those accessors through a foreign-process
//!   memory capability
//! - A signature compiler and scanner for locating code by wildcard byte
//!   patterns

pub mod error;
pub mod layout;
pub mod pattern;
pub mod remote;

pub use error::{Error, Result};
pub use layout::{
    define_struct, ArrayRef, BoundFunc, DeferredStruct, EnumType, EnumValue, Field, FieldDef,
    FuncAddress, FuncSpec, HookEngine, InvalidText, PadSpan, PointerRef, Scalar, StructBuilder,
    StructInstance, StructMut, StructRef, StructType, TextCodec, TextEncoding, TypeDesc, Value,
    POINTER_SIZE,
};
pub use pattern::{
    compile, load_signatures, save_signatures, scan, CaptureGroup, PatternMatch, Section,
    Signature, SignatureEntry, SignatureSet,
};
pub use remote::{
    derive_remote, ArraySnapshot, BufferAccessor, MemOp, MemoryAccessor, RemoteArray,
    RemoteHandle, RemotePointer, RemoteStructType, RemoteValue, RemoteView,
};

#[cfg(target_os = "windows")]
pub use remote::ProcessAccessor;
