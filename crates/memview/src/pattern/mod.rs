//! Pattern engine: wildcard byte signatures compiled into scanners over
//! module code sections.

mod scanner;
mod signature;

pub use scanner::{scan, PatternMatch, Section};
pub use signature::{
    compile, load_signatures, save_signatures, CaptureGroup, Signature, SignatureEntry,
    SignatureSet,
};
