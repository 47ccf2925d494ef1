//! Remote views: the layout engine's accessors re-routed through a
//! foreign-memory capability.

mod accessor;
mod derive;
mod view;

pub use accessor::{BufferAccessor, MemOp, MemoryAccessor, RemoteHandle};
pub use derive::{derive_remote, RemoteStructType};
pub use view::{ArraySnapshot, RemoteArray, RemotePointer, RemoteValue, RemoteView};

#[cfg(target_os = "windows")]
pub use accessor::ProcessAccessor;
