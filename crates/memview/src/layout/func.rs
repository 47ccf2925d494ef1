//! Bound function thunks: structure fields that name a callable at a
//! computed address rather than a data value.
//!
//! The thunk resolves its target address (fixed, vtable slot, or custom
//! resolver) against a live view; actually executing the target and the hook
//! trampoline lifecycle belong to external collaborators.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::layout::ty::{Scalar, TypeDesc, POINTER_SIZE};
use crate::remote::RemoteView;

/// External hooking engine. `install` returns the original (trampoline
/// continuation) address.
pub trait HookEngine {
    fn install(&self, address: u64, trampoline: u64) -> std::io::Result<u64>;
    fn enable(&self, address: u64) -> std::io::Result<()>;
    fn disable(&self, address: u64) -> std::io::Result<()>;
    fn uninstall(&self, address: u64) -> std::io::Result<()>;
}

type ResolverFn = dyn Fn(&RemoteView) -> Result<u64> + Send + Sync;

/// How a thunk's target address is found.
#[derive(Clone)]
pub enum FuncAddress {
    /// Known fixed address.
    Fixed(u64),
    /// Virtual-table dispatch: a pointer at `vtable_offset` inside the
    /// instance leads to a table; the target sits in slot `index`.
    VTableSlot { vtable_offset: usize, index: usize },
    /// Caller-supplied resolver over the live instance view.
    Resolver(Arc<ResolverFn>),
}

impl fmt::Debug for FuncAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncAddress::Fixed(addr) => write!(f, "Fixed({addr:#x})"),
            FuncAddress::VTableSlot {
                vtable_offset,
                index,
            } => write!(f, "VTableSlot({vtable_offset:#x}[{index}])"),
            FuncAddress::Resolver(_) => write!(f, "Resolver(..)"),
        }
    }
}

/// Declared callable attached to a structure type.
#[derive(Debug, Clone)]
pub struct FuncSpec {
    name: String,
    address: FuncAddress,
    ret: Option<Scalar>,
    args: Vec<TypeDesc>,
}

impl FuncSpec {
    pub fn new(name: impl Into<String>, address: FuncAddress) -> Self {
        FuncSpec {
            name: name.into(),
            address,
            ret: None,
            args: Vec::new(),
        }
    }

    pub fn returns(mut self, ret: Scalar) -> Self {
        self.ret = Some(ret);
        self
    }

    pub fn arg(mut self, ty: TypeDesc) -> Self {
        self.args.push(ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ret(&self) -> Option<Scalar> {
        self.ret
    }

    pub fn args(&self) -> &[TypeDesc] {
        &self.args
    }

    /// Resolve the target address against a live instance view.
    pub fn resolve(&self, view: &RemoteView) -> Result<u64> {
        match &self.address {
            FuncAddress::Fixed(addr) => Ok(*addr),
            FuncAddress::VTableSlot {
                vtable_offset,
                index,
            } => {
                let vtable = view.read_u64(view.address() + *vtable_offset as u64)?;
                if vtable == 0 {
                    return Err(Error::NullPointerDeref);
                }
                view.read_u64(vtable + (*index * POINTER_SIZE) as u64)
            }
            FuncAddress::Resolver(resolve) => resolve(view),
        }
    }

    /// Bind against an instance: the resolved target plus the instance
    /// address that gets marshalled as the implicit first argument.
    pub fn bind(&self, view: &RemoteView) -> Result<BoundFunc> {
        Ok(BoundFunc {
            address: self.resolve(view)?,
            instance: view.address(),
            ret: self.ret,
            args: self.args.clone(),
        })
    }

    /// Install a hook at the resolved target through the external engine.
    /// Returns the original address for trampoline continuation.
    pub fn hook(
        &self,
        view: &RemoteView,
        engine: &dyn HookEngine,
        trampoline: u64,
    ) -> Result<u64> {
        let address = self.resolve(view)?;
        engine
            .install(address, trampoline)
            .map_err(|source| Error::HookInstall { address, source })
    }
}

/// A thunk resolved against one instance, ready to hand to a caller.
#[derive(Debug, Clone)]
pub struct BoundFunc {
    address: u64,
    instance: u64,
    ret: Option<Scalar>,
    args: Vec<TypeDesc>,
}

impl BoundFunc {
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Implicit first argument for the call.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn ret(&self) -> Option<Scalar> {
        self.ret
    }

    pub fn args(&self) -> &[TypeDesc] {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{define_struct, FieldDef, StructType};
    use crate::remote::{BufferAccessor, RemoteHandle};

    const BASE: u64 = 0x10_0000;

    fn instance_type() -> StructType {
        define_struct(
            "Entity",
            vec![
                FieldDef::pointer("vtable", TypeDesc::Scalar(Scalar::U64)),
                FieldDef::scalar("hp", Scalar::U32),
            ],
        )
        .unwrap()
    }

    fn view_with(mem: Vec<u8>) -> RemoteView {
        let acc = Arc::new(BufferAccessor::new(BASE, mem));
        RemoteView::new(&instance_type(), RemoteHandle::new(acc, BASE)).unwrap()
    }

    #[test]
    fn test_fixed_address_resolves_without_io() {
        let spec = FuncSpec::new("reset", FuncAddress::Fixed(0xDEAD));
        let view = view_with(vec![0; 16]);
        assert_eq!(spec.resolve(&view).unwrap(), 0xDEAD);
    }

    #[test]
    fn test_vtable_slot_resolution() {
        // vtable pointer at offset 0, table mapped 0x100 into the buffer.
        let table = BASE + 0x100;
        let mut mem = vec![0u8; 0x200];
        mem[0..8].copy_from_slice(&table.to_le_bytes());
        mem[0x108..0x110].copy_from_slice(&0xBEEFu64.to_le_bytes());

        let spec = FuncSpec::new(
            "update",
            FuncAddress::VTableSlot {
                vtable_offset: 0,
                index: 1,
            },
        )
        .returns(Scalar::U32)
        .arg(TypeDesc::Scalar(Scalar::F32));
        let view = view_with(mem);

        let bound = spec.bind(&view).unwrap();
        assert_eq!(bound.address(), 0xBEEF);
        assert_eq!(bound.instance(), BASE);
        assert_eq!(bound.ret(), Some(Scalar::U32));
        assert_eq!(bound.args().len(), 1);
    }

    #[test]
    fn test_null_vtable_is_rejected() {
        let spec = FuncSpec::new(
            "update",
            FuncAddress::VTableSlot {
                vtable_offset: 0,
                index: 0,
            },
        );
        let view = view_with(vec![0; 16]);
        assert!(matches!(
            spec.resolve(&view),
            Err(Error::NullPointerDeref)
        ));
    }

    #[test]
    fn test_hook_failure_carries_address() {
        struct Failing;
        impl HookEngine for Failing {
            fn install(&self, _address: u64, _trampoline: u64) -> std::io::Result<u64> {
                Err(std::io::Error::other("patch site busy"))
            }
            fn enable(&self, _address: u64) -> std::io::Result<()> {
                Ok(())
            }
            fn disable(&self, _address: u64) -> std::io::Result<()> {
                Ok(())
            }
            fn uninstall(&self, _address: u64) -> std::io::Result<()> {
                Ok(())
            }
        }

        let spec = FuncSpec::new("reset", FuncAddress::Fixed(0x4444));
        let view = view_with(vec![0; 16]);
        let err = spec.hook(&view, &Failing, 0x9000).unwrap_err();
        assert!(matches!(err, Error::HookInstall { address: 0x4444, .. }));
    }

    #[test]
    fn test_resolver_sees_the_view() {
        let spec = FuncSpec::new(
            "custom",
            FuncAddress::Resolver(Arc::new(|view: &RemoteView| Ok(view.address() + 0x30))),
        );
        let view = view_with(vec![0; 16]);
        assert_eq!(spec.resolve(&view).unwrap(), BASE + 0x30);
    }
}
