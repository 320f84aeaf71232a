mod builder;
mod compiler;
mod core;
mod env;
pub mod error;
mod handle;
mod host;
mod macros;
mod opcode;
mod parser;
mod proc;
mod repr;
mod symbol;
mod value;
mod vm;

pub use self::compiler::compile;
pub use self::core::load_primitives;
pub use self::env::{lookup_location, Env, Location};
pub use self::error::{Error, Result};
pub use self::handle::Handle;
pub use self::host::{from_scheme, to_scheme, HostFn, HostValue};
pub use self::macros::{DynamicClosure, Macro, SymbolClosure};
pub use self::opcode::Opcode;
pub use self::parser::{parse, parse_all, parse_named};
pub use self::proc::{CodeBlock, Form, Primitive, Procedure};
pub use self::repr::ValueRepr;
pub use self::symbol::Symbol;
pub use self::value::{Pair, Value};
pub use self::vm::{Continuation, Vm};

/// Create a new machine with the primitive library and the Scheme
/// prelude loaded.
pub fn new_vm() -> error::Result<Vm> {
    let mut vm = Vm::new();
    vm.load_prelude()?;
    Ok(vm)
}

/// Convenience macro for declaring type safe identifiers.
///
/// ```
/// # use silt_engine::declare_id;
/// declare_id!(struct ConstantId(u16));
/// let func_id = ConstantId::new(42);
/// assert_eq!(func_id.as_inner(), 42);
/// ```
///
/// Supports a visibility modifier.
///
/// ```
/// # use silt_engine::declare_id;
/// declare_id!(pub(crate) struct LocalId(u8));
/// declare_id!(pub struct TypeId(u64));
/// # let id = LocalId::new(42);
/// # (id.as_inner(), 42);
/// # let id = TypeId::new(42);
/// # (id.as_inner(), 42);
/// ```
#[macro_export]
#[doc(hidden)]
macro_rules! declare_id {
    (
        $(#[$outer:meta])*
        $vis:vis struct $name:ident($ty:ty)
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $vis struct $name($ty);

        impl $name {
            #[inline]
            $vis const fn new(value: $ty) -> Self {
                Self(value)
            }

            #[inline]
            $vis const fn as_inner(self) -> $ty {
                self.0
            }

            #[inline]
            $vis const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> usize {
                id.as_usize()
            }
        }
    };
}
