//! Compiled code objects and native callables.
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::value::Value;
use crate::vm::Vm;

/// Immutable bytecode and its literal pool, shared between the code
/// object that owns it and every activation executing it.
#[derive(Debug)]
pub struct CodeBlock {
    pub(crate) code: Box<[u32]>,
    pub(crate) literals: Box<[Value]>,
}

impl CodeBlock {
    #[inline]
    pub fn bytecode(&self) -> &[u32] {
        &self.code
    }

    #[inline]
    pub fn literals(&self) -> &[Value] {
        &self.literals
    }
}

/// A compiled procedure prototype.
///
/// Carries the environment created at compile time, with the
/// parameters pre-allocated as slots `0..argc`. A fresh duplicate of
/// that template is created whenever the procedure is called.
///
/// The template's lexical parent may only be known at run time; in
/// that case a `fix_lexical` instruction at the creation site patches
/// it before the procedure value escapes.
#[derive(Debug)]
pub struct Procedure {
    pub(crate) block: Rc<CodeBlock>,
    pub(crate) env: Handle<Env>,
    /// Number of declared parameters, rest parameter included.
    pub(crate) argc: usize,
    /// Number of parameters that must be supplied by the caller.
    /// Equal to `argc` when there is no rest parameter.
    pub(crate) fixed_argc: usize,
}

impl Procedure {
    #[inline]
    pub fn bytecode(&self) -> &[u32] {
        self.block.bytecode()
    }

    pub fn has_rest_arg(&self) -> bool {
        self.fixed_argc != self.argc
    }

    pub fn check_arity(&self, argc: usize) -> Result<()> {
        if !self.has_rest_arg() {
            if argc != self.argc {
                return Err(Error::WrongArgNumber(format!(
                    "expecting {} arguments, but got {argc}",
                    self.argc
                )));
            }
        } else if argc < self.fixed_argc {
            return Err(Error::WrongArgNumber(format!(
                "expecting at least {} arguments, but got {argc}",
                self.fixed_argc
            )));
        }
        Ok(())
    }
}

/// The result of compiling a top-level expression.
///
/// Unlike a procedure, a form is evaluated directly in the environment
/// it was compiled against; definitions it makes are visible there.
#[derive(Debug, Clone)]
pub struct Form {
    pub(crate) block: Rc<CodeBlock>,
    pub(crate) env: Handle<Env>,
}

impl Form {
    #[inline]
    pub fn bytecode(&self) -> &[u32] {
        self.block.bytecode()
    }

    pub fn env(&self) -> Handle<Env> {
        self.env.clone()
    }
}

pub type PrimitiveFn = Rc<dyn Fn(&mut Vm, &[Value]) -> Result<Value>>;

/// A native callable with a `(min, max)` arity, where `-1` means the
/// bound is open. The VM handle is passed as an implicit first
/// argument so primitives like `apply` and `map` can re-enter the
/// machine.
pub struct Primitive {
    name: SmolStr,
    arity: (isize, isize),
    pub(crate) func: PrimitiveFn,
}

impl Primitive {
    pub fn new<F>(name: impl Into<SmolStr>, arity: (isize, isize), func: F) -> Self
    where
        F: Fn(&mut Vm, &[Value]) -> Result<Value> + 'static,
    {
        Self {
            name: name.into(),
            arity,
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn check_arity(&self, argc: usize) -> Result<()> {
        let (min, max) = self.arity;
        if min >= 0 && (argc as isize) < min {
            return Err(Error::WrongArgNumber(format!(
                "{} expects at least {min} arguments, but got {argc}",
                self.name
            )));
        }
        if max >= 0 && (argc as isize) > max {
            return Err(Error::WrongArgNumber(format!(
                "{} expects at most {max} arguments, but got {argc}",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_primitive_arity() {
        let prim = Primitive::new("-", (1, -1), |_, _| Ok(Value::Nil));
        assert!(prim.check_arity(0).is_err());
        assert!(prim.check_arity(1).is_ok());
        assert!(prim.check_arity(100).is_ok());

        let prim = Primitive::new("not", (1, 1), |_, _| Ok(Value::Nil));
        assert!(prim.check_arity(2).is_err());
    }
}
