//! Virtual machine.
use std::mem;
use std::rc::Rc;

use log::trace;

use crate::compiler;
use crate::core;
use crate::env::{self, Env};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::opcode::Opcode;
use crate::parser;
use crate::proc::{CodeBlock, Form, Procedure};
use crate::symbol::Symbol;
use crate::value::Value;

/// An activation record.
///
/// Frames are heap-allocated and linked through `prev`, so capturing a
/// continuation only copies the operand stack and shares the chain
/// below it. The operand stack is frame-local: a return delivers the
/// top of the callee's stack onto the caller's stack.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    block: Rc<CodeBlock>,
    env: Handle<Env>,
    ip: usize,
    stack: Vec<Value>,
    prev: Option<Handle<Context>>,
}

impl Context {
    fn for_form(form: &Form) -> Context {
        Context {
            block: form.block.clone(),
            // forms run directly in their compile environment
            env: form.env(),
            ip: 0,
            stack: Vec::new(),
            prev: None,
        }
    }
}

/// A snapshot of an execution context, callable with one argument.
///
/// The snapshot is cloned again every time it is invoked, so a
/// continuation may be resumed any number of times.
#[derive(Debug)]
pub struct Continuation {
    ctx: Context,
}

/// The virtual machine: owns the top-level environment and drives the
/// dispatch loop. Single-threaded; there is exactly one active context
/// at a time.
pub struct Vm {
    env: Handle<Env>,
}

impl Vm {
    /// Create a machine with the primitive library loaded into the
    /// root environment.
    pub fn new() -> Vm {
        let env = Handle::new(Env::new());
        core::load_primitives(&env);
        Vm { env }
    }

    /// The top-level environment.
    pub fn env(&self) -> Handle<Env> {
        self.env.clone()
    }

    /// Compile an expression against the top-level environment.
    pub fn compile(&self, expr: &Value) -> Result<Form> {
        compiler::compile(self.env.clone(), expr)
    }

    /// Parse and compile a single expression.
    pub fn compile_str(&self, text: &str) -> Result<Form> {
        let expr = parser::parse(text)?;
        self.compile(&expr)
    }

    /// Evaluate a compiled form in the top-level environment.
    pub fn eval(&mut self, form: &Form) -> Result<Value> {
        self.execute(Context::for_form(form))
    }

    /// Parse, compile and evaluate every expression in `text`,
    /// returning the last value.
    pub fn eval_str(&mut self, text: &str) -> Result<Value> {
        let mut result = Value::Nil;
        for expr in parser::parse_all(text)? {
            let form = self.compile(&expr)?;
            result = self.eval(&form)?;
        }
        Ok(result)
    }

    /// Evaluate the Scheme prelude into the top-level environment.
    pub fn load_prelude(&mut self) -> Result<()> {
        self.eval_str(core::PRELUDE)?;
        Ok(())
    }

    /// Insert a binding into the top-level environment.
    pub fn define(&mut self, name: &str, value: Value) {
        self.env.borrow_mut().insert(Symbol::intern(name), value);
    }

    /// Read a top-level binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        let env = self.env.borrow();
        env.find(Symbol::intern(name)).map(|idx| env.read(idx))
    }

    /// Call a Scheme value from the host. Re-entrant: primitives like
    /// `apply` and `map` use this to call back into the machine.
    pub fn apply(&mut self, callable: &Value, args: &[Value]) -> Result<Value> {
        match callable {
            Value::Primitive(prim) => {
                prim.check_arity(args.len())?;
                let func = prim.func.clone();
                func(self, args)
            }
            Value::Procedure(proc) => {
                proc.check_arity(args.len())?;
                let ctx = Context {
                    block: proc.block.clone(),
                    env: activation_env(proc, args.to_vec()),
                    ip: 0,
                    stack: Vec::new(),
                    prev: None,
                };
                self.execute(ctx)
            }
            Value::Continuation(cont) => {
                check_continuation_arity(args.len())?;
                let mut ctx = cont.ctx.clone();
                ctx.stack.push(args[0].clone());
                self.execute(ctx)
            }
            other => Err(Error::WrongArgType(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    /// The dispatch loop.
    ///
    /// Runs until the bottom context of the chain finishes. The
    /// instruction pointer is advanced by the instruction length at
    /// fetch time; control-flow actions overwrite it.
    fn execute(&mut self, ctx: Context) -> Result<Value> {
        let mut ctx = ctx;
        loop {
            if ctx.ip >= ctx.block.code.len() {
                // Falling off the end of a code block is an implicit
                // return: forms and dynamic closures end this way.
                let value = pop(&mut ctx)?;
                match ctx.prev.take() {
                    Some(prev) => {
                        ctx = prev.take_or_clone();
                        ctx.stack.push(value);
                        continue;
                    }
                    None => return Ok(value),
                }
            }

            let base = ctx.ip;
            let op = Opcode::decode(ctx.block.code[base])?;
            ctx.ip = base + op.length();
            trace!("{base:04} {op:?}");

            match op {
                Opcode::Ret => {
                    let value = pop(&mut ctx)?;
                    match ctx.prev.take() {
                        Some(prev) => {
                            ctx = prev.take_or_clone();
                            ctx.stack.push(value);
                        }
                        None => return Ok(value),
                    }
                }
                Opcode::Call | Opcode::TailCall => {
                    let argc = operand(&ctx, base, 1);
                    let callee = pop(&mut ctx)?;
                    let args = split_args(&mut ctx, argc)?;
                    self.call_value(&mut ctx, callee, args, op == Opcode::TailCall)?;
                }
                Opcode::CallCc => {
                    let callee = pop(&mut ctx)?;
                    // The clone's IP is already past the call_cc, and
                    // the callable is off its stack: resuming behaves
                    // as if call_cc returned the delivered value.
                    let cont = Continuation { ctx: ctx.clone() };
                    let args = vec![Value::Continuation(Rc::new(cont))];
                    self.call_value(&mut ctx, callee, args, false)?;
                }
                Opcode::Goto => {
                    ctx.ip = operand(&ctx, base, 1);
                }
                Opcode::GotoIfFalse => {
                    let target = operand(&ctx, base, 1);
                    if pop(&mut ctx)?.is_false() {
                        ctx.ip = target;
                    }
                }
                Opcode::GotoIfNotFalse => {
                    let target = operand(&ctx, base, 1);
                    if !pop(&mut ctx)?.is_false() {
                        ctx.ip = target;
                    }
                }
                Opcode::PushLiteral => {
                    let idx = operand(&ctx, base, 1);
                    let value = ctx.block.literals[idx].clone();
                    ctx.stack.push(value);
                }
                Opcode::PushTrue => ctx.stack.push(Value::Bool(true)),
                Opcode::PushFalse => ctx.stack.push(Value::Bool(false)),
                Opcode::Push0 => ctx.stack.push(Value::Integer(0)),
                Opcode::Push1 => ctx.stack.push(Value::Integer(1)),
                Opcode::PushNil => ctx.stack.push(Value::Nil),
                Opcode::Dup => {
                    let top = peek(&ctx)?.clone();
                    ctx.stack.push(top);
                }
                Opcode::Pop => {
                    pop(&mut ctx)?;
                }
                Opcode::PushLocal => {
                    let idx = operand(&ctx, base, 1);
                    let value = ctx.env.borrow().read(idx);
                    ctx.stack.push(value);
                }
                Opcode::SetLocal => {
                    let idx = operand(&ctx, base, 1);
                    let value = pop(&mut ctx)?;
                    ctx.env.borrow_mut().assign(idx, value);
                }
                Opcode::PushLocalDepth => {
                    let depth = operand(&ctx, base, 1);
                    let idx = operand(&ctx, base, 2);
                    let env = ancestor_env(&ctx.env, depth)?;
                    let value = env.borrow().read(idx);
                    ctx.stack.push(value);
                }
                Opcode::SetLocalDepth => {
                    let depth = operand(&ctx, base, 1);
                    let idx = operand(&ctx, base, 2);
                    let env = ancestor_env(&ctx.env, depth)?;
                    let value = pop(&mut ctx)?;
                    env.borrow_mut().assign(idx, value);
                }
                Opcode::DynamicPushLocal => {
                    let idx = operand(&ctx, base, 1);
                    let env = pop_symbol_closure_env(&mut ctx)?;
                    let value = env.borrow().read(idx);
                    ctx.stack.push(value);
                }
                Opcode::DynamicSetLocal => {
                    let idx = operand(&ctx, base, 1);
                    let env = pop_symbol_closure_env(&mut ctx)?;
                    let value = pop(&mut ctx)?;
                    env.borrow_mut().assign(idx, value);
                }
                Opcode::DynamicPushLocalDepth => {
                    let depth = operand(&ctx, base, 1);
                    let idx = operand(&ctx, base, 2);
                    let env = ancestor_env(&pop_symbol_closure_env(&mut ctx)?, depth)?;
                    let value = env.borrow().read(idx);
                    ctx.stack.push(value);
                }
                Opcode::DynamicSetLocalDepth => {
                    let depth = operand(&ctx, base, 1);
                    let idx = operand(&ctx, base, 2);
                    let env = ancestor_env(&pop_symbol_closure_env(&mut ctx)?, depth)?;
                    let value = pop(&mut ctx)?;
                    env.borrow_mut().assign(idx, value);
                }
                Opcode::FixLexical => {
                    let target = ctx.env.clone();
                    fix_lexical(peek(&ctx)?, target)?;
                }
                Opcode::FixLexicalDepth => {
                    let depth = operand(&ctx, base, 1);
                    let target = ancestor_env(&ctx.env, depth)?;
                    fix_lexical(peek(&ctx)?, target)?;
                }
                Opcode::FixLexicalPop => {
                    let target = ctx.env.clone();
                    let value = pop(&mut ctx)?;
                    fix_lexical(&value, target)?;
                }
                Opcode::DynamicEval => {
                    let handle = match pop(&mut ctx)? {
                        Value::DynamicClosure(handle) => handle,
                        other => {
                            return Err(Error::Misc(format!(
                                "dynamic_eval expects a dynamic closure, but got {}",
                                other.type_name()
                            )))
                        }
                    };
                    let (form, env) = {
                        let dc = handle.borrow();
                        (dc.form.clone(), dc.env())
                    };
                    let form = form.ok_or_else(|| {
                        Error::Misc("dynamic closure has no compiled form".to_string())
                    })?;
                    let callee_ctx = Context {
                        block: form.block.clone(),
                        env,
                        ip: 0,
                        stack: Vec::new(),
                        prev: None,
                    };
                    let caller = mem::replace(&mut ctx, callee_ctx);
                    ctx.prev = Some(Handle::new(caller));
                }
            }
        }
    }

    /// Transfer control to a callable popped by `call`, `tail_call` or
    /// `call_cc`.
    ///
    /// A tail call reuses the current frame slot: the new context's
    /// caller is the current context's caller, which keeps tail
    /// recursion constant-space. Invoking a continuation replaces the
    /// whole chain with the restored snapshot.
    fn call_value(
        &mut self,
        ctx: &mut Context,
        callee: Value,
        args: Vec<Value>,
        tail: bool,
    ) -> Result<()> {
        match callee {
            Value::Primitive(prim) => {
                prim.check_arity(args.len())?;
                let func = prim.func.clone();
                let value = func(self, &args)?;
                ctx.stack.push(value);
                Ok(())
            }
            Value::Procedure(proc) => {
                proc.check_arity(args.len())?;
                let mut callee_ctx = Context {
                    block: proc.block.clone(),
                    env: activation_env(&proc, args),
                    ip: 0,
                    stack: Vec::new(),
                    prev: None,
                };
                if tail {
                    callee_ctx.prev = ctx.prev.take();
                    *ctx = callee_ctx;
                } else {
                    let caller = mem::replace(ctx, callee_ctx);
                    ctx.prev = Some(Handle::new(caller));
                }
                Ok(())
            }
            Value::Continuation(cont) => {
                check_continuation_arity(args.len())?;
                let mut restored = cont.ctx.clone();
                restored.stack.extend(args);
                *ctx = restored;
                Ok(())
            }
            other => Err(Error::WrongArgType(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

/// Materialise an activation environment: duplicate the procedure's
/// template, bind the fixed parameters by index, and collect any
/// surplus into the rest parameter.
fn activation_env(proc: &Procedure, args: Vec<Value>) -> Handle<Env> {
    let mut env = proc.env.borrow().dup();
    for (idx, value) in args.iter().take(proc.fixed_argc).enumerate() {
        env.assign(idx, value.clone());
    }
    if proc.has_rest_arg() {
        let rest = Value::list(args[proc.fixed_argc..].iter().cloned());
        env.assign(proc.fixed_argc, rest);
    }
    Handle::new(env)
}

/// Patch the lexical scope of the procedure or closure: a procedure's
/// template gets the target as its parent; a captured fragment resolves
/// directly in the target.
fn fix_lexical(value: &Value, target: Handle<Env>) -> Result<()> {
    match value {
        Value::Procedure(proc) => {
            proc.env.borrow_mut().set_parent(Some(target));
            Ok(())
        }
        Value::DynamicClosure(dc) => {
            dc.borrow_mut().set_env(target);
            Ok(())
        }
        Value::SymbolClosure(sc) => {
            sc.borrow_mut().set_env(target);
            Ok(())
        }
        other => Err(Error::Misc(format!(
            "cannot fix the lexical scope of {}",
            other.type_name()
        ))),
    }
}

fn check_continuation_arity(argc: usize) -> Result<()> {
    if argc != 1 {
        return Err(Error::WrongArgNumber(format!(
            "a continuation expects 1 argument, but got {argc}"
        )));
    }
    Ok(())
}

#[inline]
fn operand(ctx: &Context, base: usize, n: usize) -> usize {
    ctx.block.code[base + n] as usize
}

fn pop(ctx: &mut Context) -> Result<Value> {
    ctx.stack
        .pop()
        .ok_or_else(|| Error::Misc("operand stack underflow".to_string()))
}

fn peek(ctx: &Context) -> Result<&Value> {
    ctx.stack
        .last()
        .ok_or_else(|| Error::Misc("operand stack underflow".to_string()))
}

fn split_args(ctx: &mut Context, argc: usize) -> Result<Vec<Value>> {
    if ctx.stack.len() < argc {
        return Err(Error::Misc("operand stack underflow".to_string()));
    }
    let at = ctx.stack.len() - argc;
    Ok(ctx.stack.split_off(at))
}

fn pop_symbol_closure_env(ctx: &mut Context) -> Result<Handle<Env>> {
    match pop(ctx)? {
        Value::SymbolClosure(sc) => Ok(sc.borrow().env()),
        other => Err(Error::Misc(format!(
            "dynamic local access expects a symbol closure, but got {}",
            other.type_name()
        ))),
    }
}

fn ancestor_env(env: &Handle<Env>, depth: usize) -> Result<Handle<Env>> {
    env::env_at_depth(env, depth)
        .ok_or_else(|| Error::Misc("lexical parent chain is shorter than expected".to_string()))
}
