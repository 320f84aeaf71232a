//! Bytecode builder.
use std::collections::HashMap;
use std::rc::Rc;

use crate::declare_id;
use crate::env::{self, Env};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::opcode::Opcode;
use crate::proc::{CodeBlock, Form, Procedure};
use crate::symbol::Symbol;
use crate::value::Value;

declare_id!(
    /// A branch target, resolved to an absolute bytecode offset when
    /// the builder generates.
    pub(crate) struct Label(u32)
);

/// Whether a local access reads or writes the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalAction {
    Push,
    Set,
}

/// Collects instructions, labels and literals for one form or
/// procedure while the compiler walks an expression.
///
/// Instructions are emitted with symbolic operands: labels for jumps,
/// values for literal pushes, names for local loads and stores. The
/// builder tracks a running instruction pointer so labels record
/// absolute target offsets; `generate` resolves them and emits the
/// final word stream.
pub(crate) struct Builder {
    /// The lexical environment the code is compiled against.
    env: Handle<Env>,
    stream: Vec<Entry>,
    /// Running instruction pointer, in words.
    ip: usize,
    labels: HashMap<Label, usize>,
    /// Declared parameter names, rest parameter last.
    args: Vec<Symbol>,
    rest_arg: bool,
}

enum Entry {
    /// An instruction with resolved operands.
    Op(Opcode, Vec<u32>),
    /// A `push_literal` waiting for pool placement.
    Literal(Value),
    /// A branch waiting for label resolution.
    Jump(Opcode, Label),
    /// Pseudo-instruction: generate the nested procedure and push it
    /// as a literal.
    Proc(Builder),
}

impl Builder {
    pub fn new(env: Handle<Env>) -> Self {
        Self {
            env,
            stream: Vec::new(),
            ip: 0,
            labels: HashMap::new(),
            args: Vec::new(),
            rest_arg: false,
        }
    }

    pub fn env(&self) -> Handle<Env> {
        self.env.clone()
    }

    /// Emit an instruction with no operands.
    pub fn emit(&mut self, op: Opcode) {
        debug_assert_eq!(op.length(), 1);
        self.push_entry(Entry::Op(op, Vec::new()), 1);
    }

    pub fn emit1(&mut self, op: Opcode, a: u32) {
        debug_assert_eq!(op.length(), 2);
        self.push_entry(Entry::Op(op, vec![a]), 2);
    }

    pub fn emit2(&mut self, op: Opcode, a: u32, b: u32) {
        debug_assert_eq!(op.length(), 3);
        self.push_entry(Entry::Op(op, vec![a, b]), 3);
    }

    /// Emit a literal push.
    ///
    /// The common literals true, false, 0, 1 and the empty list fold
    /// to dedicated single-word opcodes without a pool slot.
    pub fn emit_literal(&mut self, value: Value) {
        let folded = match value {
            Value::Bool(true) => Some(Opcode::PushTrue),
            Value::Bool(false) => Some(Opcode::PushFalse),
            Value::Integer(0) => Some(Opcode::Push0),
            Value::Integer(1) => Some(Opcode::Push1),
            Value::Nil => Some(Opcode::PushNil),
            _ => None,
        };
        match folded {
            Some(op) => self.emit(op),
            None => self.push_entry(Entry::Literal(value), 2),
        }
    }

    pub fn emit_jump(&mut self, op: Opcode, label: Label) {
        debug_assert!(matches!(
            op,
            Opcode::Goto | Opcode::GotoIfFalse | Opcode::GotoIfNotFalse
        ));
        self.push_entry(Entry::Jump(op, label), 2);
    }

    /// Define a label at the current instruction pointer.
    pub fn def_label(&mut self, label: Label) -> Result<()> {
        if self.labels.insert(label, self.ip).is_some() {
            return Err(Error::Compile(format!(
                "duplicated label {}",
                label.as_inner()
            )));
        }
        Ok(())
    }

    /// Define a local variable in the builder's environment.
    pub fn def_local(&mut self, name: Symbol) -> usize {
        self.env.borrow_mut().alloc(name)
    }

    /// Emit an instruction to push or set a local variable, searched
    /// in the current environment and its parents.
    ///
    /// When `dyn_env` is given, resolution happens against that
    /// environment instead and the dynamic instruction family is
    /// emitted; the run-time counterpart of the environment is taken
    /// from the symbol closure on the operand stack.
    pub fn emit_local(
        &mut self,
        action: LocalAction,
        name: Symbol,
        dyn_env: Option<&Handle<Env>>,
    ) -> Result<()> {
        let (dynamic, search_env) = match dyn_env {
            Some(env) => (true, env.clone()),
            None => (false, self.env.clone()),
        };
        let (depth, idx) = env::find_local_depth(&search_env, name)
            .ok_or_else(|| Error::unbound(name.name()))?;

        use LocalAction::*;
        use Opcode::*;
        let op = match (action, dynamic, depth == 0) {
            (Push, false, true) => PushLocal,
            (Push, false, false) => PushLocalDepth,
            (Set, false, true) => SetLocal,
            (Set, false, false) => SetLocalDepth,
            (Push, true, true) => DynamicPushLocal,
            (Push, true, false) => DynamicPushLocalDepth,
            (Set, true, true) => DynamicSetLocal,
            (Set, true, false) => DynamicSetLocalDepth,
        };
        if depth == 0 {
            self.emit1(op, idx as u32);
        } else {
            self.emit2(op, depth as u32, idx as u32);
        }
        Ok(())
    }

    /// Create a builder for a nested procedure whose environment has
    /// the given parent (this builder's environment by default) and
    /// whose parameters are pre-allocated.
    ///
    /// Once the body has been compiled into it, hand the child back to
    /// [`Builder::emit_proc`].
    pub fn new_proc_builder(
        &self,
        args: Vec<Symbol>,
        rest_arg: bool,
        parent_env: Option<Handle<Env>>,
    ) -> Builder {
        let parent = parent_env.unwrap_or_else(|| self.env.clone());
        let env = Handle::new(Env::with_parent(parent));
        for &arg in &args {
            env.borrow_mut().alloc(arg);
        }

        let mut builder = Builder::new(env);
        builder.args = args;
        builder.rest_arg = rest_arg;
        builder
    }

    /// Record the nested procedure's emission site. At generate time
    /// the child is generated first, its procedure becomes a literal,
    /// and the site becomes `push_literal <idx>`; the compiler follows
    /// up with the `fix_lexical` that binds the run-time parent.
    pub fn emit_proc(&mut self, child: Builder) {
        self.push_entry(Entry::Proc(child), 2);
    }

    pub fn generate_form(self) -> Result<Form> {
        let env = self.env.clone();
        let block = self.generate_block()?;
        Ok(Form {
            block: Rc::new(block),
            env,
        })
    }

    pub fn generate_procedure(self) -> Result<Procedure> {
        let env = self.env.clone();
        let argc = self.args.len();
        let fixed_argc = if self.rest_arg { argc - 1 } else { argc };
        let block = self.generate_block()?;
        Ok(Procedure {
            block: Rc::new(block),
            env,
            argc,
            fixed_argc,
        })
    }

    fn push_entry(&mut self, entry: Entry, words: usize) {
        self.stream.push(entry);
        self.ip += words;
    }

    fn generate_block(self) -> Result<CodeBlock> {
        let Self { stream, labels, .. } = self;

        let mut code: Vec<u32> = Vec::new();
        let mut literals: Vec<Value> = Vec::new();

        for entry in stream {
            match entry {
                Entry::Op(op, operands) => {
                    code.push(op.into());
                    code.extend(operands);
                }
                Entry::Literal(value) => {
                    code.push(Opcode::PushLiteral.into());
                    code.push(literal_index(&mut literals, value));
                }
                Entry::Jump(op, label) => {
                    let target = labels.get(&label).copied().ok_or_else(|| {
                        Error::Compile(format!("undefined label {}", label.as_inner()))
                    })?;
                    code.push(op.into());
                    code.push(target as u32);
                }
                Entry::Proc(builder) => {
                    let proc = builder.generate_procedure()?;
                    code.push(Opcode::PushLiteral.into());
                    code.push(literal_index(&mut literals, Value::Procedure(Rc::new(proc))));
                }
            }
        }

        Ok(CodeBlock {
            code: code.into_boxed_slice(),
            literals: literals.into_boxed_slice(),
        })
    }
}

/// Index of the literal in the pool, appending when absent.
///
/// Deduplication is by type-and-value equality, so `1` and `1.0` keep
/// separate slots; closures compare by identity and never coalesce.
fn literal_index(literals: &mut Vec<Value>, value: Value) -> u32 {
    match literals.iter().position(|lit| lit == &value) {
        Some(idx) => idx as u32,
        None => {
            literals.push(value);
            (literals.len() - 1) as u32
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_builder() -> Builder {
        Builder::new(Handle::new(Env::new()))
    }

    #[test]
    fn test_peephole_literals() {
        let mut bdr = new_builder();
        bdr.emit_literal(Value::Bool(true));
        bdr.emit_literal(Value::Integer(0));
        bdr.emit_literal(Value::Integer(1));
        bdr.emit_literal(Value::Nil);
        bdr.emit_literal(Value::Integer(42));

        let form = bdr.generate_form().unwrap();
        let expected: Vec<u32> = vec![
            Opcode::PushTrue.into(),
            Opcode::Push0.into(),
            Opcode::Push1.into(),
            Opcode::PushNil.into(),
            Opcode::PushLiteral.into(),
            0,
        ];
        assert_eq!(form.bytecode(), expected.as_slice());
        assert_eq!(form.block.literals(), &[Value::Integer(42)]);
    }

    #[test]
    fn test_literal_dedup_is_type_strict() {
        let mut bdr = new_builder();
        bdr.emit_literal(Value::Integer(42));
        bdr.emit_literal(Value::Real(42.0));
        bdr.emit_literal(Value::Integer(42));

        let form = bdr.generate_form().unwrap();
        assert_eq!(
            form.block.literals(),
            &[Value::Integer(42), Value::Real(42.0)]
        );
    }

    #[test]
    fn test_label_resolution() {
        let mut bdr = new_builder();
        let label = Label::new(0);
        bdr.emit_jump(Opcode::Goto, label);
        bdr.emit(Opcode::PushTrue);
        bdr.def_label(label).unwrap();
        bdr.emit(Opcode::PushFalse);

        let form = bdr.generate_form().unwrap();
        let expected: Vec<u32> = vec![
            Opcode::Goto.into(),
            3,
            Opcode::PushTrue.into(),
            Opcode::PushFalse.into(),
        ];
        assert_eq!(form.bytecode(), expected.as_slice());
    }

    #[test]
    fn test_duplicate_label_is_rejected() {
        let mut bdr = new_builder();
        let label = Label::new(7);
        bdr.def_label(label).unwrap();
        assert!(bdr.def_label(label).is_err());
    }

    #[test]
    fn test_undefined_label_is_rejected() {
        let mut bdr = new_builder();
        bdr.emit_jump(Opcode::Goto, Label::new(9));
        assert!(bdr.generate_form().is_err());
    }

    #[test]
    fn test_unbound_local() {
        let mut bdr = new_builder();
        let err = bdr
            .emit_local(LocalAction::Push, Symbol::intern("ghost"), None)
            .unwrap_err();
        assert!(matches!(err, Error::UnboundVariable { .. }));
    }
}
