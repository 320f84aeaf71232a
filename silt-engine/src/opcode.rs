use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};

/// A bytecode instruction.
///
/// Instructions are encoded as 32-bit words: the opcode followed by its
/// operand words. Each opcode declares its total word length and
/// whether its action writes the instruction pointer itself (in which
/// case the dispatch loop must not advance it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Opcode {
    /// Pop the return value, restore the caller's context.
    Ret,
    /// Call the callable on top of the stack with `argc` arguments
    /// below it.
    Call,
    /// Like `call`, but replace the current frame instead of pushing
    /// on top of it.
    TailCall,
    /// Pop a callable, capture the current continuation, and pass it
    /// as the single argument.
    CallCc,
    Goto,
    /// Branch when the popped value is the boolean false value.
    /// `0`, `""` and the empty list are all true.
    GotoIfFalse,
    GotoIfNotFalse,
    PushLiteral,
    PushTrue,
    PushFalse,
    Push0,
    Push1,
    PushNil,
    Dup,
    Pop,
    PushLocal,
    SetLocal,
    /// Walk `depth` environment parents, then index.
    PushLocalDepth,
    SetLocalDepth,
    /// Pop a symbol closure and resolve the slot against its captured
    /// use-site environment.
    DynamicPushLocal,
    DynamicSetLocal,
    DynamicPushLocalDepth,
    DynamicSetLocalDepth,
    /// Bind the lexical parent of the procedure or closure on top of
    /// the stack to the current environment.
    FixLexical,
    /// Like `fix_lexical`, binding to the ancestor `depth` parents up.
    FixLexicalDepth,
    /// Like `fix_lexical`, then pop the fixed value.
    FixLexicalPop,
    /// Pop a dynamic closure and evaluate its compiled form in the
    /// closure's captured environment.
    DynamicEval,
}

impl Opcode {
    /// Total instruction length in words, opcode included.
    pub const fn length(self) -> usize {
        use Opcode::*;

        match self {
            Ret | CallCc | PushTrue | PushFalse | Push0 | Push1 | PushNil | Dup | Pop
            | FixLexical | FixLexicalPop | DynamicEval => 1,
            Call | TailCall | Goto | GotoIfFalse | GotoIfNotFalse | PushLiteral | PushLocal
            | SetLocal | DynamicPushLocal | DynamicSetLocal | FixLexicalDepth => 2,
            PushLocalDepth | SetLocalDepth | DynamicPushLocalDepth | DynamicSetLocalDepth => 3,
        }
    }

    /// Does the action write the instruction pointer itself?
    pub const fn is_control_flow(self) -> bool {
        use Opcode::*;

        matches!(
            self,
            Ret | Call | TailCall | CallCc | Goto | GotoIfFalse | GotoIfNotFalse | DynamicEval
        )
    }

    /// Decode an opcode word.
    pub fn decode(word: u32) -> Result<Opcode> {
        Opcode::try_from(word).map_err(|_| Error::Misc(format!("unknown opcode {word}")))
    }
}
