use crate::lang::word::{Cell, WordId};
use serde::{Deserialize, Serialize};

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Call a word. Compiled words push a return frame, natives run in place.
    Call(WordId),

    /// Unconditional relative jump, from the jump's own index.
    /// Jump(1) falls through, Jump(0) spins on itself, Jump(-1) steps back one.
    Jump(i32),

    /// Show a prompt if no tokens are buffered, then resolve tokens until the
    /// line is used up.
    Prompt,

    /// Push a literal onto the data stack.
    PushNum(Cell),

    /// Resolve a single token.
    Read,

    /// Pop a return frame and resume the caller.
    Return,
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Call(_) => "CALL",
            Op::Jump(_) => "JUMP",
            Op::Prompt => "PROMPT",
            Op::PushNum(_) => "PUSHNUM",
            Op::Read => "READ",
            Op::Return => "RETURN",
        }
    }
}
