use crate::bytecode::op::Op;
use serde::{Deserialize, Serialize};

/// A single data stack cell.
pub type Cell = i64;

/// Stable index of a word in the dictionary.
///
/// Ids are handed out in insertion order and never reused, so they are safe
/// to embed as `CALL` operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordId(pub usize);

impl WordId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for WordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Native operations backing the primitive vocabulary.
///
/// Builtins run synchronously when a `CALL` targets a word without a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    // ───────────────────────────── Output ─────────────────────────────
    /// Print the top value, or `<empty>`.
    ///
    /// Stack effect: `( -- )`
    PrintTop,

    /// Print the whole stack, bottom to top: `[ 1 2 3 ]`.
    ///
    /// Stack effect: `( -- )`
    PrintStack,

    // ──────────────────────────── Arithmetic ──────────────────────────
    /// Stack effect: `( a b -- a+b )`
    Add,

    /// Stack effect: `( a b -- a-b )`
    Sub,

    /// Stack effect: `( a b -- a*b )`
    Mul,

    /// Integer division truncating toward zero.
    ///
    /// Stack effect: `( a b -- a/b )`
    Div,

    // ─────────────────────────── Stack operations ──────────────────────
    /// Stack effect: `( x -- x x )`
    Dup,

    /// Stack effect: `( x -- )`
    Pop,

    /// Stack effect: `( ... -- )`
    Clear,

    /// Stack effect: `( a b -- b a )`
    Swap,

    // ───────────────────────────── Control ─────────────────────────────
    /// Clear the VM running flag.
    Exit,

    /// `:` enter compile mode and start a new word.
    Define,

    /// `;` seal the word under construction and return to execute mode.
    EndDefine,
}

impl Builtin {
    /// Every builtin with its surface name and immediacy, in registration order.
    pub const VOCABULARY: [(&'static str, Builtin, bool); 13] = [
        (":", Builtin::Define, false),
        (";", Builtin::EndDefine, true),
        (".", Builtin::PrintTop, false),
        ("..", Builtin::PrintStack, false),
        ("+", Builtin::Add, false),
        ("-", Builtin::Sub, false),
        ("*", Builtin::Mul, false),
        ("/", Builtin::Div, false),
        ("dup", Builtin::Dup, false),
        ("pop", Builtin::Pop, false),
        ("clr", Builtin::Clear, false),
        ("swp", Builtin::Swap, false),
        ("exit", Builtin::Exit, false),
    ];

    pub fn name(self) -> &'static str {
        Self::VOCABULARY
            .iter()
            .find(|(_, builtin, _)| *builtin == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("?")
    }
}

/// What happens when a word is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WordKind {
    Native(Builtin),
    Compiled(Vec<Op>),
}

/// A named dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub name: String,
    pub kind: WordKind,
    /// Immediate words run even while compiling.
    pub immediate: bool,
}

impl Word {
    pub fn compiled(name: impl Into<String>) -> Self {
        Word {
            name: name.into(),
            kind: WordKind::Compiled(Vec::new()),
            immediate: false,
        }
    }

    pub fn native(name: impl Into<String>, builtin: Builtin, immediate: bool) -> Self {
        Word {
            name: name.into(),
            kind: WordKind::Native(builtin),
            immediate,
        }
    }

    /// Instructions of a compiled word, empty for natives.
    pub fn body(&self) -> &[Op] {
        match &self.kind {
            WordKind::Compiled(ops) => ops,
            WordKind::Native(_) => &[],
        }
    }

    /// True when calling this word transfers control through the return stack.
    pub fn has_body(&self) -> bool {
        !self.body().is_empty()
    }
}
