use crate::lang::word::WordId;
use thiserror::Error;

/// Everything that can go wrong while resolving tokens or running bytecode.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("`{0}` not a function or a number")]
    UnknownWordOrNumber(String),

    #[error("function already defined: {0}")]
    Redefinition(String),

    #[error("stack underflow: `{word}` needs {needed} value(s), found {found}")]
    DataStackUnderflow {
        word: &'static str,
        needed: usize,
        found: usize,
    },

    #[error("return stack underflow")]
    ReturnStackUnderflow,

    #[error("return stack overflow (limit {0})")]
    ReturnStackOverflow(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid opcode in word {word} at instruction {pc}")]
    InvalidOpcode { word: WordId, pc: usize },

    #[error("jump out of bounds in word {word}: ip={ip}, offset={offset}")]
    JumpOutOfBounds { word: WordId, ip: usize, offset: i32 },

    #[error("execution step limit exceeded ({0})")]
    StepLimit(usize),

    #[error("bad dictionary image: {0}")]
    BadImage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error: {}", self.kind)?;

        // Innermost word first, all on the same line.
        if let Some((innermost, callers)) = self.call_stack.split_first() {
            write!(f, " (in {}", innermost)?;
            for caller in callers {
                write!(f, ", called from {}", caller)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        RuntimeError::new(ErrorKind::Io(e))
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind) -> Self {
        RuntimeError {
            kind,
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }

    /// Fatal errors leave no state to resume from and end the REPL.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ReturnStackUnderflow | ErrorKind::StepLimit(_) | ErrorKind::Io(_)
        )
    }

    /// Errors that corrupt the current control flow; the VM unwinds to its
    /// idle loop after reporting them.
    pub fn needs_unwind(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::InvalidOpcode { .. }
                | ErrorKind::JumpOutOfBounds { .. }
                | ErrorKind::ReturnStackOverflow(_)
        )
    }

    /// Errors after which the rest of the input line is thrown away.
    pub fn discards_line(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UnknownWordOrNumber(_) | ErrorKind::Redefinition(_)
        )
    }
}

pub fn stack_underflow(word: &'static str, needed: usize, found: usize) -> RuntimeError {
    RuntimeError::new(ErrorKind::DataStackUnderflow {
        word,
        needed,
        found,
    })
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new(ErrorKind::DivisionByZero)
}

pub fn undefined_word(token: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::UnknownWordOrNumber(token.to_string()))
}
