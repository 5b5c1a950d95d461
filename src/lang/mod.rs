//! # Weakforth words and dictionary
//!
//! Everything the interpreter knows by name lives in one flat, append-only
//! dictionary. A word is either a native builtin or a compiled body of
//! [`Op`](crate::bytecode::Op)s.
//!
//! ## Documentation conventions
//!
//! - Stack effects are written as `( before -- after )`, top of stack last.
//! - Word ids are shown as `#n`, their index in the dictionary.

pub mod dictionary;
pub mod word;
