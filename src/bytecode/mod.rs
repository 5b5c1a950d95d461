pub mod disasm;
pub mod image;
pub mod op;

pub use op::Op;
