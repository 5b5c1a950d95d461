use crate::bytecode::op::Op;
use crate::lang::dictionary::Dictionary;
use crate::lang::word::{Builtin, Cell, WordId, WordKind};
use crate::runtime::runtime_error::{
    ErrorKind, RuntimeError, division_by_zero, stack_underflow,
};
use std::io::Write;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// Deepest allowed return stack. `None` grows without bound.
    pub max_call_depth: Option<usize>,
    /// Instruction budget for a whole run. `None` runs until `exit`.
    pub max_steps: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Execute,
    Compile,
}

impl Mode {
    pub fn prompt(self) -> &'static str {
        match self {
            Mode::Execute => "\n> ",
            Mode::Compile => "...> ",
        }
    }
}

/// Saved caller position on the return stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub word: WordId,
    pub pc: usize,
}

/// Work the VM hands back to the driver because it needs the token source or
/// the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Yield {
    Prompt,
    Read,
    Define,
    EndDefine,
}

/// Outcome of calling a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A native ran to completion, or the word had nothing to run.
    Done,
    /// A return frame was pushed; the callee's body runs on the next steps.
    Entered,
    Yield(Yield),
}

pub struct Vm {
    dictionary: Dictionary,
    stack: Vec<Cell>,
    returns: Vec<Frame>,
    current: WordId,
    pc: usize,
    mode: Mode,
    running: bool,
    config: VmConfig,
    /// Instructions executed so far, checked against `config.max_steps`.
    steps: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_dictionary(Dictionary::bootstrap(), config)
    }

    /// Starts execution at `Dictionary::idle()` of the given dictionary.
    pub fn with_dictionary(dictionary: Dictionary, config: VmConfig) -> Self {
        Self {
            dictionary,
            stack: Vec::new(),
            returns: Vec::new(),
            current: Dictionary::idle(),
            pc: 0,
            mode: Mode::Execute,
            running: true,
            config,
            steps: 0,
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    pub fn stack(&self) -> &[Cell] {
        &self.stack
    }

    pub fn push(&mut self, value: Cell) {
        self.stack.push(value);
    }

    pub fn return_depth(&self) -> usize {
        self.returns.len()
    }

    pub fn current(&self) -> WordId {
        self.current
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn halt(&mut self) {
        self.running = false;
    }

    /// Drops every return frame and resumes at the top of the idle loop.
    pub fn unwind(&mut self) {
        self.returns.clear();
        self.current = Dictionary::idle();
        self.pc = 0;
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::new(ErrorKind::StepLimit(max)));
            }
        }

        Ok(())
    }

    /// Fetches, decodes and executes one instruction.
    ///
    /// `PROMPT`, `READ`, and calls into `:` or `;` are returned to the caller
    /// as a [`Yield`] instead of being executed here.
    pub fn step<W: Write>(&mut self, out: &mut W) -> Result<Option<Yield>, RuntimeError> {
        self.step_inner(out).map_err(|e| self.annotate(e))
    }

    fn step_inner<W: Write>(&mut self, out: &mut W) -> Result<Option<Yield>, RuntimeError> {
        self.check_limits()?;

        let ip = self.pc;
        let op = self.fetch()?;
        self.pc += 1;

        trace!(word = %self.current, ip, ?op, "step");

        match op {
            Op::Call(target) => match self.call(target, out) {
                Ok(Dispatch::Yield(y)) => return Ok(Some(y)),
                Ok(_) => {}
                Err(e) => {
                    if let ErrorKind::InvalidOpcode { .. } = e.kind {
                        return Err(RuntimeError::new(ErrorKind::InvalidOpcode {
                            word: self.current,
                            pc: ip,
                        }));
                    }
                    return Err(e);
                }
            },
            Op::Jump(offset) => {
                let len = self.current_body_len();
                let new_ip = ip as i64 + offset as i64;
                if new_ip < 0 || new_ip as usize >= len {
                    return Err(RuntimeError::new(ErrorKind::JumpOutOfBounds {
                        word: self.current,
                        ip,
                        offset,
                    }));
                }
                self.pc = new_ip as usize;
            }
            Op::Prompt => return Ok(Some(Yield::Prompt)),
            Op::PushNum(n) => self.push(n),
            Op::Read => return Ok(Some(Yield::Read)),
            Op::Return => self.ret()?,
        }

        Ok(None)
    }

    fn fetch(&self) -> Result<Op, RuntimeError> {
        self.dictionary
            .get(self.current)
            .and_then(|word| word.body().get(self.pc))
            .copied()
            .ok_or_else(|| {
                RuntimeError::new(ErrorKind::InvalidOpcode {
                    word: self.current,
                    pc: self.pc,
                })
            })
    }

    fn current_body_len(&self) -> usize {
        self.dictionary
            .get(self.current)
            .map(|word| word.body().len())
            .unwrap_or(0)
    }

    /// Calls a word: natives run synchronously, compiled words push a return
    /// frame and take over at their first instruction.
    pub fn call<W: Write>(&mut self, target: WordId, out: &mut W) -> Result<Dispatch, RuntimeError> {
        let native = match self.dictionary.get(target) {
            Some(word) => match &word.kind {
                WordKind::Native(builtin) => Some(*builtin),
                WordKind::Compiled(_) if !word.has_body() => return Ok(Dispatch::Done),
                WordKind::Compiled(_) => None,
            },
            None => {
                return Err(RuntimeError::new(ErrorKind::InvalidOpcode {
                    word: target,
                    pc: 0,
                }));
            }
        };

        match native {
            Some(builtin) => self.builtin(builtin, out),
            None => {
                self.enter(target)?;
                Ok(Dispatch::Entered)
            }
        }
    }

    fn enter(&mut self, target: WordId) -> Result<(), RuntimeError> {
        if let Some(max) = self.config.max_call_depth {
            if self.returns.len() >= max {
                return Err(RuntimeError::new(ErrorKind::ReturnStackOverflow(max)));
            }
        }

        self.returns.push(Frame {
            word: self.current,
            pc: self.pc,
        });
        self.current = target;
        self.pc = 0;
        Ok(())
    }

    fn ret(&mut self) -> Result<(), RuntimeError> {
        let frame = self
            .returns
            .pop()
            .ok_or_else(|| RuntimeError::new(ErrorKind::ReturnStackUnderflow))?;
        self.current = frame.word;
        self.pc = frame.pc;
        Ok(())
    }

    fn builtin<W: Write>(&mut self, builtin: Builtin, out: &mut W) -> Result<Dispatch, RuntimeError> {
        match builtin {
            Builtin::PrintTop => match self.stack.last() {
                Some(top) => writeln!(out, "{}", top)?,
                None => writeln!(out, "<empty>")?,
            },
            Builtin::PrintStack => {
                write!(out, "[ ")?;
                for value in &self.stack {
                    write!(out, "{} ", value)?;
                }
                writeln!(out, "]")?;
            }

            // Arithmetic
            Builtin::Add => {
                let (a, b) = self.pop_pair("+")?;
                self.push(a.wrapping_add(b));
            }
            Builtin::Sub => {
                let (a, b) = self.pop_pair("-")?;
                self.push(a.wrapping_sub(b));
            }
            Builtin::Mul => {
                let (a, b) = self.pop_pair("*")?;
                self.push(a.wrapping_mul(b));
            }
            Builtin::Div => {
                let (a, b) = self.pop_pair("/")?;
                if b == 0 {
                    return Err(division_by_zero());
                }
                self.push(a.wrapping_div(b));
            }

            // Stack operations
            Builtin::Dup => {
                let top = self
                    .stack
                    .last()
                    .copied()
                    .ok_or_else(|| stack_underflow("dup", 1, 0))?;
                self.push(top);
            }
            Builtin::Pop => {
                self.stack
                    .pop()
                    .ok_or_else(|| stack_underflow("pop", 1, 0))?;
            }
            Builtin::Clear => self.stack.clear(),
            Builtin::Swap => {
                let (a, b) = self.pop_pair("swp")?;
                self.push(b);
                self.push(a);
            }

            Builtin::Exit => self.halt(),
            Builtin::Define => return Ok(Dispatch::Yield(Yield::Define)),
            Builtin::EndDefine => return Ok(Dispatch::Yield(Yield::EndDefine)),
        }

        out.flush()?;
        Ok(Dispatch::Done)
    }

    /// Pops `( a b -- )`, leaving the stack untouched if it holds fewer than two.
    fn pop_pair(&mut self, word: &'static str) -> Result<(Cell, Cell), RuntimeError> {
        let found = self.stack.len();
        if let [.., a, b] = self.stack[..] {
            self.stack.truncate(found - 2);
            return Ok((a, b));
        }
        Err(stack_underflow(word, 2, found))
    }

    /// Adds the names of the compiled words currently executing, innermost first.
    fn annotate(&self, mut e: RuntimeError) -> RuntimeError {
        let frames = std::iter::once(self.current).chain(self.returns.iter().rev().map(|f| f.word));
        for word in frames {
            if word != Dictionary::idle() {
                e = e.with_context(self.dictionary.name_of(word));
            }
        }
        e
    }
}
