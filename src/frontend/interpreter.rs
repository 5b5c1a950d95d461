use crate::bytecode::disasm::disassemble_word;
use crate::bytecode::op::Op;
use crate::frontend::input::{LineInput, Token};
use crate::lang::word::{Cell, WordId};
use crate::runtime::runtime_error::{ErrorKind, RuntimeError, undefined_word};
use crate::runtime::vm::{Dispatch, Mode, Vm, Yield};
use std::io::{BufRead, Write};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Print `> ` / `...> ` before reading a new line.
    pub prompts: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig { prompts: true }
    }
}

/// Drives the VM from a token stream.
///
/// Owns the word under construction while in compile mode and services the
/// [`Yield`]s the VM hands back.
pub struct Interpreter<R, W> {
    vm: Vm,
    input: LineInput<R>,
    out: W,
    compiling: Option<WordId>,
    config: ReplConfig,
}

impl<R: BufRead, W: Write> Interpreter<R, W> {
    pub fn with_config(vm: Vm, reader: R, out: W, config: ReplConfig) -> Self {
        Interpreter {
            vm,
            input: LineInput::new(reader),
            out,
            compiling: None,
            config,
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// The word currently being compiled, if any.
    pub fn compiling(&self) -> Option<WordId> {
        self.compiling
    }

    pub fn into_parts(self) -> (Vm, W) {
        (self.vm, self.out)
    }

    /// Runs the fetch loop until `exit` or end of input.
    ///
    /// Only fatal errors are returned; everything else is reported on the
    /// output and execution carries on.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        debug!("starting interpreter");

        while self.vm.is_running() {
            let result = match self.vm.step(&mut self.out) {
                Ok(None) => Ok(()),
                Ok(Some(y)) => self.service(y),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                if e.is_fatal() {
                    error!(
                        line = self.input.line(),
                        word = %self.vm.current(),
                        pc = self.vm.pc(),
                        "{}",
                        e.kind
                    );
                    return Err(e);
                }
                self.report(e)?;
            }
        }

        debug!("interpreter stopped");
        Ok(())
    }

    fn service(&mut self, y: Yield) -> Result<(), RuntimeError> {
        match y {
            Yield::Prompt => self.prompt(),
            Yield::Read => self.read().map(|_| ()),
            Yield::Define => self.define(),
            Yield::EndDefine => {
                self.end_define();
                Ok(())
            }
        }
    }

    fn show_prompt(&mut self) -> Result<(), RuntimeError> {
        if self.config.prompts {
            write!(self.out, "{}", self.vm.mode().prompt())?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// `PROMPT`: resolve tokens until the line runs out or control moves into
    /// a compiled word.
    fn prompt(&mut self) -> Result<(), RuntimeError> {
        if self.input.is_empty() {
            self.show_prompt()?;
        }

        while self.read()? {}
        Ok(())
    }

    /// `READ`: resolve one token. Returns whether the caller should keep
    /// reading from the current line.
    fn read(&mut self) -> Result<bool, RuntimeError> {
        match self.input.next_token()? {
            Token::Word(token) => match self.resolve(&token) {
                Ok(more) => Ok(more && self.vm.is_running()),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    self.report(e)?;
                    Ok(self.vm.is_running())
                }
            },
            Token::EndOfLine => Ok(false),
            Token::EndOfInput => {
                debug!("end of input");
                self.vm.halt();
                Ok(false)
            }
        }
    }

    /// Resolves one token against the dictionary, then as an integer.
    ///
    /// Returns false when control was transferred into a compiled word and
    /// the VM loop has to run it before more tokens are read.
    pub fn resolve(&mut self, token: &str) -> Result<bool, RuntimeError> {
        let found = self
            .vm
            .dictionary()
            .find(token)
            .map(|(id, word)| (id, word.immediate));

        match found {
            Some((id, immediate)) if immediate || self.vm.mode() == Mode::Execute => {
                self.execute(id)
            }
            Some((id, _)) => {
                self.compile(Op::Call(id));
                Ok(true)
            }
            None => {
                let n: Cell = token.parse().map_err(|_| undefined_word(token))?;
                match self.vm.mode() {
                    Mode::Execute => self.vm.push(n),
                    Mode::Compile => self.compile(Op::PushNum(n)),
                }
                Ok(true)
            }
        }
    }

    fn execute(&mut self, id: WordId) -> Result<bool, RuntimeError> {
        match self.vm.call(id, &mut self.out)? {
            Dispatch::Done => Ok(true),
            Dispatch::Entered => Ok(false),
            Dispatch::Yield(y) => {
                self.service(y)?;
                Ok(true)
            }
        }
    }

    fn compile(&mut self, op: Op) {
        match self.compiling {
            Some(id) => {
                self.vm.dictionary_mut().append(id, op);
            }
            None => warn!(?op, "compile mode without a word under construction"),
        }
    }

    /// `:` switch to compile mode and open a new word named by the next token.
    fn define(&mut self) -> Result<(), RuntimeError> {
        self.vm.set_mode(Mode::Compile);

        let name = loop {
            match self.input.next_token()? {
                Token::Word(name) => break name,
                Token::EndOfLine => self.show_prompt()?,
                Token::EndOfInput => {
                    self.vm.set_mode(Mode::Execute);
                    self.vm.halt();
                    return Ok(());
                }
            }
        };

        if self.vm.dictionary().find(&name).is_some() {
            self.end_define();
            return Err(RuntimeError::new(ErrorKind::Redefinition(name)));
        }

        let id = self.vm.dictionary_mut().add(&name);
        debug!(%id, name = %name, "defining word");
        self.compiling = Some(id);
        Ok(())
    }

    /// `;` back to execute mode, sealing the word under construction.
    fn end_define(&mut self) {
        self.vm.set_mode(Mode::Execute);

        if let Some(id) = self.compiling.take() {
            self.vm.dictionary_mut().append(id, Op::Return);
            debug!(
                %id,
                body = %disassemble_word(self.vm.dictionary(), id),
                "word defined"
            );
        }
    }

    fn report(&mut self, e: RuntimeError) -> Result<(), RuntimeError> {
        warn!(line = self.input.line(), call_stack = ?e.call_stack, "{}", e.kind);
        writeln!(self.out, "{}", e)?;
        self.out.flush()?;

        if e.discards_line() {
            self.input.discard_line();
        }
        if e.needs_unwind() {
            self.vm.unwind();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::dictionary::{Dictionary, IDLE_WORD};
    use crate::lang::word::Builtin;
    use crate::runtime::vm::VmConfig;
    use std::io::Cursor;

    // ============================================================
    // Test Helpers
    // ============================================================

    type TestInterpreter = Interpreter<Cursor<Vec<u8>>, Vec<u8>>;

    fn interpreter(vm: Vm, source: &str, prompts: bool) -> TestInterpreter {
        Interpreter::with_config(
            vm,
            Cursor::new(source.as_bytes().to_vec()),
            Vec::new(),
            ReplConfig { prompts },
        )
    }

    fn finish(interp: TestInterpreter) -> (Vm, String) {
        let (vm, out) = interp.into_parts();
        (vm, String::from_utf8(out).expect("output is utf-8"))
    }

    /// Run source to end of input and return the VM and everything printed.
    fn run_source(source: &str) -> (Vm, String) {
        run_with_config(source, VmConfig::default())
    }

    fn run_with_config(source: &str, config: VmConfig) -> (Vm, String) {
        let mut interp = interpreter(Vm::with_config(config), source, false);
        interp.run().expect("run should succeed");
        finish(interp)
    }

    fn assert_stack(source: &str, expected: &[Cell]) {
        let (vm, out) = run_source(source);
        assert_eq!(vm.stack(), expected, "stack mismatch, output: {:?}", out);
    }

    fn assert_error(source: &str, error_contains: &str) {
        let (_, out) = run_source(source);
        assert!(
            out.contains(error_contains),
            "expected output containing '{}', got: {:?}",
            error_contains,
            out
        );
    }

    fn body_of(vm: &Vm, name: &str) -> Vec<Op> {
        let (_, word) = vm
            .dictionary()
            .find(name)
            .unwrap_or_else(|| panic!("`{}` should be defined", name));
        word.body().to_vec()
    }

    fn id_of(vm: &Vm, name: &str) -> WordId {
        vm.dictionary()
            .find(name)
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("`{}` should be defined", name))
    }

    // ============================================================
    // Execute mode
    // ============================================================

    #[test]
    fn test_arithmetic() {
        assert_stack("3 4 +\n", &[7]);
        assert_stack("10 3 -\n", &[7]);
        assert_stack("7 3 *\n", &[21]);
        assert_stack("21 7 /\n", &[3]);
        assert_stack("-7 2 /\n", &[-3]);
    }

    #[test]
    fn test_stack_words() {
        assert_stack("5 dup\n", &[5, 5]);
        assert_stack("1 2 swp\n", &[2, 1]);
        assert_stack("1 2 3 clr\n", &[]);
        assert_stack("1 2 3 pop\n", &[1, 2]);
    }

    #[test]
    fn test_tokens_across_lines() {
        assert_stack("1\n2\n\n   +  \n", &[3]);
    }

    #[test]
    fn test_print_words_do_not_mutate() {
        let (vm, out) = run_source("1 2 3 . .. . ..\n");
        assert_eq!(vm.stack(), &[1, 2, 3]);
        assert_eq!(out, "3\n[ 1 2 3 ]\n3\n[ 1 2 3 ]\n");
    }

    #[test]
    fn test_print_empty() {
        let (_, out) = run_source(". ..\n");
        assert_eq!(out, "<empty>\n[ ]\n");
    }

    #[test]
    fn test_end_of_input_stops_the_vm() {
        let (vm, _) = run_source("1 2\n");
        assert!(!vm.is_running());
        assert_eq!(vm.stack(), &[1, 2]);
    }

    #[test]
    fn test_exit_ignores_rest_of_line() {
        let (vm, _) = run_source("1 exit 2\n3\n");
        assert!(!vm.is_running());
        assert_eq!(vm.stack(), &[1]);
    }

    #[test]
    fn test_semicolon_outside_definition_is_harmless() {
        let (vm, out) = run_source(";\n1\n");
        assert_eq!(vm.stack(), &[1]);
        assert_eq!(out, "");
        assert_eq!(vm.mode(), Mode::Execute);
    }

    // ============================================================
    // Definitions
    // ============================================================

    #[test]
    fn test_definition_round_trip() {
        assert_stack(": sq dup * ;\n5 sq\n", &[25]);
    }

    #[test]
    fn test_definition_and_use_on_one_line() {
        assert_stack("3 : sq dup * ; sq 1 +\n", &[10]);
    }

    #[test]
    fn test_composite_word_called_twice_on_one_line() {
        assert_stack(": sq dup * ;\n2 sq 3 sq +\n", &[13]);
    }

    #[test]
    fn test_compiled_body_layout() {
        let (vm, _) = run_source(": inc 1 + ;\n");
        let plus = id_of(&vm, "+");
        assert_eq!(body_of(&vm, "inc"), vec![Op::PushNum(1), Op::Call(plus), Op::Return]);
    }

    #[test]
    fn test_words_calling_words() {
        assert_stack(": sq dup * ;\n: quad sq sq ;\n2 quad\n", &[16]);
    }

    #[test]
    fn test_definition_spanning_lines() {
        let (vm, _) = run_source(": sq\ndup\n*\n;\n6 sq\n");
        assert_eq!(vm.stack(), &[36]);
        assert_eq!(vm.mode(), Mode::Execute);
    }

    #[test]
    fn test_name_on_next_line() {
        assert_stack(":\nsq dup * ;\n4 sq\n", &[16]);
        assert_stack(":\n\n\nsq dup * ;\n4 sq\n", &[16]);
    }

    #[test]
    fn test_empty_definition() {
        let (vm, _) = run_source(": nop ;\n1 nop\n");
        assert_eq!(vm.stack(), &[1]);
        assert_eq!(body_of(&vm, "nop"), vec![Op::Return]);
    }

    #[test]
    fn test_redefinition_is_rejected() {
        let (vm, out) = run_source(": sq dup * ;\n: sq dup + ;\n5 sq\n");
        assert_eq!(vm.stack(), &[25]);
        assert!(out.contains("function already defined: sq"), "{:?}", out);
        assert_eq!(vm.mode(), Mode::Execute);
        let count = vm.dictionary().iter().filter(|(_, w)| w.name == "sq").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_redefining_a_builtin_is_rejected() {
        let (vm, out) = run_source(": dup 1 ;\n7 dup\n");
        assert!(out.contains("function already defined: dup"));
        assert_eq!(vm.stack(), &[7, 7]);
    }

    #[test]
    fn test_definition_cursor_cleared() {
        let mut interp = interpreter(Vm::new(), ": sq dup *\n", false);
        interp.run().expect("run should succeed");
        assert!(interp.compiling().is_some());
        assert_eq!(interp.vm().mode(), Mode::Compile);

        let mut interp = interpreter(Vm::new(), ": sq dup * ;\n", false);
        interp.run().expect("run should succeed");
        assert!(interp.compiling().is_none());
    }

    #[test]
    fn test_recursion_grows_return_stack() {
        let config = VmConfig {
            max_call_depth: Some(5),
            ..VmConfig::default()
        };
        let (vm, out) = run_with_config(": f 1 f ;\nf\n", config);
        assert_eq!(vm.stack(), &[1, 1, 1, 1, 1]);
        assert!(out.contains("return stack overflow (limit 5)"), "{:?}", out);
        assert_eq!(vm.return_depth(), 0);
    }

    #[test]
    fn test_runaway_recursion_hits_step_limit() {
        let config = VmConfig {
            max_steps: Some(200),
            ..VmConfig::default()
        };
        let mut interp = interpreter(Vm::with_config(config), ": f f ;\nf\n", false);
        let err = interp.run().expect_err("step limit expected");
        assert!(matches!(err.kind, ErrorKind::StepLimit(200)));
    }

    // ============================================================
    // Errors
    // ============================================================

    #[test]
    fn test_unknown_word_discards_line() {
        let (vm, out) = run_source("1 foo 2 3\n4\n");
        assert_eq!(vm.stack(), &[1, 4]);
        assert_eq!(out, "error: `foo` not a function or a number\n");
    }

    #[test]
    fn test_unknown_word_while_compiling_stays_in_compile_mode() {
        let (vm, out) = run_source(": w 1 foo 2 ;\n3 ;\nw\n");
        assert!(out.contains("`foo` not a function or a number"));
        assert_eq!(body_of(&vm, "w"), vec![Op::PushNum(1), Op::PushNum(3), Op::Return]);
        assert_eq!(vm.stack(), &[1, 3]);
    }

    #[test]
    fn test_underflow_is_reported_and_survived() {
        let (vm, out) = run_source("+\n1 +\n2 3 +\n");
        assert_eq!(vm.stack(), &[1, 5]);
        assert_eq!(out.matches("stack underflow").count(), 2, "{:?}", out);
    }

    #[test]
    fn test_underflow_inside_compiled_word_continues() {
        let (vm, out) = run_source(": bad + 10 ;\nbad\n");
        assert_eq!(vm.stack(), &[10]);
        assert_eq!(
            out,
            "error: stack underflow: `+` needs 2 value(s), found 0 (in bad)\n"
        );
    }

    #[test]
    fn test_nested_error_is_one_line() {
        let (vm, out) = run_source(": inner + ;\n: outer inner 1 ;\nouter\n");
        assert_eq!(vm.stack(), &[1]);
        assert_eq!(out.lines().count(), 1, "{:?}", out);
        assert_eq!(
            out,
            "error: stack underflow: `+` needs 2 value(s), found 0 (in inner, called from outer)\n"
        );
    }

    #[test]
    fn test_division_by_zero() {
        let (vm, out) = run_source("4 8 0 /\n");
        assert_eq!(vm.stack(), &[4]);
        assert_eq!(out, "error: division by zero\n");
    }

    #[test]
    fn test_division_by_zero_keeps_rest_of_line() {
        assert_stack("1 0 / 2 3 +\n", &[5]);
    }

    #[test]
    fn test_stack_word_underflow_messages() {
        assert_error("pop\n", "stack underflow");
        assert_error("dup\n", "stack underflow");
        assert_error("1 swp\n", "stack underflow");
    }

    #[test]
    fn test_invalid_call_unwinds_to_idle_loop() {
        let mut dict = Dictionary::bootstrap();
        let bad = dict.add("bad");
        dict.append(bad, Op::Call(WordId(999)));

        let vm = Vm::with_dictionary(dict, VmConfig::default());
        let mut interp = interpreter(vm, "bad 7\n", false);
        interp.run().expect("invalid opcodes are not fatal");
        let (vm, out) = finish(interp);

        assert!(out.contains("invalid opcode"), "{:?}", out);
        assert_eq!(vm.stack(), &[7]);
        assert_eq!(vm.return_depth(), 0);
    }

    #[test]
    fn test_return_underflow_is_fatal() {
        let mut dict = Dictionary::new();
        let idle = dict.add(IDLE_WORD);
        dict.append(idle, Op::Return);

        let vm = Vm::with_dictionary(dict, VmConfig::default());
        let mut interp = interpreter(vm, "1\n", false);
        let err = interp.run().expect_err("underflow is fatal");
        assert!(matches!(err.kind, ErrorKind::ReturnStackUnderflow));
    }

    // ============================================================
    // Prompts and READ
    // ============================================================

    #[test]
    fn test_prompts_once_per_line() {
        let mut interp = interpreter(Vm::new(), "1\n: sq\ndup * ;\n2 sq 3 sq\n", true);
        interp.run().expect("run should succeed");
        let (vm, out) = finish(interp);
        assert_eq!(out, "\n> \n> ...> \n> \n> ");
        assert_eq!(vm.stack(), &[1, 4, 9]);
    }

    #[test]
    fn test_prompt_while_waiting_for_name() {
        let mut interp = interpreter(Vm::new(), ":\nsq dup * ;\n", true);
        interp.run().expect("run should succeed");
        let (_, out) = finish(interp);
        assert_eq!(out, "\n> ...> \n> ");
    }

    #[test]
    fn test_read_loop_resolves_one_token_per_instruction() {
        let mut dict = Dictionary::new();
        let idle = dict.add(IDLE_WORD);
        dict.append(idle, Op::Read);
        dict.append(idle, Op::Jump(-1));
        for (name, builtin, immediate) in Builtin::VOCABULARY {
            dict.add_builtin(name, builtin, immediate);
        }

        let vm = Vm::with_dictionary(dict, VmConfig::default());
        let mut interp = interpreter(vm, "1 2 +\n4 *\n", true);
        interp.run().expect("run should succeed");
        let (vm, out) = finish(interp);
        assert_eq!(vm.stack(), &[12]);
        assert_eq!(out, "", "READ never prompts");
    }
}
