use std::io::{self, Write};

use tracing::{debug, trace, warn};

use crate::error::{CompileError, Fault, RuntimeError};
use crate::vm::InterpretResult;
use crate::vm::chunk::{Chunk, OpCode};
use crate::vm::compiler;
use crate::vm::value::Value;

pub struct Vm {
    stack: Vec<Value>,
    output: Option<Vec<String>>,
    diagnostics: Option<Vec<String>>,
    writer: Box<dyn Write>,
    err_writer: Box<dyn Write>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// A VM that only records program output and diagnostics, for tests and embedding.
    pub fn capturing() -> Self {
        Self {
            output: Some(Vec::new()),
            diagnostics: Some(Vec::new()),
            ..Self::with_writers(Box::new(io::sink()), Box::new(io::sink()))
        }
    }

    pub fn with_writers(writer: Box<dyn Write>, err_writer: Box<dyn Write>) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            output: None,
            diagnostics: None,
            writer,
            err_writer,
        }
    }

    /// Every value printed by `Return`, in order. Only a capturing VM records them.
    pub fn output(&self) -> &[String] {
        self.output.as_deref().unwrap_or_default()
    }

    /// Every compile or runtime diagnostic reported, in order. Only a capturing VM records them.
    pub fn diagnostics(&self) -> &[String] {
        self.diagnostics.as_deref().unwrap_or_default()
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Compile `source` into a fresh chunk and run it.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let mut chunk = Chunk::new();
        if let Err(err) = compiler::compile(source, &mut chunk) {
            self.report_compile_error(&err);
            return InterpretResult::CompileError;
        }
        match self.execute(&chunk) {
            Ok(()) => InterpretResult::Ok,
            Err(err) => {
                self.report(&err.to_string());
                InterpretResult::RuntimeError
            }
        }
    }

    /// Run a compiled chunk until `Return` or a fault. On a fault the whole
    /// operand stack is discarded.
    pub fn execute(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        self.stack.clear();
        let mut ip = 0;
        let result = self.run(chunk, &mut ip);
        if let Err(fault) = result {
            let line = chunk.line_at(ip.saturating_sub(1)).unwrap_or_default();
            debug!(%fault, line, depth = self.stack.len(), "runtime fault");
            self.stack.clear();
            return Err(RuntimeError::new(fault, line));
        }
        Ok(())
    }

    fn run(&mut self, chunk: &Chunk, ip: &mut usize) -> Result<(), Fault> {
        loop {
            if tracing::enabled!(tracing::Level::TRACE) {
                let mut listing = String::new();
                chunk.disassemble_instruction(*ip, &mut listing);
                trace!(stack = %self.format_stack(), "{}", listing.trim_end());
            }

            let Some(&byte) = chunk.code.get(*ip) else {
                return Err(Fault::MissingReturn);
            };
            *ip += 1;
            let op = OpCode::try_from(byte).map_err(Fault::UnknownOpcode)?;

            match op {
                OpCode::Constant | OpCode::ConstantLong => {
                    let index = chunk
                        .read_constant_index(op, *ip)
                        .ok_or(Fault::TruncatedOperand(op))?;
                    *ip += op.operand_len();
                    let value = chunk
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(Fault::ConstantOutOfRange(index))?;
                    self.stack.push(value);
                }
                OpCode::Nil => self.stack.push(Value::Nil),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),
                OpCode::Equal => {
                    let (a, b) = self.pop_pair()?;
                    self.stack.push(Value::Bool(a == b));
                }
                OpCode::NotEqual => {
                    let (a, b) = self.pop_pair()?;
                    self.stack.push(Value::Bool(a != b));
                }
                OpCode::Greater => self.binary_op(|a, b| Value::Bool(a > b))?,
                OpCode::GreaterEqual => self.binary_op(|a, b| Value::Bool(a >= b))?,
                OpCode::Less => self.binary_op(|a, b| Value::Bool(a < b))?,
                OpCode::LessEqual => self.binary_op(|a, b| Value::Bool(a <= b))?,
                OpCode::Add => self.binary_op(|a, b| Value::Number(a + b))?,
                OpCode::Subtract => self.binary_op(|a, b| Value::Number(a - b))?,
                OpCode::Multiply => self.binary_op(|a, b| Value::Number(a * b))?,
                OpCode::Divide => self.binary_op(|a, b| Value::Number(a / b))?,
                OpCode::Not => {
                    let top = self.peek_mut(0)?;
                    *top = Value::Bool(top.is_falsey());
                }
                OpCode::Negate => {
                    let top = self.peek_mut(0)?;
                    match top {
                        Value::Number(n) => *n = -*n,
                        other => {
                            debug!(operand = other.type_name(), "negate type fault");
                            return Err(Fault::OperandMustBeNumber);
                        }
                    }
                }
                OpCode::Return => {
                    let value = self.pop()?;
                    self.print(&value.to_string());
                    return Ok(());
                }
            }
        }
    }

    fn pop(&mut self) -> Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    /// Pop the right then the left operand, returning `(left, right)`.
    fn pop_pair(&mut self) -> Result<(Value, Value), Fault> {
        if self.stack.len() < 2 {
            return Err(Fault::StackUnderflow);
        }
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn peek(&self, distance: usize) -> Result<&Value, Fault> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|idx| self.stack.get(idx))
            .ok_or(Fault::StackUnderflow)
    }

    fn peek_mut(&mut self, distance: usize) -> Result<&mut Value, Fault> {
        let idx = self
            .stack
            .len()
            .checked_sub(distance + 1)
            .ok_or(Fault::StackUnderflow)?;
        self.stack.get_mut(idx).ok_or(Fault::StackUnderflow)
    }

    /// Both operands are type-checked before either is popped.
    fn binary_op(&mut self, op: fn(f64, f64) -> Value) -> Result<(), Fault> {
        let (right, left) = (self.peek(0)?, self.peek(1)?);
        match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => {
                self.stack.truncate(self.stack.len() - 2);
                self.stack.push(op(a, b));
                Ok(())
            }
            _ => {
                debug!(
                    left = left.type_name(),
                    right = right.type_name(),
                    "binary operand type fault"
                );
                Err(Fault::OperandsMustBeNumbers)
            }
        }
    }

    fn print(&mut self, text: &str) {
        if let Err(e) = writeln!(self.writer, "{text}") {
            warn!(error = %e, "failed to write program output");
        }
        if let Some(output) = &mut self.output {
            output.push(text.to_string());
        }
    }

    fn report(&mut self, message: &str) {
        if let Err(e) = writeln!(self.err_writer, "{message}") {
            warn!(error = %e, "failed to write diagnostic");
        }
        if let Some(diagnostics) = &mut self.diagnostics {
            diagnostics.push(message.to_string());
        }
    }

    fn report_compile_error(&mut self, err: &CompileError) {
        self.report(&err.to_string());
    }

    fn format_stack(&self) -> String {
        self.stack.iter().map(|v| format!("[ {v} ]")).collect()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn run_vm(source: &str) -> Vec<String> {
        let mut vm = Vm::capturing();
        assert_eq!(vm.interpret(source), InterpretResult::Ok, "{:?}", vm.diagnostics());
        vm.output().to_vec()
    }

    fn run_chunk(chunk: &Chunk) -> (Vm, Result<(), RuntimeError>) {
        let mut vm = Vm::capturing();
        let result = vm.execute(chunk);
        (vm, result)
    }

    #[rstest]
    #[case("1 + 2", "3")]
    #[case("10 - 3", "7")]
    #[case("2 * 3", "6")]
    #[case("10 / 4", "2.5")]
    #[case("-5", "-5")]
    #[case("1 - 2 - 3", "-4")]
    #[case("2 + 3 * 4", "14")]
    #[case("(2 + 3) * 4", "20")]
    #[case("8 / 4 / 2", "1")]
    fn vm_arithmetic(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(run_vm(source), vec![expected]);
    }

    #[rstest]
    #[case("1 == \"1\"", "false")]
    #[case("\"a\" == \"a\"", "true")]
    #[case("\"a\" != \"b\"", "true")]
    #[case("nil == false", "false")]
    #[case("nil == nil", "true")]
    #[case("!nil", "true")]
    #[case("!0", "false")]
    #[case("!\"\"", "false")]
    #[case("!!true", "true")]
    #[case("1 < 2", "true")]
    #[case("2 <= 2", "true")]
    #[case("1 > 2", "false")]
    #[case("3 >= 4", "false")]
    #[case("1 + 1 == 2", "true")]
    fn vm_comparisons(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(run_vm(source), vec![expected]);
    }

    #[rstest]
    #[case("nil", "nil")]
    #[case("\"hello\"", "hello")]
    #[case("1 / 0", "inf")]
    #[case("-1 / 0", "-inf")]
    #[case("0 / 0", "NaN")]
    fn vm_literals_and_ieee(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(run_vm(source), vec![expected]);
    }

    #[rstest]
    #[case("1 + true", "Operands must be numbers.\n[line 1] in script")]
    #[case("\"a\" + \"b\"", "Operands must be numbers.\n[line 1] in script")]
    #[case("nil < 1", "Operands must be numbers.\n[line 1] in script")]
    #[case("-\"x\"", "Operand must be a number.\n[line 1] in script")]
    #[case("1 +\n\n-false", "Operand must be a number.\n[line 3] in script")]
    fn vm_type_faults(#[case] source: &str, #[case] expected: &str) {
        let mut vm = Vm::capturing();
        assert_eq!(vm.interpret(source), InterpretResult::RuntimeError);
        assert_eq!(vm.diagnostics(), &[expected.to_string()]);
        assert!(vm.output().is_empty());
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn fault_clears_pending_operands() {
        // 1 and 2 are still waiting on the stack when the negate faults
        let mut vm = Vm::capturing();
        assert_eq!(
            vm.interpret("1 + (2 * -nil)"),
            InterpretResult::RuntimeError
        );
        assert!(vm.stack().is_empty());
        assert_eq!(vm.interpret("4 - 1"), InterpretResult::Ok);
        assert_eq!(vm.output(), &["3".to_string()]);
    }

    #[test]
    fn compile_error_never_runs() {
        let mut vm = Vm::capturing();
        assert_eq!(vm.interpret("\"abc"), InterpretResult::CompileError);
        assert_eq!(
            vm.diagnostics(),
            &["[line 1 Error: Unterminated string.".to_string()]
        );
        assert!(vm.output().is_empty());
    }

    #[test]
    fn constant_long_loads_pool_entry() {
        let mut chunk = Chunk::new();
        for i in 0..300 {
            chunk.add_constant(Value::Number(i as f64)).expect("pool has room");
        }
        chunk.write_op(OpCode::ConstantLong, 1);
        chunk.write(0x00, 1);
        chunk.write(0x01, 1);
        chunk.write(0x2b, 1);
        chunk.write_op(OpCode::Return, 1);

        let (vm, result) = run_chunk(&chunk);
        assert_eq!(result, Ok(()));
        assert_eq!(vm.output(), &["299".to_string()]);
    }

    #[test]
    fn write_constant_round_trips_through_vm() {
        let mut chunk = Chunk::new();
        for i in 0..260 {
            chunk
                .write_constant(Value::Number(i as f64), 1)
                .expect("pool has room");
            if i > 0 {
                chunk.write_op(OpCode::Add, 1);
            }
        }
        chunk.write_op(OpCode::Return, 1);

        let (vm, result) = run_chunk(&chunk);
        assert_eq!(result, Ok(()));
        assert_eq!(vm.output(), &[(0..260).sum::<i32>().to_string()]);
    }

    #[test]
    fn underflow_is_a_fault() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 4);
        chunk.write_op(OpCode::Add, 5);
        chunk.write_op(OpCode::Return, 5);

        let (vm, result) = run_chunk(&chunk);
        assert_eq!(result, Err(RuntimeError::new(Fault::StackUnderflow, 5)));
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn return_on_empty_stack_is_a_fault() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Return, 2);
        let (_, result) = run_chunk(&chunk);
        assert_eq!(result, Err(RuntimeError::new(Fault::StackUnderflow, 2)));
    }

    #[test]
    fn unknown_opcode_is_a_fault() {
        let mut chunk = Chunk::new();
        chunk.write(250, 3);
        let (_, result) = run_chunk(&chunk);
        assert_eq!(result, Err(RuntimeError::new(Fault::UnknownOpcode(250), 3)));
    }

    #[test]
    fn missing_return_is_a_fault() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::True, 1);
        let (vm, result) = run_chunk(&chunk);
        assert_eq!(result, Err(RuntimeError::new(Fault::MissingReturn, 1)));
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn empty_chunk_reports_line_zero() {
        let (_, result) = run_chunk(&Chunk::new());
        assert_eq!(result, Err(RuntimeError::new(Fault::MissingReturn, 0)));
    }

    #[test]
    fn truncated_and_dangling_constants_are_faults() {
        let mut truncated = Chunk::new();
        truncated.write_op(OpCode::ConstantLong, 1);
        truncated.write(0, 1);
        let (_, result) = run_chunk(&truncated);
        assert_eq!(
            result,
            Err(RuntimeError::new(
                Fault::TruncatedOperand(OpCode::ConstantLong),
                1
            ))
        );

        let mut dangling = Chunk::new();
        dangling.write_op(OpCode::Constant, 1);
        dangling.write(7, 1);
        let (_, result) = run_chunk(&dangling);
        assert_eq!(
            result,
            Err(RuntimeError::new(Fault::ConstantOutOfRange(7), 1))
        );
    }

    #[test]
    fn stack_is_fresh_for_each_run() {
        let mut vm = Vm::capturing();
        assert_eq!(vm.interpret("1"), InterpretResult::Ok);
        assert_eq!(vm.interpret("2"), InterpretResult::Ok);
        assert_eq!(vm.output(), &["1".to_string(), "2".to_string()]);
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn writes_output_to_writer() {
        use std::cell::RefCell;
        use std::rc::Rc;

        #[derive(Clone, Default)]
        struct Shared(Rc<RefCell<Vec<u8>>>);

        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let out = Shared::default();
        let err = Shared::default();
        let mut vm = Vm::with_writers(Box::new(out.clone()), Box::new(err.clone()));
        vm.interpret("1 - 2 - 3");
        vm.interpret("1 + true");

        assert_eq!(String::from_utf8_lossy(&out.0.borrow()), "-4\n");
        assert_eq!(
            String::from_utf8_lossy(&err.0.borrow()),
            "Operands must be numbers.\n[line 1] in script\n"
        );
    }

    #[test]
    fn writer_backed_vm_keeps_nothing_between_runs() {
        let mut vm = Vm::with_writers(Box::new(io::sink()), Box::new(io::sink()));
        for _ in 0..1000 {
            assert_eq!(vm.interpret("1"), InterpretResult::Ok);
            assert_eq!(vm.interpret("1 + nil"), InterpretResult::RuntimeError);
            assert_eq!(vm.interpret("(1"), InterpretResult::CompileError);
        }
        assert!(vm.output().is_empty());
        assert!(vm.diagnostics().is_empty());
        assert!(vm.stack().is_empty());
    }
}
