pub mod chunk;
pub mod compiler;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;

use crate::error::CompileError;
use crate::vm::chunk::Chunk;
use crate::vm::vm::Vm;

/// Outcome of compiling and running one source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Interpret source code with a VM writing to stdout and stderr.
pub fn interpret(source: &str) -> InterpretResult {
    Vm::new().interpret(source)
}

/// Compile source code to bytecode and return the chunk.
pub fn compile_to_chunk(source: &str) -> Result<Chunk, CompileError> {
    let mut chunk = Chunk::new();
    compiler::compile(source, &mut chunk)
        .map_err(|err| err.with_source_code("input", source))?;
    Ok(chunk)
}
