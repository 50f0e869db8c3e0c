pub mod error;
pub mod repl;
pub mod scanner;
pub mod vm;

// Re-export error types for convenience
pub use error::{CompileError, RuntimeError};
pub use vm::InterpretResult;
