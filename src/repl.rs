use std::io::{self, BufRead, Write};

use tracing::warn;

use crate::vm::vm::Vm;

/// Run the interactive REPL on stdin. Each line is compiled into a fresh chunk.
pub fn run_repl() -> io::Result<()> {
    let stdin = io::stdin();
    let mut vm = Vm::new();
    run_session(stdin.lock(), io::stdout(), &mut vm)
}

/// Prompt, read and evaluate lines until end of input.
///
/// Prompts go to `prompt_out`; results and diagnostics go to the VM's writers.
pub fn run_session<R: BufRead, W: Write>(
    mut input: R,
    mut prompt_out: W,
    vm: &mut Vm,
) -> io::Result<()> {
    loop {
        write!(prompt_out, "> ")?;
        prompt_out.flush()?;

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => {
                // Ctrl-D / EOF
                writeln!(prompt_out)?;
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "read error");
                return Err(e);
            }
        }

        let source = line.trim_end_matches(['\n', '\r']);
        if source.trim().is_empty() {
            continue;
        }

        vm.interpret(source);
    }
}
