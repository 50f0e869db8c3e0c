use rstest::rstest;
use bytelox::InterpretResult;
use bytelox::error::CompileError;
use bytelox::vm::compile_to_chunk;
use bytelox::vm::vm::Vm;

fn compile_errors(source: &str) -> Vec<String> {
    let mut vm = Vm::capturing();
    assert_eq!(vm.interpret(source), InterpretResult::CompileError);
    assert!(vm.output().is_empty(), "compile errors must not run code");
    vm.diagnostics().to_vec()
}

#[rstest]
#[case(
    include_str!("../fixtures/error_unterminated_string.lox"),
    "[line 2 Error: Unterminated string."
)]
#[case(
    include_str!("../fixtures/error_missing_paren.lox"),
    "[line 2 Error at end: Expected ')' after expression."
)]
#[case(
    include_str!("../fixtures/error_trailing_tokens.lox"),
    "[line 1 Error at '3': Expected end of expression."
)]
#[case(
    include_str!("../fixtures/error_unexpected_character.lox"),
    "[line 1 Error: Unexpected character."
)]
fn fixture_reports_single_error(#[case] source: &str, #[case] expected: &str) {
    let errors = compile_errors(source);
    assert_eq!(
        errors.len(),
        1,
        "expected 1 error but got {}: {errors:?}",
        errors.len()
    );
    assert_eq!(errors[0], expected);
}

#[rstest]
#[case("", "[line 1 Error at end: Expected expression.")]
#[case("*", "[line 1 Error at '*': Expected expression.")]
#[case("1 +", "[line 1 Error at end: Expected expression.")]
#[case("(", "[line 1 Error at end: Expected expression.")]
#[case("1 2", "[line 1 Error at '2': Expected end of expression.")]
#[case("\n\n)", "[line 3 Error at ')': Expected expression.")]
#[case("\"a\" \"b", "[line 1 Error: Unterminated string.")]
fn inline_errors(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(compile_errors(source), vec![expected]);
}

#[test]
fn diagnostic_points_at_offending_token() {
    let err = compile_to_chunk("1 + 2 3").expect_err("trailing literal");
    match err {
        CompileError::Parse { span, line, .. } => {
            assert_eq!(span.offset(), 6);
            assert_eq!(span.len(), 1);
            assert_eq!(line, 1);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn scan_error_wins_over_follow_on_parse_error() {
    let err = compile_to_chunk("@").expect_err("bad character");
    assert!(matches!(err, CompileError::Scan { .. }));
    assert_eq!(err.message(), "Unexpected character.");
}

#[rstest]
#[case("-")]
#[case("(")]
fn deeply_nested_input_is_rejected(#[case] prefix: &str) {
    let source = format!("{}1", prefix.repeat(100_000));
    let errors = compile_errors(&source);
    assert_eq!(
        errors,
        vec![format!("[line 1 Error at '{prefix}': Expression nested too deeply.")]
    );
}
