//! Front-end integration tests: diagnostics, recovery and annotations.

use dlc::{front_end, lower, CompileError};

fn diagnostics(source: &str) -> Vec<CompileError> {
    front_end(source).expect_err("front end should reject the program")
}

fn tac(source: &str) -> String {
    lower(source).unwrap().to_string()
}

#[test]
fn valid_program_passes_the_front_end() {
    let program = front_end("programa p inicio inteiro a; a = 5; escreva(a); fim.").unwrap();
    assert_eq!(program.name, "p");
}

#[test]
fn parser_recovers_and_reports_every_bad_statement() {
    // Two malformed statements; recovery must resynchronize after the first
    // and still diagnose the second.
    let errors = diagnostics(
        "programa p inicio \
         inteiro a; \
         a = ; \
         escreva(; \
         fim.",
    );
    assert!(errors.len() >= 2, "expected two diagnostics, got {errors:?}");
    assert!(errors.iter().all(|e| matches!(e, CompileError::Syntax { .. })));
}

#[test]
fn missing_program_keyword_is_a_syntax_error() {
    let errors = diagnostics("inicio fim.");
    assert!(matches!(errors[0], CompileError::Syntax { line: 1, .. }));
    assert!(errors[0].to_string().contains("programa"));
}

#[test]
fn undeclared_variable_is_reported_with_its_line() {
    let errors = diagnostics("programa p inicio\nb = 1;\nfim.");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CompileError::Semantic { line: 2, .. }));
    assert!(errors[0].to_string().contains("undeclared"));
}

#[test]
fn duplicate_declaration_in_one_scope_is_rejected() {
    let errors = diagnostics("programa p inicio inteiro a; real a; fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("already declared")));
}

#[test]
fn redeclaration_in_a_nested_scope_is_allowed() {
    assert!(front_end(
        "programa p inicio inteiro a; a = 1; inicio real a; a = 2.0; escreva(a); fim; fim."
    )
    .is_ok());
}

#[test]
fn bool_operands_cannot_be_added() {
    let errors = diagnostics("programa p inicio booleano a; a = verdade; escreva(a + 1); fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("numeric operands")));
}

#[test]
fn narrowing_assignment_is_rejected() {
    let errors = diagnostics("programa p inicio inteiro a; a = 1.5; fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("cannot assign real to int")));
}

#[test]
fn condition_must_be_boolean() {
    let errors = diagnostics("programa p inicio inteiro a; a = 1; se (a) escreva(a); fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("condition must be bool")));
    let errors = diagnostics("programa p inicio enquanto (1 + 2) escreva(1); fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("condition must be bool")));
}

#[test]
fn logical_operators_require_booleans() {
    let errors = diagnostics("programa p inicio escreva(1 | 2); fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("bool operands")));
}

#[test]
fn comparing_bool_with_number_is_rejected() {
    let errors = diagnostics("programa p inicio escreva(verdade == 1); fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("cannot compare")));
}

#[test]
fn assignment_widens_int_to_real() {
    let tac = tac("programa p inicio real r; r = 1 + 2; escreva(r); fim.");
    assert!(tac.contains("= convert %0"), "{tac}");
}

#[test]
fn mixed_arithmetic_widens_the_int_operand() {
    let tac = tac("programa p inicio escreva(1 + 2.5); fim.");
    assert!(tac.contains("%0 = convert 1"), "{tac}");
}

#[test]
fn mixed_comparison_widens_the_int_operand() {
    let tac = tac("programa p inicio real x; x = 0.5; se (x < 1) escreva(1); fim.");
    assert!(tac.contains("= convert 1"), "{tac}");
}

#[test]
fn equal_types_insert_no_conversion() {
    let tac = tac("programa p inicio inteiro a; a = 1 + 2; escreva(a); fim.");
    assert!(!tac.contains("convert"), "{tac}");
}

#[test]
fn unary_not_rejects_numbers() {
    let errors = diagnostics("programa p inicio escreva(!1); fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("bool operand")));
}

#[test]
fn unary_minus_rejects_booleans() {
    let errors = diagnostics("programa p inicio escreva(-verdade); fim.");
    assert!(errors.iter().any(|e| e.to_string().contains("numeric operand")));
}

#[test]
fn semantic_checking_reports_multiple_errors_in_one_run() {
    let errors = diagnostics(
        "programa p inicio \
         b = 1; \
         c = 2; \
         fim.",
    );
    assert_eq!(errors.len(), 2);
}
