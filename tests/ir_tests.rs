//! Integration tests for IR generation and CFG construction.

use std::collections::HashSet;

use dlc::inter::{BlockId, Ir, Opcode};
use dlc::lower;

fn tac(source: &str) -> Vec<String> {
    lower(source).unwrap().to_string().lines().map(str::to_string).collect()
}

#[test]
fn assignment_and_write_produce_minimal_tac() {
    let lines = tac("programa p inicio inteiro a; a = 5; escreva(a); fim.");
    assert_eq!(lines, vec!["L0:", "%0 = 5", "print %0"]);
}

#[test]
fn while_lowers_to_a_pretest_loop() {
    let lines = tac(
        "programa p inicio inteiro s; inteiro i; s = 0; i = 1; \
         enquanto (i <= 3) inicio s = s + i; i = i + 1; fim; escreva(s); fim.",
    );
    assert_eq!(
        lines,
        vec![
            "L0:",
            "%0 = 0",
            "%1 = 1",
            "L1:",
            "%2 = %1 <= 3",
            "iffalse %2 goto L2",
            "%3 = %0 + %1",
            "%0 = %3",
            "%4 = %1 + 1",
            "%1 = %4",
            "goto L1",
            "L2:",
            "print %0",
        ]
    );
}

#[test]
fn if_else_wraps_both_branches() {
    let lines = tac(
        "programa p inicio inteiro a; a = 1; \
         se (a < 2) a = 10 senao a = 20; escreva(a); fim.",
    );
    let text = lines.join("\n");
    assert!(text.contains("iffalse %1 goto L1"));
    assert!(text.contains("goto L2"));
    assert!(text.contains("L1:"));
    assert!(text.contains("L2:"));
}

#[test]
fn or_branches_before_evaluating_the_right_operand() {
    // The division lives in the instruction stream but the `if` on the left
    // operand jumps over it.
    let lines = tac(
        "programa p inicio booleano a; booleano c; inteiro x; x = 0; a = verdade; \
         c = a | (1 / x == 1); escreva(c); fim.",
    );
    let first_if = lines.iter().position(|l| l.starts_with("if ")).unwrap();
    let division = lines.iter().position(|l| l.contains(" / ")).unwrap();
    assert!(first_if < division, "left test must precede the right operand's code");

    // Both constant moves into the materialized boolean result exist.
    assert!(lines.iter().any(|l| l.ends_with("= 1") && l.starts_with('%')));
    assert!(lines.iter().any(|l| l.ends_with("= 0") && l.starts_with('%')));
}

#[test]
fn and_uses_the_iffalse_dual() {
    let lines = tac(
        "programa p inicio booleano a; booleano c; a = falso; \
         c = a & verdade; escreva(c); fim.",
    );
    assert!(lines.iter().any(|l| l == "iffalse %0 goto L1"));
    assert!(lines.iter().all(|l| !l.starts_with("if ")));
}

#[test]
fn one_temp_backs_a_variable_for_its_whole_lifetime() {
    let ir = lower(
        "programa p inicio inteiro a; a = 1; a = a + 1; a = a + 2; escreva(a); fim.",
    )
    .unwrap();
    assert_eq!(ir.var_temps.len(), 1);
    let temp = ir.var_temps[&("a".to_string(), 1)];
    // Every move into `a` targets the same temporary.
    let moves = ir
        .instrs()
        .filter(|i| i.op == Opcode::Move)
        .filter(|i| i.result.as_temp() == Some(temp))
        .count();
    assert_eq!(moves, 3);
}

#[test]
fn shadowed_variables_get_distinct_temps() {
    let ir = lower(
        "programa p inicio inteiro a; a = 1; \
         inicio inteiro a; a = 2; escreva(a); fim; escreva(a); fim.",
    )
    .unwrap();
    assert_eq!(ir.var_temps.len(), 2);
    let outer = ir.var_temps[&("a".to_string(), 1)];
    let inner = ir.var_temps[&("a".to_string(), 2)];
    assert_ne!(outer, inner);
}

fn check_cfg(ir: &Ir) {
    // Reachability: the whole program order hangs off the single entry.
    let mut reachable: HashSet<BlockId> = HashSet::new();
    let mut stack = vec![ir.entry()];
    while let Some(id) = stack.pop() {
        if reachable.insert(id) {
            stack.extend(ir.block(id).succs.iter().copied());
        }
    }
    for &id in &ir.sequence {
        assert!(reachable.contains(&id), "{id} unreachable from the entry block");
    }

    // Successor sets match each block's final control transfer (or its
    // fallthrough neighbour in program order).
    for (pos, &id) in ir.sequence.iter().enumerate() {
        let block = ir.block(id);
        let next = ir.sequence.get(pos + 1).copied();
        let succs: HashSet<BlockId> = block.succs.iter().copied().collect();
        let last = block.instrs.last().expect("blocks in program order are never empty");
        match last.op {
            Opcode::Goto => {
                let target = ir.label_blocks[&last.result.as_label().unwrap()];
                assert_eq!(succs, HashSet::from([target]), "{id}");
            }
            Opcode::If | Opcode::IfFalse => {
                let target = ir.label_blocks[&last.result.as_label().unwrap()];
                let mut expected = HashSet::from([target]);
                if let Some(next) = next {
                    expected.insert(next);
                }
                assert_eq!(succs, expected, "{id}");
            }
            _ => match next {
                Some(next) => assert_eq!(succs, HashSet::from([next]), "{id}"),
                None => assert!(succs.is_empty(), "{id}"),
            },
        }
    }

    // Predecessors mirror successors exactly.
    for &id in &ir.sequence {
        for &succ in &ir.block(id).succs {
            assert!(ir.block(succ).preds.contains(&id));
        }
        for &pred in &ir.block(id).preds {
            assert!(ir.block(pred).succs.contains(&id));
        }
    }
}

#[test]
fn cfg_invariants_hold_for_structured_programs() {
    for source in [
        "programa p inicio inteiro a; a = 5; escreva(a); fim.",
        "programa p inicio inteiro a; a = 1; se (a < 2) a = 10 senao a = 20; escreva(a); fim.",
        "programa p inicio inteiro s; inteiro i; s = 0; i = 1; \
         enquanto (i <= 3) inicio s = s + i; i = i + 1; fim; escreva(s); fim.",
        "programa p inicio booleano a; booleano c; a = verdade; \
         c = a | (a & falso); escreva(c); fim.",
        "programa p inicio inteiro a; a = 0; \
         enquanto (a < 3) inicio se (a == 1) escreva(a); a = a + 1; fim; fim.",
    ] {
        let ir = lower(source).unwrap();
        check_cfg(&ir);
    }
}

#[test]
fn entry_block_holds_the_first_label() {
    let ir = lower("programa p inicio inteiro a; a = 5; escreva(a); fim.").unwrap();
    let entry = ir.block(ir.entry());
    assert_eq!(entry.instrs[0].op, Opcode::Label);
    assert!(entry.preds.is_empty());
}

#[test]
fn dot_export_lists_every_block() {
    let ir = lower(
        "programa p inicio inteiro a; a = 1; se (a < 2) a = 10 senao a = 20; escreva(a); fim.",
    )
    .unwrap();
    let dot = ir.to_dot();
    assert!(dot.starts_with("digraph cfg {"));
    for &id in &ir.sequence {
        assert!(dot.contains(&format!("{id} [label=")));
    }
}
