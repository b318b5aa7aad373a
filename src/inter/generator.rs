//! Lowering of the annotated tree into three-address code over a CFG.

use hashbrown::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::semantic::Type;
use crate::tree::{BinOp, Expr, Program, Stmt, UnOp, VarRef};

use super::{BasicBlock, BlockId, ConstValue, Instr, Ir, Label, Opcode, Operand, Temp};

/// Generate the IR for a checked program.
///
/// The tree is assumed to be free of semantic errors; a missing annotation
/// is reported as an internal invariant violation, never as a user
/// diagnostic.
pub fn generate(program: &Program) -> CompileResult<Ir> {
    log::debug!("generating IR for program \"{}\"", program.name);
    let mut gen = IrGenerator::new();
    let entry = gen.new_label();
    gen.emit_label(entry);
    gen.stmt(&program.body)?;
    Ok(gen.finish())
}

struct IrGenerator {
    blocks: Vec<BasicBlock>,
    sequence: Vec<BlockId>,
    label_blocks: HashMap<Label, BlockId>,
    var_temps: HashMap<(String, u32), Temp>,
    next_temp: u32,
    next_label: u32,
}

impl IrGenerator {
    fn new() -> Self {
        let mut gen = Self {
            blocks: Vec::new(),
            sequence: Vec::new(),
            label_blocks: HashMap::new(),
            var_temps: HashMap::new(),
            next_temp: 0,
            next_label: 0,
        };
        // The generator always has a current block; the first emitted label
        // replaces this empty placeholder and becomes the entry.
        let initial = gen.new_block();
        gen.sequence.push(initial);
        gen
    }

    fn finish(self) -> Ir {
        Ir {
            blocks: self.blocks,
            sequence: self.sequence,
            label_blocks: self.label_blocks,
            var_temps: self.var_temps,
        }
    }

    fn new_temp(&mut self, ty: Type) -> Temp {
        let temp = Temp { id: self.next_temp, ty };
        self.next_temp += 1;
        temp
    }

    fn new_label(&mut self) -> Label {
        let label = Label { id: self.next_label };
        self.next_label += 1;
        label
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// Block registered for `label`, created lazily on first reference.
    fn block_for_label(&mut self, label: Label) -> BlockId {
        if let Some(&id) = self.label_blocks.get(&label) {
            return id;
        }
        let id = self.new_block();
        self.label_blocks.insert(label, id);
        id
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from.index()].succs.contains(&to) {
            self.blocks[from.index()].succs.push(to);
        }
        if !self.blocks[to.index()].preds.contains(&from) {
            self.blocks[to.index()].preds.push(from);
        }
    }

    /// Append an instruction, maintaining block boundaries and CFG edges.
    ///
    /// A `Label` either replaces the empty current block with the label's
    /// block or starts it as a new one, linking the previous block as a
    /// fallthrough predecessor unless it ended in `Goto`. Any other
    /// instruction following a control transfer opens a fresh fallthrough
    /// block (with an edge, except after `Goto`). A control transfer records
    /// an edge to its target block, created lazily by label identity.
    fn emit(&mut self, instr: Instr) {
        let mut current = *self.sequence.last().expect("generator always has a current block");
        let prev_op = self.blocks[current.index()].instrs.last().map(|i| i.op);

        if instr.op == Opcode::Label {
            if let Some(label) = instr.result.as_label() {
                let target = self.block_for_label(label);
                if self.blocks[current.index()].instrs.is_empty() {
                    *self.sequence.last_mut().expect("sequence is never empty") = target;
                } else {
                    if prev_op != Some(Opcode::Goto) {
                        self.add_edge(current, target);
                    }
                    self.sequence.push(target);
                }
                current = target;
            }
        } else if matches!(prev_op, Some(op) if op.is_jump()) {
            let fallthrough = self.new_block();
            if prev_op != Some(Opcode::Goto) {
                self.add_edge(current, fallthrough);
            }
            self.sequence.push(fallthrough);
            current = fallthrough;
        }

        if instr.op.is_jump() {
            if let Some(label) = instr.result.as_label() {
                let target = self.block_for_label(label);
                self.add_edge(current, target);
            }
        }

        self.blocks[current.index()].instrs.push(instr);
    }

    fn emit_label(&mut self, label: Label) {
        self.emit(Instr::new(Opcode::Label, Operand::Empty, Operand::Empty, Operand::Label(label)));
    }

    fn emit_goto(&mut self, label: Label) {
        self.emit(Instr::new(Opcode::Goto, Operand::Empty, Operand::Empty, Operand::Label(label)));
    }

    fn emit_branch(&mut self, op: Opcode, cond: Operand, label: Label) {
        self.emit(Instr::new(op, cond, Operand::Empty, Operand::Label(label)));
    }

    /// One temporary backs each `(name, scope)` for its entire lifetime.
    fn var_temp(&mut self, var: &VarRef) -> CompileResult<Temp> {
        let ty = var.ty.ok_or_else(|| unresolved(var, "type"))?;
        let scope = var.scope.ok_or_else(|| unresolved(var, "scope"))?;
        let key = (var.name.clone(), scope);
        if let Some(&temp) = self.var_temps.get(&key) {
            return Ok(temp);
        }
        let temp = self.new_temp(ty);
        self.var_temps.insert(key, temp);
        Ok(temp)
    }

    fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
            }
            // Storage binds lazily at the first assignment, read or use.
            Stmt::Decl { .. } => {}
            Stmt::Assign { var, expr, .. } => {
                let arg = self.expr(expr)?;
                let temp = self.var_temp(var)?;
                self.emit(Instr::new(Opcode::Move, arg, Operand::Empty, Operand::Temp(temp)));
            }
            Stmt::If { cond, then_body, .. } => {
                let arg = self.expr(cond)?;
                let out = self.new_label();
                self.emit_branch(Opcode::IfFalse, arg, out);
                self.stmt(then_body)?;
                self.emit_label(out);
            }
            Stmt::IfElse { cond, then_body, else_body, .. } => {
                let arg = self.expr(cond)?;
                let else_label = self.new_label();
                let out = self.new_label();
                self.emit_branch(Opcode::IfFalse, arg, else_label);
                self.stmt(then_body)?;
                self.emit_goto(out);
                self.emit_label(else_label);
                self.stmt(else_body)?;
                self.emit_label(out);
            }
            Stmt::While { cond, body, .. } => {
                let begin = self.new_label();
                let end = self.new_label();
                self.emit_label(begin);
                let arg = self.expr(cond)?;
                self.emit_branch(Opcode::IfFalse, arg, end);
                self.stmt(body)?;
                self.emit_goto(begin);
                self.emit_label(end);
            }
            Stmt::Write { expr, .. } => {
                let arg = self.expr(expr)?;
                self.emit(Instr::new(Opcode::Print, arg, Operand::Empty, Operand::Empty));
            }
            Stmt::Read { var, .. } => {
                let temp = self.var_temp(var)?;
                self.emit(Instr::new(Opcode::Read, Operand::Empty, Operand::Empty, Operand::Temp(temp)));
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> CompileResult<Operand> {
        match expr {
            Expr::Literal { value, .. } => Ok(Operand::Const(const_of(*value))),
            Expr::Var(var) => Ok(Operand::Temp(self.var_temp(var)?)),
            Expr::Convert { to, operand, .. } => {
                let arg = self.expr(operand)?;
                let temp = self.new_temp(*to);
                self.emit(Instr::new(Opcode::Convert, arg, Operand::Empty, Operand::Temp(temp)));
                Ok(Operand::Temp(temp))
            }
            Expr::Unary { op, operand, ty, .. } => {
                let arg = self.expr(operand)?;
                let ty = ty.ok_or_else(|| untyped(expr))?;
                let temp = self.new_temp(ty);
                let opcode = match op {
                    UnOp::Plus => Opcode::Plus,
                    UnOp::Minus => Opcode::Minus,
                    UnOp::Not => Opcode::Not,
                };
                self.emit(Instr::new(opcode, arg, Operand::Empty, Operand::Temp(temp)));
                Ok(Operand::Temp(temp))
            }
            Expr::Binary { op: BinOp::Or, lhs, rhs, .. } => self.short_circuit_or(lhs, rhs),
            Expr::Binary { op: BinOp::And, lhs, rhs, .. } => self.short_circuit_and(lhs, rhs),
            Expr::Binary { op, lhs, rhs, ty, .. } => {
                let arg1 = self.expr(lhs)?;
                let arg2 = self.expr(rhs)?;
                let ty = ty.ok_or_else(|| untyped(expr))?;
                let temp = self.new_temp(ty);
                self.emit(Instr::new(binary_opcode(*op), arg1, arg2, Operand::Temp(temp)));
                Ok(Operand::Temp(temp))
            }
        }
    }

    /// `a | b`: evaluate `a`, jump to the true label when it holds, skipping
    /// the code for `b` entirely. Short-circuiting is a property of the
    /// generated control flow, not of generation-time evaluation order.
    fn short_circuit_or(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<Operand> {
        let true_label = self.new_label();
        let false_label = self.new_label();
        let end = self.new_label();
        let result = self.new_temp(Type::Bool);

        let arg1 = self.expr(lhs)?;
        self.emit_branch(Opcode::If, arg1, true_label);
        let arg2 = self.expr(rhs)?;
        self.emit_branch(Opcode::If, arg2, true_label);
        self.emit_goto(false_label);

        self.emit_label(true_label);
        self.emit_move(ConstValue::Bool(true), result);
        self.emit_goto(end);

        self.emit_label(false_label);
        self.emit_move(ConstValue::Bool(false), result);

        self.emit_label(end);
        Ok(Operand::Temp(result))
    }

    /// Dual of [`Self::short_circuit_or`], branching on `IfFalse`.
    fn short_circuit_and(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<Operand> {
        let false_label = self.new_label();
        let true_label = self.new_label();
        let end = self.new_label();
        let result = self.new_temp(Type::Bool);

        let arg1 = self.expr(lhs)?;
        self.emit_branch(Opcode::IfFalse, arg1, false_label);
        let arg2 = self.expr(rhs)?;
        self.emit_branch(Opcode::IfFalse, arg2, false_label);

        self.emit_label(true_label);
        self.emit_move(ConstValue::Bool(true), result);
        self.emit_goto(end);

        self.emit_label(false_label);
        self.emit_move(ConstValue::Bool(false), result);

        self.emit_label(end);
        Ok(Operand::Temp(result))
    }

    fn emit_move(&mut self, value: ConstValue, into: Temp) {
        self.emit(Instr::new(
            Opcode::Move,
            Operand::Const(value),
            Operand::Empty,
            Operand::Temp(into),
        ));
    }
}

fn const_of(literal: crate::tree::Literal) -> ConstValue {
    match literal {
        crate::tree::Literal::Bool(b) => ConstValue::Bool(b),
        crate::tree::Literal::Int(i) => ConstValue::Int(i),
        crate::tree::Literal::Real(r) => ConstValue::Real(r),
    }
}

fn binary_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Sum,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::Eq => Opcode::Eq,
        BinOp::Ne => Opcode::Ne,
        BinOp::Lt => Opcode::Lt,
        BinOp::Le => Opcode::Le,
        BinOp::Gt => Opcode::Gt,
        BinOp::Ge => Opcode::Ge,
        // Short-circuit operators never reach the opcode map.
        BinOp::Or | BinOp::And => unreachable!("short-circuit operators lower to branches"),
    }
}

fn unresolved(var: &VarRef, what: &str) -> CompileError {
    CompileError::invalid_operand(format!(
        "variable \"{}\" reached the backend without a resolved {what}",
        var.name
    ))
}

fn untyped(expr: &Expr) -> CompileError {
    CompileError::invalid_operand(format!(
        "expression at line {} reached the backend without a resolved type",
        expr.line()
    ))
}
