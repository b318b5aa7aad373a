//! Scope resolution and type checking over the parsed tree.
//!
//! The checker annotates every expression with its resolved type and every
//! variable reference with its declaring scope, inserting `Convert` nodes
//! where an int operand meets a real context. Diagnostics are collected
//! rather than failing fast, so one run reports every error in the program.

use crate::error::CompileError;
use crate::tree::{BinOp, Expr, Literal, Program, Stmt, UnOp, VarRef};

use super::env::ScopeStack;
use super::Type;

/// Check `program` in place. On failure every collected diagnostic is
/// returned; the pipeline must not proceed past a non-empty result.
pub fn check(program: &mut Program) -> Result<(), Vec<CompileError>> {
    let mut checker = Checker::new();
    checker.stmt(&mut program.body);
    checker.finish()
}

struct Checker {
    scopes: ScopeStack,
    diagnostics: Vec<CompileError>,
}

impl Checker {
    fn new() -> Self {
        let mut scopes = ScopeStack::new();
        scopes.push();
        Self { scopes, diagnostics: Vec::new() }
    }

    fn finish(mut self) -> Result<(), Vec<CompileError>> {
        self.leave_scope();
        if self.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(self.diagnostics)
        }
    }

    fn error(&mut self, line: u32, message: String) {
        self.diagnostics.push(CompileError::Semantic { line, message });
    }

    fn leave_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            for (name, info) in scope.symbols() {
                if !info.used {
                    log::warn!(
                        "variable \"{name}\" declared at line {} but never used",
                        info.declaration_line
                    );
                }
            }
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                self.scopes.push();
                for stmt in stmts {
                    self.stmt(stmt);
                }
                self.leave_scope();
            }
            Stmt::Decl { ty, vars, line } => {
                let (ty, line) = (*ty, *line);
                for var in vars {
                    match self.scopes.declare(&var.name, ty, line) {
                        Ok(scope) => {
                            var.ty = Some(ty);
                            var.scope = Some(scope);
                        }
                        Err(previous) => {
                            let name = var.name.clone();
                            self.error(
                                line,
                                format!(
                                    "variable \"{name}\" already declared in this scope (line {previous})"
                                ),
                            );
                        }
                    }
                }
            }
            Stmt::Assign { var, expr, line } => {
                let line = *line;
                let expr_ty = self.expr(expr);
                let var_ty = self.resolve_var(var);
                if let (Some(var_ty), Some(expr_ty)) = (var_ty, expr_ty) {
                    if var_ty == expr_ty {
                        // nothing to do
                    } else if expr_ty == Type::Int && var_ty == Type::Real {
                        coerce(expr, Type::Real);
                    } else {
                        let name = var.name.clone();
                        self.error(
                            line,
                            format!("cannot assign {expr_ty} to {var_ty} variable \"{name}\""),
                        );
                    }
                }
            }
            Stmt::If { cond, then_body, line } => {
                let line = *line;
                self.condition(cond, line);
                self.stmt(then_body);
            }
            Stmt::IfElse { cond, then_body, else_body, line } => {
                let line = *line;
                self.condition(cond, line);
                self.stmt(then_body);
                self.stmt(else_body);
            }
            Stmt::While { cond, body, line } => {
                let line = *line;
                self.condition(cond, line);
                self.stmt(body);
            }
            Stmt::Write { expr, .. } => {
                self.expr(expr);
            }
            Stmt::Read { var, .. } => {
                self.resolve_var(var);
            }
        }
    }

    fn condition(&mut self, cond: &mut Expr, line: u32) {
        if let Some(ty) = self.expr(cond) {
            if !ty.is_boolean() {
                self.error(line, format!("condition must be bool, found {ty}"));
            }
        }
    }

    fn resolve_var(&mut self, var: &mut VarRef) -> Option<Type> {
        match self.scopes.resolve(&var.name) {
            Some((ty, scope)) => {
                var.ty = Some(ty);
                var.scope = Some(scope);
                Some(ty)
            }
            None => {
                let name = var.name.clone();
                self.error(var.line, format!("undeclared variable \"{name}\""));
                None
            }
        }
    }

    /// Type an expression, annotating it in place. `None` means a diagnostic
    /// was already emitted somewhere below; callers stay quiet to avoid
    /// cascading errors.
    fn expr(&mut self, expr: &mut Expr) -> Option<Type> {
        match expr {
            Expr::Literal { value, .. } => Some(value.ty()),
            Expr::Var(var) => self.resolve_var(var),
            Expr::Convert { to, .. } => Some(*to),
            Expr::Unary { op, operand, ty, line } => {
                let (op, line) = (*op, *line);
                let operand_ty = self.expr(operand)?;
                let result = match op {
                    UnOp::Not if operand_ty.is_boolean() => operand_ty,
                    UnOp::Not => {
                        self.error(line, format!("operator \"!\" requires a bool operand, found {operand_ty}"));
                        return None;
                    }
                    UnOp::Plus | UnOp::Minus if operand_ty.is_numeric() => operand_ty,
                    UnOp::Plus | UnOp::Minus => {
                        self.error(
                            line,
                            format!("unary \"{op}\" requires a numeric operand, found {operand_ty}"),
                        );
                        return None;
                    }
                };
                *ty = Some(result);
                Some(result)
            }
            Expr::Binary { op, lhs, rhs, ty, line } => {
                let (op, line) = (*op, *line);
                let lhs_ty = self.expr(lhs);
                let rhs_ty = self.expr(rhs);
                let (lhs_ty, rhs_ty) = (lhs_ty?, rhs_ty?);
                let result = match op {
                    BinOp::Or | BinOp::And => {
                        if !lhs_ty.is_boolean() || !rhs_ty.is_boolean() {
                            self.error(
                                line,
                                format!("operator \"{op}\" requires bool operands, found {lhs_ty} and {rhs_ty}"),
                            );
                            return None;
                        }
                        Type::Bool
                    }
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                        let common = self.numeric_common(op, lhs_ty, rhs_ty, line)?;
                        coerce(lhs, common);
                        coerce(rhs, common);
                        common
                    }
                    BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                        let common = self.numeric_common(op, lhs_ty, rhs_ty, line)?;
                        coerce(lhs, common);
                        coerce(rhs, common);
                        Type::Bool
                    }
                    BinOp::Eq | BinOp::Ne => {
                        if lhs_ty == rhs_ty {
                            Type::Bool
                        } else if let Some(common) = Type::common(lhs_ty, rhs_ty) {
                            coerce(lhs, common);
                            coerce(rhs, common);
                            Type::Bool
                        } else {
                            self.error(line, format!("cannot compare {lhs_ty} with {rhs_ty}"));
                            return None;
                        }
                    }
                };
                *ty = Some(result);
                Some(result)
            }
        }
    }

    fn numeric_common(&mut self, op: BinOp, lhs: Type, rhs: Type, line: u32) -> Option<Type> {
        if lhs.is_numeric() && rhs.is_numeric() {
            Type::common(lhs, rhs)
        } else {
            self.error(
                line,
                format!("operator \"{op}\" requires numeric operands, found {lhs} and {rhs}"),
            );
            None
        }
    }
}

/// Wrap `expr` in a `Convert` node when its type differs from `to`.
fn coerce(expr: &mut Expr, to: Type) {
    if expr.ty() == Some(to) {
        return;
    }
    let line = expr.line();
    let inner = std::mem::replace(expr, Expr::Literal { value: Literal::Int(0), line });
    *expr = Expr::Convert { to, operand: Box::new(inner), line };
}
