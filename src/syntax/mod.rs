//! Recursive-descent parser with panic-mode recovery.
//!
//! Statement lists recover from syntax errors by recording a diagnostic and
//! resynchronizing to the next statement-start token, so a single run
//! reports every malformed statement instead of stopping at the first.

use crate::error::{CompileError, CompileResult};
use crate::lex::{Lexer, Tag, Token};
use crate::semantic::Type;
use crate::tree::{BinOp, Expr, Literal, Program, Stmt, UnOp, VarRef};

/// Tokens that can begin a statement; panic-mode recovery skips to one of
/// these (or to the end of the enclosing block).
const SYNC_SET: [Tag; 10] =
    [Tag::Eof, Tag::Begin, Tag::If, Tag::While, Tag::Write, Tag::Read, Tag::Int, Tag::Real, Tag::Bool, Tag::End];

/// Parse a whole DL compilation unit.
pub fn parse(source: &str) -> Result<Program, Vec<CompileError>> {
    let mut lexer = Lexer::new(source);
    let lookahead = lexer.next_token();
    let mut parser = Parser { lexer, lookahead, diagnostics: Vec::new() };
    match parser.program() {
        Ok(program) if parser.diagnostics.is_empty() => Ok(program),
        Ok(_) => Err(parser.diagnostics),
        Err(error) => {
            parser.diagnostics.push(error);
            Err(parser.diagnostics)
        }
    }
}

struct Parser {
    lexer: Lexer,
    lookahead: Token,
    diagnostics: Vec<CompileError>,
}

impl Parser {
    fn advance(&mut self) -> Token {
        std::mem::replace(&mut self.lookahead, self.lexer.next_token())
    }

    fn expect(&mut self, tag: Tag) -> CompileResult<Token> {
        if self.lookahead.tag == tag {
            Ok(self.advance())
        } else {
            Err(CompileError::syntax(
                self.lookahead.line,
                format!("expected \"{tag}\", found \"{}\"", self.lookahead.describe()),
            ))
        }
    }

    fn synchronize(&mut self) {
        while !SYNC_SET.contains(&self.lookahead.tag) {
            self.advance();
        }
    }

    fn program(&mut self) -> CompileResult<Program> {
        let program_tok = self.expect(Tag::Program)?;
        let name_tok = self.expect(Tag::Id)?;
        let body = self.stmt()?;
        self.expect(Tag::Dot)?;
        self.expect(Tag::Eof)?;
        Ok(Program { name: name_tok.lexeme, line: program_tok.line, body })
    }

    fn stmt(&mut self) -> CompileResult<Stmt> {
        match self.lookahead.tag {
            Tag::Begin => self.block(),
            Tag::Int | Tag::Real | Tag::Bool => self.decl(),
            Tag::Id => self.assign(),
            Tag::If => self.if_stmt(),
            Tag::While => self.while_stmt(),
            Tag::Write => self.write_stmt(),
            Tag::Read => self.read_stmt(),
            _ => Err(CompileError::syntax(
                self.lookahead.line,
                format!("\"{}\" is not a valid statement", self.lookahead.describe()),
            )),
        }
    }

    fn block(&mut self) -> CompileResult<Stmt> {
        self.expect(Tag::Begin)?;
        let mut stmts = Vec::new();
        while !matches!(self.lookahead.tag, Tag::End | Tag::Eof) {
            let result = self.stmt().and_then(|stmt| {
                self.expect(Tag::Semi)?;
                Ok(stmt)
            });
            match result {
                Ok(stmt) => stmts.push(stmt),
                Err(error) => {
                    self.diagnostics.push(error);
                    self.synchronize();
                }
            }
        }
        self.expect(Tag::End)?;
        Ok(Stmt::Block(stmts))
    }

    fn decl(&mut self) -> CompileResult<Stmt> {
        let type_tok = self.advance();
        let ty = match type_tok.tag {
            Tag::Int => Type::Int,
            Tag::Real => Type::Real,
            _ => Type::Bool,
        };
        let mut vars = Vec::new();
        let name = self.expect(Tag::Id)?;
        vars.push(VarRef::new(name.lexeme, name.line));
        while self.lookahead.tag == Tag::Comma {
            self.advance();
            let name = self.expect(Tag::Id)?;
            vars.push(VarRef::new(name.lexeme, name.line));
        }
        Ok(Stmt::Decl { ty, vars, line: type_tok.line })
    }

    fn assign(&mut self) -> CompileResult<Stmt> {
        let var_tok = self.expect(Tag::Id)?;
        self.expect(Tag::Assign)?;
        let expr = self.expr()?;
        let line = var_tok.line;
        Ok(Stmt::Assign { var: VarRef::new(var_tok.lexeme, line), expr, line })
    }

    fn if_stmt(&mut self) -> CompileResult<Stmt> {
        let if_tok = self.expect(Tag::If)?;
        self.expect(Tag::LParen)?;
        let cond = self.expr()?;
        self.expect(Tag::RParen)?;
        let then_body = Box::new(self.stmt()?);
        if self.lookahead.tag != Tag::Else {
            return Ok(Stmt::If { cond, then_body, line: if_tok.line });
        }
        self.advance();
        let else_body = Box::new(self.stmt()?);
        Ok(Stmt::IfElse { cond, then_body, else_body, line: if_tok.line })
    }

    fn while_stmt(&mut self) -> CompileResult<Stmt> {
        let while_tok = self.expect(Tag::While)?;
        self.expect(Tag::LParen)?;
        let cond = self.expr()?;
        self.expect(Tag::RParen)?;
        let body = Box::new(self.stmt()?);
        Ok(Stmt::While { cond, body, line: while_tok.line })
    }

    fn write_stmt(&mut self) -> CompileResult<Stmt> {
        let write_tok = self.expect(Tag::Write)?;
        self.expect(Tag::LParen)?;
        let expr = self.expr()?;
        self.expect(Tag::RParen)?;
        Ok(Stmt::Write { expr, line: write_tok.line })
    }

    fn read_stmt(&mut self) -> CompileResult<Stmt> {
        let read_tok = self.expect(Tag::Read)?;
        self.expect(Tag::LParen)?;
        let name = self.expect(Tag::Id)?;
        self.expect(Tag::RParen)?;
        Ok(Stmt::Read { var: VarRef::new(name.lexeme, name.line), line: read_tok.line })
    }

    // Expression precedence, lowest first: | & (== !=) (< <= > >=) (+ -) (* / %) unary factor.

    fn expr(&mut self) -> CompileResult<Expr> {
        self.left_assoc(&[(Tag::Or, BinOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> CompileResult<Expr> {
        self.left_assoc(&[(Tag::And, BinOp::And)], Self::equality)
    }

    fn equality(&mut self) -> CompileResult<Expr> {
        self.left_assoc(&[(Tag::Eq, BinOp::Eq), (Tag::Ne, BinOp::Ne)], Self::relational)
    }

    fn relational(&mut self) -> CompileResult<Expr> {
        self.left_assoc(
            &[(Tag::Lt, BinOp::Lt), (Tag::Le, BinOp::Le), (Tag::Gt, BinOp::Gt), (Tag::Ge, BinOp::Ge)],
            Self::arith,
        )
    }

    fn arith(&mut self) -> CompileResult<Expr> {
        self.left_assoc(&[(Tag::Sum, BinOp::Add), (Tag::Sub, BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> CompileResult<Expr> {
        self.left_assoc(
            &[(Tag::Mul, BinOp::Mul), (Tag::Div, BinOp::Div), (Tag::Mod, BinOp::Mod)],
            Self::unary,
        )
    }

    fn left_assoc(
        &mut self,
        ops: &[(Tag, BinOp)],
        next: fn(&mut Self) -> CompileResult<Expr>,
    ) -> CompileResult<Expr> {
        let mut expr = next(self)?;
        while let Some(&(_, op)) = ops.iter().find(|(tag, _)| *tag == self.lookahead.tag) {
            let op_tok = self.advance();
            let rhs = next(self)?;
            expr = Expr::Binary {
                op,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
                ty: None,
                line: op_tok.line,
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> CompileResult<Expr> {
        let op = match self.lookahead.tag {
            Tag::Sum => UnOp::Plus,
            Tag::Sub => UnOp::Minus,
            Tag::Not => UnOp::Not,
            _ => return self.factor(),
        };
        let op_tok = self.advance();
        let operand = Box::new(self.unary()?);
        Ok(Expr::Unary { op, operand, ty: None, line: op_tok.line })
    }

    fn factor(&mut self) -> CompileResult<Expr> {
        match self.lookahead.tag {
            Tag::LParen => {
                self.advance();
                let expr = self.expr()?;
                self.expect(Tag::RParen)?;
                Ok(expr)
            }
            Tag::LitInt => {
                let token = self.advance();
                let value = token.lexeme.parse::<i32>().map_err(|_| {
                    CompileError::syntax(token.line, format!("integer literal \"{}\" out of range", token.lexeme))
                })?;
                Ok(Expr::Literal { value: Literal::Int(value), line: token.line })
            }
            Tag::LitReal => {
                let token = self.advance();
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    CompileError::syntax(token.line, format!("malformed real literal \"{}\"", token.lexeme))
                })?;
                Ok(Expr::Literal { value: Literal::Real(value), line: token.line })
            }
            Tag::LitTrue | Tag::LitFalse => {
                let token = self.advance();
                let value = token.tag == Tag::LitTrue;
                Ok(Expr::Literal { value: Literal::Bool(value), line: token.line })
            }
            Tag::Id => {
                let token = self.advance();
                Ok(Expr::Var(VarRef::new(token.lexeme, token.line)))
            }
            _ => Err(CompileError::syntax(
                self.lookahead.line,
                format!("\"{}\" is not a valid expression", self.lookahead.describe()),
            )),
        }
    }
}
