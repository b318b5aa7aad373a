//! Direct execution of the generated CFG.
//!
//! The interpreter validates the IR before native code generation: for any
//! program free of undefined operations, interpreting the IR and running
//! the generated assembly must print the same `output:` lines.

use std::io::{BufRead, Write};

use hashbrown::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::semantic::Type;

use super::{BlockId, ConstValue, Instr, Ir, Opcode, Operand, Temp};

pub struct Interpreter<'ir, R, W> {
    ir: &'ir Ir,
    input: R,
    output: W,
    values: HashMap<Temp, ConstValue>,
    /// Position of each block in the program-order sequence, for
    /// fallthrough stepping.
    positions: HashMap<BlockId, usize>,
}

impl<'ir, R: BufRead, W: Write> Interpreter<'ir, R, W> {
    pub fn new(ir: &'ir Ir, input: R, output: W) -> Self {
        let positions = ir.sequence.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        Self { ir, input, output, values: HashMap::new(), positions }
    }

    /// Execute from the entry block until the program order runs out.
    pub fn run(&mut self) -> CompileResult<()> {
        let mut pos = 0;
        while pos < self.ir.sequence.len() {
            let block = self.ir.block(self.ir.sequence[pos]);
            let mut jump = None;
            for instr in &block.instrs {
                if let Some(target) = self.step(instr)? {
                    jump = Some(target);
                    break;
                }
            }
            pos = match jump {
                Some(block) => *self.positions.get(&block).ok_or_else(|| {
                    CompileError::invalid_operand(format!("jump target {block} is not in program order"))
                })?,
                None => pos + 1,
            };
        }
        Ok(())
    }

    /// Execute one instruction; a `Some` is a taken control transfer.
    fn step(&mut self, instr: &Instr) -> CompileResult<Option<BlockId>> {
        match instr.op {
            Opcode::Label => Ok(None),
            Opcode::Goto => self.target(instr).map(Some),
            Opcode::If => {
                if truthy(self.value(instr.arg1)?) {
                    self.target(instr).map(Some)
                } else {
                    Ok(None)
                }
            }
            Opcode::IfFalse => {
                if !truthy(self.value(instr.arg1)?) {
                    self.target(instr).map(Some)
                } else {
                    Ok(None)
                }
            }
            Opcode::Print => {
                match self.value(instr.arg1)? {
                    ConstValue::Real(r) => writeln!(self.output, "output: {r:.4}")?,
                    ConstValue::Int(i) => writeln!(self.output, "output: {i}")?,
                    ConstValue::Bool(b) => writeln!(self.output, "output: {}", b as i32)?,
                }
                Ok(None)
            }
            Opcode::Read => {
                let value = self.read(instr)?;
                self.set(instr.result, value)?;
                Ok(None)
            }
            Opcode::Move => {
                let value = self.value(instr.arg1)?;
                self.set(instr.result, value)?;
                Ok(None)
            }
            Opcode::Convert | Opcode::Plus | Opcode::Minus | Opcode::Not => {
                let value = unary(instr.op, self.value(instr.arg1)?)?;
                self.set(instr.result, value)?;
                Ok(None)
            }
            _ => {
                let value = binary(instr.op, self.value(instr.arg1)?, self.value(instr.arg2)?)?;
                self.set(instr.result, value)?;
                Ok(None)
            }
        }
    }

    fn target(&self, instr: &Instr) -> CompileResult<BlockId> {
        let label = instr
            .result
            .as_label()
            .ok_or_else(|| CompileError::invalid_operand("control transfer without a label target"))?;
        self.ir
            .label_blocks
            .get(&label)
            .copied()
            .ok_or_else(|| CompileError::invalid_operand(format!("no block registered for {label}")))
    }

    fn value(&self, operand: Operand) -> CompileResult<ConstValue> {
        match operand {
            Operand::Const(c) => Ok(c),
            Operand::Temp(t) => self.values.get(&t).copied().ok_or_else(|| CompileError::Runtime {
                reason: format!("read of temporary {t} before any value was assigned"),
            }),
            Operand::Label(_) | Operand::Empty => {
                Err(CompileError::invalid_operand("expected a value operand"))
            }
        }
    }

    fn set(&mut self, operand: Operand, value: ConstValue) -> CompileResult<()> {
        let temp = operand
            .as_temp()
            .ok_or_else(|| CompileError::invalid_operand("result slot is not a temporary"))?;
        self.values.insert(temp, value);
        Ok(())
    }

    fn read(&mut self, instr: &Instr) -> CompileResult<ConstValue> {
        let temp = instr
            .result
            .as_temp()
            .ok_or_else(|| CompileError::invalid_operand("read into a non-temporary"))?;
        write!(self.output, "input: ")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let text = line.trim();
        let parsed = match temp.ty {
            Type::Bool => text.parse::<i32>().map(|i| ConstValue::Bool(i != 0)).ok(),
            Type::Int => text.parse::<i32>().map(ConstValue::Int).ok(),
            Type::Real => text.parse::<f64>().map(ConstValue::Real).ok(),
        };
        parsed.ok_or_else(|| CompileError::Runtime {
            reason: format!("invalid {} input \"{text}\"", temp.ty),
        })
    }
}

fn truthy(value: ConstValue) -> bool {
    match value {
        ConstValue::Bool(b) => b,
        ConstValue::Int(i) => i != 0,
        ConstValue::Real(r) => r != 0.0,
    }
}

fn unary(op: Opcode, value: ConstValue) -> CompileResult<ConstValue> {
    use ConstValue::*;
    Ok(match (op, value) {
        (Opcode::Convert, Int(i)) => Real(i as f64),
        (Opcode::Plus, v) => v,
        (Opcode::Minus, Int(i)) => Int(i.wrapping_neg()),
        (Opcode::Minus, Real(r)) => Real(-r),
        (Opcode::Not, Bool(b)) => Bool(!b),
        _ => {
            return Err(CompileError::invalid_operand(format!(
                "unary {op:?} applied to {value:?}"
            )))
        }
    })
}

/// Integer arithmetic wraps at 32 bits and truncates on division, matching
/// the generated machine code.
fn binary(op: Opcode, a: ConstValue, b: ConstValue) -> CompileResult<ConstValue> {
    use ConstValue::*;
    let mismatched =
        || CompileError::invalid_operand(format!("binary {op:?} applied to {a:?} and {b:?}"));
    let div_by_zero = || CompileError::Runtime { reason: "division by zero".into() };
    Ok(match (a, b) {
        (Int(a), Int(b)) => match op {
            Opcode::Sum => Int(a.wrapping_add(b)),
            Opcode::Sub => Int(a.wrapping_sub(b)),
            Opcode::Mul => Int(a.wrapping_mul(b)),
            Opcode::Div => Int(a.checked_div(b).ok_or_else(div_by_zero)?),
            Opcode::Mod => Int(a.checked_rem(b).ok_or_else(div_by_zero)?),
            Opcode::Eq => Bool(a == b),
            Opcode::Ne => Bool(a != b),
            Opcode::Lt => Bool(a < b),
            Opcode::Le => Bool(a <= b),
            Opcode::Gt => Bool(a > b),
            Opcode::Ge => Bool(a >= b),
            _ => return Err(mismatched()),
        },
        (Real(a), Real(b)) => match op {
            Opcode::Sum => Real(a + b),
            Opcode::Sub => Real(a - b),
            Opcode::Mul => Real(a * b),
            Opcode::Div => Real(a / b),
            Opcode::Mod => Real(a % b),
            Opcode::Eq => Bool(a == b),
            Opcode::Ne => Bool(a != b),
            Opcode::Lt => Bool(a < b),
            Opcode::Le => Bool(a <= b),
            Opcode::Gt => Bool(a > b),
            Opcode::Ge => Bool(a >= b),
            _ => return Err(mismatched()),
        },
        (Bool(a), Bool(b)) => match op {
            Opcode::Eq => Bool(a == b),
            Opcode::Ne => Bool(a != b),
            _ => return Err(mismatched()),
        },
        _ => return Err(mismatched()),
    })
}
