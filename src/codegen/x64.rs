//! x86-64 assembly emission, Intel syntax, SysV AMD64 ABI.
//!
//! The generator lowers the flattened instruction stream plus the register
//! allocation into text destined for an external assembler/linker against a
//! C runtime (`printf`/`scanf`/`fmod`). Values move through the `eax`/`xmm0`
//! accumulators; operands resolve to immediates, `.rodata` references,
//! registers or frame slots.

use hashbrown::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::inter::{ConstValue, Instr, Ir, Opcode, Operand};
use crate::semantic::Type;

use super::live_range::compute_live_ranges;
use super::reg_alloc::{allocate, RegisterAllocation};

/// Allocatable 32-bit general-purpose registers (callee-saved set).
pub const INT_REGISTERS: [&str; 4] = ["r12d", "r13d", "r14d", "r15d"];

/// Allocatable SSE registers, clear of the call/return scratch ones.
pub const FLOAT_REGISTERS: [&str; 8] =
    ["xmm8", "xmm9", "xmm10", "xmm11", "xmm12", "xmm13", "xmm14", "xmm15"];

pub struct X64CodeGenerator<'ir> {
    ir: &'ir Ir,
    alloc: RegisterAllocation,
    lines: Vec<String>,
    /// Deduplicated float constants in first-occurrence order.
    float_consts: Vec<(String, f64)>,
    float_const_index: HashMap<u64, usize>,
}

impl<'ir> X64CodeGenerator<'ir> {
    pub fn new(ir: &'ir Ir) -> Self {
        let ranges = compute_live_ranges(ir);
        let alloc = allocate(&ranges, &INT_REGISTERS, &FLOAT_REGISTERS);
        Self {
            ir,
            alloc,
            lines: Vec::new(),
            float_consts: Vec::new(),
            float_const_index: HashMap::new(),
        }
    }

    /// Produce the complete assembly artifact.
    pub fn generate(mut self) -> CompileResult<String> {
        self.prologue();
        let instrs: Vec<Instr> = self.ir.instrs().copied().collect();
        for instr in &instrs {
            self.lower(instr)?;
        }
        self.epilogue();
        self.runtime_helpers();
        self.rodata();
        Ok(self.lines.join("\n") + "\n")
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn prologue(&mut self) {
        let frame_size = self.alloc.frame_size();
        self.push("# Assemble with: gcc prog.s -o prog -lm");
        self.push(".intel_syntax noprefix");
        self.push("");
        self.push(".section .text");
        self.push(".globl main");
        self.push(".extern printf");
        self.push("");
        self.push("main:");
        self.push("\t# stack frame");
        self.push("\tpush rbp");
        self.push("\tmov rbp, rsp");
        self.push(format!("\tsub rsp, {frame_size}"));
        self.push("");
    }

    fn epilogue(&mut self) {
        self.push("\t# exit with status 0");
        self.push("\tleave");
        self.push("\tmov eax, 0");
        self.push("\tret");
    }

    /// Resolve an operand to its assembly spelling. Anything that is neither
    /// a label, a constant, an allocated register nor a spill slot is an
    /// internal invariant violation.
    fn resolve(&mut self, operand: Operand) -> CompileResult<String> {
        match operand {
            Operand::Label(label) => Ok(label.to_string()),
            Operand::Const(ConstValue::Real(value)) => {
                let symbol = self.float_symbol(value);
                Ok(format!("[rip + {symbol}]"))
            }
            Operand::Const(value) => Ok(value.to_string()),
            Operand::Temp(temp) => {
                if let Some(reg) = self.alloc.registers.get(&temp) {
                    Ok((*reg).to_string())
                } else if let Some(offset) = self.alloc.spills.get(&temp) {
                    Ok(format!("[rbp - {offset}]"))
                } else {
                    Err(CompileError::invalid_operand(format!(
                        "temporary {temp} has neither a register nor a spill slot"
                    )))
                }
            }
            Operand::Empty => {
                Err(CompileError::invalid_operand("tried to resolve an empty operand slot"))
            }
        }
    }

    /// `.rodata` symbol for a float constant; the first occurrence of a
    /// value names the entry, later uses share it.
    fn float_symbol(&mut self, value: f64) -> String {
        let bits = value.to_bits();
        if let Some(&index) = self.float_const_index.get(&bits) {
            return self.float_consts[index].0.clone();
        }
        let symbol = format!("const_{}", self.float_consts.len());
        self.float_const_index.insert(bits, self.float_consts.len());
        self.float_consts.push((symbol.clone(), value));
        symbol
    }

    fn operand_type(&self, operand: Operand, instr: &Instr) -> CompileResult<Type> {
        operand.ty().ok_or_else(|| {
            CompileError::invalid_operand(format!("instruction \"{instr}\" lacks a typed operand"))
        })
    }

    fn lower(&mut self, instr: &Instr) -> CompileResult<()> {
        self.push(format!("\t# {instr}"));
        match instr.op {
            Opcode::Label => {
                let target = self.resolve(instr.result)?;
                self.push(format!("\t{target}:"));
            }
            Opcode::Goto => {
                let target = self.resolve(instr.result)?;
                self.push(format!("\tjmp {target}"));
            }
            Opcode::If | Opcode::IfFalse => {
                let ty = self.operand_type(instr.arg1, instr)?;
                if ty.is_float() {
                    return Err(CompileError::UnsupportedLowering { op: instr.op, ty });
                }
                let arg = self.resolve(instr.arg1)?;
                let target = self.resolve(instr.result)?;
                let jcc = if instr.op == Opcode::If { "jne" } else { "je" };
                self.push(format!("\tmov eax, {arg}"));
                self.push("\tcmp eax, 0");
                self.push(format!("\t{jcc} {target}"));
            }
            Opcode::Print => {
                let ty = self.operand_type(instr.arg1, instr)?;
                let arg = self.resolve(instr.arg1)?;
                let (mov, dst, helper) = if ty.is_float() {
                    ("movsd", "xmm0", "print_double")
                } else {
                    ("mov", "edi", "print_int")
                };
                self.push(format!("\t{mov} {dst}, {arg}"));
                self.push(format!("\tcall {helper}"));
            }
            Opcode::Read => {
                let ty = self.operand_type(instr.result, instr)?;
                let result = self.resolve(instr.result)?;
                let (mov, acc, helper) = if ty.is_float() {
                    ("movsd", "xmm0", "read_double")
                } else {
                    ("mov", "eax", "read_int")
                };
                self.push(format!("\tcall {helper}"));
                self.push(format!("\t{mov} {result}, {acc}"));
            }
            // Unary plus is an identity move; the result still has to be
            // materialized in its own location.
            Opcode::Move | Opcode::Plus => {
                let ty = self.operand_type(instr.arg1, instr)?;
                let (mov, acc) = mov_acc(ty);
                let arg = self.resolve(instr.arg1)?;
                let result = self.resolve(instr.result)?;
                self.push(format!("\t{mov} {acc}, {arg}"));
                self.push(format!("\t{mov} {result}, {acc}"));
            }
            Opcode::Convert => {
                let ty = self.operand_type(instr.arg1, instr)?;
                if ty.is_float() {
                    return Err(CompileError::UnsupportedLowering { op: instr.op, ty });
                }
                let arg = self.resolve(instr.arg1)?;
                let result = self.resolve(instr.result)?;
                self.push(format!("\tmov eax, {arg}"));
                self.push("\tcvtsi2sd xmm0, eax");
                self.push(format!("\tmovsd {result}, xmm0"));
            }
            Opcode::Minus => {
                let ty = self.operand_type(instr.arg1, instr)?;
                let arg = self.resolve(instr.arg1)?;
                let result = self.resolve(instr.result)?;
                if ty.is_float() {
                    // No float `neg`; subtract from positive zero instead.
                    self.push("\txorpd xmm0, xmm0");
                    self.push(format!("\tsubsd xmm0, {arg}"));
                    self.push(format!("\tmovsd {result}, xmm0"));
                } else {
                    self.push(format!("\tmov eax, {arg}"));
                    self.push("\tneg eax");
                    self.push(format!("\tmov {result}, eax"));
                }
            }
            Opcode::Not => {
                let ty = self.operand_type(instr.arg1, instr)?;
                if ty.is_float() {
                    return Err(CompileError::UnsupportedLowering { op: instr.op, ty });
                }
                let arg = self.resolve(instr.arg1)?;
                let result = self.resolve(instr.result)?;
                self.push(format!("\tmov eax, {arg}"));
                self.push("\txor eax, 1");
                self.push(format!("\tmov {result}, eax"));
            }
            op if op.is_relational() => {
                let ty = self.operand_type(instr.arg1, instr)?;
                let arg1 = self.resolve(instr.arg1)?;
                let arg2 = self.resolve(instr.arg2)?;
                let result = self.resolve(instr.result)?;
                let (mov, acc) = mov_acc(ty);
                // The float compare sets flags like an unsigned integer
                // compare, hence the below/above condition codes.
                let (cmp, setcc) = if ty.is_float() {
                    ("ucomisd", float_setcc(op))
                } else {
                    ("cmp", int_setcc(op))
                };
                self.push(format!("\t{mov} {acc}, {arg1}"));
                self.push(format!("\t{cmp} {acc}, {arg2}"));
                self.push(format!("\t{setcc} al"));
                self.push("\tmovzx eax, al");
                self.push(format!("\tmov {result}, eax"));
            }
            Opcode::Div | Opcode::Mod => {
                let ty = self.operand_type(instr.arg1, instr)?;
                let arg1 = self.resolve(instr.arg1)?;
                let arg2 = self.resolve(instr.arg2)?;
                let result = self.resolve(instr.result)?;
                if ty.is_float() {
                    if instr.op == Opcode::Div {
                        self.push(format!("\tmovsd xmm0, {arg1}"));
                        self.push(format!("\tdivsd xmm0, {arg2}"));
                        self.push(format!("\tmovsd {result}, xmm0"));
                    } else {
                        // Float remainder goes through the C runtime.
                        self.push(format!("\tmovsd xmm0, {arg1}"));
                        self.push(format!("\tmovsd xmm1, {arg2}"));
                        self.push("\tcall fmod@PLT");
                        self.push(format!("\tmovsd {result}, xmm0"));
                    }
                } else {
                    let out = if instr.op == Opcode::Div { "eax" } else { "edx" };
                    self.push(format!("\tmov eax, {arg1}"));
                    self.push("\tcdq");
                    self.push(format!("\tmov ecx, {arg2}"));
                    self.push("\tidiv ecx");
                    self.push(format!("\tmov {result}, {out}"));
                }
            }
            Opcode::Sum | Opcode::Sub | Opcode::Mul => {
                let ty = self.operand_type(instr.arg1, instr)?;
                let arg1 = self.resolve(instr.arg1)?;
                let arg2 = self.resolve(instr.arg2)?;
                let result = self.resolve(instr.result)?;
                let (mov, acc) = mov_acc(ty);
                let mnemonic = match (instr.op, ty.is_float()) {
                    (Opcode::Sum, false) => "add",
                    (Opcode::Sub, false) => "sub",
                    (Opcode::Mul, false) => "imul",
                    (Opcode::Sum, true) => "addsd",
                    (Opcode::Sub, true) => "subsd",
                    _ => "mulsd",
                };
                self.push(format!("\t{mov} {acc}, {arg1}"));
                self.push(format!("\t{mnemonic} {acc}, {arg2}"));
                self.push(format!("\t{mov} {result}, {acc}"));
            }
            op => {
                let ty = instr.arg1.ty().unwrap_or(Type::Int);
                return Err(CompileError::UnsupportedLowering { op, ty });
            }
        }
        Ok(())
    }

    fn runtime_helpers(&mut self) {
        for line in RUNTIME_HELPERS.lines() {
            self.push(line);
        }
    }

    fn rodata(&mut self) {
        self.push("");
        self.push(".section .rodata");
        self.push("\tstr_input_prompt: .string \"input: \"");
        self.push("\tfmt_in_int:      .string \"%d\"");
        self.push("\tfmt_in_double:   .string \"%lf\"");
        self.push("\tfmt_out_int:     .string \"output: %d\\n\"");
        self.push("\tfmt_out_double:  .string \"output: %.4lf\\n\"");
        for (symbol, value) in std::mem::take(&mut self.float_consts) {
            self.push(format!("\t{symbol}: .double {value:?}"));
        }
        self.push("");
        self.push(".section .note.GNU-stack,\"\",@progbits");
    }
}

fn mov_acc(ty: Type) -> (&'static str, &'static str) {
    if ty.is_float() {
        ("movsd", "xmm0")
    } else {
        ("mov", "eax")
    }
}

fn int_setcc(op: Opcode) -> &'static str {
    match op {
        Opcode::Eq => "sete",
        Opcode::Ne => "setne",
        Opcode::Lt => "setl",
        Opcode::Le => "setle",
        Opcode::Gt => "setg",
        _ => "setge",
    }
}

fn float_setcc(op: Opcode) -> &'static str {
    match op {
        Opcode::Eq => "sete",
        Opcode::Ne => "setne",
        Opcode::Lt => "setb",
        Opcode::Le => "setbe",
        Opcode::Gt => "seta",
        _ => "setae",
    }
}

/// Console I/O routines shared by every compiled program. Emitted once,
/// after the program body.
const RUNTIME_HELPERS: &str = r#"
# ---------------------------------------------------------
# Routine: print_int (argument in edi)
# ---------------------------------------------------------
print_int:
    push rbp
    mov rbp, rsp
    sub rsp, 16
    mov esi, edi
    lea rdi, [rip + fmt_out_int]
    xor eax, eax
    call printf@PLT
    leave
    ret

# ---------------------------------------------------------
# Routine: print_double (argument in xmm0)
# ---------------------------------------------------------
print_double:
    push rbp
    mov rbp, rsp
    sub rsp, 16
    lea rdi, [rip + fmt_out_double]
    mov eax, 1                      # one vector register carries arguments
    call printf@PLT
    leave
    ret

# ---------------------------------------------------------
# Routine: read_int (returns the value in eax)
# ---------------------------------------------------------
read_int:
    push rbp
    mov rbp, rsp
    sub rsp, 16
    lea rdi, [rip + str_input_prompt]
    xor eax, eax
    call printf@PLT
    lea rdi, [rip + fmt_in_int]
    lea rsi, [rbp - 4]
    xor eax, eax
    call scanf@PLT
    mov eax, [rbp - 4]
    leave
    ret

# ---------------------------------------------------------
# Routine: read_double (returns the value in xmm0)
# ---------------------------------------------------------
read_double:
    push rbp
    mov rbp, rsp
    sub rsp, 16
    lea rdi, [rip + str_input_prompt]
    xor eax, eax
    call printf@PLT
    lea rdi, [rip + fmt_in_double]
    lea rsi, [rbp - 8]
    xor eax, eax
    call scanf@PLT
    movsd xmm0, [rbp - 8]
    leave
    ret"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower;

    fn asm_for(source: &str) -> String {
        let ir = lower(source).unwrap();
        X64CodeGenerator::new(&ir).generate().unwrap()
    }

    #[test]
    fn frame_allocation_is_sixteen_byte_aligned() {
        let asm = asm_for("programa p inicio inteiro a; a = 1; escreva(a); fim.");
        let sub = asm.lines().find(|l| l.trim_start().starts_with("sub rsp, ")).unwrap();
        let bytes: u32 = sub.trim_start().trim_start_matches("sub rsp, ").parse().unwrap();
        assert_eq!(bytes % 16, 0);
    }

    #[test]
    fn float_constants_are_deduplicated() {
        let asm = asm_for(
            "programa p inicio real x; real y; x = 3.1415; y = 3.1415; escreva(x + y); fim.",
        );
        let entries: Vec<_> = asm.lines().filter(|l| l.contains(".double")).collect();
        assert_eq!(entries, vec!["\tconst_0: .double 3.1415"]);
        // Both use sites reference the single entry.
        assert_eq!(asm.matches("[rip + const_0]").count(), 2);
    }

    #[test]
    fn integer_division_uses_the_widening_form() {
        let asm = asm_for("programa p inicio inteiro a; a = 7 / 2; escreva(a); fim.");
        assert!(asm.contains("cdq"));
        assert!(asm.contains("idiv ecx"));
    }

    #[test]
    fn float_compare_uses_unsigned_condition_codes() {
        let asm = asm_for(
            "programa p inicio real x; booleano b; x = 1.5; b = x < 2.5; escreva(b); fim.",
        );
        assert!(asm.contains("ucomisd"));
        assert!(asm.contains("setb al"));
        assert!(!asm.contains("setl al"));
    }

    #[test]
    fn helpers_and_sections_are_emitted_once() {
        let asm = asm_for("programa p inicio inteiro a; leia(a); escreva(a); fim.");
        for marker in ["print_int:", "print_double:", "read_int:", "read_double:"] {
            assert_eq!(asm.matches(marker).count(), 1, "{marker}");
        }
        assert_eq!(asm.matches(".section .rodata").count(), 1);
        assert!(asm.contains(".section .note.GNU-stack"));
    }
}
