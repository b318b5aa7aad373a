//! The intermediate representation: operands, three-address instructions,
//! basic blocks, the IR generator and a direct interpreter.

mod block;
mod generator;
mod instr;
mod interp;
mod operand;

pub use block::{BasicBlock, BlockId, Ir};
pub use generator::generate;
pub use instr::{Instr, Opcode};
pub use interp::Interpreter;
pub use operand::{ConstValue, Label, Operand, Temp};
