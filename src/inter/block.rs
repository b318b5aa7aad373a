//! Basic blocks and the generated IR.

use std::fmt;

use hashbrown::HashMap;

use super::{Instr, Label, Temp};

/// Index of a block in the CFG arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A maximal straight-line instruction sequence. Successor/predecessor
/// lists hold arena indices, never ownership.
#[derive(Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub succs: Vec<BlockId>,
    pub preds: Vec<BlockId>,
}

impl BasicBlock {
    pub(super) fn new(id: BlockId) -> Self {
        Self { id, instrs: Vec::new(), succs: Vec::new(), preds: Vec::new() }
    }
}

/// Output of the IR generator: the block arena, the blocks in program
/// order, and the maps the later phases key off.
#[derive(Debug)]
pub struct Ir {
    /// Block arena indexed by [`BlockId`].
    pub blocks: Vec<BasicBlock>,
    /// Blocks in program order; their concatenation is the instruction
    /// stream every later phase consumes.
    pub sequence: Vec<BlockId>,
    /// Label identity to the block it starts.
    pub label_blocks: HashMap<Label, BlockId>,
    /// `(variable name, scope)` to its backing temporary.
    pub var_temps: HashMap<(String, u32), Temp>,
}

impl Ir {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// The unique entry block.
    pub fn entry(&self) -> BlockId {
        self.sequence[0]
    }

    /// Instructions in program order across all blocks.
    pub fn instrs(&self) -> impl Iterator<Item = &Instr> + '_ {
        self.sequence.iter().flat_map(|id| self.block(*id).instrs.iter())
    }

    /// Render the CFG in Graphviz DOT form for inspection.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph cfg {\n");
        out.push_str("\tnode [shape=box, fontname=\"monospace\"];\n");
        for &id in &self.sequence {
            let block = self.block(id);
            let mut label = String::new();
            for instr in &block.instrs {
                label.push_str(&instr.to_string());
                label.push_str("\\l");
            }
            out.push_str(&format!("\t{id} [label=\"{label}\", xlabel=\"{id}\"];\n"));
            for succ in &block.succs {
                out.push_str(&format!("\t{id} -> {succ};\n"));
            }
        }
        out.push_str("}\n");
        out
    }
}

impl fmt::Display for Ir {
    /// One instruction per line, in the debug surface syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in self.instrs() {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}
