//! Per-class live ranges over the flattened instruction stream.

use hashbrown::HashMap;

use crate::inter::{Ir, Label, Opcode, Operand, Temp};

/// First and last instruction index (program order across all blocks) at
/// which a temporary is live. `start <= end` always holds once defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub start: usize,
    pub end: usize,
}

/// Ranges of one register class, remembering first-appearance order so the
/// allocator can break start ties deterministically.
#[derive(Debug, Default)]
pub struct ClassRanges {
    order: Vec<Temp>,
    map: HashMap<Temp, LiveRange>,
}

impl ClassRanges {
    fn record(&mut self, temp: Temp, index: usize) {
        match self.map.get_mut(&temp) {
            Some(range) => range.end = index,
            None => {
                self.order.push(temp);
                self.map.insert(temp, LiveRange { start: index, end: index });
            }
        }
    }

    /// Extend across a back edge: anything live at the loop header survives
    /// to the closing branch.
    fn extend_across(&mut self, header: usize, branch: usize) {
        for range in self.map.values_mut() {
            if range.start <= header && range.end >= header {
                range.end = range.end.max(branch);
            }
        }
    }

    pub fn get(&self, temp: &Temp) -> Option<&LiveRange> {
        self.map.get(temp)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Temporaries in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (Temp, LiveRange)> + '_ {
        self.order.iter().map(|t| (*t, self.map[t]))
    }

    /// Intervals ordered by increasing start; ties keep first-appearance
    /// order (stable sort).
    pub fn sorted_by_start(&self) -> Vec<(Temp, LiveRange)> {
        let mut intervals: Vec<_> = self.iter().collect();
        intervals.sort_by_key(|(_, range)| range.start);
        intervals
    }
}

#[cfg(test)]
impl ClassRanges {
    /// Test-only hook so allocator tests can build ranges directly.
    pub(crate) fn record_for_test(&mut self, temp: Temp, index: usize) {
        self.record(temp, index);
    }
}

#[derive(Debug, Default)]
pub struct LiveRanges {
    pub int: ClassRanges,
    pub float: ClassRanges,
}

/// Single forward scan: every temporary operand extends its range to the
/// current index, in the class picked by its type.
///
/// A branch whose target label resolves to an earlier index closes a loop;
/// every range spanning the header index is conservatively extended to the
/// branch. This is an approximation, not a backward-dataflow fixpoint — a
/// value only live inside the loop body may be kept alive to the branch.
pub fn compute_live_ranges(ir: &Ir) -> LiveRanges {
    let mut ranges = LiveRanges::default();
    let mut label_pos: HashMap<Label, usize> = HashMap::new();

    for (index, instr) in ir.instrs().enumerate() {
        if instr.op == Opcode::Label {
            if let Some(label) = instr.result.as_label() {
                label_pos.insert(label, index);
            }
        }

        for operand in [instr.arg1, instr.arg2, instr.result] {
            if let Operand::Temp(temp) = operand {
                let class = if temp.ty.is_float() { &mut ranges.float } else { &mut ranges.int };
                class.record(temp, index);
            }
        }

        if instr.op.is_jump() {
            if let Some(target) = instr.result.as_label() {
                if let Some(&header) = label_pos.get(&target) {
                    if header < index {
                        ranges.int.extend_across(header, index);
                        ranges.float.extend_across(header, index);
                    }
                }
            }
        }
    }
    ranges
}
