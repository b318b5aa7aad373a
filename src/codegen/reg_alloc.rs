//! Linear-scan register allocation.

use hashbrown::HashMap;

use crate::inter::Temp;
use crate::semantic::Type;

use super::live_range::{ClassRanges, LiveRange, LiveRanges};

/// Allocation of one register class: register names or spill-slot byte
/// offsets, keyed by temporary identity.
#[derive(Debug, Default)]
pub struct ClassAllocation {
    pub registers: HashMap<Temp, &'static str>,
    pub spills: HashMap<Temp, u32>,
    pub spill_count: u32,
}

/// Classic linear scan over intervals sorted by start.
///
/// Members of the active set whose end precedes the new interval's start are
/// expired first, freeing their registers. When no register is free the
/// farthest-ending active interval is compared against the new one: whichever
/// lives longer takes a fresh spill slot, the other keeps (or takes over)
/// the register. Slot offsets grow by `slot_size` per spill, so they are
/// unique and strictly increasing in assignment order.
pub fn linear_scan(ranges: &ClassRanges, available: &[&'static str], slot_size: u32) -> ClassAllocation {
    let mut alloc = ClassAllocation::default();
    let mut free: Vec<&'static str> = available.to_vec();
    let mut active: Vec<(Temp, LiveRange, &'static str)> = Vec::new();

    for (temp, range) in ranges.sorted_by_start() {
        let mut i = 0;
        while i < active.len() {
            if active[i].1.end < range.start {
                let (_, _, reg) = active.remove(i);
                free.push(reg);
            } else {
                i += 1;
            }
        }

        if !free.is_empty() {
            let reg = free.remove(0);
            alloc.registers.insert(temp, reg);
            active.push((temp, range, reg));
            continue;
        }

        // No register left: spill whichever interval ends farthest. The
        // first of equally-far candidates wins, keeping ties deterministic.
        let mut victim: Option<(usize, usize)> = None;
        for (index, (_, active_range, _)) in active.iter().enumerate() {
            if victim.map_or(true, |(_, end)| active_range.end > end) {
                victim = Some((index, active_range.end));
            }
        }

        match victim {
            Some((index, end)) if range.end < end => {
                let (evicted, _, reg) = active.remove(index);
                alloc.registers.remove(&evicted);
                alloc.spill_count += 1;
                alloc.spills.insert(evicted, alloc.spill_count * slot_size);
                alloc.registers.insert(temp, reg);
                active.push((temp, range, reg));
            }
            _ => {
                alloc.spill_count += 1;
                alloc.spills.insert(temp, alloc.spill_count * slot_size);
            }
        }
    }
    alloc
}

/// Merged allocation of both classes. Integer spill slots occupy the top of
/// the spill region; float slots follow below, so the two classes form one
/// contiguous frame area.
#[derive(Debug)]
pub struct RegisterAllocation {
    pub registers: HashMap<Temp, &'static str>,
    pub spills: HashMap<Temp, u32>,
    pub int_spill_count: u32,
    pub float_spill_count: u32,
}

impl RegisterAllocation {
    /// Total frame bytes: spill regions rounded up to the 16-byte multiple
    /// the SysV ABI requires.
    pub fn frame_size(&self) -> u32 {
        let raw =
            self.int_spill_count * Type::Int.size() + self.float_spill_count * Type::Real.size();
        raw.div_ceil(16) * 16
    }
}

/// Allocate both classes independently and concatenate their spill regions.
pub fn allocate(
    ranges: &LiveRanges,
    int_regs: &[&'static str],
    float_regs: &[&'static str],
) -> RegisterAllocation {
    let int = linear_scan(&ranges.int, int_regs, Type::Int.size());
    let float = linear_scan(&ranges.float, float_regs, Type::Real.size());
    log::debug!(
        "register allocation: {} int temps ({} spilled), {} float temps ({} spilled)",
        ranges.int.len(),
        int.spill_count,
        ranges.float.len(),
        float.spill_count,
    );

    let int_bytes = int.spill_count * Type::Int.size();
    let mut registers = int.registers;
    registers.extend(float.registers);
    let mut spills = int.spills;
    for (temp, offset) in float.spills {
        spills.insert(temp, offset + int_bytes);
    }

    RegisterAllocation {
        registers,
        spills,
        int_spill_count: int.spill_count,
        float_spill_count: float.spill_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inter::Temp;

    fn temp(id: u32) -> Temp {
        Temp { id, ty: Type::Int }
    }

    fn ranges_of(spans: &[(u32, usize, usize)]) -> ClassRanges {
        // ClassRanges is built through its recording API in production; the
        // tests reconstruct the same state from (id, start, end) triples.
        let mut ranges = ClassRanges::default();
        for &(id, start, end) in spans {
            ranges.record_for_test(temp(id), start);
            ranges.record_for_test(temp(id), end);
        }
        ranges
    }

    #[test]
    fn disjoint_ranges_share_one_register() {
        let ranges = ranges_of(&[(0, 0, 1), (1, 2, 3), (2, 4, 5)]);
        let alloc = linear_scan(&ranges, &["r12d"], 4);
        assert_eq!(alloc.spill_count, 0);
        assert!(alloc.registers.values().all(|&r| r == "r12d"));
    }

    #[test]
    fn longest_living_interval_is_spilled() {
        // %0 spans everything; when %1 arrives with a nearer end it takes
        // the register and %0 moves to a spill slot.
        let ranges = ranges_of(&[(0, 0, 10), (1, 1, 2)]);
        let alloc = linear_scan(&ranges, &["r12d"], 4);
        assert_eq!(alloc.registers.get(&temp(1)), Some(&"r12d"));
        assert_eq!(alloc.spills.get(&temp(0)), Some(&4));
    }

    #[test]
    fn new_interval_spills_itself_when_it_lives_longest() {
        let ranges = ranges_of(&[(0, 0, 3), (1, 1, 10)]);
        let alloc = linear_scan(&ranges, &["r12d"], 4);
        assert_eq!(alloc.registers.get(&temp(0)), Some(&"r12d"));
        assert_eq!(alloc.spills.get(&temp(1)), Some(&4));
    }

    #[test]
    fn spill_offsets_increase_per_slot() {
        let ranges = ranges_of(&[(0, 0, 9), (1, 1, 9), (2, 2, 9), (3, 3, 9)]);
        let alloc = linear_scan(&ranges, &["r12d"], 4);
        assert_eq!(alloc.spill_count, 3);
        let mut offsets: Vec<u32> = alloc.spills.values().copied().collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![4, 8, 12]);
    }

    #[test]
    fn float_region_sits_below_the_int_region() {
        let mut ranges = LiveRanges::default();
        for id in 0..3 {
            ranges.int.record_for_test(temp(id), 0);
            ranges.int.record_for_test(temp(id), 9);
        }
        for id in 10..12 {
            let t = Temp { id, ty: Type::Real };
            ranges.float.record_for_test(t, 0);
            ranges.float.record_for_test(t, 9);
        }
        let alloc = allocate(&ranges, &["r12d"], &["xmm8"]);
        assert_eq!(alloc.int_spill_count, 2);
        assert_eq!(alloc.float_spill_count, 1);
        // Int slots at 4 and 8; the float slot starts after the 8 int bytes.
        assert_eq!(alloc.spills.get(&Temp { id: 11, ty: Type::Real }), Some(&16));
        assert_eq!(alloc.frame_size(), 16);
    }

    #[test]
    fn frame_size_is_a_multiple_of_sixteen() {
        let mut ranges = LiveRanges::default();
        for id in 0..6 {
            ranges.int.record_for_test(temp(id), 0);
            ranges.int.record_for_test(temp(id), 9);
        }
        let alloc = allocate(&ranges, &["r12d"], &["xmm8"]);
        assert_eq!(alloc.int_spill_count, 5);
        assert_eq!(alloc.frame_size() % 16, 0);
        assert_eq!(alloc.frame_size(), 32);
    }
}
