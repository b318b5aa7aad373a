//! The backend: live ranges, linear-scan register allocation and x86-64
//! assembly emission.

mod live_range;
mod reg_alloc;
mod x64;

pub use live_range::{compute_live_ranges, ClassRanges, LiveRange, LiveRanges};
pub use reg_alloc::{allocate, linear_scan, ClassAllocation, RegisterAllocation};
pub use x64::{X64CodeGenerator, FLOAT_REGISTERS, INT_REGISTERS};
