//! Semantic analysis: the DL type system, scoped symbol tables and the
//! tree checker.

mod checker;
mod env;
mod types;

pub use checker::check;
pub use env::{Scope, ScopeStack, SymbolInfo};
pub use types::Type;
