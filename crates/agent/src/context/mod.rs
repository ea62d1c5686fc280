//! What the model sees each turn.
//!
//! | Piece | Source | Rebuilt |
//! |-------|--------|---------|
//! | System instruction | Base prompt + file cache + automode status | Every request |
//! | Conversation | Conversation store minus materialized tool results | Every request |
//!
//! Neither step mutates the session; both are pure views over it.

pub mod filter;
pub mod instruction;

pub use filter::{filter_context, is_materialized};
pub use instruction::system_instruction;
