//! Terminal output and prompts.

mod output;
pub mod prompts;

pub use output::{header, info, kv, success, warning};
