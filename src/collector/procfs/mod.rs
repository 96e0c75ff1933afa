//! Readers for the Linux `/proc` filesystem.
//!
//! This module provides the tokenisers, the positional field access and the
//! process tree discovery built on top of them.

pub mod fields;
pub mod parser;
pub mod tree;

pub use fields::{Field, FieldSet, FieldSource, ReadError};
pub use parser::ParseError;
pub use tree::{ProcessTree, TreeDepth};
