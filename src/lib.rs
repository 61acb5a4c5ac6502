//! A canonical LR(1) parser generator.
//!
//! A grammar of terminals and nonterminals is augmented with a synthetic
//! start symbol, turned into the canonical collection of LR(1) item sets,
//! and assembled into ACTION/GOTO tables. A table-driven shift-reduce
//! parser consumes a token stream from an external lexer and hands every
//! reduction to a tree builder.

pub mod dfa;
pub mod first_sets;
pub mod grammar;
pub mod item;
pub mod parse_table;
pub mod parser;
pub mod serialize;
pub mod tree;
pub mod types;
