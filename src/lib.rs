//! An LL(k) compiler-compiler.
//!
//! A grammar declares namespaced tokens and rules. It compiles into a
//! [`Parser`] that lexes text, runs a backtracking interpreter over the rules
//! and builds a [`SyntaxTree`]. Rules support ordered choice, bounded
//! repetition, node labels with merging, and unification of token values
//! (`::quote[0]:: <string> ::quote[0]::`).
//!
//! # Example
//!
//! ```rust
//! use llk::Grammar;
//!
//! let parser = Grammar::from_str(
//!     r"
//! %skip   space   \s
//! %token  number  \d+
//! %token  plus    \+
//!
//! #sum:
//!     <number> ( ::plus:: <number> )*
//! ",
//! )?
//! .compile()?;
//!
//! let tree = parser.parse("1 + 2", None)?;
//! assert_eq!(
//!     tree.to_string(),
//!     ">  #sum\n>  >  token(number, 1)\n>  >  token(number, 2)\n"
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod grammar;
pub mod lexer;
pub mod parser;
mod position;
pub mod rule;
pub mod tree;

pub use grammar::{Grammar, GrammarError, Pragma};
pub use lexer::{LexError, Lexer, NextNamespace, Token, TokenDefs, tokenize};
pub use parser::{ParseError, Parser};
pub use position::{Position, SourceContext};
pub use rule::{RuleError, RuleTable, compile};
pub use tree::{Dump, SyntaxTree, TreeNode, Visitor};
