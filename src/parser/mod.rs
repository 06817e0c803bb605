//! The backtracking LL(k) parser.
//!
//! A [`Parser`] owns token definitions and a compiled [`RuleTable`]. Each call
//! lexes the input, runs the backtracking engine from the root rule and, for
//! [`Parser::parse`], assembles the syntax tree from the accepted trace. The
//! parser itself is never mutated, so one instance serves any number of
//! concurrent calls.

mod builder;
mod engine;
mod trace;


use thiserror::Error;
use tracing::{debug, instrument};

use crate::lexer::{LexError, Lexer, Token, TokenDefs};
use crate::position::SourceContext;
use crate::rule::{RuleId, RuleTable};
use crate::tree::SyntaxTree;

use engine::Engine;

/// Errors raised by a single parse call.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unexpected token {value:?} ({token}) at {}:\n{context}", context.position)]
    UnexpectedToken {
        token: String,
        value: String,
        context: SourceContext,
    },
    #[error("parse abandoned after {limit} steps")]
    StepLimitExceeded { limit: usize },
    #[error("rule {0} does not exist")]
    UnknownRule(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct Parser {
    defs: TokenDefs,
    rules: RuleTable,
    step_limit: Option<usize>,
}

impl Parser {
    pub fn new(defs: TokenDefs, rules: RuleTable) -> Self {
        Self {
            defs,
            rules,
            step_limit: None,
        }
    }

    /// Abandon a call once the engine has performed `limit` steps.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn step_limit(&self) -> Option<usize> {
        self.step_limit
    }

    pub fn token_defs(&self) -> &TokenDefs {
        &self.defs
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// The visible token stream of `text`.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>, LexError> {
        Lexer::new(&self.defs).tokenize(text)
    }

    /// Parse `text` from `root` (the first declared rule when `None`) and
    /// build its syntax tree.
    ///
    /// If the root rule does not produce exactly one node, the returned root
    /// is a synthesized node whose id is the root rule's name and whose
    /// children are whatever the rule produced.
    #[instrument(level = "debug", skip(self, text), fields(len = text.len()))]
    pub fn parse(&self, text: &str, root: Option<&str>) -> Result<SyntaxTree, ParseError> {
        let root = self.root_rule(root)?;
        let tokens = self.tokenize(text)?;
        let trace = Engine::new(&self.rules, &tokens, text, self.step_limit).run(root)?;
        let tree = builder::build(&self.rules, &tokens, &trace, root)?;
        debug!(tokens = tokens.len(), trace = trace.len(), "parsed");
        Ok(tree)
    }

    /// Check that `text` is accepted from `root` without building a tree.
    #[instrument(level = "debug", skip(self, text), fields(len = text.len()))]
    pub fn recognize(&self, text: &str, root: Option<&str>) -> Result<(), ParseError> {
        let root = self.root_rule(root)?;
        let tokens = self.tokenize(text)?;
        let trace = Engine::new(&self.rules, &tokens, text, self.step_limit).run(root)?;
        debug!(tokens = tokens.len(), trace = trace.len(), "recognized");
        Ok(())
    }

    fn root_rule(&self, root: Option<&str>) -> Result<RuleId, ParseError> {
        match root {
            None => Ok(self.rules.root()),
            Some(name) => self
                .rules
                .by_name(name)
                .ok_or_else(|| ParseError::UnknownRule(name.to_string())),
        }
    }
}
