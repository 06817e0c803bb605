//! Namespace-aware lexer.
//!
//! At every step the definitions of the active namespace are tried in
//! declaration order, anchored at the cursor; the first one that matches
//! wins. The namespace's skip pattern is tried last and its matches are
//! consumed without being part of the visible stream. A definition may
//! switch the active namespace, either to a named one or back along the
//! stack of previously active namespaces.

mod token;

pub use token::{
    DEFAULT_NAMESPACE, EOF, Namespace, NextNamespace, SKIP, Token, TokenDef, TokenDefs,
};

use itertools::Itertools;
use thiserror::Error;
use tracing::trace;

use crate::position::SourceContext;

/// Errors raised while defining tokens or lexing text.
#[derive(Debug, Error)]
pub enum LexError {
    #[error("unrecognized token {found:?} at {}:\n{context}", context.position)]
    UnrecognizedToken {
        found: String,
        context: SourceContext,
    },
    #[error("token {token} in namespace {namespace} matched an empty string at offset {offset}")]
    EmptyMatch {
        token: String,
        namespace: String,
        offset: usize,
    },
    #[error("namespace {target} does not exist, called by token {token} in namespace {namespace}")]
    UnknownNamespace {
        target: String,
        token: String,
        namespace: String,
    },
    #[error(
        "cannot shift namespace {requested} times from token {token} in namespace {namespace}, \
         the stack holds only {available}"
    )]
    ShiftUnderflow {
        requested: usize,
        available: usize,
        token: String,
        namespace: String,
    },
    #[error("invalid pattern for token {token}: {source}")]
    InvalidPattern {
        token: String,
        #[source]
        source: regex_automata::meta::BuildError,
    },
}

/// Tokenizes text against a [`TokenDefs`] table.
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'d> {
    defs: &'d TokenDefs,
}

impl<'d> Lexer<'d> {
    pub fn new(defs: &'d TokenDefs) -> Self {
        Self { defs }
    }

    /// Iterate over every token of `text`, skipped ones included, ending with
    /// [`EOF`]. The iterator stops after the first error.
    pub fn lex<'t>(&self, text: &'t str) -> Lex<'d, 't> {
        Lex {
            defs: self.defs,
            text,
            offset: 0,
            namespace: DEFAULT_NAMESPACE,
            stack: self.defs.uses_shift().then(Vec::new),
            done: false,
        }
    }

    /// The visible token stream of `text`: kept tokens followed by [`EOF`].
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>, LexError> {
        self.lex(text).filter_ok(|token| token.keep).collect()
    }
}

/// Tokenize `text` with `defs`. See [`Lexer::tokenize`].
pub fn tokenize(text: &str, defs: &TokenDefs) -> Result<Vec<Token>, LexError> {
    Lexer::new(defs).tokenize(text)
}

/// Iterator returned by [`Lexer::lex`].
#[derive(Debug)]
pub struct Lex<'d, 't> {
    defs: &'d TokenDefs,
    text: &'t str,
    offset: usize,
    namespace: &'d str,
    stack: Option<Vec<&'d str>>,
    done: bool,
}

impl<'d> Lex<'d, '_> {
    fn next_token(&mut self) -> Result<Token, LexError> {
        let rest = &self.text[self.offset..];
        let matched = self.defs.namespace(self.namespace).and_then(|ns| {
            ns.candidates()
                .find_map(|(def, keep)| {
                    def.match_len(self.text, self.offset)
                        .map(|len| (def, keep, len))
                })
        });
        let Some((def, keep, len)) = matched else {
            return Err(LexError::UnrecognizedToken {
                found: rest.chars().next().map(String::from).unwrap_or_default(),
                context: SourceContext::new(self.text, self.offset),
            });
        };
        if len == 0 {
            return Err(LexError::EmptyMatch {
                token: def.name().to_string(),
                namespace: self.namespace.to_string(),
                offset: self.offset,
            });
        }

        let token = Token {
            name: def.name().to_string(),
            value: rest[..len].to_string(),
            offset: self.offset,
            length: len,
            namespace: self.namespace.to_string(),
            keep,
        };
        trace!(token = %token.name, offset = token.offset, namespace = self.namespace, "lexeme");
        self.offset += len;
        if let Some(next) = def.next() {
            self.switch(def, next)?;
        }
        Ok(token)
    }

    fn switch(&mut self, def: &TokenDef, next: &NextNamespace) -> Result<(), LexError> {
        match next {
            NextNamespace::Enter(target) => {
                if target == self.namespace {
                    return Ok(());
                }
                let target = self.defs.namespace_key(target).ok_or_else(|| {
                    LexError::UnknownNamespace {
                        target: target.clone(),
                        token: def.name().to_string(),
                        namespace: self.namespace.to_string(),
                    }
                })?;
                if let Some(stack) = &mut self.stack {
                    stack.push(self.namespace);
                }
                self.namespace = target;
            }
            NextNamespace::ShiftBack(0) => {}
            NextNamespace::ShiftBack(levels) => {
                let stack = self.stack.get_or_insert_with(Vec::new);
                if *levels > stack.len() {
                    return Err(LexError::ShiftUnderflow {
                        requested: *levels,
                        available: stack.len(),
                        token: def.name().to_string(),
                        namespace: self.namespace.to_string(),
                    });
                }
                let keep = stack.len() - levels;
                self.namespace = stack[keep];
                stack.truncate(keep);
            }
        }
        Ok(())
    }
}

impl Iterator for Lex<'_, '_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.offset >= self.text.len() {
            self.done = true;
            return Some(Ok(Token::eof(self.text.len())));
        }
        let result = self.next_token();
        self.done = result.is_err();
        Some(result)
    }
}
