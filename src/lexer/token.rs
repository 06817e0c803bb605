//! Token definitions, grouped by namespace, and the tokens the lexer emits.

use std::collections::HashMap;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use regex_automata::{Anchored, Input, meta};

use super::LexError;

/// The namespace the lexer starts in.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Name of the sentinel token that ends every token stream.
pub const EOF: &str = "EOF";

/// Name given to tokens produced by a namespace's skip pattern.
pub const SKIP: &str = "skip";

static SHIFT_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^__shift__(?:\s*\*\s*(\d+))?$").unwrap());

/// Where the lexer goes after a token matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextNamespace {
    /// Switch to the named namespace.
    Enter(String),
    /// Return to the namespace active N switches ago.
    ShiftBack(usize),
}

impl NextNamespace {
    /// Interpret the target of a `-> target` token declaration.
    ///
    /// `__shift__` and `__shift__ * N` are shift-back directives; anything
    /// else names a namespace.
    pub fn from_target(target: &str) -> Self {
        let target = target.trim();
        match SHIFT_DIRECTIVE.captures(target) {
            Some(caps) => NextNamespace::ShiftBack(
                caps.get(1)
                    .map(|n| n.as_str().parse().unwrap_or(usize::MAX))
                    .unwrap_or(1),
            ),
            None => NextNamespace::Enter(target.to_string()),
        }
    }
}

/// One named token pattern.
#[derive(Debug, Clone)]
pub struct TokenDef {
    name: String,
    pattern: String,
    regex: meta::Regex,
    next: Option<NextNamespace>,
}

impl TokenDef {
    /// Compile a definition.
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        next: Option<NextNamespace>,
    ) -> Result<Self, LexError> {
        let name = name.into();
        let pattern = pattern.into();
        let regex = meta::Regex::new(&pattern).map_err(|source| {
            LexError::InvalidPattern {
                token: name.clone(),
                source,
            }
        })?;
        Ok(Self {
            name,
            pattern,
            regex,
            next,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn next(&self) -> Option<&NextNamespace> {
        self.next.as_ref()
    }

    /// Byte length of the match starting exactly at `offset` in `text`, if
    /// any. The text before `offset` stays visible to assertions like `\b`.
    pub(crate) fn match_len(&self, text: &str, offset: usize) -> Option<usize> {
        let input = Input::new(text).range(offset..).anchored(Anchored::Yes);
        self.regex.find(input).map(|m| m.end() - offset)
    }
}

/// A lexer mode: ordered token definitions plus an optional skip pattern.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    tokens: Vec<TokenDef>,
    skip: Option<TokenDef>,
}

impl Namespace {
    /// Token definitions in precedence order.
    pub fn tokens(&self) -> &[TokenDef] {
        &self.tokens
    }

    pub fn skip(&self) -> Option<&TokenDef> {
        self.skip.as_ref()
    }

    /// All definitions in the order the lexer tries them, each paired with
    /// whether its matches are kept.
    pub(crate) fn candidates(&self) -> impl Iterator<Item = (&TokenDef, bool)> {
        self.tokens
            .iter()
            .map(|def| (def, true))
            .chain(self.skip.iter().map(|def| (def, false)))
    }

    fn definitions(&self) -> impl Iterator<Item = &TokenDef> {
        self.tokens.iter().chain(self.skip.iter())
    }
}

/// The token definition table: every namespace the lexer may enter.
#[derive(Debug, Clone, Default)]
pub struct TokenDefs {
    namespaces: HashMap<String, Namespace>,
    shifts: bool,
}

impl TokenDefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` in `namespace`.
    ///
    /// Redeclaring a name replaces the pattern but keeps its precedence slot.
    pub fn add_token(
        &mut self,
        namespace: &str,
        name: &str,
        pattern: &str,
        next: Option<NextNamespace>,
    ) -> Result<&mut Self, LexError> {
        let def = TokenDef::new(name, pattern, next)?;
        self.note_shift(&def);
        let ns = self.namespaces.entry(namespace.to_string()).or_default();
        match ns.tokens.iter_mut().find(|t| t.name == name) {
            Some(slot) => *slot = def,
            None => ns.tokens.push(def),
        }
        Ok(self)
    }

    /// Add a skip pattern to `namespace`. Several skip patterns in one
    /// namespace are combined into a single alternation, earlier patterns
    /// first.
    pub fn add_skip(
        &mut self,
        namespace: &str,
        pattern: &str,
        next: Option<NextNamespace>,
    ) -> Result<&mut Self, LexError> {
        let old = self.namespaces.get(namespace).and_then(Namespace::skip);
        let pattern = match old {
            Some(old) => format!("(?:{}|{pattern})", old.pattern),
            None => pattern.to_string(),
        };
        let def = TokenDef::new(SKIP, pattern, next)?;
        self.note_shift(&def);
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .skip = Some(def);
        Ok(self)
    }

    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.get(name)
    }

    /// The stored key for `name`, borrowed from the table.
    pub(crate) fn namespace_key(&self, name: &str) -> Option<&str> {
        self.namespaces.get_key_value(name).map(|(k, _)| k.as_str())
    }

    /// Namespace names in sorted order.
    pub fn namespace_names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str).sorted()
    }

    /// Whether any namespace declares a token called `name`.
    pub fn contains_token(&self, name: &str) -> bool {
        self.namespaces
            .values()
            .any(|ns| ns.tokens.iter().any(|t| t.name == name))
    }

    /// Whether some definition shifts back, which makes the lexer keep a
    /// namespace stack.
    pub fn uses_shift(&self) -> bool {
        self.shifts
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Check that every namespace a definition switches to is declared.
    pub fn validate(&self) -> Result<(), LexError> {
        for namespace in self.namespace_names() {
            let Some(ns) = self.namespaces.get(namespace) else {
                continue;
            };
            for def in ns.definitions() {
                if let Some(NextNamespace::Enter(target)) = &def.next
                    && !self.namespaces.contains_key(target)
                {
                    return Err(LexError::UnknownNamespace {
                        target: target.clone(),
                        token: def.name.clone(),
                        namespace: namespace.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn note_shift(&mut self, def: &TokenDef) {
        self.shifts |= matches!(def.next, Some(NextNamespace::ShiftBack(_)));
    }
}

/// A token emitted by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub name: String,
    pub value: String,
    /// Byte offset of the token in the input.
    pub offset: usize,
    /// Byte length of the token.
    pub length: usize,
    /// Namespace that was active when the token matched.
    pub namespace: String,
    /// `false` for skipped input.
    pub keep: bool,
}

impl Token {
    pub(crate) fn eof(offset: usize) -> Self {
        Self {
            name: EOF.to_string(),
            value: EOF.to_string(),
            offset,
            length: 0,
            namespace: DEFAULT_NAMESPACE.to_string(),
            keep: true,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.name == EOF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_directives() {
        assert_eq!(
            NextNamespace::from_target("__shift__"),
            NextNamespace::ShiftBack(1)
        );
        assert_eq!(
            NextNamespace::from_target("__shift__ * 3"),
            NextNamespace::ShiftBack(3)
        );
        assert_eq!(
            NextNamespace::from_target(" string "),
            NextNamespace::Enter("string".to_string())
        );
    }

    #[test]
    fn test_redeclared_token_keeps_slot() {
        let mut defs = TokenDefs::new();
        defs.add_token("default", "a", "a", None)
            .unwrap()
            .add_token("default", "b", "b", None)
            .unwrap()
            .add_token("default", "a", "A", None)
            .unwrap();
        let ns = defs.namespace("default").unwrap();
        let names: Vec<_> = ns.tokens().iter().map(TokenDef::name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(ns.tokens()[0].pattern(), "A");
    }

    #[test]
    fn test_skips_combine() {
        let mut defs = TokenDefs::new();
        defs.add_skip("default", r"\s", None)
            .unwrap()
            .add_skip("default", r"#[^\n]*", None)
            .unwrap();
        let skip = defs.namespace("default").unwrap().skip().unwrap();
        assert_eq!(skip.pattern(), r"(?:\s|#[^\n]*)");
        assert_eq!(skip.match_len("# note", 0), Some(6));
        assert_eq!(skip.match_len(" x", 0), Some(1));
    }

    #[test]
    fn test_earlier_skip_wins() {
        let mut defs = TokenDefs::new();
        defs.add_skip("default", r"\s", None)
            .unwrap()
            .add_skip("default", r"\s+", None)
            .unwrap();
        let skip = defs.namespace("default").unwrap().skip().unwrap();
        assert_eq!(skip.match_len("   x", 0), Some(1));
    }

    #[test]
    fn test_invalid_pattern() {
        let mut defs = TokenDefs::new();
        let err = defs.add_token("default", "bad", "(", None).unwrap_err();
        assert!(matches!(err, LexError::InvalidPattern { ref token, .. } if token == "bad"));
    }

    #[test]
    fn test_match_is_anchored() {
        let def = TokenDef::new("b", "b", None).unwrap();
        assert_eq!(def.match_len("ab", 0), None);
        assert_eq!(def.match_len("ab", 1), Some(1));
        assert_eq!(def.match_len("ba", 0), Some(1));
        assert_eq!(def.match_len("abcb", 2), None);
    }

    #[test]
    fn test_match_sees_preceding_text() {
        let def = TokenDef::new("kw", r"\bif", None).unwrap();
        assert_eq!(def.match_len("xif", 1), None);
        assert_eq!(def.match_len("x if", 2), Some(2));

        let start = TokenDef::new("start", "^a", None).unwrap();
        assert_eq!(start.match_len("aa", 0), Some(1));
        assert_eq!(start.match_len("aa", 1), None);
    }

    #[test]
    fn test_validate_unknown_namespace() {
        let mut defs = TokenDefs::new();
        defs.add_token(
            "default",
            "quote",
            "\"",
            Some(NextNamespace::Enter("string".into())),
        )
        .unwrap();
        assert!(matches!(
            defs.validate(),
            Err(LexError::UnknownNamespace { ref target, .. }) if target == "string"
        ));
        defs.add_token("string", "text", "[^\"]+", None).unwrap();
        assert!(defs.validate().is_ok());
    }

    #[test]
    fn test_uses_shift() {
        let mut defs = TokenDefs::new();
        defs.add_token("default", "a", "a", None).unwrap();
        assert!(!defs.uses_shift());
        defs.add_token("default", "b", "b", Some(NextNamespace::ShiftBack(1)))
            .unwrap();
        assert!(defs.uses_shift());
    }
}
