//! Loader for the textual grammar format.
//!
//! A grammar file is line oriented:
//!
//! ```text
//! // comment
//! %skip   space           \s
//! %token  quote_          "        -> string
//! %token  string:string   [^"]+
//! %token  string:_quote   "        -> default
//! %pragma parser.step_limit 100000
//! %include common.pp
//!
//! #pair:
//!     string() ::colon:: value()
//! ```
//!
//! Directives start with `%`. Any other non-blank line names a rule and ends
//! with `:`; the indented lines that follow make up its body.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::iter::{Enumerate, Peekable};
use std::path::{Path, PathBuf};
use std::str::Lines;

use once_cell::sync::Lazy;
use phf::{Map, phf_map};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lexer::{DEFAULT_NAMESPACE, LexError, NextNamespace, TokenDefs};
use crate::parser::Parser;
use crate::rule::{self, RuleError};

/// Pragma that bounds the number of parser steps per call.
pub const STEP_LIMIT_PRAGMA: &str = "parser.step_limit";

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("syntax error on line {line}: {text:?}")]
    Syntax { line: usize, text: String },
    #[error("%include on line {line} needs a grammar loaded from a file")]
    IncludeWithoutPath { line: usize },
    #[error("{} includes itself", .0.display())]
    IncludeCycle(PathBuf),
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// A `%pragma` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pragma {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Pragma {
    fn parse(value: &str) -> Self {
        let value = value.trim();
        match value {
            "true" => Pragma::Bool(true),
            "false" => Pragma::Bool(false),
            _ => match value.parse() {
                Ok(n) if value.bytes().all(|b| b.is_ascii_digit()) => Pragma::Int(n),
                _ => Pragma::Str(value.to_string()),
            },
        }
    }
}

impl fmt::Display for Pragma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pragma::Bool(b) => write!(f, "{b}"),
            Pragma::Int(n) => write!(f, "{n}"),
            Pragma::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Directive {
    Include,
    Pragma,
    Skip,
    Token,
}

const DIRECTIVES: Map<&'static str, Directive> = phf_map! {
    "%include" => Directive::Include,
    "%pragma" => Directive::Pragma,
    "%skip" => Directive::Skip,
    "%token" => Directive::Token,
};

static SKIP_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^%skip\s+(?:([^:\s]+):)?(\S+)\s+(.*?)(?:\s+->\s+(.*))?$").unwrap()
});
static TOKEN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^%token\s+(?:([^:\s]+):)?(\S+)\s+(.*?)(?:\s+->\s+(.*))?$").unwrap()
});
static PRAGMA_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%pragma\s+(\S+)\s+(.*)$").unwrap());
static INCLUDE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^%include\s+(.+)$").unwrap());

/// Token definitions, raw rules and pragmas read from grammar text.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    defs: TokenDefs,
    rules: Vec<(String, String)>,
    pragmas: BTreeMap<String, Pragma>,
}

impl Grammar {
    /// Read a grammar from text. `%include` is not available.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, GrammarError> {
        let mut loader = Loader::default();
        loader.read(text, None)?;
        Ok(loader.grammar)
    }

    /// Read a grammar file. Included paths resolve relative to the file that
    /// includes them.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GrammarError> {
        let mut loader = Loader::default();
        loader.read_file(path.as_ref())?;
        debug!(
            path = %path.as_ref().display(),
            rules = loader.grammar.rules.len(),
            "loaded grammar"
        );
        Ok(loader.grammar)
    }

    pub fn token_defs(&self) -> &TokenDefs {
        &self.defs
    }

    /// Raw `(name, body)` rules in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(n, b)| (n.as_str(), b.as_str()))
    }

    pub fn pragma(&self, key: &str) -> Option<&Pragma> {
        self.pragmas.get(key)
    }

    pub fn pragmas(&self) -> impl Iterator<Item = (&str, &Pragma)> {
        self.pragmas.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Validate the token definitions, compile the rules and configure a
    /// parser from the pragmas.
    pub fn compile(self) -> Result<Parser, GrammarError> {
        self.defs.validate()?;
        let rules = rule::compile(&self.defs, self.rules())?;
        let mut parser = Parser::new(self.defs, rules);
        match self.pragmas.get(STEP_LIMIT_PRAGMA) {
            Some(Pragma::Int(limit)) if *limit >= 0 => {
                parser = parser.with_step_limit(usize::try_from(*limit).unwrap_or(usize::MAX));
            }
            Some(other) => warn!(value = %other, "ignoring invalid {STEP_LIMIT_PRAGMA}"),
            None => {}
        }
        Ok(parser)
    }
}

#[derive(Default)]
struct Loader {
    grammar: Grammar,
    /// Files being read, innermost last.
    open: Vec<PathBuf>,
}

impl Loader {
    fn read_file(&mut self, path: &Path) -> Result<(), GrammarError> {
        let io_error = |source| GrammarError::Io {
            path: path.to_path_buf(),
            source,
        };
        let canonical = fs::canonicalize(path).map_err(io_error)?;
        if self.open.contains(&canonical) {
            return Err(GrammarError::IncludeCycle(canonical));
        }
        let text = fs::read_to_string(&canonical).map_err(io_error)?;
        let dir = canonical.parent().map(Path::to_path_buf);

        self.open.push(canonical);
        let result = self.read(&text, dir.as_deref());
        self.open.pop();
        result
    }

    fn read(&mut self, text: &str, dir: Option<&Path>) -> Result<(), GrammarError> {
        let mut lines = text.lines().enumerate().peekable();
        while let Some((n, line)) = lines.next() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let number = n + 1;
            if line.starts_with('%') {
                self.directive(number, line, dir)?;
                continue;
            }
            let Some(name) = line.strip_suffix(':').filter(|_| !line.starts_with([' ', '\t']))
            else {
                return Err(syntax(number, line));
            };
            let body = rule_body(&mut lines);
            self.grammar.rules.push((name.trim().to_string(), body));
        }
        Ok(())
    }

    fn directive(&mut self, line: usize, text: &str, dir: Option<&Path>) -> Result<(), GrammarError> {
        let keyword = text.split_whitespace().next().unwrap_or_default();
        let Some(directive) = DIRECTIVES.get(keyword) else {
            return Err(syntax(line, text));
        };
        match directive {
            Directive::Skip => {
                let caps = SKIP_LINE.captures(text).ok_or_else(|| syntax(line, text))?;
                let namespace = caps.get(1).map_or(DEFAULT_NAMESPACE, |m| m.as_str());
                let next = caps.get(4).map(|m| NextNamespace::from_target(m.as_str()));
                self.grammar.defs.add_skip(namespace, &caps[3], next)?;
            }
            Directive::Token => {
                let caps = TOKEN_LINE.captures(text).ok_or_else(|| syntax(line, text))?;
                let namespace = caps.get(1).map_or(DEFAULT_NAMESPACE, |m| m.as_str());
                let next = caps.get(4).map(|m| NextNamespace::from_target(m.as_str()));
                self.grammar
                    .defs
                    .add_token(namespace, &caps[2], &caps[3], next)?;
            }
            Directive::Pragma => {
                let caps = PRAGMA_LINE.captures(text).ok_or_else(|| syntax(line, text))?;
                self.grammar
                    .pragmas
                    .insert(caps[1].to_string(), Pragma::parse(&caps[2]));
            }
            Directive::Include => {
                let caps = INCLUDE_LINE.captures(text).ok_or_else(|| syntax(line, text))?;
                let Some(dir) = dir else {
                    return Err(GrammarError::IncludeWithoutPath { line });
                };
                self.read_file(&dir.join(caps[1].trim()))?;
            }
        }
        Ok(())
    }
}

/// Join the indented lines following a rule name, skipping comments.
fn rule_body(lines: &mut Peekable<Enumerate<Lines<'_>>>) -> String {
    let mut parts = Vec::new();
    while let Some((_, line)) = lines.next_if(|(_, l)| {
        l.starts_with([' ', '\t']) || l.starts_with("//")
    }) {
        let line = line.trim();
        if !line.is_empty() && !line.starts_with("//") {
            parts.push(line);
        }
    }
    parts.join(" ")
}

fn syntax(line: usize, text: &str) -> GrammarError {
    GrammarError::Syntax {
        line,
        text: text.to_string(),
    }
}
