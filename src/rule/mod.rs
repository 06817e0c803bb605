//! Compiled grammar rules.
//!
//! Rule bodies are compiled by [`compile`] into a flat table. Rules refer to
//! each other by [`RuleId`], so recursive grammars are graphs over the table
//! rather than nested values.

mod analyzer;

pub use analyzer::{RuleError, compile};

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

/// Index of a rule in its [`RuleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a rule is named.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleName {
    /// Declared in the grammar.
    Named(String),
    /// Synthesized by the compiler for an intermediate node.
    Transitional(usize),
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleName::Named(name) => f.write_str(name),
            RuleName::Transitional(n) => write!(f, "{n}"),
        }
    }
}

/// How a node merges with a preceding sibling of the same id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Merge {
    #[default]
    None,
    /// `:M`: the new node's children are appended to the sibling.
    Flat,
    /// `:m`: like `Flat`, but children that match the sibling's last child
    /// are merged into it in turn.
    Recursive,
}

/// An AST node id attached to a rule, written `#id` or `#id:M` / `#id:m`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeLabel {
    /// Id without the leading `#`.
    pub id: String,
    pub merge: Merge,
}

impl NodeLabel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            merge: Merge::None,
        }
    }

    /// Parse `#id`, `#id:M` or `#id:m`. The `#` is optional.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('#').unwrap_or(text);
        let (id, merge) = match text.rsplit_once(':') {
            Some((id, "M")) => (id, Merge::Flat),
            Some((id, "m")) => (id, Merge::Recursive),
            _ => (text, Merge::None),
        };
        Self {
            id: id.to_string(),
            merge,
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)?;
        match self.merge {
            Merge::None => Ok(()),
            Merge::Flat => f.write_str(":M"),
            Merge::Recursive => f.write_str(":m"),
        }
    }
}

/// What a rule matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// One token. Skipped tokens (`::name::`) are matched but left out of
    /// the tree.
    Token { token: String, kept: bool },
    Concatenation(Vec<RuleId>),
    /// Ordered alternatives.
    Choice(Vec<RuleId>),
    /// `max == None` is unbounded.
    Repetition {
        child: RuleId,
        min: usize,
        max: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: RuleName,
    pub kind: RuleKind,
    /// Node created when an activation of this rule completes.
    pub node: Option<NodeLabel>,
    /// Fallback node for `#name` rules whose activation found no label.
    pub default_node: Option<NodeLabel>,
    /// Back-reference index: every match with the same index inside one rule
    /// activation must have the same text.
    pub unification: Option<usize>,
    /// Body text of a named rule.
    pub source: Option<String>,
}

impl Rule {
    pub(crate) fn new(name: RuleName, kind: RuleKind) -> Self {
        Self {
            name,
            kind,
            node: None,
            default_node: None,
            unification: None,
            source: None,
        }
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self.name, RuleName::Transitional(_))
    }
}

/// Every compiled rule of a grammar. The first declared rule is the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
    names: HashMap<String, RuleId>,
    root: RuleId,
}

impl RuleTable {
    pub(crate) fn new(rules: Vec<Rule>, names: HashMap<String, RuleId>, root: RuleId) -> Self {
        Self { rules, names, root }
    }

    pub fn root(&self) -> RuleId {
        self.root
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    /// Look up a named rule. A leading `#` is ignored.
    pub fn by_name(&self, name: &str) -> Option<RuleId> {
        let name = name.strip_prefix('#').unwrap_or(name);
        self.names.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules.iter().enumerate().map(|(i, r)| (RuleId(i), r))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Index<RuleId> for RuleTable {
    type Output = Rule;

    fn index(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_label_parse() {
        assert_eq!(NodeLabel::parse("#pair"), NodeLabel::new("pair"));
        assert_eq!(
            NodeLabel::parse("#list:M"),
            NodeLabel {
                id: "list".into(),
                merge: Merge::Flat
            }
        );
        assert_eq!(NodeLabel::parse("#list:m").merge, Merge::Recursive);
        assert_eq!(NodeLabel::parse("#list:m").to_string(), "#list:m");
    }

    #[test]
    fn test_rule_name_display() {
        assert_eq!(RuleName::Named("value".into()).to_string(), "value");
        assert_eq!(RuleName::Transitional(7).to_string(), "7");
    }
}
