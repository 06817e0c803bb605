//! Recursive descent compiler for rule bodies.
//!
//! A body is first tokenized with a fixed meta-grammar and then parsed:
//!
//! ```text
//! choice        := concatenation ( '|' concatenation )*
//! concatenation := repetition+
//! repetition    := simple quantifier? node?
//! simple        := '(' choice ')' | ::token:: | <token> | rule()
//! ```
//!
//! Every non-trivial intermediate node becomes a transitional rule. A pending
//! node label is threaded through the descent: a `#id` after a repetition
//! sets it, and the enclosing concatenation is kept (never collapsed) so that
//! the enclosing choice can attach the label to it.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;

use super::{NodeLabel, Rule, RuleId, RuleKind, RuleName, RuleTable};
use crate::lexer::{Lexer, Token, TokenDefs};

/// Errors raised while compiling rules.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("no rules to compile")]
    NoRules,
    #[error("token {token} does not exist in rule {rule}")]
    UnknownToken { token: String, rule: String },
    #[error("cannot call rule {callee}() in rule {rule} because it does not exist")]
    UnknownRule { callee: String, rule: String },
    #[error("upper bound {max} is lower than lower bound {min} in rule {rule}")]
    InvalidBounds { min: usize, max: usize, rule: String },
    #[error("syntax error in rule {rule}: {message}")]
    Syntax { rule: String, message: String },
    #[error("rule {0} is defined more than once")]
    DuplicateRule(String),
}

const IDENT: &str = "[a-zA-Z_][a-zA-Z0-9_]*";

static META: Lazy<TokenDefs> = Lazy::new(|| {
    let lexemes = [
        ("or", r"\|".to_string()),
        ("zero_or_one", r"\?".to_string()),
        ("one_or_more", r"\+".to_string()),
        ("zero_or_more", r"\*".to_string()),
        ("n_to_m", r"\{[0-9]+,[0-9]+\}".to_string()),
        ("zero_to_m", r"\{,[0-9]+\}".to_string()),
        ("n_or_more", r"\{[0-9]+,\}".to_string()),
        ("exactly_n", r"\{[0-9]+\}".to_string()),
        ("skipped", format!(r"::{IDENT}(\[\d+\])?::")),
        ("kept", format!(r"<{IDENT}(\[\d+\])?>")),
        ("named", format!(r"{IDENT}\(\)(\[\d+\])?")),
        ("node", format!("#{IDENT}(:[mM])?")),
        ("capturing_", r"\(".to_string()),
        ("_capturing", r"\)".to_string()),
    ];
    let mut defs = TokenDefs::new();
    defs.add_skip("default", r"\s", None)
        .expect("built-in skip pattern");
    for (name, pattern) in lexemes {
        defs.add_token("default", name, &pattern, None)
            .expect("built-in rule lexeme");
    }
    defs
});

/// Compile raw `(name, body)` rules against the declared tokens.
///
/// A name written `#name` makes `name` the rule's default node. The first
/// rule is the root.
pub fn compile<I, N, B>(defs: &TokenDefs, rules: I) -> Result<RuleTable, RuleError>
where
    I: IntoIterator<Item = (N, B)>,
    N: AsRef<str>,
    B: AsRef<str>,
{
    let raw: Vec<(String, String)> = rules
        .into_iter()
        .map(|(n, b)| (n.as_ref().trim().to_string(), b.as_ref().to_string()))
        .collect();
    if raw.is_empty() {
        return Err(RuleError::NoRules);
    }

    let mut names = HashMap::new();
    let mut slots = Vec::with_capacity(raw.len());
    for (i, (raw_name, _)) in raw.iter().enumerate() {
        let (name, default_node) = match raw_name.strip_prefix('#') {
            Some(name) => (name, Some(NodeLabel::new(name))),
            None => (raw_name.as_str(), None),
        };
        if names.insert(name.to_string(), RuleId(i)).is_some() {
            return Err(RuleError::DuplicateRule(name.to_string()));
        }
        slots.push((name.to_string(), default_node));
    }

    let mut analyzer = Analyzer {
        defs,
        names: &names,
        rules: slots
            .iter()
            .map(|(name, _)| {
                Rule::new(
                    RuleName::Named(name.clone()),
                    RuleKind::Concatenation(Vec::new()),
                )
            })
            .collect(),
        named: slots.len(),
        transitional: 0,
        rule: String::new(),
        lexemes: Vec::new(),
        pos: 0,
    };
    for (i, ((name, default_node), (_, body))) in slots.into_iter().zip(&raw).enumerate() {
        let mut rule = analyzer.analyze(&name, body, default_node.clone())?;
        rule.name = RuleName::Named(name);
        rule.default_node = default_node;
        rule.source = Some(body.trim().to_string());
        analyzer.rules[i] = rule;
    }

    let rules = analyzer.rules;
    debug!(
        named = names.len(),
        transitional = rules.len() - names.len(),
        "compiled rules"
    );
    Ok(RuleTable::new(rules, names, RuleId(0)))
}

struct Analyzer<'a> {
    defs: &'a TokenDefs,
    names: &'a HashMap<String, RuleId>,
    rules: Vec<Rule>,
    /// Rules below this index are the named slots.
    named: usize,
    transitional: usize,
    /// Name of the rule being compiled, for diagnostics.
    rule: String,
    lexemes: Vec<Token>,
    pos: usize,
}

impl Analyzer<'_> {
    /// Compile one body and return the rule to install in its named slot.
    fn analyze(
        &mut self,
        name: &str,
        body: &str,
        mut pending: Option<NodeLabel>,
    ) -> Result<Rule, RuleError> {
        self.rule = name.to_string();
        let lexemes = Lexer::new(&META)
            .tokenize(body)
            .map_err(|err| self.syntax(err.to_string()))?;
        self.lexemes = lexemes;
        self.pos = 0;

        let top = self.choice(&mut pending)?;
        if let Some(lexeme) = self.peek() {
            return Err(self.syntax(format!("unexpected {:?}", lexeme.value)));
        }

        // The top rule is the most recently created one unless the body is a
        // bare call to a named rule; a named slot must not alias another.
        if top.0 >= self.named
            && top.0 + 1 == self.rules.len()
            && let Some(rule) = self.rules.pop()
        {
            return Ok(rule);
        }
        self.transitional += 1;
        Ok(Rule::new(
            RuleName::Transitional(self.transitional - 1),
            RuleKind::Concatenation(vec![top]),
        ))
    }

    fn choice(&mut self, pending: &mut Option<NodeLabel>) -> Result<RuleId, RuleError> {
        let mut children = Vec::new();
        loop {
            let mut label = pending.clone();
            let rule = self.concatenation(&mut label)?;
            if label.is_some() {
                self.rules[rule.0].node = label;
            }
            children.push(rule);
            if !self.eat("or") {
                break;
            }
        }
        *pending = None;

        if children.len() == 1 {
            return Ok(children[0]);
        }
        Ok(self.push(RuleKind::Choice(children)))
    }

    fn concatenation(&mut self, pending: &mut Option<NodeLabel>) -> Result<RuleId, RuleError> {
        let Some(first) = self.repetition(pending)? else {
            let found = self.peek().map_or("end of rule", |l| l.value.as_str());
            return Err(self.syntax(format!(
                "expected a token, a rule call or a group, found {found:?}"
            )));
        };
        let mut children = vec![first];
        while let Some(next) = self.repetition(pending)? {
            children.push(next);
        }

        if children.len() == 1 && pending.is_none() {
            return Ok(first);
        }
        Ok(self.push(RuleKind::Concatenation(children)))
    }

    fn repetition(&mut self, pending: &mut Option<NodeLabel>) -> Result<Option<RuleId>, RuleError> {
        let Some(content) = self.simple(pending)? else {
            return Ok(None);
        };
        let bounds = self.quantifier()?;
        if let Some(node) = self.peek().filter(|l| l.name == "node") {
            *pending = Some(NodeLabel::parse(&node.value));
            self.pos += 1;
        }

        Ok(Some(match bounds {
            Some((min, max)) => self.push(RuleKind::Repetition {
                child: content,
                min,
                max,
            }),
            None => content,
        }))
    }

    fn quantifier(&mut self) -> Result<Option<(usize, Option<usize>)>, RuleError> {
        let Some(lexeme) = self.peek() else {
            return Ok(None);
        };
        let bounds = lexeme.value.trim_matches(['{', '}']);
        let bounds = match lexeme.name.as_str() {
            "zero_or_one" => (0, Some(1)),
            "one_or_more" => (1, None),
            "zero_or_more" => (0, None),
            "n_to_m" => {
                let (min, max) = bounds.split_once(',').unwrap_or((bounds, bounds));
                let (min, max) = (self.bound(min)?, self.bound(max)?);
                if max < min {
                    return Err(RuleError::InvalidBounds {
                        min,
                        max,
                        rule: self.rule.clone(),
                    });
                }
                (min, Some(max))
            }
            "zero_to_m" => (0, Some(self.bound(bounds.trim_start_matches(','))?)),
            "n_or_more" => (self.bound(bounds.trim_end_matches(','))?, None),
            "exactly_n" => {
                let n = self.bound(bounds)?;
                (n, Some(n))
            }
            _ => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(bounds))
    }

    fn simple(&mut self, pending: &mut Option<NodeLabel>) -> Result<Option<RuleId>, RuleError> {
        let Some(lexeme) = self.peek() else {
            return Ok(None);
        };
        let (name, value) = (lexeme.name.clone(), lexeme.value.clone());
        match name.as_str() {
            "capturing_" => {
                self.pos += 1;
                let rule = self.choice(pending)?;
                if !self.eat("_capturing") {
                    return Err(self.syntax("unclosed group".to_string()));
                }
                Ok(Some(rule))
            }
            kind @ ("skipped" | "kept") => {
                self.pos += 1;
                let kept = kind == "kept";
                let reference = if kept {
                    value.trim_start_matches('<').trim_end_matches('>')
                } else {
                    value.trim_matches(':')
                };
                let (token, unification) = self.reference(reference)?;
                if !self.defs.contains_token(token) {
                    return Err(RuleError::UnknownToken {
                        token: token.to_string(),
                        rule: self.rule.clone(),
                    });
                }
                let id = self.push(RuleKind::Token {
                    token: token.to_string(),
                    kept,
                });
                self.rules[id.0].unification = unification;
                Ok(Some(id))
            }
            "named" => {
                self.pos += 1;
                let reference = value.replacen("()", "", 1);
                let (callee, unification) = self.reference(&reference)?;
                let Some(&target) = self.names.get(callee) else {
                    return Err(RuleError::UnknownRule {
                        callee: callee.to_string(),
                        rule: self.rule.clone(),
                    });
                };
                let Some(index) = unification else {
                    return Ok(Some(target));
                };
                let id = self.push(RuleKind::Concatenation(vec![target]));
                self.rules[id.0].unification = Some(index);
                Ok(Some(id))
            }
            _ => Ok(None),
        }
    }

    /// Split `name[uid]` into the name and the unification index.
    fn reference<'r>(&self, text: &'r str) -> Result<(&'r str, Option<usize>), RuleError> {
        match text.strip_suffix(']').and_then(|t| t.split_once('[')) {
            Some((name, index)) => Ok((name, Some(self.bound(index)?))),
            None => Ok((text, None)),
        }
    }

    fn bound(&self, digits: &str) -> Result<usize, RuleError> {
        digits
            .trim()
            .parse()
            .map_err(|_| self.syntax(format!("invalid number {digits:?}")))
    }

    fn push(&mut self, kind: RuleKind) -> RuleId {
        let id = RuleId(self.rules.len());
        self.rules
            .push(Rule::new(RuleName::Transitional(self.transitional), kind));
        self.transitional += 1;
        id
    }

    /// The next lexeme, or `None` at the end of the body.
    fn peek(&self) -> Option<&Token> {
        self.lexemes.get(self.pos).filter(|l| !l.is_eof())
    }

    fn eat(&mut self, name: &str) -> bool {
        let matched = self.peek().is_some_and(|l| l.name == name);
        if matched {
            self.pos += 1;
        }
        matched
    }

    fn syntax(&self, message: String) -> RuleError {
        RuleError::Syntax {
            rule: self.rule.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Merge;
    use rstest::rstest;

    fn defs() -> TokenDefs {
        let mut defs = TokenDefs::new();
        for name in ["a", "b", "c", "t"] {
            defs.add_token("default", name, name, None).unwrap();
        }
        defs
    }

    fn compile_one(body: &str) -> RuleTable {
        compile(&defs(), [("r", body)]).unwrap()
    }

    fn kind(table: &RuleTable, id: RuleId) -> &RuleKind {
        &table[id].kind
    }

    #[test]
    fn test_single_token_is_not_wrapped() {
        let table = compile_one("<a>");
        let root = &table[table.root()];
        assert_eq!(root.name, RuleName::Named("r".into()));
        assert_eq!(
            root.kind,
            RuleKind::Token {
                token: "a".into(),
                kept: true
            }
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_concatenation_and_choice() {
        let table = compile_one("<a> ::b:: | <c>");
        let RuleKind::Choice(alternatives) = kind(&table, table.root()) else {
            panic!("expected a choice");
        };
        assert_eq!(alternatives.len(), 2);
        let RuleKind::Concatenation(first) = kind(&table, alternatives[0]) else {
            panic!("expected a concatenation");
        };
        assert_eq!(
            kind(&table, first[1]),
            &RuleKind::Token {
                token: "b".into(),
                kept: false
            }
        );
        assert!(table[alternatives[1]].is_transitional());
    }

    #[rstest]
    #[case("<a>?", 0, Some(1))]
    #[case("<a>+", 1, None)]
    #[case("<a>*", 0, None)]
    #[case("<a>{2,5}", 2, Some(5))]
    #[case("<a>{,3}", 0, Some(3))]
    #[case("<a>{4,}", 4, None)]
    #[case("<a>{3}", 3, Some(3))]
    fn test_quantifiers(#[case] body: &str, #[case] min: usize, #[case] max: Option<usize>) {
        let table = compile_one(body);
        let RuleKind::Repetition {
            min: got_min,
            max: got_max,
            ..
        } = kind(&table, table.root())
        else {
            panic!("expected a repetition");
        };
        assert_eq!((*got_min, *got_max), (min, max));
    }

    #[test]
    fn test_invalid_bounds() {
        let err = compile(&defs(), [("r", "<a>{5,2}")]).unwrap_err();
        assert!(matches!(err, RuleError::InvalidBounds { min: 5, max: 2, .. }));
    }

    #[test]
    fn test_unknown_token() {
        let err = compile(&defs(), [("r", "<a> ::nope::")]).unwrap_err();
        assert!(matches!(err, RuleError::UnknownToken { ref token, .. } if token == "nope"));
    }

    #[test]
    fn test_unknown_rule() {
        let err = compile(&defs(), [("r", "missing()")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot call rule missing() in rule r because it does not exist"
        );
    }

    #[test]
    fn test_no_rules() {
        let rules: [(&str, &str); 0] = [];
        assert!(matches!(compile(&defs(), rules), Err(RuleError::NoRules)));
    }

    #[test]
    fn test_duplicate_rule() {
        let err = compile(&defs(), [("r", "<a>"), ("#r", "<b>")]).unwrap_err();
        assert!(matches!(err, RuleError::DuplicateRule(ref name) if name == "r"));
    }

    #[rstest]
    #[case("<a> )")]
    #[case("( <a>")]
    #[case("<a> |")]
    #[case("<a> %")]
    #[case("")]
    fn test_syntax_errors(#[case] body: &str) {
        assert!(matches!(
            compile(&defs(), [("r", body)]),
            Err(RuleError::Syntax { .. })
        ));
    }

    #[test]
    fn test_unification_indexes() {
        let table = compile_one("::t[0]:: r()[1]? ::t[0]::");
        let RuleKind::Concatenation(children) = kind(&table, table.root()) else {
            panic!("expected a concatenation");
        };
        assert_eq!(table[children[0]].unification, Some(0));
        assert_eq!(table[children[2]].unification, Some(0));
        let RuleKind::Repetition { child, .. } = kind(&table, children[1]) else {
            panic!("expected a repetition");
        };
        assert_eq!(table[*child].unification, Some(1));
        assert_eq!(
            kind(&table, *child),
            &RuleKind::Concatenation(vec![table.root()])
        );
    }

    #[test]
    fn test_bare_call_is_wrapped() {
        let table = compile(&defs(), [("r", "s()"), ("s", "<a>")]).unwrap();
        let s = table.by_name("s").unwrap();
        assert_eq!(kind(&table, table.root()), &RuleKind::Concatenation(vec![s]));
        assert_eq!(table[table.root()].name, RuleName::Named("r".into()));
    }

    #[test]
    fn test_node_labels() {
        let table = compile(&defs(), [("#pair", "<a> <b>")]).unwrap();
        let root = &table[table.root()];
        assert_eq!(root.node, Some(NodeLabel::new("pair")));
        assert_eq!(root.default_node, Some(NodeLabel::new("pair")));
        assert_eq!(table.by_name("#pair"), Some(table.root()));

        // A label after the last repetition keeps the concatenation.
        let table = compile_one("<a> #list:M");
        let root = &table[table.root()];
        assert!(matches!(root.kind, RuleKind::Concatenation(ref c) if c.len() == 1));
        assert_eq!(root.node.as_ref().map(|l| l.merge), Some(Merge::Flat));
        assert_eq!(root.default_node, None);
    }

    #[test]
    fn test_each_alternative_has_its_own_label() {
        let table = compile_one("<a> #first | <b> #second");
        let RuleKind::Choice(alternatives) = kind(&table, table.root()) else {
            panic!("expected a choice");
        };
        let labels: Vec<_> = alternatives
            .iter()
            .map(|&id| table[id].node.as_ref().map(|l| l.id.as_str()))
            .collect();
        assert_eq!(labels, [Some("first"), Some("second")]);
    }

    #[test]
    fn test_source_is_kept() {
        let table = compile_one("  <a>  <b> ");
        assert_eq!(table[table.root()].source.as_deref(), Some("<a>  <b>"));
    }
}
