//! Iterative backtracking interpreter over a [`RuleTable`].
//!
//! Work is kept on an explicit `todo` stack and every decision is recorded
//! on the `trace`. Choices record the todo stack as it was when they were
//! taken; repetitions record a checkpoint after each completed iteration.
//! The todo stack is persistent, so a saved copy is a shared pointer.
//! Backtracking pops the trace back to the most recent such point and
//! resumes from its saved todo stack, so failure is a stack truncation.

use tracing::trace;

use super::ParseError;
use super::trace::{Consumed, Invocation, Todo, TodoStack, Trace};
use crate::lexer::Token;
use crate::position::SourceContext;
use crate::rule::{RuleId, RuleKind, RuleTable};

pub(crate) struct Engine<'p> {
    rules: &'p RuleTable,
    tokens: &'p [Token],
    text: &'p str,
    step_limit: Option<usize>,
    steps: usize,
    cursor: usize,
    /// Furthest token reached on any path.
    error_cursor: usize,
    depth: usize,
    todo: TodoStack,
    trace: Vec<Trace>,
}

impl<'p> Engine<'p> {
    pub(crate) fn new(
        rules: &'p RuleTable,
        tokens: &'p [Token],
        text: &'p str,
        step_limit: Option<usize>,
    ) -> Self {
        Self {
            rules,
            tokens,
            text,
            step_limit,
            steps: 0,
            cursor: 0,
            error_cursor: 0,
            depth: 0,
            todo: TodoStack::default(),
            trace: Vec::new(),
        }
    }

    // ─── Driving loop ───────────────────────────────────────────────────────

    /// Match the whole token stream against `root` and return the trace of
    /// the accepted path.
    pub(crate) fn run(mut self, root: RuleId) -> Result<Vec<Trace>, ParseError> {
        self.todo.push(Todo::Ekzit { rule: root });
        self.todo.push(Todo::Entry {
            rule: root,
            data: 0,
        });
        loop {
            if self.unfold()? && self.current().is_some_and(Token::is_eof) {
                trace!(steps = self.steps, "accepted");
                return Ok(self.trace);
            }
            if !self.backtrack() {
                return Err(self.unexpected());
            }
        }
    }

    /// Run pending work until it is exhausted (`true`) or a path fails.
    fn unfold(&mut self) -> Result<bool, ParseError> {
        while let Some(item) = self.todo.pop() {
            self.steps += 1;
            if let Some(limit) = self.step_limit
                && self.steps > limit
            {
                return Err(ParseError::StepLimitExceeded { limit });
            }
            let ok = match item {
                Todo::Entry { rule, data } => self.enter(rule, data),
                Todo::Ekzit { rule } => self.exit(rule),
                Todo::Repeat { rule, count, since } => {
                    self.repeat(rule, count, since);
                    true
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn backtrack(&mut self) -> bool {
        while let Some(entry) = self.trace.pop() {
            match entry {
                Trace::Token(_) => self.cursor = self.cursor.saturating_sub(1),
                Trace::Entry(Invocation {
                    rule,
                    data,
                    depth,
                    todo: Some(todo),
                    ..
                }) => {
                    // Retry the choice with its next alternative.
                    self.todo = todo;
                    self.depth = depth - usize::from(!self.rules[rule].is_transitional());
                    self.todo.push(Todo::Entry {
                        rule,
                        data: data + 1,
                    });
                    trace!(rule = rule.index(), alternative = data + 1, "backtrack");
                    return true;
                }
                Trace::Ekzit(Invocation {
                    rule,
                    data,
                    depth,
                    todo: Some(todo),
                    ..
                }) => {
                    // Settle the repetition with the iterations it had.
                    self.todo = todo;
                    self.depth = depth;
                    trace!(rule = rule.index(), iterations = data, "backtrack");
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    // ─── Rule activations ───────────────────────────────────────────────────

    fn enter(&mut self, id: RuleId, data: usize) -> bool {
        let rules = self.rules;
        let rule = &rules[id];
        let named = !rule.is_transitional();
        match &rule.kind {
            RuleKind::Token { token, kept } => {
                let Some(current) = self.current() else {
                    return false;
                };
                if current.name != *token {
                    return false;
                }
                if let Some(index) = rule.unification
                    && !self.unifies(index, &current.value)
                {
                    return false;
                }
                self.trace.push(Trace::Token(Consumed {
                    token: self.cursor,
                    kept: *kept,
                    unification: rule.unification,
                }));
                self.cursor += 1;
                self.error_cursor = self.error_cursor.max(self.cursor);
                // A token closes itself.
                self.todo.pop();
                true
            }
            RuleKind::Concatenation(children) => {
                self.depth += usize::from(named);
                self.trace
                    .push(Trace::Entry(Invocation::new(id, data, self.depth)));
                for &child in children.iter().rev() {
                    self.push_activation(child);
                }
                true
            }
            RuleKind::Choice(children) => {
                let Some(&child) = children.get(data) else {
                    return false;
                };
                self.depth += usize::from(named);
                self.trace.push(Trace::Entry(
                    Invocation::new(id, data, self.depth).with_todo(self.todo.clone()),
                ));
                self.push_activation(child);
                true
            }
            RuleKind::Repetition { child, min, .. } => {
                self.depth += usize::from(named);
                self.trace
                    .push(Trace::Entry(Invocation::new(id, 0, self.depth)));
                self.todo.push(Todo::Repeat {
                    rule: id,
                    count: *min,
                    since: self.cursor,
                });
                for _ in 0..*min {
                    self.push_activation(*child);
                }
                true
            }
        }
    }

    fn exit(&mut self, id: RuleId) -> bool {
        let rules = self.rules;
        let rule = &rules[id];
        let mut exit = Invocation::new(id, 0, self.depth);
        if let Some(index) = rule.unification {
            let text = self.consumed_by(id);
            if !self.unifies(index, &text) {
                return false;
            }
            exit.capture = Some(text);
        }
        self.trace.push(Trace::Ekzit(exit));
        if !rule.is_transitional() {
            self.depth = self.depth.saturating_sub(1);
        }
        true
    }

    /// Either settle a repetition after `count` iterations or try one more,
    /// leaving a checkpoint to settle at if the attempt fails.
    fn repeat(&mut self, id: RuleId, count: usize, since: usize) {
        let RuleKind::Repetition { child, max, .. } = self.rules[id].kind else {
            return;
        };
        let exhausted = max.is_some_and(|max| count >= max);
        let stalled = count > 0 && self.cursor == since;
        if exhausted || stalled {
            return;
        }
        self.trace.push(Trace::Ekzit(
            Invocation::new(id, count, self.depth).with_todo(self.todo.clone()),
        ));
        self.todo.push(Todo::Repeat {
            rule: id,
            count: count + 1,
            since: self.cursor,
        });
        self.push_activation(child);
    }

    fn push_activation(&mut self, rule: RuleId) {
        self.todo.push(Todo::Ekzit { rule });
        self.todo.push(Todo::Entry { rule, data: 0 });
    }

    // ─── Unification ────────────────────────────────────────────────────────

    /// Check `value` against earlier captures with the same index in the
    /// current rule activation.
    ///
    /// Walking back, the first named activation opened at or above the
    /// current depth bounds the scope. Captures inside deeper named
    /// activations belong to those activations and are skipped.
    fn unifies(&self, index: usize, value: &str) -> bool {
        let mut skip = 0usize;
        for entry in self.trace.iter().rev() {
            match entry {
                Trace::Entry(inv) if !self.rules[inv.rule].is_transitional() => {
                    if inv.depth <= self.depth {
                        break;
                    }
                    skip = skip.saturating_sub(1);
                }
                Trace::Ekzit(inv) if inv.todo.is_none() => {
                    if !self.rules[inv.rule].is_transitional() {
                        skip += usize::from(inv.depth > self.depth);
                    } else if skip == 0
                        && self.rules[inv.rule].unification == Some(index)
                        && inv.capture.as_deref().is_some_and(|c| c != value)
                    {
                        return false;
                    }
                }
                Trace::Token(consumed)
                    if skip == 0
                        && consumed.unification == Some(index)
                        && self.tokens[consumed.token].value != value =>
                {
                    return false;
                }
                _ => {}
            }
        }
        true
    }

    /// Concatenated token text consumed since the open activation of `id`.
    fn consumed_by(&self, id: RuleId) -> String {
        let mut nesting = 0usize;
        let mut parts = Vec::new();
        for entry in self.trace.iter().rev() {
            match entry {
                Trace::Ekzit(inv) if inv.rule == id && inv.todo.is_none() => nesting += 1,
                Trace::Entry(inv) if inv.rule == id => {
                    if nesting == 0 {
                        break;
                    }
                    nesting -= 1;
                }
                Trace::Token(consumed) => parts.push(self.tokens[consumed.token].value.as_str()),
                _ => {}
            }
        }
        parts.iter().rev().copied().collect()
    }

    // ─── Diagnostics ────────────────────────────────────────────────────────

    fn current(&self) -> Option<&'p Token> {
        self.tokens.get(self.cursor)
    }

    fn unexpected(&self) -> ParseError {
        let Some(token) = self
            .tokens
            .get(self.error_cursor)
            .or_else(|| self.tokens.last())
        else {
            return ParseError::Internal("empty token stream".to_string());
        };
        trace!(steps = self.steps, offset = token.offset, "rejected");
        ParseError::UnexpectedToken {
            token: token.name.clone(),
            value: token.value.clone(),
            context: SourceContext::new(self.text, token.offset),
        }
    }
}
