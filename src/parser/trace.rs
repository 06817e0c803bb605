//! Work items and trace records of the backtracking engine.

use std::rc::Rc;

use crate::rule::RuleId;

/// Pending work.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Todo {
    /// Start an activation. `data` is the alternative index of a choice.
    Entry { rule: RuleId, data: usize },
    /// Close an activation.
    Ekzit { rule: RuleId },
    /// Resume a repetition after `count` completed iterations, the last of
    /// which started at token `since`.
    Repeat {
        rule: RuleId,
        count: usize,
        since: usize,
    },
}

/// Persistent stack of pending work.
///
/// Clones share their tail, so saving the stack at a backtracking point costs
/// one pointer however deep the parse is.
#[derive(Debug, Clone, Default)]
pub(crate) struct TodoStack {
    head: Option<Rc<TodoNode>>,
}

#[derive(Debug)]
struct TodoNode {
    item: Todo,
    next: Option<Rc<TodoNode>>,
}

impl TodoStack {
    pub(crate) fn push(&mut self, item: Todo) {
        let next = self.head.take();
        self.head = Some(Rc::new(TodoNode { item, next }));
    }

    pub(crate) fn pop(&mut self) -> Option<Todo> {
        let node = self.head.take()?;
        match Rc::try_unwrap(node) {
            Ok(node) => {
                self.head = node.next;
                Some(node.item)
            }
            Err(shared) => {
                self.head = shared.next.clone();
                Some(shared.item)
            }
        }
    }
}

impl Drop for TodoStack {
    // Unlink iteratively; a long unshared chain would otherwise drop
    // recursively.
    fn drop(&mut self) {
        let mut head = self.head.take();
        while let Some(node) = head {
            match Rc::try_unwrap(node) {
                Ok(mut node) => head = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// One rule activation boundary as recorded in the trace.
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub rule: RuleId,
    /// Chosen alternative for a choice, completed iterations for a
    /// repetition checkpoint.
    pub data: usize,
    pub depth: usize,
    /// Work to restore when backtracking to this point.
    pub todo: Option<TodoStack>,
    /// Text consumed by a unifying rule call.
    pub capture: Option<String>,
}

impl Invocation {
    pub(crate) fn new(rule: RuleId, data: usize, depth: usize) -> Self {
        Self {
            rule,
            data,
            depth,
            todo: None,
            capture: None,
        }
    }

    pub(crate) fn with_todo(mut self, todo: TodoStack) -> Self {
        self.todo = Some(todo);
        self
    }
}

/// A consumed token.
#[derive(Debug, Clone)]
pub(crate) struct Consumed {
    /// Index into the token stream.
    pub token: usize,
    pub kept: bool,
    pub unification: Option<usize>,
}

#[derive(Debug, Clone)]
pub(crate) enum Trace {
    Entry(Invocation),
    Ekzit(Invocation),
    Token(Consumed),
}

impl Trace {
    /// A repetition's backtracking point. It is not a closing bracket.
    pub(crate) fn is_checkpoint(&self) -> bool {
        matches!(self, Trace::Ekzit(inv) if inv.todo.is_some())
    }
}
