//! Assembles the syntax tree from an accepted trace.
//!
//! The trace is walked once with an explicit stack. A named activation opens
//! a marker, labels and finished nodes are stacked on top of it, and its
//! closing record folds everything above the marker into one node (or passes
//! the nodes through when no label applies).

use super::ParseError;
use super::trace::Trace;
use crate::lexer::Token;
use crate::rule::{Merge, NodeLabel, RuleId, RuleTable};
use crate::tree::{NodeArena, NodeIndex, SyntaxTree};

enum Slot {
    Open(RuleId),
    Label(NodeLabel),
    Node(NodeIndex),
}

/// Build the tree for an accepted `trace`.
///
/// When the root activation yields no node or several (a root rule without a
/// label, or one that keeps no tokens), they are wrapped in a synthesized
/// node named after the root rule.
pub(crate) fn build(
    rules: &RuleTable,
    tokens: &[Token],
    trace: &[Trace],
    root: RuleId,
) -> Result<SyntaxTree, ParseError> {
    let trace: Vec<&Trace> = trace.iter().filter(|t| !t.is_checkpoint()).collect();
    let mut arena = NodeArena::default();
    let mut slots = Vec::new();

    let mut i = 0;
    while i < trace.len() {
        match trace[i] {
            Trace::Entry(entry) => {
                // An activation that matched nothing leaves no trace in the tree.
                if let Some(Trace::Ekzit(exit)) = trace.get(i + 1)
                    && exit.rule == entry.rule
                {
                    i += 2;
                    continue;
                }
                let rule = &rules[entry.rule];
                if !rule.is_transitional() {
                    slots.push(Slot::Open(entry.rule));
                }
                if let Some(label) = &rule.node {
                    slots.push(Slot::Label(label.clone()));
                }
            }
            Trace::Token(consumed) => {
                if consumed.kept {
                    slots.push(Slot::Node(arena.leaf(&tokens[consumed.token])));
                }
            }
            Trace::Ekzit(exit) => {
                if !rules[exit.rule].is_transitional() {
                    close(rules, exit.rule, &mut slots, &mut arena)?;
                }
            }
        }
        i += 1;
    }

    let mut nodes = Vec::with_capacity(slots.len());
    for slot in slots {
        let Slot::Node(node) = slot else {
            return Err(ParseError::Internal(
                "rule activation left open after parsing".to_string(),
            ));
        };
        nodes.push(node);
    }
    let root = match nodes.as_slice() {
        [node] => *node,
        _ => arena.interior(&rules[root].name.to_string(), nodes),
    };
    Ok(arena.finish(root))
}

fn close(
    rules: &RuleTable,
    id: RuleId,
    slots: &mut Vec<Slot>,
    arena: &mut NodeArena,
) -> Result<(), ParseError> {
    let rule = &rules[id];
    let mut children = Vec::new();
    let mut label = None;
    loop {
        match slots.pop() {
            Some(Slot::Node(node)) => children.push(node),
            // The most recently discovered label wins.
            Some(Slot::Label(found)) => {
                label.get_or_insert(found);
            }
            Some(Slot::Open(open)) if open == id => break,
            Some(Slot::Open(open)) => {
                return Err(ParseError::Internal(format!(
                    "rule {} closed while {} was open",
                    rule.name, rules[open].name
                )));
            }
            None => {
                return Err(ParseError::Internal(format!(
                    "rule {} closed without being opened",
                    rule.name
                )));
            }
        }
    }
    children.reverse();

    let Some(label) = label.or_else(|| rule.default_node.clone()) else {
        slots.extend(children.into_iter().map(Slot::Node));
        return Ok(());
    };

    if label.merge != Merge::None
        && let Some(Slot::Node(sibling)) = slots.last()
        && arena.id(*sibling) == label.id
    {
        let sibling = *sibling;
        match label.merge {
            Merge::Recursive => merge_recursive(arena, sibling, children),
            _ => {
                for child in children {
                    arena.append(sibling, child);
                }
            }
        }
        return Ok(());
    }

    let id = rule.node.as_ref().map_or(label.id.as_str(), |own| own.id.as_str());
    let node = arena.interior(id, children);
    slots.push(Slot::Node(node));
    Ok(())
}

/// Append `children` to `target`, descending into `target`'s last child
/// whenever an incoming interior node has the same id.
fn merge_recursive(arena: &mut NodeArena, target: NodeIndex, children: Vec<NodeIndex>) {
    let mut work: Vec<(NodeIndex, NodeIndex)> =
        children.into_iter().rev().map(|c| (target, c)).collect();
    while let Some((target, node)) = work.pop() {
        let last = arena.children(target).last().copied();
        match last {
            Some(last) if !arena.is_token(node) && arena.id(last) == arena.id(node) => {
                let grandchildren = arena.children(node).to_vec();
                work.extend(grandchildren.into_iter().rev().map(|c| (last, c)));
            }
            _ => arena.append(target, node),
        }
    }
}
