//! The syntax tree produced by a successful parse.
//!
//! Nodes live in an arena owned by [`SyntaxTree`]; [`TreeNode`] is a cheap
//! borrowed view used for traversal. Interior nodes carry the id of the rule
//! label that created them, token leaves carry the id `token` and the
//! matched [`TokenValue`].

mod dump;

pub use dump::Dump;

use std::fmt;

use crate::lexer::Token;

/// Id of every token leaf.
pub const TOKEN_ID: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(usize);

/// The token a leaf was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValue {
    pub token: String,
    pub value: String,
    pub namespace: String,
    /// Byte offset in the parsed text.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeData {
    id: String,
    value: Option<TokenValue>,
    children: Vec<NodeIndex>,
    parent: Option<NodeIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    nodes: Vec<NodeData>,
    root: NodeIndex,
}

impl SyntaxTree {
    pub fn root(&self) -> TreeNode<'_> {
        self.node(self.root)
    }

    pub fn node(&self, index: NodeIndex) -> TreeNode<'_> {
        TreeNode { tree: self, index }
    }

    /// Walk the tree from the root with `visitor`.
    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        self.root().accept(visitor)
    }
}

impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.accept(&mut Dump::default()))
    }
}

/// A node of a [`SyntaxTree`].
#[derive(Clone, Copy)]
pub struct TreeNode<'a> {
    tree: &'a SyntaxTree,
    index: NodeIndex,
}

impl<'a> TreeNode<'a> {
    fn data(&self) -> &'a NodeData {
        &self.tree.nodes[self.index.0]
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Node id, without `#`. Token leaves have the id `token`.
    pub fn id(&self) -> &'a str {
        &self.data().id
    }

    pub fn value(&self) -> Option<&'a TokenValue> {
        self.data().value.as_ref()
    }

    /// Name of the token of a leaf.
    pub fn token(&self) -> Option<&'a str> {
        self.value().map(|v| v.token.as_str())
    }

    /// Matched text of a leaf.
    pub fn text(&self) -> Option<&'a str> {
        self.value().map(|v| v.value.as_str())
    }

    pub fn is_token(&self) -> bool {
        self.data().value.is_some()
    }

    pub fn children(self) -> impl ExactSizeIterator<Item = TreeNode<'a>> + 'a {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&index| TreeNode { tree, index })
    }

    pub fn child(&self, i: usize) -> Option<TreeNode<'a>> {
        self.data()
            .children
            .get(i)
            .map(|&index| self.tree.node(index))
    }

    pub fn child_count(&self) -> usize {
        self.data().children.len()
    }

    pub fn parent(&self) -> Option<TreeNode<'a>> {
        self.data().parent.map(|index| self.tree.node(index))
    }

    pub fn accept<V: Visitor>(self, visitor: &mut V) -> V::Output {
        visitor.visit(self)
    }
}

impl fmt::Debug for TreeNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TreeNode");
        s.field("id", &self.id());
        if let Some(value) = self.value() {
            s.field("value", value);
        }
        s.field("children", &self.child_count()).finish()
    }
}

/// A traversal over a syntax tree. The visitor decides how to descend.
pub trait Visitor {
    type Output;

    fn visit(&mut self, node: TreeNode<'_>) -> Self::Output;
}

/// Mutable node storage used while a tree is assembled.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: Vec<NodeData>,
}

impl NodeArena {
    pub(crate) fn leaf(&mut self, token: &Token) -> NodeIndex {
        self.push(NodeData {
            id: TOKEN_ID.to_string(),
            value: Some(TokenValue {
                token: token.name.clone(),
                value: token.value.clone(),
                namespace: token.namespace.clone(),
                offset: token.offset,
            }),
            children: Vec::new(),
            parent: None,
        })
    }

    /// A new interior node adopting `children`.
    pub(crate) fn interior(&mut self, id: &str, children: Vec<NodeIndex>) -> NodeIndex {
        let index = self.push(NodeData {
            id: id.to_string(),
            value: None,
            children: Vec::new(),
            parent: None,
        });
        for child in children {
            self.append(index, child);
        }
        index
    }

    pub(crate) fn append(&mut self, parent: NodeIndex, child: NodeIndex) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub(crate) fn id(&self, index: NodeIndex) -> &str {
        &self.nodes[index.0].id
    }

    pub(crate) fn is_token(&self, index: NodeIndex) -> bool {
        self.nodes[index.0].value.is_some()
    }

    pub(crate) fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.nodes[index.0].children
    }

    pub(crate) fn finish(self, root: NodeIndex) -> SyntaxTree {
        SyntaxTree {
            nodes: self.nodes,
            root,
        }
    }

    fn push(&mut self, data: NodeData) -> NodeIndex {
        self.nodes.push(data);
        NodeIndex(self.nodes.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(name: &str, value: &str, offset: usize) -> Token {
        Token {
            name: name.into(),
            value: value.into(),
            offset,
            length: value.len(),
            namespace: "default".into(),
            keep: true,
        }
    }

    fn sample() -> SyntaxTree {
        let mut arena = NodeArena::default();
        let a = arena.leaf(&token("word", "a", 0));
        let b = arena.leaf(&token("word", "b", 2));
        let inner = arena.interior("inner", vec![b]);
        let root = arena.interior("outer", vec![a, inner]);
        arena.finish(root)
    }

    #[test]
    fn test_navigation() {
        let tree = sample();
        let root = tree.root();
        assert_eq!(root.id(), "outer");
        assert!(!root.is_token());
        assert_eq!(root.child_count(), 2);
        assert!(root.parent().is_none());

        let a = root.child(0).unwrap();
        assert_eq!(a.id(), TOKEN_ID);
        assert_eq!(a.token(), Some("word"));
        assert_eq!(a.text(), Some("a"));
        assert_eq!(a.parent().map(|p| p.id()), Some("outer"));

        let inner = root.child(1).unwrap();
        let b = inner.children().next().unwrap();
        assert_eq!(b.value().map(|v| v.offset), Some(2));
        assert_eq!(b.parent().unwrap().index(), inner.index());
        assert!(root.child(2).is_none());
    }

    struct CountLeaves;

    impl Visitor for CountLeaves {
        type Output = usize;

        fn visit(&mut self, node: TreeNode<'_>) -> usize {
            if node.is_token() {
                return 1;
            }
            node.children().map(|child| child.accept(self)).sum()
        }
    }

    #[test]
    fn test_visitor() {
        assert_eq!(sample().accept(&mut CountLeaves), 2);
    }
}
