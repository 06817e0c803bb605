use super::{TreeNode, Visitor};
use crate::lexer::DEFAULT_NAMESPACE;

/// Renders a tree one node per line, indented with `>  ` per level.
///
/// ```text
/// >  #pair
/// >  >  token(string:string, foo)
/// >  >  token(true, true)
/// ```
#[derive(Debug, Default)]
pub struct Dump {
    depth: usize,
}

impl Visitor for Dump {
    type Output = String;

    fn visit(&mut self, node: TreeNode<'_>) -> String {
        self.depth += 1;
        let mut out = ">  ".repeat(self.depth);
        match node.value() {
            Some(value) => {
                out.push_str(node.id());
                out.push('(');
                if value.namespace != DEFAULT_NAMESPACE {
                    out.push_str(&value.namespace);
                    out.push(':');
                }
                out.push_str(&value.token);
                out.push_str(", ");
                out.push_str(&value.value);
                out.push(')');
            }
            None => {
                out.push('#');
                out.push_str(node.id());
            }
        }
        out.push('\n');
        for child in node.children() {
            out.push_str(&child.accept(self));
        }
        self.depth -= 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::Token;
    use crate::tree::NodeArena;

    #[test]
    fn test_dump() {
        let mut arena = NodeArena::default();
        let key = arena.leaf(&Token {
            name: "string".into(),
            value: "foo".into(),
            offset: 1,
            length: 3,
            namespace: "string".into(),
            keep: true,
        });
        let value = arena.leaf(&Token {
            name: "true".into(),
            value: "true".into(),
            offset: 7,
            length: 4,
            namespace: "default".into(),
            keep: true,
        });
        let pair = arena.interior("pair", vec![key, value]);
        let tree = arena.finish(pair);
        assert_eq!(
            tree.to_string(),
            ">  #pair\n>  >  token(string:string, foo)\n>  >  token(true, true)\n"
        );
    }
}
