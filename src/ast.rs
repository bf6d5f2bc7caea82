/*
    MIT License

    Copyright (c) 2020 Lars Krueger <lars_e_krueger@gmx.de>

    Permission is hereby granted, free of charge, to any person obtaining a copy
    of this software and associated documentation files (the "Software"), to deal
    in the Software without restriction, including without limitation the rights
    to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
    copies of the Software, and to permit persons to whom the Software is
    furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in all
    copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
    OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
    SOFTWARE.
*/

//! Syntax tree built by the matcher.

use crate::style;

/// One node of the syntax tree.
///
/// A node is created for every pushing rule that takes part in a successful
/// match. Children appear in source order and are exclusively owned by their
/// parent; dropping the root releases the whole tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    /// Name of the rule that produced the node.
    pub rule: String,

    /// The matched text. For leaves this is the matched input slice, for
    /// inner nodes the concatenation of the children's texts, and for the
    /// formatting marker rules a fixed synthetic string.
    pub text: String,

    /// Child nodes in source order.
    pub children: Vec<AstNode>,
}

impl AstNode {
    /// Render the tree with box-drawing connectors, one `rule: text` line per
    /// node. With `colored` set, rule names and texts are wrapped in ANSI
    /// color escapes.
    pub fn to_tree_string(&self, colored: bool) -> String {
        let mut out = String::new();
        self.format_node(&mut out, "", "", colored);
        out
    }

    fn format_node(&self, out: &mut String, lead: &str, child_lead: &str, colored: bool) {
        out.push_str(lead);
        if colored {
            out.push_str(&style::prefix(style::RULE_NAME));
            out.push_str(&self.rule);
            out.push_str(style::RESET);
            out.push_str(": ");
            out.push_str(&style::prefix(style::NODE_TEXT));
            out.push_str(&self.text);
            out.push_str(style::RESET);
        } else {
            out.push_str(&self.rule);
            out.push_str(": ");
            out.push_str(&self.text);
        }
        out.push('\n');

        for (index, child) in self.children.iter().enumerate() {
            let last = index + 1 == self.children.len();
            let lead = format!("{}{}", child_lead, if last { "└─" } else { "├─" });
            let next_lead = format!("{}{}", child_lead, if last { "  " } else { "│ " });
            child.format_node(out, &lead, &next_lead, colored);
        }
    }

    /// Pre-order iteration over the node and all its descendants.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a AstNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(rule: &str, text: &str) -> AstNode {
        AstNode {
            rule: rule.to_string(),
            text: text.to_string(),
            children: Vec::new(),
        }
    }

    #[test]
    fn tree_dump_connectors() {
        let tree = AstNode {
            rule: "sum".to_string(),
            text: "1+2".to_string(),
            children: vec![leaf("number", "1"), leaf("+", "+"), leaf("number", "2")],
        };
        let dump = tree.to_tree_string(false);
        assert_eq!(dump, "sum: 1+2\n├─number: 1\n├─+: +\n└─number: 2\n");
    }

    #[test]
    fn nested_dump_indents_under_the_last_child() {
        let tree = AstNode {
            rule: "a".to_string(),
            text: "xy".to_string(),
            children: vec![AstNode {
                rule: "b".to_string(),
                text: "xy".to_string(),
                children: vec![leaf("c", "x"), leaf("d", "y")],
            }],
        };
        let dump = tree.to_tree_string(false);
        assert_eq!(dump, "a: xy\n└─b: xy\n  ├─c: x\n  └─d: y\n");
    }

    #[test]
    fn walk_is_pre_order() {
        let tree = AstNode {
            rule: "a".to_string(),
            text: String::new(),
            children: vec![
                AstNode {
                    rule: "b".to_string(),
                    text: String::new(),
                    children: vec![leaf("c", "")],
                },
                leaf("d", ""),
            ],
        };
        let mut names = Vec::new();
        tree.walk(&mut |node| names.push(node.rule.as_str()));
        assert_eq!(names, ["a", "b", "c", "d"]);
    }
}
