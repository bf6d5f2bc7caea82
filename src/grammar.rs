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

//! Grammar builder and its compiled form.
//!
//! A grammar is built at runtime from named rules in textual form. Rules can
//! be registered as stubs first and filled in later with
//! [update_rule](struct.Grammar.html#method.update_rule), which is how cyclic
//! rule sets are constructed. When the grammar is complete, it is compiled to
//! the look-up tables required for matching; compilation checks that all
//! references resolve and that no rule is left recursive.

use std::collections::HashMap;

use thiserror::Error;

use crate::rules::{parse_rule_text, RuleExpr};

/// Rule ids are indices into the rule table. As such, they can be fairly
/// small integers to save space. 16 bit should be sufficient for all
/// purposes. If not, file a feature request.
pub type RuleId = u16;

/// Errors when building or compiling a grammar.
///
/// Match failure is not an error; it is reported as part of the match result.
#[derive(Debug, Error, PartialEq)]
pub enum GrammarError {
    /// A brace in the rule text has no partner.
    #[error("unbalanced braces in rule text")]
    UnbalancedBraces,

    /// The rule text ends in the middle of an expression.
    #[error("rule text ends in the middle of an expression")]
    UnexpectedEnd,

    /// An operator character appears where a matcher is expected.
    #[error("stray operator {0:?} in rule text")]
    StrayOperator(char),

    /// The upper end of a character range is below the lower end.
    #[error("invalid character range {0:?}-{1:?}")]
    BadRange(char, char),

    /// A `#{...}` set without any option.
    #[error("empty rule set")]
    EmptySet,

    /// A rule of this name has already been added.
    #[error("duplicate rule: {0:?}")]
    DuplicateRule(String),

    /// Update of a rule that has not been added.
    #[error("can't update unknown rule: {0:?}")]
    UnknownRule(String),

    /// A `${...}` reference that does not resolve at compile time.
    #[error("reference to unknown rule: {0:?}")]
    UnknownReference(String),

    /// No root rule has been set before compiling.
    #[error("no root rule set")]
    NoRootRule,

    /// The rule can call itself without consuming input.
    #[error("rule {0:?} is left recursive")]
    LeftRecursive(String),

    /// Too many rules to index with a rule id.
    #[error("too many rules")]
    TooLarge,
}

/// One rule as registered with the builder.
struct RuleDef {
    name: String,
    expr: RuleExpr<String>,
    pushing: bool,
}

/// Grammar builder with rules in textual reference form.
pub struct Grammar {
    rules: Vec<RuleDef>,
    index: HashMap<String, usize>,
    root: Option<String>,
}

/// One rule of a compiled grammar, references resolved to rule ids.
pub(crate) struct CompiledRule {
    pub(crate) name: String,
    pub(crate) expr: RuleExpr<RuleId>,
    pub(crate) pushing: bool,

    /// Fixed node text for the formatting marker rules, `None` for all
    /// ordinary rules.
    pub(crate) synthetic: Option<&'static str>,
}

/// A checked and compacted grammar, ready for matching.
pub struct CompiledGrammar {
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) root: RuleId,
}

/// The marker rules seed formatting hints in the syntax tree. They carry a
/// fixed text instead of the matched input.
fn synthetic_text(name: &str) -> Option<&'static str> {
    match name {
        "insert space" => Some(" "),
        "insert \n" => Some("\n"),
        "insert \ns" => Some("\n"),
        "line-cont" => Some(" \\\n"),
        _ => None,
    }
}

impl Grammar {
    /// Return a new, empty grammar builder.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            index: HashMap::new(),
            root: None,
        }
    }

    /// Compile `text` and register it under `name`. A pushing rule creates a
    /// syntax tree node when it matches; a plain rule is transparent.
    pub fn add_rule(&mut self, name: &str, text: &str, pushing: bool) -> Result<(), GrammarError> {
        if self.index.contains_key(name) {
            return Err(GrammarError::DuplicateRule(name.to_string()));
        }
        let expr = parse_rule_text(text)?;
        self.index.insert(name.to_string(), self.rules.len());
        self.rules.push(RuleDef {
            name: name.to_string(),
            expr,
            pushing,
        });
        Ok(())
    }

    /// Replace the expression of an already registered rule.
    ///
    /// This keeps the registration, so references compiled against the name
    /// stay valid. Together with stub rules this allows forward references
    /// and cycles.
    pub fn update_rule(
        &mut self,
        name: &str,
        text: &str,
        pushing: bool,
    ) -> Result<(), GrammarError> {
        let slot = *self
            .index
            .get(name)
            .ok_or_else(|| GrammarError::UnknownRule(name.to_string()))?;
        let expr = parse_rule_text(text)?;
        self.rules[slot].expr = expr;
        self.rules[slot].pushing = pushing;
        Ok(())
    }

    /// Designate the entry point for matching.
    pub fn set_root(&mut self, name: &str) {
        self.root = Some(name.to_string());
    }

    /// Compile the grammar for matching.
    ///
    /// Checks that a root rule is set, that every reference resolves, and
    /// that no rule can reach itself again without consuming input.
    pub fn compile(self) -> Result<CompiledGrammar, GrammarError> {
        let Grammar { rules, index, root } = self;

        if rules.len() > RuleId::max_value() as usize {
            return Err(GrammarError::TooLarge);
        }
        let root_name = root.ok_or(GrammarError::NoRootRule)?;
        let root = *index
            .get(&root_name)
            .ok_or_else(|| GrammarError::UnknownReference(root_name.clone()))?
            as RuleId;

        let mut compiled = Vec::with_capacity(rules.len());
        for def in rules {
            let expr = def.expr.map_refs(&mut |name: String| {
                index
                    .get(&name)
                    .map(|slot| *slot as RuleId)
                    .ok_or(GrammarError::UnknownReference(name))
            })?;
            let synthetic = synthetic_text(&def.name);
            compiled.push(CompiledRule {
                name: def.name,
                expr,
                pushing: def.pushing,
                synthetic,
            });
        }

        let grammar = CompiledGrammar {
            rules: compiled,
            root,
        };
        if let Some(id) = grammar.find_left_recursion() {
            return Err(GrammarError::LeftRecursive(
                grammar.rules[id as usize].name.clone(),
            ));
        }
        debug!(
            "compiled grammar: {} rules, root {:?}",
            grammar.rules.len(),
            grammar.rules[grammar.root as usize].name
        );
        Ok(grammar)
    }
}

/// Traversal state for the left-recursion search.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl CompiledGrammar {
    /// Number of rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Printable name of a rule.
    pub fn rule_name(&self, rule: RuleId) -> &str {
        &self.rules[rule as usize].name
    }

    /// Convert a rule name to its id.
    ///
    /// This function is slow and should not be used for mass queries.
    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rules
            .iter()
            .position(|r| r.name == name)
            .map(|slot| slot as RuleId)
    }

    /// Id of the root rule.
    pub fn root(&self) -> RuleId {
        self.root
    }

    /// Whether each rule can match without consuming input.
    fn nullable_table(&self) -> Vec<bool> {
        let mut nullable = vec![false; self.rules.len()];
        loop {
            let mut changed = false;
            for (slot, rule) in self.rules.iter().enumerate() {
                if !nullable[slot] && expr_nullable(&rule.expr, &nullable) {
                    nullable[slot] = true;
                    changed = true;
                }
            }
            if !changed {
                return nullable;
            }
        }
    }

    /// Find a rule that can reach itself again at the same input position.
    /// Returns a member of the cycle, or `None` if the grammar is clean.
    fn find_left_recursion(&self) -> Option<RuleId> {
        let nullable = self.nullable_table();
        let mut heads: Vec<Vec<RuleId>> = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let mut refs = Vec::new();
            collect_head_refs(&rule.expr, &nullable, &mut refs);
            heads.push(refs);
        }

        let mut marks = vec![Mark::Unvisited; self.rules.len()];
        for start in 0..self.rules.len() {
            if marks[start] == Mark::Unvisited {
                if let Some(id) = cycle_search(start as RuleId, &heads, &mut marks) {
                    return Some(id);
                }
            }
        }
        None
    }
}

fn expr_nullable(expr: &RuleExpr<RuleId>, nullable: &[bool]) -> bool {
    match expr {
        RuleExpr::Char(_) | RuleExpr::Range(_, _) => false,
        RuleExpr::Anything | RuleExpr::Repeat(_) => true,
        RuleExpr::Sequence(items) => items.iter().all(|i| expr_nullable(i, nullable)),
        RuleExpr::AnyOf(items) => items.iter().any(|i| expr_nullable(i, nullable)),
        RuleExpr::Rule(id) => nullable[*id as usize],
        RuleExpr::Substitute { options, .. } => options.iter().any(|id| nullable[*id as usize]),
    }
}

/// Collect the rules that can be entered before any input is consumed.
fn collect_head_refs(expr: &RuleExpr<RuleId>, nullable: &[bool], out: &mut Vec<RuleId>) {
    match expr {
        RuleExpr::Char(_) | RuleExpr::Range(_, _) | RuleExpr::Anything => {}
        RuleExpr::Sequence(items) => {
            for item in items {
                collect_head_refs(item, nullable, out);
                if !expr_nullable(item, nullable) {
                    break;
                }
            }
        }
        RuleExpr::AnyOf(items) => {
            for item in items {
                collect_head_refs(item, nullable, out);
            }
        }
        RuleExpr::Repeat(inner) => collect_head_refs(inner, nullable, out),
        RuleExpr::Rule(id) => out.push(*id),
        RuleExpr::Substitute { options, .. } => out.extend(options.iter().copied()),
    }
}

fn cycle_search(node: RuleId, heads: &[Vec<RuleId>], marks: &mut [Mark]) -> Option<RuleId> {
    marks[node as usize] = Mark::InProgress;
    for &next in &heads[node as usize] {
        match marks[next as usize] {
            Mark::InProgress => return Some(next),
            Mark::Unvisited => {
                if let Some(id) = cycle_search(next, heads, marks) {
                    return Some(id);
                }
            }
            Mark::Done => {}
        }
    }
    marks[node as usize] = Mark::Done;
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_rules_are_rejected() {
        let mut grammar = Grammar::new();
        grammar.add_rule("a", "x", false).expect("first add works");
        assert_eq!(
            grammar.add_rule("a", "y", false),
            Err(GrammarError::DuplicateRule("a".to_string()))
        );
    }

    #[test]
    fn update_needs_a_registered_rule() {
        let mut grammar = Grammar::new();
        assert_eq!(
            grammar.update_rule("a", "x", false),
            Err(GrammarError::UnknownRule("a".to_string()))
        );
    }

    #[test]
    fn stub_then_update() {
        let mut grammar = Grammar::new();
        grammar.add_rule("word", "STUB!", false).expect("stub");
        grammar
            .add_rule("root", "${word}", true)
            .expect("reference to stub");
        grammar
            .update_rule("word", "a-z a-z^*", false)
            .expect("update");
        grammar.set_root("root");
        assert!(grammar.compile().is_ok());
    }

    #[test]
    fn dangling_references_fail_at_compile_time() {
        let mut grammar = Grammar::new();
        grammar.add_rule("root", "${nothing}", true).expect("add");
        grammar.set_root("root");
        assert_eq!(
            grammar.compile().err(),
            Some(GrammarError::UnknownReference("nothing".to_string()))
        );
    }

    #[test]
    fn missing_root_fails_at_compile_time() {
        let mut grammar = Grammar::new();
        grammar.add_rule("a", "x", false).expect("add");
        assert_eq!(grammar.compile().err(), Some(GrammarError::NoRootRule));
    }

    #[test]
    fn direct_left_recursion_is_rejected() {
        let mut grammar = Grammar::new();
        grammar.add_rule("s", "{${s} x} | x", true).expect("add");
        grammar.set_root("s");
        assert_eq!(
            grammar.compile().err(),
            Some(GrammarError::LeftRecursive("s".to_string()))
        );
    }

    #[test]
    fn left_recursion_through_a_nullable_prefix_is_rejected() {
        let mut grammar = Grammar::new();
        grammar.add_rule("ε", "", false).expect("add");
        grammar.add_rule("maybe", "m|${ε}", false).expect("add");
        grammar.add_rule("s", "${maybe} ${s} x", true).expect("add");
        grammar.set_root("s");
        assert_eq!(
            grammar.compile().err(),
            Some(GrammarError::LeftRecursive("s".to_string()))
        );
    }

    #[test]
    fn right_recursion_is_fine() {
        let mut grammar = Grammar::new();
        grammar
            .add_rule("list", "a {${list}}|b", true)
            .expect("add");
        grammar.set_root("list");
        assert!(grammar.compile().is_ok());
    }

    #[test]
    fn marker_rules_get_synthetic_texts() {
        let mut grammar = Grammar::new();
        grammar.add_rule("insert space", "", true).expect("add");
        grammar
            .add_rule("root", "${insert space}", true)
            .expect("add");
        grammar.set_root("root");
        let compiled = grammar.compile().expect("compiles");
        let id = compiled.rule_id("insert space").expect("registered");
        assert_eq!(compiled.rules[id as usize].synthetic, Some(" "));
        assert_eq!(compiled.rule_name(id), "insert space");
    }
}
