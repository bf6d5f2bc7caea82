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

//! Matching engine.
//!
//! Matches an input string against the root rule of a compiled grammar,
//! building the syntax tree of pushing rules along the way. All combinators
//! cooperate through an explicit continuation: ordered choice retries later
//! alternatives, repetition backs off one repetition at a time, and the
//! wildcard grows one character at a time when the rest of the expression
//! cannot complete otherwise. The engine keeps track of the furthest input
//! position it ever reached and the rules in progress at that moment, which
//! is the basis of the parse failure report.

use crate::ast::AstNode;
use crate::grammar::{CompiledGrammar, RuleId};
use crate::rules::{FilterMode, RuleExpr, SetFilter};

/// Outcome of a match attempt.
///
/// A failed match is a normal outcome, not an error. The tree is present
/// exactly when the match succeeded and the root rule is a pushing rule; the
/// caller owns it.
#[derive(Debug)]
pub struct MatchResult {
    /// Whether a prefix of the input matched the root rule.
    pub matched: bool,

    /// Number of input bytes consumed from position 0.
    pub match_length: usize,

    /// The syntax tree of the match.
    pub tree: Option<AstNode>,

    /// Furthest byte offset the matcher ever reached.
    pub max_match_length: usize,

    /// Rules that were in progress at the furthest position, outermost first.
    pub rule_stack: Vec<String>,
}

/// What to match after the current expression. The frames borrow each other
/// on the call stack, so backtracking into an earlier frame is a plain
/// return.
///
/// TODO: Flatten the frames into an explicit heap stack to lift the call
/// depth limit on large inputs.
enum Cont<'g, 'c> {
    /// The whole expression stack has matched. Records the end position.
    Accept,

    /// Match the remaining expressions of a sequence, then continue.
    Sequence(&'g [RuleExpr<RuleId>], &'c Cont<'g, 'c>),

    /// One repetition has been matched; try to match more of them. The
    /// position field is where the repetition started, used to stop
    /// repetitions that consume nothing.
    RepeatNext(&'g RuleExpr<RuleId>, usize, &'c Cont<'g, 'c>),

    /// The body of a pushing rule has matched: wrap the nodes produced since
    /// `mark` into one node, then continue.
    FinishRule {
        id: RuleId,
        start: usize,
        mark: usize,
        next: &'c Cont<'g, 'c>,
    },

    /// The body of a plain rule has matched. Only maintains the rule stack.
    EndRule { id: RuleId, next: &'c Cont<'g, 'c> },
}

/// All mutable state of one match run.
struct Matcher<'g> {
    grammar: &'g CompiledGrammar,
    input: &'g str,

    /// Nodes produced so far, children of the rules currently in progress.
    nodes: Vec<AstNode>,

    /// Rules currently being matched, outermost first.
    rule_stack: Vec<RuleId>,

    /// Furthest position ever reached and the rule stack at that moment.
    furthest: usize,
    furthest_stack: Vec<RuleId>,

    /// End position recorded by the most recent `Cont::Accept`.
    accepted: usize,
}

impl CompiledGrammar {
    /// Match `input` from position 0 against the root rule.
    pub fn match_input(&self, input: &str) -> MatchResult {
        let mut matcher = Matcher {
            grammar: self,
            input,
            nodes: Vec::new(),
            rule_stack: Vec::new(),
            furthest: 0,
            furthest_stack: Vec::new(),
            accepted: 0,
        };
        let matched = matcher.match_rule(self.root, 0, &Cont::Accept);
        let match_length = if matched { matcher.accepted } else { 0 };
        let tree = if matched && self.rules[self.root as usize].pushing {
            matcher.nodes.pop()
        } else {
            None
        };
        debug!(
            "match: matched={}, length={} of {}, furthest={}",
            matched,
            match_length,
            input.len(),
            matcher.furthest
        );
        MatchResult {
            matched,
            match_length,
            tree,
            max_match_length: matcher.furthest,
            rule_stack: matcher
                .furthest_stack
                .iter()
                .map(|id| self.rules[*id as usize].name.clone())
                .collect(),
        }
    }
}

impl<'g> Matcher<'g> {
    /// The character at byte position `pos`, if any.
    fn char_at(&self, pos: usize) -> Option<char> {
        self.input[pos..].chars().next()
    }

    /// Record that matching has come this far.
    fn reached(&mut self, pos: usize) {
        if pos > self.furthest {
            self.furthest = pos;
            self.furthest_stack = self.rule_stack.clone();
        }
    }

    /// Apply a continuation at `pos`. Returns whether the rest of the
    /// expression stack matched; on `false` all state changes are undone.
    fn run(&mut self, cont: &Cont<'g, '_>, pos: usize) -> bool {
        match cont {
            &Cont::Accept => {
                self.accepted = pos;
                true
            }
            &Cont::Sequence(items, next) => match items.split_first() {
                None => self.run(next, pos),
                Some((first, rest)) => self.match_expr(first, pos, &Cont::Sequence(rest, next)),
            },
            &Cont::RepeatNext(inner, start, next) => {
                if pos == start {
                    // The repetition matched nothing; stop to avoid looping.
                    false
                } else {
                    self.match_repeat(inner, pos, next)
                }
            }
            &Cont::FinishRule {
                id,
                start,
                mark,
                next,
            } => {
                let grammar = self.grammar;
                let rule = &grammar.rules[id as usize];
                let children = self.nodes.split_off(mark);
                let text = if let Some(fixed) = rule.synthetic {
                    fixed.to_string()
                } else if children.is_empty() {
                    self.input[start..pos].to_string()
                } else {
                    children.iter().map(|c| c.text.as_str()).collect()
                };
                self.nodes.push(AstNode {
                    rule: rule.name.clone(),
                    text,
                    children,
                });
                self.rule_stack.pop();
                if self.run(next, pos) {
                    true
                } else {
                    self.rule_stack.push(id);
                    let node = self.nodes.pop().expect("node was pushed above");
                    self.nodes.extend(node.children);
                    false
                }
            }
            &Cont::EndRule { id, next } => {
                self.rule_stack.pop();
                if self.run(next, pos) {
                    true
                } else {
                    self.rule_stack.push(id);
                    false
                }
            }
        }
    }

    /// Match one expression at `pos`, then the continuation.
    fn match_expr(&mut self, expr: &'g RuleExpr<RuleId>, pos: usize, cont: &Cont<'g, '_>) -> bool {
        match expr {
            RuleExpr::Char(expected) => match self.char_at(pos) {
                Some(c) if c == *expected => {
                    let end = pos + c.len_utf8();
                    self.reached(end);
                    self.run(cont, end)
                }
                _ => false,
            },
            RuleExpr::Range(lo, hi) => match self.char_at(pos) {
                Some(c) if *lo <= c && c <= *hi => {
                    let end = pos + c.len_utf8();
                    self.reached(end);
                    self.run(cont, end)
                }
                _ => false,
            },
            RuleExpr::Anything => {
                let mut here = pos;
                loop {
                    if self.run(cont, here) {
                        return true;
                    }
                    match self.char_at(here) {
                        None => return false,
                        Some(c) => here += c.len_utf8(),
                    }
                    self.reached(here);
                }
            }
            RuleExpr::Sequence(items) => match items.split_first() {
                None => self.run(cont, pos),
                Some((first, rest)) => self.match_expr(first, pos, &Cont::Sequence(rest, cont)),
            },
            RuleExpr::AnyOf(items) => {
                for item in items {
                    if self.match_expr(item, pos, cont) {
                        return true;
                    }
                }
                false
            }
            RuleExpr::Repeat(inner) => self.match_repeat(inner, pos, cont),
            RuleExpr::Rule(id) => self.match_rule(*id, pos, cont),
            RuleExpr::Substitute { options, filter } => {
                self.match_substitute(options, filter.as_ref(), pos, cont)
            }
        }
    }

    /// Greedy repetition: try one more repetition first, fall back to ending
    /// the repetition here.
    fn match_repeat(&mut self, inner: &'g RuleExpr<RuleId>, pos: usize, cont: &Cont<'g, '_>) -> bool {
        if self.match_expr(inner, pos, &Cont::RepeatNext(inner, pos, cont)) {
            true
        } else {
            self.run(cont, pos)
        }
    }

    /// Match a rule reference, maintaining the rule stack and, for pushing
    /// rules, the node under construction.
    fn match_rule(&mut self, id: RuleId, pos: usize, cont: &Cont<'g, '_>) -> bool {
        let grammar = self.grammar;
        let rule = &grammar.rules[id as usize];
        self.rule_stack.push(id);
        let ok = if rule.pushing {
            let mark = self.nodes.len();
            self.match_expr(
                &rule.expr,
                pos,
                &Cont::FinishRule {
                    id,
                    start: pos,
                    mark,
                    next: cont,
                },
            )
        } else {
            self.match_expr(&rule.expr, pos, &Cont::EndRule { id, next: cont })
        };
        if !ok {
            // The closing frame never ran, so the entry is still on the stack.
            self.rule_stack.pop();
        }
        ok
    }

    /// Longest match over a set of rules, ties broken by listing order. The
    /// filter accepts or rejects by the identity of the winning rule; a
    /// rejected winner fails the whole set, there is no second-best fallback.
    fn match_substitute(
        &mut self,
        options: &'g [RuleId],
        filter: Option<&'g SetFilter<RuleId>>,
        pos: usize,
        cont: &Cont<'g, '_>,
    ) -> bool {
        let mut best: Option<(RuleId, usize, Vec<AstNode>)> = None;
        for &option in options {
            let mark = self.nodes.len();
            if self.match_rule(option, pos, &Cont::Accept) {
                let end = self.accepted;
                let nodes = self.nodes.split_off(mark);
                if best.as_ref().map_or(true, |(_, best_end, _)| end > *best_end) {
                    best = Some((option, end, nodes));
                }
            }
        }

        let (winner, end, nodes) = match best {
            Some(found) => found,
            None => return false,
        };
        if let Some(filter) = filter {
            let in_set = filter.rules.contains(&winner);
            let pass = match filter.mode {
                FilterMode::Accept => in_set,
                FilterMode::Reject => !in_set,
            };
            if !pass {
                return false;
            }
        }

        let mark = self.nodes.len();
        self.nodes.extend(nodes);
        if self.run(cont, end) {
            true
        } else {
            self.nodes.truncate(mark);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    fn compile(rules: &[(&str, &str, bool)], root: &str) -> CompiledGrammar {
        let mut grammar = Grammar::new();
        for (name, text, pushing) in rules {
            grammar.add_rule(name, text, *pushing).expect("rule adds");
        }
        grammar.set_root(root);
        grammar.compile().expect("grammar compiles")
    }

    #[test]
    fn literal_sequence() {
        let grammar = compile(&[("s", "abc", true)], "s");

        let hit = grammar.match_input("abc");
        assert!(hit.matched);
        assert_eq!(hit.match_length, 3);
        let tree = hit.tree.expect("pushing root builds a tree");
        assert_eq!(tree.rule, "s");
        assert_eq!(tree.text, "abc");
        assert!(tree.children.is_empty());

        let miss = grammar.match_input("abx");
        assert!(!miss.matched);
        assert_eq!(miss.max_match_length, 2);
        assert_eq!(miss.rule_stack, ["s"]);
    }

    #[test]
    fn longest_prefix_without_full_consumption() {
        let grammar = compile(&[("s", "abc", true)], "s");
        let result = grammar.match_input("abcd");
        assert!(result.matched);
        assert_eq!(result.match_length, 3);
    }

    #[test]
    fn ordered_choice_backtracks() {
        let grammar = compile(&[("s", "{a b}|{a} c", true)], "s");
        assert!(grammar.match_input("abc").matched);
        // The first alternative matches "a b", then fails on "c"; the match
        // must come back and use the second alternative.
        assert!(grammar.match_input("ac").matched);
        assert!(!grammar.match_input("ab").matched);
    }

    #[test]
    fn repetition_backs_off() {
        let grammar = compile(&[("s", "a^* a b", true)], "s");
        // The repetition first swallows every `a` and has to give one back.
        let result = grammar.match_input("aaab");
        assert!(result.matched);
        assert_eq!(result.match_length, 4);
        assert!(grammar.match_input("ab").matched);
        assert!(!grammar.match_input("b").matched);
    }

    #[test]
    fn wildcard_stops_at_the_first_exit() {
        let grammar = compile(&[("s", "\" * \"", true)], "s");
        let result = grammar.match_input("\"ab\"cd");
        assert!(result.matched);
        assert_eq!(result.match_length, 4);
    }

    #[test]
    fn substitute_takes_the_longest_option() {
        let rules = [
            ("kw", "int", false),
            ("word", "a-z a-z^*", false),
            ("s", "#{{kw} {word}}", true),
        ];
        let grammar = compile(&rules, "s");
        // Both options match, the longer one wins.
        let result = grammar.match_input("intx");
        assert!(result.matched);
        assert_eq!(result.match_length, 4);
        // Equal lengths: the earlier option wins (no observable difference
        // without a filter, the match just succeeds).
        assert!(grammar.match_input("int").matched);
    }

    #[test]
    fn substitute_reject_filter() {
        let rules = [
            ("kw", "int", false),
            ("word", "a-z a-z^*", false),
            ("s", "#{{kw} {word} != {word}}", true),
        ];
        let grammar = compile(&rules, "s");
        // The keyword wins the tie, so plain `int` passes.
        assert!(grammar.match_input("int").matched);
        // Anything longer is won by `word` and rejected.
        assert!(!grammar.match_input("intx").matched);
    }

    #[test]
    fn substitute_accept_filter() {
        let rules = [
            ("kw", "int", false),
            ("word", "a-z a-z^*", false),
            ("s", "#{{kw} {word} == {word}}", true),
        ];
        let grammar = compile(&rules, "s");
        // Keywords are not words.
        assert!(!grammar.match_input("int").matched);
        assert!(grammar.match_input("intx").matched);
    }

    #[test]
    fn pushing_rules_build_nodes_and_plain_rules_are_transparent() {
        let rules = [
            ("number", "0-9 0-9^*", true),
            ("operand", "${number}", false),
            ("sum", "${operand} {+ ${operand}}^*", true),
        ];
        let grammar = compile(&rules, "sum");
        let result = grammar.match_input("1+22+3");
        assert!(result.matched);
        let tree = result.tree.expect("tree");
        assert_eq!(tree.rule, "sum");
        // The plain `operand` rules do not show up; their `number` children
        // are spliced directly into the sum node.
        let names: Vec<&str> = tree.children.iter().map(|c| c.rule.as_str()).collect();
        assert_eq!(names, ["number", "number", "number"]);
        let texts: Vec<&str> = tree.children.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["1", "22", "3"]);
    }

    #[test]
    fn marker_rules_carry_synthetic_text() {
        let rules = [
            ("insert space", "", true),
            ("s", "a ${insert space} b", true),
        ];
        let grammar = compile(&rules, "s");
        let result = grammar.match_input("ab");
        assert!(result.matched);
        assert_eq!(result.match_length, 2);
        let tree = result.tree.expect("tree");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].rule, "insert space");
        assert_eq!(tree.children[0].text, " ");
        // An inner node's text is the concatenation of its children's texts.
        assert_eq!(tree.text, " ");
    }

    #[test]
    fn failure_reports_position_and_rule_stack() {
        let rules = [
            ("head", "ab", true),
            ("tail", "cd", true),
            ("s", "${head} ${tail}", true),
        ];
        let grammar = compile(&rules, "s");
        let result = grammar.match_input("abce");
        assert!(!result.matched);
        assert_eq!(result.max_match_length, 3);
        assert_eq!(result.rule_stack, ["s", "tail"]);
    }

    #[test]
    fn recursion_through_updated_stubs() {
        let mut grammar = Grammar::new();
        grammar.add_rule("expr", "STUB!", true).expect("stub");
        grammar
            .update_rule("expr", "{ ( ${expr} ) } | x", true)
            .expect("update");
        grammar.set_root("expr");
        let grammar = grammar.compile().expect("compiles");
        assert!(grammar.match_input("x").matched);
        let nested = grammar.match_input("((x))");
        assert!(nested.matched);
        assert_eq!(nested.match_length, 5);
        assert!(!grammar.match_input("((x)").matched);
    }
}
