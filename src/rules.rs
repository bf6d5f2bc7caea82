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

//! Compiler from the textual rule syntax to matcher expressions.
//!
//! A rule text is a sequence of matchers:
//!
//! * a plain character matches itself, `a-z` matches a character range,
//! * `\X` escapes the following character (`\n`, `\t`, `\r` decode to the
//!   usual control characters),
//! * `${name}` references another rule, `${}` references the rule with the
//!   empty name,
//! * juxtaposition concatenates, `A|B` is ordered choice, `X^*` repeats
//!   greedily, `{ ... }` groups,
//! * `*` matches any characters, as few as possible,
//! * `#{{a} {b}}` matches the longest of a set of rules, optionally filtered
//!   by the winning rule with `== {c}` or `!= {c}`.
//!
//! Space characters are not significant outside escapes. All other characters,
//! including tabs and line breaks, match themselves.

use crate::grammar::GrammarError;

/// One matcher expression, parameterized over the rule reference type.
///
/// Rule references are plain names directly after parsing and rule ids after
/// the grammar has been compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpr<R> {
    /// Match exactly this character.
    Char(char),

    /// Match one character in the inclusive range.
    Range(char, char),

    /// Match any characters, as few as possible. Grows only when the rest of
    /// the enclosing expression cannot match otherwise.
    Anything,

    /// Match all sub-expressions in order. The empty sequence matches the
    /// empty input.
    Sequence(Vec<RuleExpr<R>>),

    /// Ordered choice. A later alternative is tried when an earlier one
    /// cannot complete the match.
    AnyOf(Vec<RuleExpr<R>>),

    /// Zero or more repetitions, longest first, backing off one repetition at
    /// a time when the rest of the expression fails.
    Repeat(Box<RuleExpr<R>>),

    /// Reference to another rule.
    Rule(R),

    /// Longest match over a set of rules, ties broken by listing order.
    Substitute {
        options: Vec<R>,
        filter: Option<SetFilter<R>>,
    },
}

/// Accept or reject a substitute match by the identity of the winning rule.
#[derive(Debug, Clone, PartialEq)]
pub struct SetFilter<R> {
    pub mode: FilterMode,
    pub rules: Vec<R>,
}

/// Polarity of a substitute filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterMode {
    /// `==`: the winner must be one of the filter rules.
    Accept,
    /// `!=`: the winner must not be one of the filter rules.
    Reject,
}

impl<R> RuleExpr<R> {
    /// Convert all rule references with `f`, keeping the structure.
    pub fn map_refs<S, E>(self, f: &mut dyn FnMut(R) -> Result<S, E>) -> Result<RuleExpr<S>, E> {
        Ok(match self {
            RuleExpr::Char(c) => RuleExpr::Char(c),
            RuleExpr::Range(lo, hi) => RuleExpr::Range(lo, hi),
            RuleExpr::Anything => RuleExpr::Anything,
            RuleExpr::Sequence(items) => RuleExpr::Sequence(
                items
                    .into_iter()
                    .map(|i| i.map_refs(f))
                    .collect::<Result<_, E>>()?,
            ),
            RuleExpr::AnyOf(items) => RuleExpr::AnyOf(
                items
                    .into_iter()
                    .map(|i| i.map_refs(f))
                    .collect::<Result<_, E>>()?,
            ),
            RuleExpr::Repeat(inner) => RuleExpr::Repeat(Box::new(inner.map_refs(f)?)),
            RuleExpr::Rule(r) => RuleExpr::Rule(f(r)?),
            RuleExpr::Substitute { options, filter } => RuleExpr::Substitute {
                options: options.into_iter().map(|r| f(r)).collect::<Result<_, E>>()?,
                filter: match filter {
                    None => None,
                    Some(flt) => Some(SetFilter {
                        mode: flt.mode,
                        rules: flt.rules.into_iter().map(|r| f(r)).collect::<Result<_, E>>()?,
                    }),
                },
            },
        })
    }
}

/// Compile one rule text into an expression tree.
pub fn parse_rule_text(text: &str) -> Result<RuleExpr<String>, GrammarError> {
    let mut cursor = TextCursor {
        chars: text.chars().collect(),
        pos: 0,
    };
    parse_sequence(&mut cursor, false)
}

/// Character cursor over the rule text.
struct TextCursor {
    chars: Vec<char>,
    pos: usize,
}

impl TextCursor {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }
}

/// Parse a concatenation, either the whole text or a `{ ... }` group body.
fn parse_sequence(cur: &mut TextCursor, in_group: bool) -> Result<RuleExpr<String>, GrammarError> {
    let mut items = Vec::new();
    loop {
        cur.skip_spaces();
        match cur.peek() {
            None => {
                if in_group {
                    return Err(GrammarError::UnbalancedBraces);
                }
                break;
            }
            Some('}') => {
                if !in_group {
                    return Err(GrammarError::UnbalancedBraces);
                }
                cur.bump();
                break;
            }
            Some(_) => items.push(parse_choice(cur)?),
        }
    }
    if items.len() == 1 {
        Ok(items.pop().expect("one item"))
    } else {
        Ok(RuleExpr::Sequence(items))
    }
}

/// Parse one element of a concatenation, including `|` chains between units.
fn parse_choice(cur: &mut TextCursor) -> Result<RuleExpr<String>, GrammarError> {
    let mut alternatives = vec![parse_item(cur)?];
    loop {
        cur.skip_spaces();
        if cur.eat('|') {
            cur.skip_spaces();
            alternatives.push(parse_item(cur)?);
        } else {
            break;
        }
    }
    if alternatives.len() == 1 {
        Ok(alternatives.pop().expect("one alternative"))
    } else {
        Ok(RuleExpr::AnyOf(alternatives))
    }
}

/// Parse one unit and an optional `^*` behind it.
fn parse_item(cur: &mut TextCursor) -> Result<RuleExpr<String>, GrammarError> {
    let unit = parse_unit(cur)?;
    cur.skip_spaces();
    if cur.peek() == Some('^') {
        cur.bump();
        if !cur.eat('*') {
            return Err(GrammarError::StrayOperator('^'));
        }
        Ok(RuleExpr::Repeat(Box::new(unit)))
    } else {
        Ok(unit)
    }
}

/// Parse a single unit: group, set, reference, wildcard, or literal.
fn parse_unit(cur: &mut TextCursor) -> Result<RuleExpr<String>, GrammarError> {
    match cur.peek() {
        None => Err(GrammarError::UnexpectedEnd),
        Some('$') => {
            cur.bump();
            if !cur.eat('{') {
                return Err(GrammarError::StrayOperator('$'));
            }
            Ok(RuleExpr::Rule(read_name(cur)?))
        }
        Some('#') => {
            cur.bump();
            if !cur.eat('{') {
                return Err(GrammarError::StrayOperator('#'));
            }
            parse_substitute(cur)
        }
        Some('{') => {
            cur.bump();
            parse_sequence(cur, true)
        }
        Some('*') => {
            cur.bump();
            Ok(RuleExpr::Anything)
        }
        Some(c @ '^') | Some(c @ '|') | Some(c @ '}') => Err(GrammarError::StrayOperator(c)),
        Some(_) => parse_literal_or_range(cur),
    }
}

/// Read a rule name up to the closing brace. Names may be empty and may
/// contain anything but a closing brace.
fn read_name(cur: &mut TextCursor) -> Result<String, GrammarError> {
    let mut name = String::new();
    loop {
        match cur.bump() {
            None => return Err(GrammarError::UnbalancedBraces),
            Some('}') => return Ok(name),
            Some(c) => name.push(c),
        }
    }
}

/// Parse the body of `#{ ... }` after the opening brace.
fn parse_substitute(cur: &mut TextCursor) -> Result<RuleExpr<String>, GrammarError> {
    let mut options = Vec::new();
    let mut filter: Option<SetFilter<String>> = None;
    loop {
        cur.skip_spaces();
        match cur.peek() {
            None => return Err(GrammarError::UnbalancedBraces),
            Some('}') => {
                cur.bump();
                break;
            }
            Some('{') => {
                cur.bump();
                let name = read_name(cur)?;
                match filter.as_mut() {
                    Some(f) => f.rules.push(name),
                    None => options.push(name),
                }
            }
            Some('=') => {
                cur.bump();
                if !cur.eat('=') || filter.is_some() {
                    return Err(GrammarError::StrayOperator('='));
                }
                filter = Some(SetFilter {
                    mode: FilterMode::Accept,
                    rules: Vec::new(),
                });
            }
            Some('!') => {
                cur.bump();
                if !cur.eat('=') || filter.is_some() {
                    return Err(GrammarError::StrayOperator('!'));
                }
                filter = Some(SetFilter {
                    mode: FilterMode::Reject,
                    rules: Vec::new(),
                });
            }
            Some(c) => return Err(GrammarError::StrayOperator(c)),
        }
    }
    if options.is_empty() {
        return Err(GrammarError::EmptySet);
    }
    Ok(RuleExpr::Substitute { options, filter })
}

/// Parse an escaped or plain character, rejecting unescaped operators.
fn parse_literal_char(cur: &mut TextCursor) -> Result<char, GrammarError> {
    match cur.bump() {
        None => Err(GrammarError::UnexpectedEnd),
        Some('\\') => match cur.bump() {
            None => Err(GrammarError::UnexpectedEnd),
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some(c) => Ok(c),
        },
        Some(c) => {
            if "{}|^*$#- ".contains(c) {
                Err(GrammarError::StrayOperator(c))
            } else {
                Ok(c)
            }
        }
    }
}

/// Parse a literal character, extended to a range when a dash follows.
fn parse_literal_or_range(cur: &mut TextCursor) -> Result<RuleExpr<String>, GrammarError> {
    let first = parse_literal_char(cur)?;
    if cur.peek() == Some('-') {
        cur.bump();
        let second = parse_literal_char(cur)?;
        if second < first {
            return Err(GrammarError::BadRange(first, second));
        }
        Ok(RuleExpr::Range(first, second))
    } else {
        Ok(RuleExpr::Char(first))
    }
}
