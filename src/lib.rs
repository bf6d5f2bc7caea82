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

//! Addaat to C translator.
//!
//! The translation runs in two phases. A grammar-driven matcher, configured
//! by the rule set in [language](language/index.html), turns the source text
//! into a syntax tree of pushing-rule matches. The code generator walks that
//! tree, enforces the language rules (scoping, redeclaration, signatures,
//! class and static lowering) and prints C text.

#[macro_use]
extern crate log;

mod ast;
mod codegen;
mod grammar;
mod language;
mod matcher;
mod rules;
mod style;
mod symbols;

pub use ast::AstNode;
pub use codegen::{generate_code, CodegenError};
pub use grammar::{CompiledGrammar, Grammar, GrammarError, RuleId};
pub use language::define_language;
pub use matcher::MatchResult;
pub use symbols::{same_signature, BaseType, ClassInfo, FunctionInfo, VarType, VariableInfo};
