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

//! Converting Addaat syntax trees to C code, enforcing language semantics in
//! the process.
//!
//! The walkers follow one convention: each consumes the children of its node
//! in source order through a small cursor and dispatches on the child's rule
//! name. Structural walkers (declarations, classes, function heads) read
//! silently and print their own lowered text; statement and expression
//! walkers let the formatting markers in the tree drive spacing where the
//! grammar placed them.

use ansiterm::Colour;
use itertools::Itertools;
use thiserror::Error;

use crate::ast::AstNode;
use crate::style;
use crate::symbols::{same_signature, BaseType, ClassInfo, FunctionInfo, Scope, VarType, VariableInfo};

/// Semantic errors. The first one stops the translation.
#[derive(Debug, Error, PartialEq)]
pub enum CodegenError {
    #[error("Class redefinition: {0}")]
    ClassRedefinition(String),

    #[error("Variable redefinition: {0}")]
    VariableRedefinition(String),

    #[error("Parameter redefinition: {0}")]
    ParameterRedefinition(String),

    #[error("Function redefinition: {0}")]
    FunctionRedefinition(String),

    #[error("Function signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("Can't declare variables of void type: {0}")]
    VoidVariable(String),

    #[error("Can't declare parameters of void type: {0}")]
    VoidParameter(String),

    #[error("Can't make arrays of void type.")]
    VoidArray,

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Enums are not yet supported.")]
    EnumsNotSupported,

    /// Internal invariant violation, a node the dispatch does not know.
    #[error("Unexpected node: {0}")]
    UnexpectedNode(String),
}

type Result<T> = std::result::Result<T, CodegenError>;

/// Translate one `translation-unit` tree to C source text.
pub fn generate_code(tree: &AstNode, colorize: bool) -> Result<String> {
    let mut gen = CodeGen::new(colorize);
    gen.translation_unit(tree)?;
    Ok(gen.finish())
}

/// Formatting nodes ride along in the tree and are handled by the emitter,
/// not by the structural walkers.
fn is_formatting(rule: &str) -> bool {
    match rule {
        "insert space" | "insert \n" | "insert \ns" | "line-cont" | "line-comment"
        | "block-comment" => true,
        _ => false,
    }
}

fn unexpected(node: &AstNode) -> CodegenError {
    CodegenError::UnexpectedNode(node.rule.clone())
}

fn expect_rule<'a>(node: Option<&'a AstNode>, rule: &str) -> Result<&'a AstNode> {
    match node {
        Some(node) if node.rule == rule => Ok(node),
        Some(node) => Err(unexpected(node)),
        None => Err(CodegenError::UnexpectedNode(format!("missing {}", rule))),
    }
}

/// Child cursor over one node.
struct Cursor<'a> {
    nodes: &'a [AstNode],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn new(node: &'a AstNode) -> Self {
        Self {
            nodes: &node.children,
            index: 0,
        }
    }

    /// Next child, dropping formatting nodes.
    fn next_silent(&mut self) -> Option<&'a AstNode> {
        while let Some(node) = self.nodes.get(self.index) {
            self.index += 1;
            if !is_formatting(&node.rule) {
                return Some(node);
            }
        }
        None
    }

    /// Next child without consuming anything.
    fn peek(&self) -> Option<&'a AstNode> {
        self.nodes[self.index..]
            .iter()
            .find(|node| !is_formatting(&node.rule))
    }
}

/// All state of one translation.
struct CodeGen {
    /// Generated code.
    out: String,

    /// Hoisted declarations of static locals, prepended to `out` at the end.
    hoisted: String,

    /// Code coloring.
    colorize: bool,
    color_stack: Vec<Colour>,
    last_color: Option<Colour>,

    /// Indentation depth in steps of four spaces.
    indent: usize,

    /// Symbols.
    classes: Vec<ClassInfo>,
    globals: Vec<VariableInfo>,
    functions: Vec<FunctionInfo>,
    scopes: Vec<Scope>,
    next_scope_id: u32,
    current_function: Option<usize>,
    current_class: Option<usize>,
}

impl CodeGen {
    fn new(colorize: bool) -> Self {
        Self {
            out: String::new(),
            hoisted: String::new(),
            colorize,
            color_stack: Vec::new(),
            last_color: None,
            indent: 0,
            classes: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            scopes: Vec::new(),
            next_scope_id: 0,
            current_function: None,
            current_class: None,
        }
    }

    fn finish(self) -> String {
        if self.hoisted.is_empty() {
            self.out
        } else {
            let mut out = self.hoisted;
            out.push('\n');
            out.push_str(&self.out);
            out
        }
    }

    // ------------------------------------------------------------------
    // Output assembly
    // ------------------------------------------------------------------

    /// Append text to the output. Starts a fresh line with the current
    /// indentation and re-emits the active color when it changed and the
    /// text is not pure whitespace.
    fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.out.ends_with('\n') {
            for _ in 0..self.indent {
                self.out.push_str("    ");
            }
        }
        if self.colorize && text != " " && text != "\n" {
            let active = self.color_stack.last().copied();
            if active != self.last_color {
                match active {
                    Some(colour) => self.out.push_str(&style::prefix(colour)),
                    None => self.out.push_str(style::RESET),
                }
                self.last_color = active;
            }
        }
        self.out.push_str(text);
    }

    /// Append a line break unless the output already ends in one.
    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn colored(&mut self, colour: Colour, text: &str) {
        self.color_stack.push(colour);
        self.append(text);
        self.color_stack.pop();
    }

    fn keyword(&mut self, text: &str) {
        self.colored(style::KEYWORD, text);
    }

    fn type_text(&mut self, text: &str) {
        self.colored(style::TYPE, text);
    }

    /// Emit a formatting node. Returns false when the node is not one.
    fn handle_formatting(&mut self, node: &AstNode) -> bool {
        match node.rule.as_str() {
            "insert space" => self.append(" "),
            "insert \n" => self.newline(),
            "insert \ns" => self.append("\n"),
            "line-cont" => self.append(" \\\n"),
            "line-comment" | "block-comment" => self.colored(style::COMMENT, &node.text),
            _ => return false,
        }
        true
    }

    /// Next child of an emitting cursor: formatting nodes are printed and
    /// skipped.
    fn next_child<'a>(&mut self, cursor: &mut Cursor<'a>) -> Option<&'a AstNode> {
        while let Some(node) = cursor.nodes.get(cursor.index) {
            cursor.index += 1;
            if !self.handle_formatting(node) {
                return Some(node);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    fn find_class(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    fn find_function(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    // ------------------------------------------------------------------
    // Types and declarations
    // ------------------------------------------------------------------

    /// Resolve a `type-specifier` node. Class names are looked up in the
    /// class table, enums are not supported yet.
    fn parse_type_specifier(&self, node: &AstNode) -> Result<VarType> {
        let mut cursor = Cursor::new(node);
        let base_node = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        let (base, class_index) = match base_node.rule.as_str() {
            "void" => (BaseType::Void, 0),
            "char" => (BaseType::Char, 0),
            "short" => (BaseType::Short, 0),
            "int" => (BaseType::Int, 0),
            "long" => (BaseType::Long, 0),
            "float" => (BaseType::Float, 0),
            "double" => (BaseType::Double, 0),
            "class-specifier" => {
                let name = base_node.text.as_str();
                let index = self
                    .find_class(name)
                    .ok_or_else(|| CodegenError::UnknownClass(name.to_string()))?;
                (BaseType::Class, index)
            }
            "enum" => return Err(CodegenError::EnumsNotSupported),
            _ => return Err(unexpected(base_node)),
        };
        let mut array_depth = 0;
        while let Some(child) = cursor.next_silent() {
            if child.rule == "array-specifier" {
                array_depth += 1;
            } else {
                return Err(unexpected(child));
            }
        }
        if base == BaseType::Void && array_depth > 0 {
            return Err(CodegenError::VoidArray);
        }
        Ok(VarType {
            base,
            class_index,
            array_depth,
        })
    }

    /// Read one `declaration` node: optional `static`, a type, and a list of
    /// names. All names share the type.
    fn parse_declaration(&self, node: &AstNode) -> Result<(bool, VarType, Vec<String>)> {
        let mut cursor = Cursor::new(node);
        let mut child = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        let mut is_static = false;
        if child.rule == "static" {
            is_static = true;
            child = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        }
        if child.rule != "type-specifier" {
            return Err(unexpected(child));
        }
        let var_type = self.parse_type_specifier(child)?;

        let mut names = Vec::new();
        loop {
            let name = expect_rule(cursor.next_silent(), "identifier")?;
            names.push(name.text.clone());
            match cursor.next_silent() {
                Some(sep) if sep.rule == "," => continue,
                Some(sep) if sep.rule == ";" => break,
                Some(sep) => return Err(unexpected(sep)),
                None => return Err(CodegenError::UnexpectedNode("missing ;".to_string())),
            }
        }
        if var_type.base == BaseType::Void {
            return Err(CodegenError::VoidVariable(names.join(", ")));
        }
        Ok((is_static, var_type, names))
    }

    /// A declaration at file scope. Redeclaration with the identical type is
    /// a tentative definition and is emitted again.
    fn global_declaration(&mut self, node: &AstNode) -> Result<()> {
        let (is_static, var_type, names) = self.parse_declaration(node)?;
        let type_c = var_type.to_c(&self.classes);
        for name in names {
            let known = self
                .globals
                .iter()
                .find(|v| v.name == name)
                .map(|v| v.var_type.clone());
            match known {
                Some(existing) => {
                    if existing != var_type {
                        return Err(CodegenError::VariableRedefinition(name));
                    }
                }
                None => self.globals.push(VariableInfo {
                    name: name.clone(),
                    var_type: var_type.clone(),
                    is_static,
                }),
            }
            if is_static {
                self.keyword("static");
                self.append(" ");
            }
            self.type_text(&type_c);
            self.append(" ");
            self.append(&name);
            self.append(";");
            self.append("\n");
        }
        Ok(())
    }

    /// A declaration inside a class body. Nothing is emitted here; the class
    /// walker prints the collected members afterwards.
    fn member_declaration(&mut self, class_index: usize, node: &AstNode) -> Result<()> {
        let (is_static, var_type, names) = self.parse_declaration(node)?;
        for name in names {
            if self.classes[class_index]
                .members
                .iter()
                .any(|m| m.name == name)
            {
                return Err(CodegenError::VariableRedefinition(name));
            }
            debug!("class member {:?} (class #{:?})", name, self.current_class);
            self.classes[class_index].members.push(VariableInfo {
                name,
                var_type: var_type.clone(),
                is_static,
            });
        }
        Ok(())
    }

    /// A declaration in block scope. Static locals are hoisted to file scope
    /// under their mangled name and leave nothing at the statement site.
    /// With `one_per_line` unset (inside a `for` head) the declarations are
    /// joined by spaces.
    fn local_declaration(&mut self, node: &AstNode, one_per_line: bool) -> Result<()> {
        let (is_static, var_type, names) = self.parse_declaration(node)?;
        let type_c = var_type.to_c(&self.classes);
        let scope_id = match self.scopes.last() {
            Some(scope) => scope.id,
            None => return Err(CodegenError::UnexpectedNode("declaration outside scope".to_string())),
        };
        let mut emitted = false;
        for name in names {
            {
                let scope = self.scopes.last_mut().expect("scope checked above");
                if scope.variables.iter().any(|v| v.name == name) {
                    return Err(CodegenError::VariableRedefinition(name));
                }
                scope.variables.push(VariableInfo {
                    name: name.clone(),
                    var_type: var_type.clone(),
                    is_static,
                });
            }
            if is_static {
                self.hoisted
                    .push_str(&format!("{} _scope{}_{}_;\n", type_c, scope_id, name));
            } else {
                if emitted && !one_per_line {
                    self.append(" ");
                }
                self.type_text(&type_c);
                self.append(" ");
                self.append(&name);
                self.append(";");
                if one_per_line {
                    self.append("\n");
                }
                emitted = true;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    fn class_declaration(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        expect_rule(cursor.next_silent(), "class")?;
        let name = expect_rule(cursor.next_silent(), "identifier")?.text.clone();
        let class_index = match self.find_class(&name) {
            Some(index) => index,
            None => {
                self.classes.push(ClassInfo {
                    name: name.clone(),
                    members: Vec::new(),
                    defined: false,
                });
                self.classes.len() - 1
            }
        };

        let next = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        match next.rule.as_str() {
            ";" => {
                // Forward declaration, may be repeated.
                self.keyword("struct");
                self.append(" ");
                self.append(&name);
                self.append(";");
                self.append("\n");
                Ok(())
            }
            "OB" => {
                if self.classes[class_index].defined {
                    return Err(CodegenError::ClassRedefinition(name));
                }
                self.classes[class_index].defined = true;
                self.current_class = Some(class_index);
                loop {
                    let child = cursor.next_silent().ok_or_else(|| unexpected(node))?;
                    match child.rule.as_str() {
                        "declaration" => self.member_declaration(class_index, child)?,
                        "CB" => break,
                        _ => return Err(unexpected(child)),
                    }
                }
                self.current_class = None;

                // The struct holds the non-static members in declaration
                // order.
                self.keyword("struct");
                self.append(" ");
                self.append(&name);
                self.append(" {");
                self.append("\n");
                self.indent += 1;
                let members: Vec<(String, String)> = self.classes[class_index]
                    .members
                    .iter()
                    .filter(|m| !m.is_static)
                    .map(|m| (m.var_type.to_c(&self.classes), m.name.clone()))
                    .collect();
                for (type_c, member) in members {
                    self.type_text(&type_c);
                    self.append(" ");
                    self.append(&member);
                    self.append(";");
                    self.append("\n");
                }
                self.indent -= 1;
                self.append("};");
                self.append("\n");

                // Every static member becomes one global under a mangled
                // name.
                let statics: Vec<(String, String)> = self.classes[class_index]
                    .members
                    .iter()
                    .filter(|m| m.is_static)
                    .map(|m| (m.var_type.to_c(&self.classes), m.name.clone()))
                    .collect();
                for (type_c, member) in statics {
                    self.type_text(&type_c);
                    self.append(" ");
                    self.append(&format!("_{}_{}_;", name, member));
                    self.append("\n");
                }
                Ok(())
            }
            _ => Err(unexpected(next)),
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn parse_parameter(&self, node: &AstNode) -> Result<VariableInfo> {
        let mut cursor = Cursor::new(node);
        let type_node = expect_rule(cursor.next_silent(), "type-specifier")?;
        let var_type = self.parse_type_specifier(type_node)?;
        let name = expect_rule(cursor.next_silent(), "identifier")?.text.clone();
        if var_type.base == BaseType::Void {
            return Err(CodegenError::VoidParameter(name));
        }
        Ok(VariableInfo {
            name,
            var_type,
            is_static: false,
        })
    }

    /// Read a `function-head`: optional `static`, return type, name, and the
    /// parameter list. Parameter names are unique within the list.
    fn parse_function_head(&self, node: &AstNode) -> Result<FunctionInfo> {
        let mut cursor = Cursor::new(node);
        let mut child = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        let mut is_static = false;
        if child.rule == "static" {
            is_static = true;
            child = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        }
        if child.rule != "type-specifier" {
            return Err(unexpected(child));
        }
        let return_type = self.parse_type_specifier(child)?;
        let name = expect_rule(cursor.next_silent(), "identifier")?.text.clone();
        expect_rule(cursor.next_silent(), "(")?;

        let mut parameters: Vec<VariableInfo> = Vec::new();
        loop {
            let child = cursor.next_silent().ok_or_else(|| unexpected(node))?;
            match child.rule.as_str() {
                ")" => break,
                "parameter-declaration" => {
                    let parameter = self.parse_parameter(child)?;
                    if parameters.iter().any(|p| p.name == parameter.name) {
                        return Err(CodegenError::ParameterRedefinition(parameter.name));
                    }
                    parameters.push(parameter);
                    if let Some(sep) = cursor.peek() {
                        if sep.rule == "," {
                            cursor.next_silent();
                        }
                    }
                }
                _ => return Err(unexpected(child)),
            }
        }
        Ok(FunctionInfo {
            name,
            parameters,
            return_type,
            is_static,
            defined: false,
        })
    }

    fn function_head_text(&self, info: &FunctionInfo) -> String {
        let parameters = info
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.var_type.to_c(&self.classes), p.name))
            .join(", ");
        format!(
            "{}{} {}({})",
            if info.is_static { "static " } else { "" },
            info.return_type.to_c(&self.classes),
            info.name,
            parameters
        )
    }

    /// `function-head ;`. Registers the function on first sight; repeated
    /// declarations are allowed when the signature stays the same.
    fn function_declaration(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let head = expect_rule(cursor.next_silent(), "function-head")?;
        let info = self.parse_function_head(head)?;
        match self.find_function(&info.name) {
            Some(index) => {
                if !same_signature(&self.functions[index], &info) {
                    return Err(CodegenError::SignatureMismatch(info.name.clone()));
                }
            }
            None => self.functions.push(info.clone()),
        }
        let text = self.function_head_text(&info);
        self.append(&text);
        self.append(";");
        self.append("\n");
        Ok(())
    }

    /// `function-head compound-statement`. A forward-declared entry is
    /// reused when the signatures match; a second body is an error.
    fn function_definition(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let head = expect_rule(cursor.next_silent(), "function-head")?;
        let body = expect_rule(cursor.next_silent(), "compound-statement")?;
        let info = self.parse_function_head(head)?;

        let index = match self.find_function(&info.name) {
            Some(index) => {
                if self.functions[index].defined {
                    return Err(CodegenError::FunctionRedefinition(info.name.clone()));
                }
                if !same_signature(&self.functions[index], &info) {
                    return Err(CodegenError::SignatureMismatch(info.name.clone()));
                }
                self.functions[index].defined = true;
                index
            }
            None => {
                let mut info = info;
                info.defined = true;
                self.functions.push(info);
                self.functions.len() - 1
            }
        };

        self.current_function = Some(index);
        let text = self.function_head_text(&self.functions[index]);
        self.append(&text);
        self.append(" ");
        let seed = self.functions[index].parameters.clone();
        let result = self.compound_statement(body, seed);
        self.current_function = None;
        result
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// A compound statement opens a fresh scope. When entering a function
    /// body, the parameters seed the new scope.
    fn compound_statement(&mut self, node: &AstNode, seed: Vec<VariableInfo>) -> Result<()> {
        self.next_scope_id += 1;
        let id = self.next_scope_id;
        trace!("scope {} opens (function {:?})", id, self.current_function);
        self.scopes.push(Scope {
            id,
            variables: seed,
        });

        let mut cursor = Cursor::new(node);
        let mut result = Ok(());
        while let Some(child) = self.next_child(&mut cursor) {
            let step = match child.rule.as_str() {
                "OB" => {
                    self.append("{");
                    self.indent += 1;
                    Ok(())
                }
                "CB" => {
                    self.indent -= 1;
                    self.append("}");
                    Ok(())
                }
                "declaration" => self.local_declaration(child, true),
                "statement" => self.statement(child),
                _ => Err(unexpected(child)),
            };
            if step.is_err() {
                result = step;
                break;
            }
        }
        self.scopes.pop();
        if result.is_ok() {
            self.newline();
        }
        result
    }

    fn statement(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let child = self
            .next_child(&mut cursor)
            .ok_or_else(|| unexpected(node))?;
        match child.rule.as_str() {
            "labeled-statement" => self.labeled_statement(child),
            "compound-statement" => self.compound_statement(child, Vec::new()),
            "expression-statement" => self.expression_statement(child),
            "selection-statement" => self.selection_statement(child),
            "iteration-statement" => self.iteration_statement(child),
            "jump-statement" => self.jump_statement(child),
            _ => Err(unexpected(child)),
        }
    }

    fn labeled_statement(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let first = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        match first.rule.as_str() {
            "identifier" => {
                self.append(&first.text);
                expect_rule(cursor.next_silent(), ":")?;
                self.append(": ");
            }
            "case" => {
                self.keyword("case");
                self.append(" ");
                let value = expect_rule(cursor.next_silent(), "constant-expression")?;
                self.constant_expression(value)?;
                expect_rule(cursor.next_silent(), ":")?;
                self.append(": ");
            }
            "default" => {
                self.keyword("default");
                expect_rule(cursor.next_silent(), ":")?;
                self.append(": ");
            }
            _ => return Err(unexpected(first)),
        }
        let body = expect_rule(cursor.next_silent(), "statement")?;
        self.statement(body)
    }

    fn expression_statement(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let first = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        match first.rule.as_str() {
            "expression" => {
                self.expression(first)?;
                expect_rule(cursor.next_silent(), ";")?;
            }
            ";" => {}
            _ => return Err(unexpected(first)),
        }
        self.append(";");
        self.append("\n");
        Ok(())
    }

    fn selection_statement(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let first = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        match first.rule.as_str() {
            "if" => self.keyword("if"),
            "switch" => self.keyword("switch"),
            _ => return Err(unexpected(first)),
        }
        self.append(" (");
        expect_rule(cursor.next_silent(), "(")?;
        let condition = expect_rule(cursor.next_silent(), "expression")?;
        self.expression(condition)?;
        expect_rule(cursor.next_silent(), ")")?;
        self.append(") ");
        let body = expect_rule(cursor.next_silent(), "statement")?;
        self.statement(body)?;

        if let Some(tail) = cursor.next_silent() {
            if tail.rule != "else" {
                return Err(unexpected(tail));
            }
            // Pull `else` up onto the line of the closing brace.
            if self.out.ends_with("}\n") {
                self.out.pop();
                self.append(" ");
            }
            self.keyword("else");
            self.append(" ");
            let alternative = expect_rule(cursor.next_silent(), "statement")?;
            self.statement(alternative)?;
        }
        Ok(())
    }

    fn iteration_statement(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let first = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        match first.rule.as_str() {
            "while" => {
                self.keyword("while");
                self.append(" (");
                expect_rule(cursor.next_silent(), "(")?;
                let condition = expect_rule(cursor.next_silent(), "expression")?;
                self.expression(condition)?;
                expect_rule(cursor.next_silent(), ")")?;
                self.loop_body(&mut cursor)
            }
            "do" => {
                self.keyword("do");
                self.append(" ");
                let body = expect_rule(cursor.next_silent(), "statement")?;
                self.statement(body)?;
                expect_rule(cursor.next_silent(), "while")?;
                if self.out.ends_with("}\n") {
                    self.out.pop();
                    self.append(" ");
                }
                self.keyword("while");
                self.append(" (");
                expect_rule(cursor.next_silent(), "(")?;
                let condition = expect_rule(cursor.next_silent(), "expression")?;
                self.expression(condition)?;
                expect_rule(cursor.next_silent(), ")")?;
                expect_rule(cursor.next_silent(), ";")?;
                self.append(");");
                self.append("\n");
                Ok(())
            }
            "for" => {
                // The whole construct gets its own scope so a declaration in
                // the head stays local to the loop.
                self.next_scope_id += 1;
                let id = self.next_scope_id;
                self.scopes.push(Scope {
                    id,
                    variables: Vec::new(),
                });
                self.keyword("for");
                self.append(" (");
                let result = self.for_tail(&mut cursor);
                self.scopes.pop();
                result
            }
            _ => Err(unexpected(first)),
        }
    }

    /// Everything of a `for` after the keyword.
    fn for_tail(&mut self, cursor: &mut Cursor) -> Result<()> {
        expect_rule(cursor.next_silent(), "(")?;
        let mut past_close = false;
        while let Some(child) = cursor.next_silent() {
            match child.rule.as_str() {
                "declaration" => self.local_declaration(child, false)?,
                "expression" => {
                    if !self.out.ends_with('(') {
                        self.append(" ");
                    }
                    self.expression(child)?;
                }
                ";" => {
                    self.append(";");
                    if past_close {
                        self.append("\n");
                    }
                }
                ")" => {
                    self.append(")");
                    past_close = true;
                }
                "statement" => {
                    self.append(" ");
                    self.statement(child)?;
                }
                _ => return Err(unexpected(child)),
            }
        }
        Ok(())
    }

    /// The `;`-or-statement tail of `while` and `for`. An empty body stays
    /// on the line of the closing parenthesis.
    fn loop_body(&mut self, cursor: &mut Cursor) -> Result<()> {
        let body = cursor.next_silent();
        match body {
            Some(node) if node.rule == ";" => {
                self.append(");");
                self.append("\n");
                Ok(())
            }
            Some(node) if node.rule == "statement" => {
                self.append(") ");
                self.statement(node)
            }
            Some(node) => Err(unexpected(node)),
            None => Err(CodegenError::UnexpectedNode("missing loop body".to_string())),
        }
    }

    fn jump_statement(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let first = cursor.next_silent().ok_or_else(|| unexpected(node))?;
        match first.rule.as_str() {
            "goto" => {
                self.keyword("goto");
                self.append(" ");
                let label = expect_rule(cursor.next_silent(), "identifier")?;
                self.append(&label.text);
                expect_rule(cursor.next_silent(), ";")?;
            }
            "continue" | "break" => {
                self.keyword(&first.rule);
                expect_rule(cursor.next_silent(), ";")?;
            }
            "return" => {
                self.keyword("return");
                let next = cursor.next_silent().ok_or_else(|| unexpected(node))?;
                match next.rule.as_str() {
                    "expression" => {
                        self.append(" ");
                        self.expression(next)?;
                        expect_rule(cursor.next_silent(), ";")?;
                    }
                    ";" => {}
                    _ => return Err(unexpected(next)),
                }
            }
            _ => return Err(unexpected(first)),
        }
        self.append(";");
        self.append("\n");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Walk one binary level: operands recurse into the next level, operator
    /// tokens are printed as they are, markers drive the spacing.
    fn chain(
        &mut self,
        node: &AstNode,
        operand: &str,
        operators: &[&str],
        next: fn(&mut Self, &AstNode) -> Result<()>,
    ) -> Result<()> {
        for child in &node.children {
            if child.rule == operand {
                next(self, child)?;
            } else if operators.contains(&child.rule.as_str()) {
                self.append(&child.text);
            } else if !self.handle_formatting(child) {
                return Err(unexpected(child));
            }
        }
        Ok(())
    }

    fn expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "assignment-expression", &[","], Self::assignment_expression)
    }

    fn assignment_expression(&mut self, node: &AstNode) -> Result<()> {
        for child in &node.children {
            match child.rule.as_str() {
                "conditional-expression" => self.conditional_expression(child)?,
                "unary-expression" => self.unary_expression(child)?,
                "assignment-expression" => self.assignment_expression(child)?,
                "=" | "*=" | "/=" | "%=" | "+=" | "-=" | "<<=" | ">>=" | "&=" | "^=" | "|=" => {
                    self.append(&child.text)
                }
                _ => {
                    if !self.handle_formatting(child) {
                        return Err(unexpected(child));
                    }
                }
            }
        }
        Ok(())
    }

    fn conditional_expression(&mut self, node: &AstNode) -> Result<()> {
        for child in &node.children {
            match child.rule.as_str() {
                "logical-or-expression" => self.logical_or_expression(child)?,
                "expression" => self.expression(child)?,
                "conditional-expression" => self.conditional_expression(child)?,
                "?" | ":" => self.append(&child.text),
                _ => {
                    if !self.handle_formatting(child) {
                        return Err(unexpected(child));
                    }
                }
            }
        }
        Ok(())
    }

    fn logical_or_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "logical-and-expression", &["||"], Self::logical_and_expression)
    }

    fn logical_and_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "or-expression", &["&&"], Self::or_expression)
    }

    fn or_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "xor-expression", &["|"], Self::xor_expression)
    }

    fn xor_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "and-expression", &["^"], Self::and_expression)
    }

    fn and_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "equality-expression", &["&"], Self::equality_expression)
    }

    fn equality_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "relational-expression", &["==", "!="], Self::relational_expression)
    }

    fn relational_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "shift-expression", &["<", ">", "<=", ">="], Self::shift_expression)
    }

    fn shift_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "additive-expression", &["<<", ">>"], Self::additive_expression)
    }

    fn additive_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "multiplicative-expression", &["+", "-"], Self::multiplicative_expression)
    }

    fn multiplicative_expression(&mut self, node: &AstNode) -> Result<()> {
        self.chain(node, "cast-expression", &["*", "/", "%"], Self::cast_expression)
    }

    fn cast_expression(&mut self, node: &AstNode) -> Result<()> {
        for child in &node.children {
            match child.rule.as_str() {
                "unary-expression" => self.unary_expression(child)?,
                "(" => self.append("("),
                "type-name" => self.type_name(child)?,
                ")" => self.append(") "),
                "cast-expression" => self.cast_expression(child)?,
                _ => {
                    if !self.handle_formatting(child) {
                        return Err(unexpected(child));
                    }
                }
            }
        }
        Ok(())
    }

    fn unary_expression(&mut self, node: &AstNode) -> Result<()> {
        for child in &node.children {
            match child.rule.as_str() {
                "postfix-expression" => self.postfix_expression(child)?,
                "unary-expression" => self.unary_expression(child)?,
                "cast-expression" => self.cast_expression(child)?,
                "++" | "--" | "+" | "-" | "~" | "!" => self.append(&child.text),
                _ => {
                    if !self.handle_formatting(child) {
                        return Err(unexpected(child));
                    }
                }
            }
        }
        Ok(())
    }

    fn postfix_expression(&mut self, node: &AstNode) -> Result<()> {
        for child in &node.children {
            match child.rule.as_str() {
                "primary-expression" => self.primary_expression(child)?,
                "expression" => self.expression(child)?,
                "assignment-expression" => self.assignment_expression(child)?,
                "identifier" => self.identifier(child),
                "[" | "]" | "(" | ")" | "." | "," | "++" | "--" => self.append(&child.text),
                _ => {
                    if !self.handle_formatting(child) {
                        return Err(unexpected(child));
                    }
                }
            }
        }
        Ok(())
    }

    fn primary_expression(&mut self, node: &AstNode) -> Result<()> {
        for child in &node.children {
            match child.rule.as_str() {
                "identifier" => self.identifier(child),
                "constant" => self.colored(style::LITERAL, &child.text),
                "string-literal" => self.colored(style::STRING, &child.text),
                "(" => self.append("("),
                "expression" => self.expression(child)?,
                ")" => self.append(")"),
                _ => {
                    if !self.handle_formatting(child) {
                        return Err(unexpected(child));
                    }
                }
            }
        }
        Ok(())
    }

    fn constant_expression(&mut self, node: &AstNode) -> Result<()> {
        for child in &node.children {
            match child.rule.as_str() {
                "conditional-expression" => self.conditional_expression(child)?,
                _ => {
                    if !self.handle_formatting(child) {
                        return Err(unexpected(child));
                    }
                }
            }
        }
        Ok(())
    }

    /// Identifiers are printed as they are. Rewriting `this` accesses and
    /// class statics to their mangled globals would hook in here.
    fn identifier(&mut self, node: &AstNode) {
        self.append(&node.text);
    }

    /// The type of a cast. Printed through the normal type lowering, but a
    /// class name is not checked against the class table.
    fn type_name(&mut self, node: &AstNode) -> Result<()> {
        let mut cursor = Cursor::new(node);
        let spec = expect_rule(cursor.next_silent(), "type-specifier")?;
        let mut inner = Cursor::new(spec);
        let base_node = inner.next_silent().ok_or_else(|| unexpected(spec))?;
        let base = match base_node.rule.as_str() {
            "void" | "char" | "short" | "float" | "double" => base_node.rule.clone(),
            "int" => "int32_t".to_string(),
            "long" => "int64_t".to_string(),
            "class-specifier" => base_node.text.clone(),
            "enum" => return Err(CodegenError::EnumsNotSupported),
            _ => return Err(unexpected(base_node)),
        };
        let mut array_depth = 0;
        while let Some(child) = inner.next_silent() {
            if child.rule == "array-specifier" {
                array_depth += 1;
            } else {
                return Err(unexpected(child));
            }
        }
        let text = format!("{}{}", base, "*".repeat(array_depth));
        self.type_text(&text);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Translation unit
    // ------------------------------------------------------------------

    fn translation_unit(&mut self, tree: &AstNode) -> Result<()> {
        if tree.rule != "translation-unit" {
            return Err(unexpected(tree));
        }
        let mut cursor = Cursor::new(tree);
        while let Some(child) = self.next_child(&mut cursor) {
            match child.rule.as_str() {
                "function-declaration" => self.function_declaration(child)?,
                "function-definition" => self.function_definition(child)?,
                "declaration" => self.global_declaration(child)?,
                "class-declaration" => self.class_declaration(child)?,
                _ => return Err(unexpected(child)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::define_language;

    fn translate(source: &str) -> Result<String> {
        let grammar = define_language()
            .expect("language definition is well formed")
            .compile()
            .expect("language grammar compiles");
        let result = grammar.match_input(source);
        assert!(
            result.matched && result.match_length == source.len(),
            "parse of {:?} stopped at {} (rules {:?})",
            source,
            result.max_match_length,
            result.rule_stack
        );
        generate_code(&result.tree.expect("tree"), false)
    }

    fn index_of(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{:?} not found in {:?}", needle, haystack))
    }

    #[test]
    fn class_forward_declaration() {
        let out = translate("class MyFirstClass;").expect("translates");
        assert!(out.contains("struct MyFirstClass;"));
        assert!(!out.contains("{"));
    }

    #[test]
    fn empty_class_definition() {
        let out = translate("class MyFirstClass {}").expect("translates");
        assert!(out.contains("struct MyFirstClass {\n};"));
        assert!(!out.contains("_scope"));
    }

    #[test]
    fn class_lowering_keeps_member_order() {
        let out = translate(
            "class MyFirstClass {\n    static int[] a, b;\n    static double[][] c, d;\n    float e, f;\n}",
        )
        .expect("translates");
        assert!(out.contains("struct MyFirstClass {\n    float e;\n    float f;\n};"));
        let a = index_of(&out, "int32_t* _MyFirstClass_a_;");
        let b = index_of(&out, "int32_t* _MyFirstClass_b_;");
        let c = index_of(&out, "double** _MyFirstClass_c_;");
        let d = index_of(&out, "double** _MyFirstClass_d_;");
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn class_redefinition_is_fatal() {
        assert_eq!(
            translate("class X { int a; } class X { int a; }"),
            Err(CodegenError::ClassRedefinition("X".to_string()))
        );
    }

    #[test]
    fn repeated_forward_declarations_are_fine() {
        let out = translate("class X;\nclass X;\nclass X { int a; }").expect("translates");
        assert_eq!(out.matches("struct X;").count(), 2);
        assert!(out.contains("struct X {"));
    }

    #[test]
    fn member_redefinition_is_fatal() {
        assert_eq!(
            translate("class C { int a, a; }"),
            Err(CodegenError::VariableRedefinition("a".to_string()))
        );
        assert_eq!(
            translate("class C { int a; float a; }"),
            Err(CodegenError::VariableRedefinition("a".to_string()))
        );
    }

    #[test]
    fn function_declaration_then_definition() {
        let out = translate("void main();\nvoid main() { return; }").expect("translates");
        assert!(out.contains("void main();"));
        assert!(out.contains("void main() {"));
        assert!(out.contains("return;"));
    }

    #[test]
    fn repeated_function_declarations_are_fine() {
        let out = translate("void f(int a);\nvoid f(int b);").expect("translates");
        assert_eq!(out.matches("void f(int32_t").count(), 2);
    }

    #[test]
    fn function_redefinition_is_fatal() {
        assert_eq!(
            translate("void f() { return; }\nvoid f() { return; }"),
            Err(CodegenError::FunctionRedefinition("f".to_string()))
        );
    }

    #[test]
    fn signature_mismatches_are_fatal() {
        assert_eq!(
            translate("void f(int a);\nint f(int a);"),
            Err(CodegenError::SignatureMismatch("f".to_string()))
        );
        assert_eq!(
            translate("void f(int a);\nvoid f(float a) { return; }"),
            Err(CodegenError::SignatureMismatch("f".to_string()))
        );
    }

    #[test]
    fn parameter_checks() {
        assert_eq!(
            translate("void f(int a, int a);"),
            Err(CodegenError::ParameterRedefinition("a".to_string()))
        );
        assert_eq!(
            translate("void f(void v);"),
            Err(CodegenError::VoidParameter("v".to_string()))
        );
    }

    #[test]
    fn statics_are_hoisted_under_their_scope_id() {
        let out = translate(
            "void main() {\n    int a;\n    {\n        int a;\n        static int c;\n        insideScope:;\n    }\n    goto insideScope;\nfinish: return;\n}",
        )
        .expect("translates");
        // The function body is scope 1, the inner block scope 2.
        assert!(out.contains("int32_t _scope2_c_;"));
        // Nothing is left at the statement site.
        assert!(!out.contains("int32_t c;"));
        assert!(!out.contains("static int"));
        let inside = index_of(&out, "insideScope:");
        let finish = index_of(&out, "finish:");
        assert!(inside < finish);
        assert!(out.contains("goto insideScope;"));
    }

    #[test]
    fn scope_ids_are_never_reused() {
        let out = translate(
            "void f() { { static int x; } { static int x; } { static int x; } }",
        )
        .expect("translates");
        assert!(out.contains("int32_t _scope2_x_;"));
        assert!(out.contains("int32_t _scope3_x_;"));
        assert!(out.contains("int32_t _scope4_x_;"));
    }

    #[test]
    fn shadowing_across_scopes_is_fine() {
        assert!(translate("void f() { int a; { int a; } }").is_ok());
    }

    #[test]
    fn duplicate_locals_in_one_scope_are_fatal() {
        assert_eq!(
            translate("void f() { int a; int a; }"),
            Err(CodegenError::VariableRedefinition("a".to_string()))
        );
        // A parameter occupies the body scope.
        assert_eq!(
            translate("void f(int a) { int a; }"),
            Err(CodegenError::VariableRedefinition("a".to_string()))
        );
    }

    #[test]
    fn tentative_global_definitions() {
        let out = translate("int a;\nint a;").expect("translates");
        assert_eq!(out.matches("int32_t a;").count(), 2);
        assert_eq!(
            translate("int a;\nfloat a;"),
            Err(CodegenError::VariableRedefinition("a".to_string()))
        );
    }

    #[test]
    fn type_lowering() {
        let out = translate("int[][] m;\nchar[] s;\nlong big;\nshort small;").expect("translates");
        assert!(out.contains("int32_t** m;"));
        assert!(out.contains("char* s;"));
        assert!(out.contains("int64_t big;"));
        assert!(out.contains("short small;"));
    }

    #[test]
    fn void_misuse_is_fatal() {
        assert_eq!(
            translate("void x;"),
            Err(CodegenError::VoidVariable("x".to_string()))
        );
        assert_eq!(translate("void[] x;"), Err(CodegenError::VoidArray));
    }

    #[test]
    fn class_typed_variables() {
        let out = translate("class P { int x; }\nP p;").expect("translates");
        assert!(out.contains("struct P p;"));
        assert_eq!(
            translate("Q q;"),
            Err(CodegenError::UnknownClass("Q".to_string()))
        );
    }

    #[test]
    fn enums_are_rejected() {
        assert_eq!(
            translate("enum Color c;"),
            Err(CodegenError::EnumsNotSupported)
        );
    }

    #[test]
    fn else_joins_the_closing_brace() {
        let out =
            translate("void f() { if (a) { b; } else { c; } }").expect("translates");
        assert!(out.contains("if (a) {"));
        assert!(out.contains("} else {"));
    }

    #[test]
    fn loop_emission() {
        let out = translate(
            "void f() { for (int i; i < 3; ++i) x += i; while (x) x--; do x++; while (x < 9); }",
        )
        .expect("translates");
        assert!(out.contains("for (int32_t i; i < 3; ++i) x += i;"));
        assert!(out.contains("while (x) x--;"));
        assert!(out.contains("do x++;"));
        assert!(out.contains("while (x < 9);"));
    }

    #[test]
    fn empty_loop_bodies_stay_on_one_line() {
        let out = translate("void f() { while (x); }").expect("translates");
        assert!(out.contains("while (x);"));
    }

    #[test]
    fn switch_and_labels() {
        let out = translate(
            "void f(int x) { switch (x) { case 1: x = 2; break; default: x = 0; } }",
        )
        .expect("translates");
        assert!(out.contains("switch (x) {"));
        assert!(out.contains("case 1: x = 2;"));
        assert!(out.contains("break;"));
        assert!(out.contains("default: x = 0;"));
    }

    #[test]
    fn expression_emission() {
        let out = translate("void f() { a = b + c * d; }").expect("translates");
        assert!(out.contains("a = b + c * d;"));
        let out = translate("void f() { a = f(b, c.d++); }").expect("translates");
        assert!(out.contains("a = f(b, c.d++);"));
        let out = translate("void f() { v[i] = x ? y : z; }").expect("translates");
        assert!(out.contains("v[i] = x ? y : z;"));
    }

    #[test]
    fn casts_lower_their_type_without_a_class_check() {
        let out = translate("void f() { x = (long) y; }").expect("translates");
        assert!(out.contains("x = (int64_t) y;"));
        // A cast to an unknown name is passed through.
        let out = translate("void f() { x = (Unknown) y; }").expect("translates");
        assert!(out.contains("x = (Unknown) y;"));
    }

    #[test]
    fn comments_are_carried_over() {
        let out = translate("int a; // keep me\nint b;").expect("translates");
        assert!(out.contains("// keep me"));
    }

    #[test]
    fn colorized_output_uses_escapes() {
        let grammar = define_language()
            .expect("language definition is well formed")
            .compile()
            .expect("language grammar compiles");
        let result = grammar.match_input("int a;");
        let tree = result.tree.expect("tree");
        let plain = generate_code(&tree, false).expect("translates");
        let colored = generate_code(&tree, true).expect("translates");
        assert!(!plain.contains('\u{1b}'));
        assert!(colored.contains('\u{1b}'));
    }
}
