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

//! Addaat language syntax.
//!
//! Notes:
//! =====
//!  Leave right recursion as is.
//!  Convert left recursion into repeat or right recursion (note that right
//!  recursion inverses the order of operations).
//!    Example:
//!    ========
//! ```text
//!      Rule:
//!      -----
//!         shift-expression:
//!            additive-expression
//!            shift-expression << additive-expression
//!            shift-expression >> additive-expression
//!      Becomes:
//!      --------
//!         shift-expression:
//!            ${additive-expression} {
//!               { << ${additive-expression}} |
//!               { >> ${additive-expression}}
//!            }^*
//! ```
//!
//! Alternatives that share a prefix must list the longer one first, the
//! ordered choice commits to its first complete alternative.

use crate::grammar::{Grammar, GrammarError};

/// Build the Addaat grammar. The root rule is `translation-unit`.
pub fn define_language() -> Result<Grammar, GrammarError> {
    let mut g = Grammar::new();

    // =====================================
    // Lexical rules,
    // =====================================

    // Tokens,
    g.add_rule("+", "+", true)?;
    g.add_rule("-", "\\-", true)?;
    g.add_rule("*", "\\*", true)?;
    g.add_rule("/", "/", true)?;
    g.add_rule("%", "%", true)?;
    g.add_rule("!", "!", true)?;
    g.add_rule("~", "~", true)?;
    g.add_rule("&", "&", true)?;
    g.add_rule("|", "\\|", true)?;
    g.add_rule("^", "\\^", true)?;
    g.add_rule("<<", "<<", true)?;
    g.add_rule(">>", ">>", true)?;
    g.add_rule("=", "=", true)?;
    g.add_rule("+=", "+=", true)?;
    g.add_rule("-=", "\\-=", true)?;
    g.add_rule("*=", "\\*=", true)?;
    g.add_rule("/=", "/=", true)?;
    g.add_rule("%=", "%=", true)?;
    g.add_rule("<<=", "<<=", true)?;
    g.add_rule(">>=", ">>=", true)?;
    g.add_rule("^=", "\\^=", true)?;
    g.add_rule("&=", "&=", true)?;
    g.add_rule("|=", "\\|=", true)?;
    g.add_rule("==", "==", true)?;
    g.add_rule("!=", "!=", true)?;
    g.add_rule("<", "<", true)?;
    g.add_rule(">", ">", true)?;
    g.add_rule("<=", "<=", true)?;
    g.add_rule(">=", ">=", true)?;
    g.add_rule("&&", "&&", true)?;
    g.add_rule("||", "\\|\\|", true)?;
    g.add_rule("(", "(", true)?;
    g.add_rule(")", ")", true)?;
    g.add_rule("[", "[", true)?;
    g.add_rule("]", "]", true)?;
    g.add_rule("OB", "\\{", true)?;
    g.add_rule("CB", "\\}", true)?;
    g.add_rule(":", ":", true)?;
    g.add_rule(";", ";", true)?;
    g.add_rule("?", "?", true)?;
    g.add_rule(",", ",", true)?;
    g.add_rule(".", ".", true)?;
    g.add_rule("++", "++", true)?;
    g.add_rule("--", "\\-\\-", true)?;
    g.add_rule("...", "...", true)?;
    g.add_rule("class", "class", true)?;
    g.add_rule("enum", "enum", true)?;
    g.add_rule("if", "if", true)?;
    g.add_rule("else", "else", true)?;
    g.add_rule("while", "while", true)?;
    g.add_rule("do", "do", true)?;
    g.add_rule("for", "for", true)?;
    g.add_rule("continue", "continue", true)?;
    g.add_rule("break", "break", true)?;
    g.add_rule("return", "return", true)?;
    g.add_rule("switch", "switch", true)?;
    g.add_rule("case", "case", true)?;
    g.add_rule("default", "default", true)?;
    g.add_rule("goto", "goto", true)?;
    g.add_rule("void", "void", true)?;
    g.add_rule("char", "char", true)?;
    g.add_rule("short", "short", true)?;
    g.add_rule("int", "int", true)?;
    g.add_rule("long", "long", true)?;
    g.add_rule("float", "float", true)?;
    g.add_rule("double", "double", true)?;
    g.add_rule("signed", "signed", true)?;
    g.add_rule("unsigned", "unsigned", true)?;
    g.add_rule("static", "static", true)?;

    // Space markers (forward declaration),
    g.add_rule("insert space", "", true)?;

    // Spaces and comments,
    g.add_rule("ε", "", false)?;
    g.add_rule("line-cont", "\\\\\n", true)?;
    g.add_rule(
        "white-space",
        "{\\ |\t|\r|\n|${line-cont}} {\\ |\t|\r|\n|${line-cont}}^*",
        false,
    )?;
    g.add_rule("not-new-line", "\x01-\x09 | \x0b-\u{10FFFF}", false)?;
    g.add_rule(
        "line-comment",
        "${white-space}|${ε} // ${not-new-line}^* \n|${ε}",
        true,
    )?;
    g.add_rule("block-comment", "${white-space}|${ε} /\\* * \\*/", true)?;
    g.add_rule(
        "ignorable",
        "#{{white-space} {line-comment} {block-comment}}",
        false,
    )?;
    g.add_rule("", "${ignorable}^*", false)?;
    g.add_rule(" ", "${ignorable} ${ignorable}^*", false)?;

    // Space markers (implementation),
    g.add_rule("+ ", "${} ${insert space}", false)?;
    g.add_rule("insert \n", "", true)?;
    g.add_rule("insert \ns", "", true)?;
    g.add_rule("+\n", "${} ${insert \n}", false)?;
    g.add_rule("+\ns", "${} ${insert \ns}", false)?;

    g.add_rule("digit", "0-9", false)?;
    g.add_rule("non-zero-digit", "1-9", false)?;
    g.add_rule("non-digit", "_|a-z|A-Z", false)?;
    g.add_rule("hexadecimal-prefix", "0x|X", false)?;
    g.add_rule("hexadecimal-digit", "0-9|a-f|A-F", false)?;
    g.add_rule(
        "hex-quad",
        "${hexadecimal-digit}${hexadecimal-digit}${hexadecimal-digit}${hexadecimal-digit}",
        false,
    )?;
    g.add_rule(
        "universal-character-name",
        "{\\\\u ${hex-quad}} | {\\\\U ${hex-quad} ${hex-quad}}",
        false,
    )?;

    // Identifier. Keywords win the tie against equally long identifiers, so
    // an identifier is only accepted when the identifier alternative wins,
    g.add_rule(
        "keyword",
        "#{{class} {enum} {if} {else} {while} {do} {for} {continue} {break} {return} \
          {switch} {case} {default} {goto} {void} {char} {short} {int} {long} {float} \
          {double} {signed} {unsigned} {static}}",
        false,
    )?;
    g.add_rule(
        "identifier-non-digit",
        "${non-digit} | ${universal-character-name}",
        false,
    )?;
    g.add_rule(
        "identifier-content",
        "${identifier-non-digit} {${digit} | ${identifier-non-digit}}^*",
        false,
    )?;
    g.add_rule(
        "identifier",
        "#{{keyword} {identifier-content} == {identifier-content}}",
        true,
    )?;

    // Constants,
    // Integer constant,
    g.add_rule("decimal-constant", "${non-zero-digit} ${digit}^*", false)?;
    g.add_rule("octal-constant", "0 0-7^*", false)?;
    g.add_rule(
        "hexadecimal-constant",
        "${hexadecimal-prefix} ${hexadecimal-digit} ${hexadecimal-digit}^*",
        false,
    )?;
    g.add_rule(
        "integer-suffix",
        "{ u|U {ll}|{LL}|l|L|${ε} } | { {ll}|{LL}|l|L u|U|${ε} }",
        false,
    )?;
    g.add_rule(
        "integer-constant",
        "${hexadecimal-constant}|${decimal-constant}|${octal-constant} ${integer-suffix}|${ε}",
        true,
    )?;

    // Decimal floating point,
    g.add_rule(
        "fractional-constant",
        "{${digit}^* . ${digit} ${digit}^*} | {${digit} ${digit}^* . }",
        false,
    )?;
    g.add_rule("exponent-part", "e|E +|\\-|${ε} ${digit} ${digit}^*", false)?;
    g.add_rule("floating-suffix", "f|l|F|L", false)?;
    g.add_rule(
        "decimal-floating-constant",
        "{${fractional-constant} ${exponent-part}|${ε} ${floating-suffix}|${ε}} | \
         {${digit} ${digit}^* ${exponent-part} ${floating-suffix}|${ε}}",
        false,
    )?;

    // Hexadecimal floating point,
    g.add_rule(
        "hexadecimal-fractional-constant",
        "{${hexadecimal-digit}^* . ${hexadecimal-digit} ${hexadecimal-digit}^*} | \
         {${hexadecimal-digit} ${hexadecimal-digit}^* . }",
        false,
    )?;
    g.add_rule(
        "binary-exponent-part",
        "p|P +|\\-|${ε} ${digit} ${digit}^*",
        false,
    )?;
    g.add_rule(
        "hexadecimal-floating-constant",
        "${hexadecimal-prefix} ${hexadecimal-fractional-constant}|{${hexadecimal-digit}${hexadecimal-digit}^*} \
         ${binary-exponent-part} ${floating-suffix}|${ε}",
        false,
    )?;

    // Floating point constant,
    g.add_rule(
        "floating-constant",
        "${decimal-floating-constant} | ${hexadecimal-floating-constant}",
        true,
    )?;

    // Enumeration constant,
    g.add_rule("enumeration-constant", "${identifier}", true)?;

    // Character constant. Unknown escape sequences are implementation
    // defined, the escaped character is passed through like gcc and clang
    // do,
    g.add_rule(
        "c-char",
        "\x01-\x09 | \x0b-\x26 | \x28-\x5b | \x5d-\u{10FFFF}",
        false,
    )?;
    g.add_rule(
        "s-char",
        "\x01-\x09 | \x0b-\x21 | \\\x23-\x5b | \x5d-\u{10FFFF}",
        false,
    )?;
    g.add_rule(
        "c-char-with-backslash-without-uUxX",
        "\x01-\x09 | \x0b-\x54 | \x56-\x57 | \x59-\x74 | \x76-\x77 | \x79-\u{10FFFF}",
        false,
    )?;
    g.add_rule(
        "hexadecimal-escape-sequence",
        "\\\\x ${hexadecimal-digit} ${hexadecimal-digit}^*",
        false,
    )?;
    g.add_rule(
        "character-constant",
        "L|u|U|${ε} ' { ${c-char}|${hexadecimal-escape-sequence}|${universal-character-name}|{\\\\${c-char-with-backslash-without-uUxX}} }^* '",
        true,
    )?;

    // Constant,
    g.add_rule(
        "constant",
        "#{{integer-constant} {floating-constant} {enumeration-constant} {character-constant}}",
        true,
    )?;

    // String literal,
    // See: https://stackoverflow.com/a/13087264/1942069   and   https://stackoverflow.com/a/13445170/1942069
    g.add_rule(
        "string-literal-fragment",
        "{u8}|u|U|L|${ε} \" { ${s-char}|${hexadecimal-escape-sequence}|${universal-character-name}|{\\\\${c-char-with-backslash-without-uUxX}} }^* \"",
        true,
    )?;
    g.add_rule(
        "string-literal",
        "${string-literal-fragment} {${} ${string-literal-fragment}}|${ε}",
        true,
    )?;

    // =====================================
    // Phrase structure,
    // =====================================

    // -------------------------------------
    // Expressions,
    // -------------------------------------

    // Primary expression,
    g.add_rule("expression", "STUB!", false)?;
    g.add_rule(
        "primary-expression",
        "${identifier} | ${constant} | ${string-literal} | { ${(} ${} ${expression} ${} ${)} }",
        true,
    )?;

    // Postfix expression,
    g.add_rule("type-name", "STUB!", false)?;
    g.add_rule("argument-expression-list", "STUB!", false)?;
    g.add_rule(
        "postfix-expression",
        "${primary-expression} {\
            {${} ${[} ${} ${expression} ${} ${]} } | \
            {${} ${(} ${} ${argument-expression-list}|${ε} ${} ${)} } | \
            {${} ${.} ${} ${identifier}} | \
            {${} ${++} } | \
            {${} ${--} }\
         }^*",
        true,
    )?;

    // Argument expression list,
    g.add_rule("assignment-expression", "STUB!", false)?;
    g.update_rule(
        "argument-expression-list",
        "${assignment-expression} { ${} ${,} ${+ } ${assignment-expression} }^*",
        false,
    )?;

    // Unary expression,
    g.add_rule("unary-expression", "STUB!", false)?;
    g.add_rule("unary-operator", "STUB!", false)?;
    g.add_rule("cast-expression", "STUB!", false)?;
    g.update_rule(
        "unary-expression",
        "${postfix-expression} | \
         { ${++} ${} ${unary-expression} } | \
         { ${--} ${} ${unary-expression} } | \
         { ${unary-operator} ${} ${cast-expression} }",
        true,
    )?;

    // Unary operator,
    g.update_rule("unary-operator", "#{{+}{-}{~}{!} {++}{--} != {++}{--}}", false)?;

    // Cast expression. The type is not checked against the known types,
    g.update_rule(
        "cast-expression",
        "${unary-expression} | { ${(} ${} ${type-name} ${} ${)} ${} ${cast-expression} }",
        true,
    )?;
    g.update_rule("type-name", "${type-specifier}", true)?;

    // Multiplicative expression,
    g.add_rule(
        "multiplicative-expression",
        "${cast-expression} { ${+ } ${*}|${/}|${%} ${+ } ${cast-expression} }^*",
        true,
    )?;

    // Additive expression,
    g.add_rule(
        "additive-expression",
        "${multiplicative-expression} { ${+ } ${+}|${-} ${+ } ${multiplicative-expression} }^*",
        true,
    )?;

    // Shift expression,
    g.add_rule(
        "shift-expression",
        "${additive-expression} { ${+ } ${<<}|${>>} ${+ } ${additive-expression} }^*",
        true,
    )?;

    // Relational expression,
    g.add_rule(
        "relational-expression",
        "${shift-expression} { ${+ } #{{<} {>} {<=} {>=}} ${+ } ${shift-expression} }^*",
        true,
    )?;

    // Equality expression,
    g.add_rule(
        "equality-expression",
        "${relational-expression} { ${+ } ${==}|${!=} ${+ } ${relational-expression} }^*",
        true,
    )?;

    // AND expression,
    g.add_rule(
        "and-expression",
        "${equality-expression} { ${+ } #{{&} {&&} != {&&}} ${+ } ${equality-expression} }^*",
        true,
    )?;

    // Exclusive OR expression,
    g.add_rule(
        "xor-expression",
        "${and-expression} { ${+ } ${^} ${+ } ${and-expression} }^*",
        true,
    )?;

    // Inclusive OR expression,
    g.add_rule(
        "or-expression",
        "${xor-expression} { ${+ } #{{|} {||} != {||}} ${+ } ${xor-expression} }^*",
        true,
    )?;

    // Logical AND expression,
    g.add_rule(
        "logical-and-expression",
        "${or-expression} { ${+ } ${&&} ${+ } ${or-expression} }^*",
        true,
    )?;

    // Logical OR expression,
    g.add_rule(
        "logical-or-expression",
        "${logical-and-expression} { ${+ } ${||} ${+ } ${logical-and-expression} }^*",
        true,
    )?;

    // Conditional expression,
    g.add_rule("conditional-expression", "STUB!", false)?;
    g.update_rule(
        "conditional-expression",
        "${logical-or-expression} | \
         {${logical-or-expression} ${+ } ${?} ${+ } ${expression} ${+ } ${:} ${+ } ${conditional-expression}}",
        true,
    )?;

    // Assignment expression,
    g.add_rule("assignment-operator", "STUB!", false)?;
    g.update_rule(
        "assignment-expression",
        "${conditional-expression} | \
         {${unary-expression} ${+ } ${assignment-operator} ${+ } ${assignment-expression}}",
        true,
    )?;

    // Assignment operator,
    g.update_rule(
        "assignment-operator",
        "#{{=} {*=} {/=} {%=} {+=} {-=} {<<=} {>>=} {&=} {^=} {|=}}",
        false,
    )?;

    // Expression,
    g.update_rule(
        "expression",
        "${assignment-expression} { ${} ${,} ${} ${assignment-expression} }^*",
        true,
    )?;

    g.add_rule("constant-expression", "${conditional-expression}", true)?;

    // -------------------------------------
    // Declarations,
    // -------------------------------------

    // Declaration,
    g.add_rule("declaration-specifiers", "STUB!", false)?;
    g.add_rule("identifier-list", "STUB!", false)?;
    g.add_rule(
        "declaration",
        "${declaration-specifiers} ${+ } ${identifier-list} ${} ${;}",
        true,
    )?;

    // Identifier list,
    g.update_rule(
        "identifier-list",
        "${identifier} { ${} ${,} ${+ } ${identifier} }^*",
        false,
    )?;

    // Declaration specifiers,
    g.add_rule("storage-class-specifier", "STUB!", false)?;
    g.add_rule("type-specifier", "STUB!", false)?;
    g.update_rule(
        "declaration-specifiers",
        "${storage-class-specifier}|${ε} ${+ } ${type-specifier}",
        false,
    )?;

    // Storage class specifier,
    g.update_rule(
        "storage-class-specifier",
        "#{{static} {identifier} != {identifier}}",
        false,
    )?;

    // Type specifier,
    g.add_rule("class-specifier", "STUB!", false)?;
    g.add_rule("enum-specifier", "STUB!", false)?;
    g.add_rule("array-specifier", "STUB!", false)?;
    g.update_rule(
        "type-specifier",
        "#{{void}     {char}            \
           {short}    {int}      {long} \
           {float}    {double}          \
           {class-specifier}            \
           {enum-specifier}             \
           {identifier} != {identifier}}\
         {${} ${array-specifier}}^*",
        true,
    )?;

    // Array specifier,
    g.update_rule("array-specifier", "${[} ${} ${]}", true)?;

    // Class specifier,
    g.update_rule("class-specifier", "${identifier}", true)?;

    // Class declaration,
    g.add_rule("declaration-list", "STUB!", false)?;
    g.add_rule(
        "class-declaration",
        "${class} ${+ } ${identifier} \
         {${} ${;} ${+\n}} |\
         {${+ } ${OB} ${+\n} ${declaration-list}|${ε} ${} ${CB} ${+\n}}",
        true,
    )?;

    // Declaration list,
    g.update_rule(
        "declaration-list",
        "${declaration} ${+\n} ${declaration-list}|${ε}",
        false,
    )?;

    // Enum specifier,
    g.add_rule("enumerator-list", "STUB!", false)?;
    g.update_rule(
        "enum-specifier",
        "{ ${enum} ${} ${identifier}|${ε} ${} ${OB} ${enumerator-list} ${} ${,}|${ε} ${} ${CB} } | \
         { ${enum} ${} ${identifier} }",
        false,
    )?;

    // Enumerator list,
    g.add_rule("enumerator", "STUB!", false)?;
    g.update_rule(
        "enumerator-list",
        "${enumerator} { ${} ${,} ${+ } ${enumerator} }^*",
        false,
    )?;

    // Enumerator,
    g.update_rule(
        "enumerator",
        "${enumeration-constant} { ${} = ${} ${constant-expression} }|${ε}",
        false,
    )?;

    // -------------------------------------
    // Statements,
    // -------------------------------------

    // Statement,
    g.add_rule("labeled-statement", "STUB!", false)?;
    g.add_rule("compound-statement", "STUB!", false)?;
    g.add_rule("expression-statement", "STUB!", false)?;
    g.add_rule("selection-statement", "STUB!", false)?;
    g.add_rule("iteration-statement", "STUB!", false)?;
    g.add_rule("jump-statement", "STUB!", false)?;
    g.add_rule(
        "statement",
        "#{   {labeled-statement}\
             {compound-statement}\
           {expression-statement}\
            {selection-statement}\
            {iteration-statement}\
                 {jump-statement}}",
        true,
    )?;

    // Labeled statement,
    g.update_rule(
        "labeled-statement",
        "{${identifier}                      ${} ${:} ${} ${statement}} | \
         {${case} ${} ${constant-expression} ${} ${:} ${} ${statement}} | \
         {${default}                         ${} ${:} ${} ${statement}}",
        true,
    )?;

    // Compound statement,
    g.add_rule("block-item-list", "STUB!", true)?;
    g.update_rule(
        "compound-statement",
        "${OB} ${} ${block-item-list}|${ε} ${} ${CB}",
        true,
    )?;

    // Block item list,
    g.add_rule("block-item", "STUB!", false)?;
    g.update_rule(
        "block-item-list",
        "${+\n} ${block-item} {{ ${+\n} ${block-item} }^*} ${+\n}",
        false,
    )?;

    // Block item,
    g.update_rule("block-item", "#{{declaration} {statement}}", false)?;

    // Expression statement,
    g.update_rule("expression-statement", "${expression}|${ε} ${} ${;}", true)?;

    // Selection statement,
    g.update_rule(
        "selection-statement",
        "{ ${if}     ${} ${(} ${} ${expression} ${} ${)} ${} ${statement} {${} ${else} ${} ${statement}}|${ε} } | \
         { ${switch} ${} ${(} ${} ${expression} ${} ${)} ${} ${statement}                                     }",
        true,
    )?;

    // Iteration statement,
    g.update_rule(
        "iteration-statement",
        "{ ${while} ${+ }                       ${} ${(} ${} ${expression} ${} ${)} ${} ${;}|{${+ } ${statement}} } | \
         { ${do}    ${+ } ${statement} ${} ${while} ${} ${(} ${} ${expression} ${} ${)} ${} ${;}                  } | \
         { ${for}   ${+ } ${(} ${} ${expression}|${ε} ${} ${;} ${+ } ${expression}|${ε} ${} ${;} ${+ } ${expression}|${ε} ${} ${)} ${} ${;}|{${+ } ${statement}} } | \
         { ${for}   ${+ } ${(} ${} ${declaration}              ${+ } ${expression}|${ε} ${} ${;} ${+ } ${expression}|${ε} ${} ${)} ${} ${;}|{${+ } ${statement}} }",
        true,
    )?;

    // Jump statement,
    g.update_rule(
        "jump-statement",
        "{ ${goto}     ${} ${identifier}      ${} ${;} } | \
         { ${continue} ${}                        ${;} } | \
         { ${break}    ${}                        ${;} } | \
         { ${return}   ${} ${expression}|${ε} ${} ${;} }",
        true,
    )?;

    // -------------------------------------
    // External definitions,
    // -------------------------------------

    // Parameter declaration,
    g.add_rule(
        "parameter-declaration",
        "${type-specifier} ${+ } ${identifier}",
        true,
    )?;

    // Parameter list,
    g.add_rule(
        "parameter-list",
        "${parameter-declaration} { ${} ${,} ${+ } ${parameter-declaration} }^*",
        false,
    )?;

    // Function head,
    g.add_rule(
        "function-head",
        "${declaration-specifiers} ${+ } \
         ${identifier} ${} \
         ${(} ${} ${parameter-list}|${ε} ${} ${)}",
        true,
    )?;

    // Function declaration,
    g.add_rule("function-declaration", "${function-head} ${} ${;}", true)?;

    // Function definition,
    g.add_rule(
        "function-definition",
        "${function-head} ${+ } ${compound-statement}",
        true,
    )?;

    // External declaration,
    g.add_rule(
        "external-declaration",
        "#{{function-declaration} {function-definition} {declaration} {class-declaration}}",
        false,
    )?;

    // Translation unit. The repeat is encapsulated in a sub-rule to avoid
    // early termination,
    g.add_rule(
        "translation-unit",
        "${} ${external-declaration} {{ ${} ${+\ns} ${external-declaration} }^*} ${}",
        true,
    )?;
    g.set_root("translation-unit");

    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNode;
    use crate::grammar::CompiledGrammar;

    fn language() -> CompiledGrammar {
        define_language()
            .expect("language definition is well formed")
            .compile()
            .expect("language grammar compiles")
    }

    fn assert_full_match(grammar: &CompiledGrammar, source: &str) -> AstNode {
        let result = grammar.match_input(source);
        assert!(
            result.matched && result.match_length == source.len(),
            "{:?} stopped at {} of {} (rules: {:?})",
            source,
            result.max_match_length,
            source.len(),
            result.rule_stack
        );
        result.tree.expect("translation-unit is a pushing rule")
    }

    /// Every reference resolves and no rule is left recursive, otherwise
    /// this would fail to compile the grammar.
    #[test]
    fn language_grammar_compiles() {
        let grammar = language();
        assert!(grammar.rule_count() > 100);
        assert_eq!(
            grammar.root(),
            grammar.rule_id("translation-unit").expect("root exists")
        );
    }

    #[test]
    fn class_forward_declaration() {
        let grammar = language();
        let tree = assert_full_match(&grammar, "class MyFirstClass;");
        assert_eq!(tree.rule, "translation-unit");
        assert_eq!(tree.children[0].rule, "class-declaration");
        let class = &tree.children[0];
        assert_eq!(class.children[0].rule, "class");
        assert_eq!(class.children[2].rule, "identifier");
        assert_eq!(class.children[2].text, "MyFirstClass");
    }

    #[test]
    fn class_definitions() {
        let grammar = language();
        assert_full_match(&grammar, "class MyFirstClass {}");
        assert_full_match(
            &grammar,
            "class MyFirstClass {\n    static int[] a, b;\n    static double[][] c, d;\n    float e, f;\n}",
        );
    }

    #[test]
    fn functions_and_statements() {
        let grammar = language();
        assert_full_match(&grammar, "void main();");
        assert_full_match(&grammar, "void main() { return; }");
        assert_full_match(
            &grammar,
            "void main() {\n    int a, b, d;\n    static int c;\n    {\n        int a;\n        static int c;\n        insideScope:;\
             }\n    goto insideScope;\nfinish: return;\n}",
        );
        assert_full_match(
            &grammar,
            "int twice(int x) { if (x < 0) { return 0; } else { return 2 * x; } }",
        );
        assert_full_match(
            &grammar,
            "void loops() { int i; for (int j; j < 10; ++j) i += j; while (i) i--; do i++; while (i < 5); }",
        );
        assert_full_match(
            &grammar,
            "void pick(int x) { switch (x) { case 1: x = 2; break; default: x = 0; } }",
        );
    }

    #[test]
    fn expressions() {
        let grammar = language();
        assert_full_match(&grammar, "void f() { a = b + c * d; }");
        assert_full_match(&grammar, "void f() { a = x ? y | z : w & v; }");
        assert_full_match(&grammar, "void f() { a <<= f(b, c.d++); }");
        assert_full_match(&grammar, "void f() { v[i] = (float) n; }");
        assert_full_match(&grammar, "void f() { x = 1.5e3; y = 0x1F; s = \"hi\"; c = 'a'; }");
    }

    #[test]
    fn comments_are_matched() {
        let grammar = language();
        assert_full_match(&grammar, "int a; // trailing words\nint b;");
        assert_full_match(&grammar, "int a; /* between */ int b;");
        assert_full_match(&grammar, "// leading\nint a;");
    }

    #[test]
    fn keywords_are_not_identifiers() {
        let grammar = language();
        let result = grammar.match_input("int class;");
        assert!(!result.matched || result.match_length < "int class;".len());
        // Identifiers merely starting with a keyword are fine.
        assert_full_match(&grammar, "int classes, doubled, iffy;");
    }

    /// Single-token leaves carry exactly the matched source text, in source
    /// order. The synthetic marker nodes are not part of the input and are
    /// skipped.
    #[test]
    fn token_fidelity() {
        let grammar = language();
        let source = "void main() { int a; a += 2; }";
        let tree = assert_full_match(&grammar, source);
        let synthetic = ["insert space", "insert \n", "insert \ns", "line-cont"];
        let mut from = 0;
        let mut seen = 0;
        let mut missed = Vec::new();
        tree.walk(&mut |node| {
            if synthetic.contains(&node.rule.as_str()) {
                return;
            }
            if node.children.is_empty() && !node.text.is_empty() {
                match source[from..].find(&node.text) {
                    Some(at) => {
                        from += at + node.text.len();
                        seen += 1;
                    }
                    None => missed.push(node.text.clone()),
                }
            }
        });
        assert!(missed.is_empty(), "leaves out of order: {:?}", missed);
        // void, main, (, ), {, int, a, ;, a, +=, 2, ;, }
        assert_eq!(seen, 13);
    }

    #[test]
    fn parse_failures_report_the_failure_point() {
        let grammar = language();
        let source = "int a @ b;";
        let result = grammar.match_input(source);
        assert!(!result.matched || result.match_length < source.len());
        assert!(result.max_match_length >= source.find('@').expect("marker"));
        assert!(!result.rule_stack.is_empty());
    }
}
