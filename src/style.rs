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

//! Fixed ANSI palette for emitted code and tree dumps.

use ansiterm::Colour;

/// Keywords in emitted C.
pub const KEYWORD: Colour = Colour::Blue;

/// Type names in emitted C.
pub const TYPE: Colour = Colour::Cyan;

/// Numeric and character constants.
pub const LITERAL: Colour = Colour::Yellow;

/// String literals.
pub const STRING: Colour = Colour::Green;

/// Comments carried over from the source.
pub const COMMENT: Colour = Colour::Fixed(8);

/// Rule names in the tree dump.
pub const RULE_NAME: Colour = Colour::Cyan;

/// Matched texts in the tree dump.
pub const NODE_TEXT: Colour = Colour::Yellow;

/// Return to the stream default color.
pub const RESET: &str = "\u{1b}[0m";

/// The escape sequence that switches to `colour`.
pub fn prefix(colour: Colour) -> String {
    colour.normal().prefix().to_string()
}
