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

//! Command line front-end: read an `.addaat` file, translate it, write the
//! `.c` file next to it.

#[macro_use]
extern crate log;
extern crate flexi_logger;
extern crate itertools;

use libc;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::exit;

#[cfg(target_family = "unix")]
use std::os::unix::fs::OpenOptionsExt;

use itertools::Itertools;
use structopt::StructOpt;

use addaat::{define_language, generate_code};

#[derive(Debug, StructOpt)]
#[structopt(name = "addaat", about = "Translates Addaat sources to C")]
struct CommandLine {
    /// Input file, must end in `.addaat`
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Dump the syntax tree after parsing
    #[structopt(long = "print-trees")]
    print_trees: bool,

    /// Use ANSI colors in the syntax tree dump
    #[structopt(long = "print-colored-trees")]
    print_colored_trees: bool,

    /// Use ANSI colors in the emitted C code
    #[structopt(long = "colorize-code")]
    colorize_code: bool,
}

/// Line and column of a byte offset, both starting at 1.
fn line_and_column(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for c in source[..offset].chars() {
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn run(cmd_line: &CommandLine) -> Result<(), String> {
    if cmd_line.input.extension().map_or(true, |e| e != "addaat") {
        return Err(format!(
            "Input file must have the .addaat extension: {}",
            cmd_line.input.to_string_lossy()
        ));
    }

    // Read the whole input.
    let mut file = OpenOptions::new();
    file.read(true);
    #[cfg(target_family = "unix")]
    file.custom_flags(libc::O_EXCL);
    let mut file = file
        .open(&cmd_line.input)
        .map_err(|e| format!("Can't open {}: {}", cmd_line.input.to_string_lossy(), e))?;
    let mut source = String::new();
    file.read_to_string(&mut source)
        .map_err(|e| format!("Can't read {}: {}", cmd_line.input.to_string_lossy(), e))?;

    // Language definition.
    let grammar = define_language()
        .and_then(|grammar| grammar.compile())
        .map_err(|e| format!("Error in the language definition: {}", e))?;

    // Match.
    let result = grammar.match_input(&source);
    if cmd_line.print_trees {
        if let Some(tree) = &result.tree {
            info!("{}", tree.to_tree_string(cmd_line.print_colored_trees));
        }
    }
    if !result.matched || result.match_length != source.len() {
        let (line, column) = line_and_column(&source, result.max_match_length);
        let mut message = format!(
            "Failed! Match: {}, length: {}\n",
            if result.matched { "True" } else { "False" },
            result.match_length
        );
        message.push_str(&format!(
            "          Max match length: {}, line: {}, column: {}\n",
            result.max_match_length, line, column
        ));
        for rule in result.rule_stack.iter().rev().dedup() {
            message.push_str(&format!("            {}\n", rule));
        }
        return Err(message);
    }
    let tree = result
        .tree
        .ok_or_else(|| "Parser returned no syntax tree".to_string())?;

    // Generate code.
    let code = generate_code(&tree, cmd_line.colorize_code).map_err(|e| e.to_string())?;

    // Write the output next to the input.
    let out_path = cmd_line.input.with_extension("c");
    let mut out_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&out_path)
        .map_err(|e| format!("Can't open {}: {}", out_path.to_string_lossy(), e))?;
    out_file
        .write_all(code.as_bytes())
        .map_err(|e| format!("Can't write {}: {}", out_path.to_string_lossy(), e))?;
    info!("Wrote {}", out_path.to_string_lossy());
    Ok(())
}

fn main() {
    let _ = flexi_logger::Logger::with_env_or_str("info").start();

    let cmd_line = CommandLine::from_args();
    debug!("{:?}", cmd_line);

    if let Err(message) = run(&cmd_line) {
        error!("{}", message);
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_and_column_counting() {
        let source = "ab\ncde\nf";
        assert_eq!(line_and_column(source, 0), (1, 1));
        assert_eq!(line_and_column(source, 1), (1, 2));
        assert_eq!(line_and_column(source, 3), (2, 1));
        assert_eq!(line_and_column(source, 7), (3, 1));
    }
}
