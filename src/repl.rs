// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) over bytecode listings.
//!
//! Each entry is assembled and run in one long-lived runtime, so
//! definitions and procedures carry over between entries.

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};
use corvid_vm::bytecode::{Opcode, disassemble};
use corvid_vm::{HeapConfig, Runtime, Value};
use std::borrow::Cow;
use std::path::PathBuf;

use crate::asm::Assembler;

/// REPL configuration constants
const HISTORY_FILE: &str = "history";
const MAX_HISTORY_SIZE: usize = 1000;

/// Listing directives, offered by completion next to the mnemonics.
const DIRECTIVES: &[&str] = &[".proc", ".doc", ".end"];

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
    Disasm,
    Gc,
    Stats,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    ///
    /// Listing directives such as `.proc` are not commands and yield `None`.
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let rest = input.strip_prefix('.')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            "disasm" | "dis" => Some((ReplCommand::Disasm, arg)),
            "gc" => Some((ReplCommand::Gc, arg)),
            "stats" => Some((ReplCommand::Stats, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Assemble and run a listing file"),
            (".disasm [proc]", "List procedures, or disassemble one"),
            (".gc", "Run a collection now"),
            (".stats", "Show slab occupancy"),
        ]
    }
}

/// Helper struct for rustyline that provides completion, hints, and validation
#[derive(Default)]
struct CorvidHelper {
    /// Mnemonics, directives and commands, sorted
    words: Vec<String>,
}

impl CorvidHelper {
    fn new() -> Self {
        let mut words: Vec<String> = Opcode::all()
            .iter()
            .map(|op| op.mnemonic().to_string())
            .chain(DIRECTIVES.iter().map(|d| d.to_string()))
            .chain(ReplCommand::all_commands().iter().filter_map(|(cmd, _)| {
                cmd.split_whitespace().next().map(str::to_string)
            }))
            .collect();
        words.sort();
        words.dedup();
        Self { words }
    }

    /// Known words starting with `prefix`.
    fn candidates<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.words.iter().filter(move |w| w.starts_with(prefix))
    }
}

/// Start of the whitespace-delimited word ending at `pos`.
fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .rfind(char::is_whitespace)
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl Completer for CorvidHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let word = &line[word_start(line, pos)..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .candidates(word)
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for CorvidHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[word_start(line, pos)..];
        if word.len() < 2 {
            return None;
        }

        self.candidates(word)
            .find(|w| w.len() > word.len())
            .map(|w| w[word.len()..].to_string().dimmed().to_string())
    }
}

impl Highlighter for CorvidHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut chars = line.chars().peekable();
        let mut word = String::new();

        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    self.flush_word(&mut result, &mut word);
                    let mut literal = String::from(c);
                    while let Some(c) = chars.next() {
                        literal.push(c);
                        if c == '\\' {
                            if let Some(escaped) = chars.next() {
                                literal.push(escaped);
                            }
                        } else if c == '"' || c == '\n' {
                            break;
                        }
                    }
                    result.push_str(&literal.green().to_string());
                }
                ';' => {
                    self.flush_word(&mut result, &mut word);
                    let mut comment = String::from(c);
                    while let Some(&c) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        comment.push(c);
                        chars.next();
                    }
                    result.push_str(&comment.dimmed().to_string());
                }
                c if c.is_whitespace() || c == '(' || c == ')' => {
                    self.flush_word(&mut result, &mut word);
                    result.push(c);
                }
                _ => word.push(c),
            }
        }
        self.flush_word(&mut result, &mut word);

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl CorvidHelper {
    fn flush_word(&self, out: &mut String, word: &mut String) {
        if word.is_empty() {
            return;
        }
        let colored = if word.ends_with(':') {
            word.cyan().to_string()
        } else if word.starts_with('.') {
            word.magenta().to_string()
        } else if word.starts_with('\'') {
            word.blue().to_string()
        } else if self.words.binary_search(word).is_ok() {
            word.yellow().to_string()
        } else {
            word.clone()
        };
        out.push_str(&colored);
        word.clear();
    }
}

impl Validator for CorvidHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        if has_open_procedure(ctx.input()) {
            return Ok(ValidationResult::Incomplete);
        }
        Ok(ValidationResult::Valid(None))
    }
}

impl Helper for CorvidHelper {}

/// First significant word of each line, skipping labels and comments.
fn leading_words(input: &str) -> impl Iterator<Item = Option<&str>> {
    input.lines().map(|line| {
        let code = line.split(';').next().unwrap_or_default();
        let mut words = code.split_whitespace().peekable();
        if words.peek().is_some_and(|w| w.ends_with(':')) {
            words.next();
        }
        words.next()
    })
}

/// Whether a `.proc` was opened and not yet closed with `.end`
fn has_open_procedure(input: &str) -> bool {
    let mut open = false;
    for word in leading_words(input).flatten() {
        match word {
            ".proc" => open = true,
            ".end" => open = false,
            _ => {}
        }
    }
    open
}

/// Whether the top-level code of an entry still needs a closing `ret`.
///
/// Entries that end in `ret` or close a procedure are left alone; anything
/// else returns whatever it leaves on the stack.
fn needs_ret(input: &str) -> bool {
    let last = input
        .lines()
        .rev()
        .zip(leading_words(input).collect::<Vec<_>>().into_iter().rev())
        .find(|(line, _)| !line.split(';').next().unwrap_or_default().trim().is_empty())
        .map(|(_, word)| word);

    match last {
        None => false,
        Some(Some("ret" | ".end")) => false,
        Some(_) => true,
    }
}

/// The interactive REPL for the Corvid virtual machine
pub struct Repl {
    runtime: Runtime,
    assembler: Assembler,
    editor: Editor<CorvidHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(config: HeapConfig) -> anyhow::Result<Self> {
        let config_rl = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config_rl)?;
        editor.set_helper(Some(CorvidHelper::new()));

        // Determine history file path
        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("corvid")
            .join(HISTORY_FILE);

        // Create parent directory if it doesn't exist
        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        // Load history
        let _ = editor.load_history(&history_path);

        Ok(Self {
            runtime: Runtime::with_config(config)?,
            assembler: Assembler::new(),
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }

                    // Check for REPL commands
                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.eval_and_print(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        // Save history
        let _ = self.editor.save_history(&self.history_path);

        self.print_goodbye();
        Ok(())
    }

    fn print_banner(&self) {
        let version = env!("CARGO_PKG_VERSION");
        println!();
        println!("{}", r#"                         _     _ "#.bright_cyan().bold());
        println!("{}", r#"   ___ ___  _ ____   __ (_) __| |"#.bright_cyan().bold());
        println!("{}", r#"  / __/ _ \| '__\ \ / / | |/ _` |"#.bright_cyan().bold());
        println!("{}", r#" | (_| (_) | |   \ V /  | | (_| |"#.bright_cyan().bold());
        println!("{}", r#"  \___\___/|_|    \_/   |_|\__,_|"#.bright_cyan().bold());
        println!();
        println!(
            "  {} {} {}",
            "Corvid Virtual Machine".white().bold(),
            "v".dimmed(),
            version.bright_yellow()
        );
        println!(
            "  {}",
            "Entries without a trailing ret return their top of stack".dimmed()
        );
        println!();
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn print_goodbye(&self) {
        println!();
        println!("{}", "Goodbye!".bright_cyan());
        println!();
    }

    fn format_prompt(&self) -> String {
        format!("{} ", "corvid>".bright_green().bold())
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => self.print_version(),
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(path),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
            ReplCommand::Disasm => self.disasm(arg),
            ReplCommand::Gc => {
                let report = self.runtime.heap_mut().collect();
                println!(
                    "{} {} {} {:?}",
                    "freed".dimmed(),
                    report.total_freed().yellow(),
                    "slots in".dimmed(),
                    report.elapsed
                );
            }
            ReplCommand::Stats => crate::print_stats(self.runtime.heap()),
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();

        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }

        println!();
        println!("{}", "Listings:".white().bold());
        println!();
        println!("  {:16} {}", "mnemonic args".yellow(), "One instruction per line".dimmed());
        println!("  {:16} {}", "name:".cyan(), "Bind a label".dimmed());
        println!("  {:16} {}", ".proc f (a b)".magenta(), "Open a procedure, closed by .end".dimmed());
        println!("  {:16} {}", "; text".dimmed(), "Comment".dimmed());

        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!(
            "  {:16} {}",
            "Ctrl+C".yellow(),
            "Cancel current input".dimmed()
        );
        println!("  {:16} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:16} {}", "Tab".yellow(), "Complete mnemonics".dimmed());
        println!("  {:16} {}", "↑/↓".yellow(), "Navigate history".dimmed());
        println!();
    }

    fn print_version(&self) {
        let version = env!("CARGO_PKG_VERSION");
        println!();
        println!("{}: {}", "Corvid".bright_cyan().bold(), version.yellow());
        println!();
    }

    fn load_file(&mut self, path: &str) {
        match std::fs::read_to_string(path) {
            Ok(source) => self.eval_and_print(&source),
            Err(e) => eprintln!("{}: {}: {}", "Error".red().bold(), path.cyan(), e),
        }
    }

    fn disasm(&self, name: Option<&str>) {
        let Some(name) = name else {
            let mut names: Vec<&str> = self.assembler.procedures().collect();
            names.sort_unstable();
            for name in names {
                println!("  {}", name.magenta());
            }
            return;
        };

        let Some(code) = self.assembler.procedure_code(name) else {
            eprintln!("{}: no procedure {}", "Error".red().bold(), name.cyan());
            return;
        };
        match disassemble(self.runtime.heap(), code) {
            Ok(listing) => print!("{}", listing),
            Err(e) => crate::print_error(self.runtime.heap(), &e),
        }
    }

    fn eval_and_print(&mut self, input: &str) {
        let source = if needs_ret(input) {
            Cow::Owned(format!("{}\nret", input))
        } else {
            Cow::Borrowed(input)
        };

        let code = match self.assembler.assemble(self.runtime.heap_mut(), &source) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{}: {}", "Syntax".red().bold(), e);
                return;
            }
        };

        let empty = self
            .runtime
            .heap()
            .get(code)
            .map(|bytecode| bytecode.ops.is_empty())
            .unwrap_or(false);
        if empty {
            return;
        }

        let mark = self.runtime.heap_mut().roots_mut().push(code);
        match self.runtime.evaluate(code) {
            Ok(value) => println!("{}", format_value(self.runtime.heap(), value)),
            Err(e) => crate::print_error(self.runtime.heap(), &e),
        }
        self.runtime.heap_mut().roots_mut().pop(mark);
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

/// Format a value for display with syntax coloring
fn format_value(heap: &corvid_vm::Heap, value: Value) -> String {
    let text = value.display(heap).to_string();
    match value {
        Value::Nil => text.blue().dimmed().to_string(),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => text.yellow().to_string(),
        Value::String(_) => text.green().to_string(),
        Value::Symbol(_) => text.magenta().to_string(),
        Value::Lambda(_) | Value::Macro(_) | Value::NativeFunc(_) => text.cyan().to_string(),
        Value::Exception(_) => text.red().to_string(),
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(
            ReplCommand::parse(".help"),
            Some((ReplCommand::Help, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".exit"),
            Some((ReplCommand::Exit, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".load sum.casm"),
            Some((ReplCommand::Load, Some("sum.casm")))
        ));
        assert!(matches!(
            ReplCommand::parse(".dis square"),
            Some((ReplCommand::Disasm, Some("square")))
        ));
        assert!(ReplCommand::parse("push/nil").is_none());
        assert!(ReplCommand::parse(".proc square (x)").is_none());
        assert!(ReplCommand::parse(".end").is_none());
    }

    #[test]
    fn test_has_open_procedure() {
        assert!(has_open_procedure(".proc f ()"));
        assert!(has_open_procedure(".proc f ()\n  push/nil"));
        assert!(!has_open_procedure(".proc f ()\n  push/nil\n  ret\n.end"));
        assert!(!has_open_procedure("push/nil ; .proc in a comment"));
        assert!(!has_open_procedure("push/int/byte 1"));
    }

    #[test]
    fn test_needs_ret() {
        assert!(needs_ret("push/int/byte 1"));
        assert!(needs_ret("push/int/byte 1\ndone:"));
        assert!(!needs_ret("push/nil\nret"));
        assert!(!needs_ret("push/nil\nret ; done\n\n"));
        assert!(!needs_ret("done: ret"));
        assert!(!needs_ret(".proc f ()\n ret\n.end"));
        assert!(!needs_ret(""));
    }

    #[test]
    fn test_completion_candidates() {
        let helper = CorvidHelper::new();
        let push: Vec<&String> = helper.candidates("push/").collect();
        assert!(push.iter().any(|w| w.as_str() == "push/nil"));
        assert!(push.iter().all(|w| w.starts_with("push/")));
        assert!(helper.candidates(".pr").any(|w| w == ".proc"));
        assert!(helper.candidates(".lo").any(|w| w == ".load"));
    }

    #[test]
    fn test_word_start() {
        assert_eq!(word_start("  push/ni", 9), 2);
        assert_eq!(word_start("add/int", 3), 0);
    }
}
