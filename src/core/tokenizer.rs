/// StyleML tokenizer — escapes, line trimming, comments, continuations, and
/// command/bracket/character lexing.

use crate::schema::token::{Bracket, Token};

/// Characters that may follow a backslash to be taken literally.
const ESCAPABLE: &[char] = &['\\', '[', ']', '{', '}', '@', '#'];

/// One input character after escape resolution. Escaped units are never
/// reinterpreted as markup by later passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Raw(char),
    Escaped(char),
}

/// Convert StyleML text into a flat token sequence.
///
/// Full mode (`inline == false`) also processes line structure: everything up
/// to and including an unescaped `@` is dropped (otherwise leading spaces are
/// trimmed), `#` starts a comment running to the end of the line, and a
/// backslash directly before a newline joins the two lines.
///
/// Inline mode skips the line passes; it is used when re-tokenizing macro
/// templates whose line structure the caller already controls.
///
/// Tokenizing never fails. A command cut off by the end of input ends there,
/// and an argument whose `]` never arrives is dropped.
pub fn tokenize(text: &str, inline: bool) -> Vec<Token> {
    let mut units = resolve_escapes(text);
    if !inline {
        units = trim_lines(&units);
        units = join_continuations(&units);
    }
    lex(&units)
}

fn resolve_escapes(text: &str) -> Vec<Unit> {
    let mut units = Vec::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if ESCAPABLE.contains(&next) {
                    chars.next();
                    units.push(Unit::Escaped(next));
                    continue;
                }
            }
        }
        units.push(Unit::Raw(ch));
    }
    units
}

fn trim_lines(units: &[Unit]) -> Vec<Unit> {
    let mut trimmed = Vec::with_capacity(units.len());
    for (i, line) in units.split(|u| *u == Unit::Raw('\n')).enumerate() {
        if i > 0 {
            trimmed.push(Unit::Raw('\n'));
        }
        let line = line.strip_suffix(&[Unit::Raw('\r')]).unwrap_or(line);
        let line = match line.iter().position(|u| *u == Unit::Raw('@')) {
            Some(at) => &line[at + 1..],
            None => {
                let start = line
                    .iter()
                    .position(|u| *u != Unit::Raw(' '))
                    .unwrap_or(line.len());
                &line[start..]
            }
        };
        let line = match line.iter().position(|u| *u == Unit::Raw('#')) {
            Some(hash) => &line[..hash],
            None => line,
        };
        trimmed.extend_from_slice(line);
    }
    trimmed
}

fn join_continuations(units: &[Unit]) -> Vec<Unit> {
    let mut joined = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        if units[i] == Unit::Raw('\\') && units.get(i + 1) == Some(&Unit::Raw('\n')) {
            i += 2;
            continue;
        }
        joined.push(units[i]);
        i += 1;
    }
    joined
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '!'
}

/// End of the command name starting at `start`. Names are identifier
/// characters; macro calls (`\!name`) may also carry runs of `.` and `<`
/// between identifier characters, so a name never ends in a path separator.
fn command_name_end(units: &[Unit], start: usize) -> usize {
    let is_macro_call = units.get(start) == Some(&Unit::Raw('!'));
    let mut end = start;
    while let Some(&Unit::Raw(ch)) = units.get(end) {
        if is_name_char(ch) {
            end += 1;
            continue;
        }
        if !is_macro_call || !matches!(ch, '.' | '<') {
            break;
        }
        let mut run = end;
        while matches!(units.get(run), Some(Unit::Raw('.' | '<'))) {
            run += 1;
        }
        match units.get(run) {
            Some(&Unit::Raw(next)) if is_name_char(next) => end = run,
            _ => break,
        }
    }
    end
}

fn lex(units: &[Unit]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < units.len() {
        let unit = units[i];
        i += 1;
        match unit {
            Unit::Raw('\\') => {
                let end = command_name_end(units, i);
                let name: String = units[i..end]
                    .iter()
                    .map(|u| match *u {
                        Unit::Raw(ch) | Unit::Escaped(ch) => ch,
                    })
                    .collect();
                i = end;
                let mut argument = None;
                if units.get(i) == Some(&Unit::Raw('[')) {
                    i += 1;
                    let mut depth = 1;
                    let mut raw = String::new();
                    while let Some(u) = units.get(i) {
                        i += 1;
                        match *u {
                            Unit::Raw('[') => {
                                depth += 1;
                                raw.push('[');
                            }
                            Unit::Raw(']') => {
                                depth -= 1;
                                if depth == 0 {
                                    argument = Some(raw);
                                    break;
                                }
                                raw.push(']');
                            }
                            Unit::Raw(ch) | Unit::Escaped(ch) => raw.push(ch),
                        }
                    }
                } else if units.get(i) == Some(&Unit::Raw(' ')) {
                    i += 1;
                }
                tokens.push(Token::command(name, argument));
            }
            Unit::Raw('{') => tokens.push(Token::bracket(Bracket::Open)),
            Unit::Raw('}') => tokens.push(Token::bracket(Bracket::Close)),
            Unit::Raw(ch) | Unit::Escaped(ch) => tokens.push(Token::character(ch)),
        }
    }
    tokens
}
