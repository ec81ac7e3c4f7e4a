//! Syntactic nesting of a function source, measured before it is parsed.
//!
//! The engine's parser and compiler recurse once per nested construct, so a
//! few kilobytes of `[[[[...` are enough to overflow the native stack and
//! take the whole process down. This scan runs in a single loop and gives
//! the engine a number to refuse such sources with.
//!
//! A level is an open bracket (`(`, `[`, `{`, a template substitution) or a
//! pending right-associative operator inside the current bracket: an
//! assignment, a conditional `?`, an arrow `=>` or a prefix `!`, `~`, `+`
//! or `-`. `,` and `;` end the pending operators of their bracket. String,
//! template and comment text is skipped. Regular expression literals are
//! not recognised, so their contents can only raise the count.

use std::iter::Peekable;
use std::str::Chars;

struct Frame {
    /// Closes back into template text rather than code.
    template: bool,
    /// Pending operators of the enclosing bracket.
    outer_chain: usize,
}

/// Deepest nesting reached anywhere in `source`.
pub(crate) fn source_nesting(source: &str) -> usize {
    let mut chars = source.chars().peekable();
    let mut frames: Vec<Frame> = Vec::new();
    // Pending operators in the innermost bracket, and across all brackets.
    let mut chain = 0usize;
    let mut total = 0usize;
    let mut deepest = 0usize;
    let mut in_template = false;
    // Whether the last token ends an operand, which makes `+`/`-` binary.
    let mut operand = false;

    while let Some(c) = chars.next() {
        if in_template {
            match c {
                '\\' => {
                    chars.next();
                }
                '`' => {
                    in_template = false;
                    operand = true;
                }
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    frames.push(Frame { template: true, outer_chain: chain });
                    chain = 0;
                    deepest = deepest.max(frames.len() + total);
                    in_template = false;
                    operand = false;
                }
                _ => {}
            }
            continue;
        }
        if c.is_whitespace() {
            continue;
        }

        let mut opens = false;
        let mut ends_operand = false;
        match c {
            '(' | '[' | '{' => {
                frames.push(Frame { template: false, outer_chain: chain });
                chain = 0;
            }
            ')' | ']' | '}' => {
                total -= chain;
                match frames.pop() {
                    Some(frame) => {
                        chain = frame.outer_chain;
                        in_template = frame.template;
                    }
                    None => chain = 0,
                }
                ends_operand = true;
            }
            ',' | ';' => {
                total -= chain;
                chain = 0;
            }
            '\'' | '"' => {
                skip_string(&mut chars, c);
                ends_operand = true;
            }
            '`' => in_template = true,
            '/' if chars.peek() == Some(&'/') => {
                skip_line(&mut chars);
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                skip_block_comment(&mut chars);
                continue;
            }
            '?' => match chars.peek() {
                // Optional chaining and nullish coalescing.
                Some('.' | '?') => {
                    chars.next();
                }
                _ => opens = true,
            },
            '=' => match chars.peek() {
                Some('=') => {
                    while chars.next_if_eq(&'=').is_some() {}
                }
                Some('>') => {
                    chars.next();
                    opens = true;
                }
                _ => opens = true,
            },
            '!' if chars.peek() == Some(&'=') => {
                while chars.next_if_eq(&'=').is_some() {}
            }
            '<' | '>' => {
                chars.next_if_eq(&'=');
            }
            '!' | '~' => opens = true,
            '+' | '-' => {
                if chars.next_if_eq(&c).is_some() {
                    // Increment and decrement leave an operand where it was.
                    ends_operand = operand;
                } else {
                    opens = !operand;
                }
            }
            c if c.is_alphanumeric() || c == '_' || c == '$' => ends_operand = true,
            _ => {}
        }
        if opens {
            chain += 1;
            total += 1;
        }
        deepest = deepest.max(frames.len() + total);
        operand = ends_operand;
    }
    deepest
}

fn skip_string(chars: &mut Peekable<Chars<'_>>, quote: char) {
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            c if c == quote || c == '\n' => break,
            _ => {}
        }
    }
}

fn skip_line(chars: &mut Peekable<Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) {
    let mut star = false;
    for c in chars.by_ref() {
        if star && c == '/' {
            break;
        }
        star = c == '*';
    }
}
