//! Shell-like variable interpolation.
//!
//! Supports the subset of POSIX/bash parameter expansion that manifest
//! templates use in practice:
//!
//! | Form | Result |
//! |------|--------|
//! | `$VAR`, `${VAR}` | value |
//! | `${VAR:-word}`, `${VAR-word}`, `${VAR:=word}`, `${VAR=word}` | `word` if value is empty |
//! | `${VAR:+word}`, `${VAR+word}` | `word` if value is non-empty |
//! | `${VAR#pat}`, `${VAR##pat}` | strip shortest / longest matching prefix |
//! | `${VAR%pat}`, `${VAR%%pat}` | strip shortest / longest matching suffix |
//! | `${VAR/pat/rep}`, `${VAR//pat/rep}` | replace first / all |
//! | `${VAR/#pat/rep}`, `${VAR/%pat/rep}` | replace prefix / suffix |
//! | `${VAR^}`, `${VAR^^}`, `${VAR,}`, `${VAR,,}` | case conversion |
//! | `${VAR:offset}`, `${VAR:offset:length}` | substring |
//! | `${#VAR}` | length |
//! | `$$` | literal `$` |
//!
//! Trim patterns are globs (`*`, `?`); replace patterns are literal. Words may
//! contain nested references. Every reference is resolved through a callback
//! that can ask for the reference to be left exactly as written.

use thiserror::Error;

/// Outcome of resolving a single variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Substitute this value and apply the reference's operator.
    Value(String),
    /// Leave the whole reference as its original source text.
    Verbatim,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

/// A parsed piece of text with embedded references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Reference(Reference),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    name: String,
    op: Operation,
    source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Value,
    Length,
    Default(Template),
    Alternative(Template),
    TrimPrefix { pattern: Template, longest: bool },
    TrimSuffix { pattern: Template, longest: bool },
    Replace {
        pattern: Template,
        replacement: Template,
        mode: ReplaceMode,
    },
    Upper { all: bool },
    Lower { all: bool },
    Substring { offset: i64, length: Option<i64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplaceMode {
    First,
    All,
    Prefix,
    Suffix,
}

/// Parse and evaluate `text` in one step.
///
/// # Errors
///
/// Returns `SyntaxError` if the text contains a malformed reference.
pub fn expand<F>(text: &str, mut resolve: F) -> Result<String, SyntaxError>
where
    F: FnMut(&str) -> Resolution,
{
    Ok(Template::parse(text)?.evaluate(&mut resolve))
}

impl Template {
    /// Parse interpolation syntax.
    ///
    /// # Errors
    ///
    /// Returns `SyntaxError` for unterminated `${`, empty names, unknown
    /// operators and non-numeric substring offsets.
    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        let mut parser = Parser { src: text, pos: 0 };
        let template = parser.template(&[])?;
        debug_assert_eq!(parser.pos, text.len());
        Ok(template)
    }

    /// Names of every variable referenced, including inside words.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        for part in &self.parts {
            if let Part::Reference(reference) = part {
                names.push(&reference.name);
                match &reference.op {
                    Operation::Default(word) | Operation::Alternative(word) => {
                        word.collect_variables(names)
                    }
                    Operation::TrimPrefix { pattern, .. } | Operation::TrimSuffix { pattern, .. } => {
                        pattern.collect_variables(names)
                    }
                    Operation::Replace {
                        pattern,
                        replacement,
                        ..
                    } => {
                        pattern.collect_variables(names);
                        replacement.collect_variables(names);
                    }
                    _ => {}
                }
            }
        }
    }

    pub fn has_references(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, Part::Reference(_)))
    }

    pub fn evaluate<F>(&self, resolve: &mut F) -> String
    where
        F: FnMut(&str) -> Resolution,
    {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Reference(reference) => match resolve(&reference.name) {
                    Resolution::Verbatim => out.push_str(&reference.source),
                    Resolution::Value(value) => {
                        out.push_str(&apply(&reference.op, value, resolve));
                    }
                },
            }
        }
        out
    }
}

fn apply<F>(op: &Operation, value: String, resolve: &mut F) -> String
where
    F: FnMut(&str) -> Resolution,
{
    match op {
        Operation::Value => value,
        Operation::Length => value.chars().count().to_string(),
        Operation::Default(word) => {
            if value.is_empty() {
                word.evaluate(resolve)
            } else {
                value
            }
        }
        Operation::Alternative(word) => {
            if value.is_empty() {
                value
            } else {
                word.evaluate(resolve)
            }
        }
        Operation::TrimPrefix { pattern, longest } => {
            let pattern = pattern.evaluate(resolve);
            trim_prefix(&value, &pattern, *longest).to_string()
        }
        Operation::TrimSuffix { pattern, longest } => {
            let pattern = pattern.evaluate(resolve);
            trim_suffix(&value, &pattern, *longest).to_string()
        }
        Operation::Replace {
            pattern,
            replacement,
            mode,
        } => {
            let pattern = pattern.evaluate(resolve);
            let replacement = replacement.evaluate(resolve);
            replace(&value, &pattern, &replacement, *mode)
        }
        Operation::Upper { all: true } => value.to_uppercase(),
        Operation::Lower { all: true } => value.to_lowercase(),
        Operation::Upper { all: false } => map_first(&value, |c| c.to_uppercase().collect()),
        Operation::Lower { all: false } => map_first(&value, |c| c.to_lowercase().collect()),
        Operation::Substring { offset, length } => substring(&value, *offset, *length),
    }
}

fn map_first(value: &str, f: impl Fn(char) -> String) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => f(first) + chars.as_str(),
        None => String::new(),
    }
}

fn substring(value: &str, offset: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len() as i64;
    let start = if offset < 0 {
        len.saturating_add(offset).max(0)
    } else {
        offset.min(len)
    };
    let end = match length {
        None => len,
        Some(l) if l < 0 => len.saturating_add(l),
        Some(l) => start.saturating_add(l).min(len),
    };
    if end <= start {
        return String::new();
    }
    chars[start as usize..end as usize].iter().collect()
}

fn boundaries(value: &str) -> Vec<usize> {
    let mut bounds: Vec<usize> = value.char_indices().map(|(i, _)| i).collect();
    bounds.push(value.len());
    bounds
}

fn trim_prefix<'a>(value: &'a str, pattern: &str, longest: bool) -> &'a str {
    let mut bounds = boundaries(value);
    if longest {
        bounds.reverse();
    }
    for i in bounds {
        if glob_match(pattern, &value[..i]) {
            return &value[i..];
        }
    }
    value
}

fn trim_suffix<'a>(value: &'a str, pattern: &str, longest: bool) -> &'a str {
    let mut bounds = boundaries(value);
    if !longest {
        bounds.reverse();
    }
    for i in bounds {
        if glob_match(pattern, &value[i..]) {
            return &value[..i];
        }
    }
    value
}

fn replace(value: &str, pattern: &str, replacement: &str, mode: ReplaceMode) -> String {
    if pattern.is_empty() {
        return value.to_string();
    }
    match mode {
        ReplaceMode::First => value.replacen(pattern, replacement, 1),
        ReplaceMode::All => value.replace(pattern, replacement),
        ReplaceMode::Prefix => match value.strip_prefix(pattern) {
            Some(rest) => format!("{}{}", replacement, rest),
            None => value.to_string(),
        },
        ReplaceMode::Suffix => match value.strip_suffix(pattern) {
            Some(rest) => format!("{}{}", rest, replacement),
            None => value.to_string(),
        },
    }
}

/// Match `text` against a glob with `*` and `?` wildcards.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            offset: self.pos,
        }
    }

    /// Parse text up to (not including) one of `stops`, or end of input.
    ///
    /// Inside a braced reference (`stops` non-empty) a backslash escapes the
    /// next character.
    fn template(&mut self, stops: &[char]) -> Result<Template, SyntaxError> {
        let mut parts = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            match c {
                '$' => {
                    if let Some(part) = self.dollar()? {
                        if !text.is_empty() {
                            parts.push(Part::Text(std::mem::take(&mut text)));
                        }
                        parts.push(part);
                    } else {
                        text.push('$');
                    }
                }
                '\\' if !stops.is_empty() => {
                    self.bump();
                    match self.bump() {
                        Some(escaped) => text.push(escaped),
                        None => text.push('\\'),
                    }
                }
                _ => {
                    text.push(c);
                    self.bump();
                }
            }
        }

        if !text.is_empty() {
            parts.push(Part::Text(text));
        }
        Ok(Template { parts })
    }

    /// Parse at a `$`. Returns `None` when the dollar is literal text.
    fn dollar(&mut self) -> Result<Option<Part>, SyntaxError> {
        let start = self.pos;
        self.bump();

        match self.peek() {
            Some('$') => {
                self.bump();
                Ok(Some(Part::Text("$".to_string())))
            }
            Some('{') => {
                self.bump();
                self.braced(start).map(Some)
            }
            Some(c) if is_name_start(c) => {
                let name = self.name();
                Ok(Some(Part::Reference(Reference {
                    name,
                    op: Operation::Value,
                    source: self.src[start..self.pos].to_string(),
                })))
            }
            _ => Ok(None),
        }
    }

    fn name(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    fn braced(&mut self, start: usize) -> Result<Part, SyntaxError> {
        if self.peek() == Some('#') && matches!(self.peek_second(), Some(c) if is_name_start(c)) {
            self.bump();
            let name = self.name();
            self.close()?;
            return Ok(Part::Reference(Reference {
                name,
                op: Operation::Length,
                source: self.src[start..self.pos].to_string(),
            }));
        }

        let name = self.name();
        if name.is_empty() {
            return Err(self.error("empty variable name"));
        }

        let op = match self.bump() {
            Some('}') => {
                return Ok(Part::Reference(Reference {
                    name,
                    op: Operation::Value,
                    source: self.src[start..self.pos].to_string(),
                }))
            }
            Some(':') => match self.peek() {
                Some('-') | Some('=') => {
                    self.bump();
                    Operation::Default(self.template(&['}'])?)
                }
                Some('+') => {
                    self.bump();
                    Operation::Alternative(self.template(&['}'])?)
                }
                _ => self.substring()?,
            },
            Some('-') | Some('=') => Operation::Default(self.template(&['}'])?),
            Some('+') => Operation::Alternative(self.template(&['}'])?),
            Some('#') => {
                let longest = self.eat('#');
                Operation::TrimPrefix {
                    pattern: self.template(&['}'])?,
                    longest,
                }
            }
            Some('%') => {
                let longest = self.eat('%');
                Operation::TrimSuffix {
                    pattern: self.template(&['}'])?,
                    longest,
                }
            }
            Some('/') => {
                let mode = if self.eat('/') {
                    ReplaceMode::All
                } else if self.eat('#') {
                    ReplaceMode::Prefix
                } else if self.eat('%') {
                    ReplaceMode::Suffix
                } else {
                    ReplaceMode::First
                };
                let pattern = self.template(&['/', '}'])?;
                let replacement = if self.eat('/') {
                    self.template(&['}'])?
                } else {
                    Template::default()
                };
                Operation::Replace {
                    pattern,
                    replacement,
                    mode,
                }
            }
            Some('^') => Operation::Upper {
                all: self.eat('^'),
            },
            Some(',') => Operation::Lower {
                all: self.eat(','),
            },
            Some(c) => return Err(self.error(format!("bad substitution operator '{}'", c))),
            None => return Err(self.error("unterminated variable reference")),
        };

        self.close()?;
        Ok(Part::Reference(Reference {
            name,
            op,
            source: self.src[start..self.pos].to_string(),
        }))
    }

    fn close(&mut self) -> Result<(), SyntaxError> {
        match self.bump() {
            Some('}') => Ok(()),
            Some(c) => Err(self.error(format!("expected '}}', found '{}'", c))),
            None => Err(self.error("unterminated variable reference")),
        }
    }

    /// `${VAR:offset}` or `${VAR:offset:length}`; the leading ':' is consumed.
    fn substring(&mut self) -> Result<Operation, SyntaxError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '}') {
            self.bump();
        }
        let spec = &self.src[start..self.pos];
        let (offset, length) = match spec.split_once(':') {
            Some((offset, length)) => (offset, Some(length)),
            None => (spec, None),
        };
        let parse = |s: &str| {
            s.trim().parse::<i64>().map_err(|_| SyntaxError {
                message: format!("invalid substring offset '{}'", s),
                offset: start,
            })
        };
        Ok(Operation::Substring {
            offset: parse(offset)?,
            length: length.map(parse).transpose()?,
        })
    }
}
