/* Good resource for parsing regex at
 * https://matt.might.net/articles/parsing-regex-with-recursive-descent/ */

use color_eyre::eyre::{Report, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::char_set::{class_universe, CharRange, CharRangeSet};

#[derive(Debug, Clone)]
pub enum Quantifier {
    Star,
    Question,
    Plus,
    /// `*?`, recognized but never compiled.
    LazyStar,
    /// `+?`, recognized but never compiled.
    LazyPlus,
    Exact(u32),
    Range(u32, u32),
    Atleast(u32),
    Atmost(u32),
}

#[derive(Debug)]
pub enum Base {
    Character(char),
    EscapeCharacter(char),
    Exp(Box<RegEx>),
    /// A character class. Negated classes stay flagged here and are
    /// lowered to a positive set during synthesis.
    CharSet { negated: bool, set: CharRangeSet },
    /// A single contiguous class like `[a-z]`.
    Range(CharRange),
}

#[derive(Debug)]
pub enum Factor {
    SimpleFactor(Base, Option<Quantifier>),
}

#[derive(Debug)]
pub enum Term {
    SimpleTerm(Factor),
    ConcatTerm(Factor, Box<Term>),
}

#[derive(Debug)]
pub enum RegEx {
    SimpleRegex(Term),
    AlterRegex(Term, Box<RegEx>),
}

/// One `REGEX::CATEGORY` rule, parsed.
#[derive(Debug)]
pub struct RegexpStatement {
    pub name: String,
    pub pattern: String,
    pub regex: RegEx,
    pub action: Option<String>,
    pub line: usize,
}

/// The whole rule set, in declaration order.
#[derive(Debug, Default)]
pub struct LexerDescription {
    pub statements: Vec<RegexpStatement>,
}

impl LexerDescription {
    pub fn rule_names(&self) -> Vec<String> {
        self.statements
            .iter()
            .map(|statement| statement.name.clone())
            .collect()
    }
}

/// One raw line of a microsyntax file.
#[derive(Debug, Clone)]
pub struct MicrosyntaxEntry {
    pub pattern: String,
    pub category: String,
    pub action: Option<String>,
    pub line: usize,
}

impl MicrosyntaxEntry {
    pub fn new(pattern: &str, category: &str, line: usize) -> Self {
        MicrosyntaxEntry {
            pattern: pattern.to_string(),
            category: category.to_string(),
            action: None,
            line,
        }
    }
}

#[derive(Debug)]
pub enum SyntaxError {
    MalformedMicrosyntax(String),
    InvalidRegex(String),
    UnbalancedParenthesis(String),
    FileOpen(String),
    FileRead(String),
    InvalidCharacterRange(char, char),
    InvalidEscapeCharacter(char),
    InvalidQuantifier(char),
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntaxError::UnbalancedParenthesis(regex) => {
                write!(f, "Error: {} has unbalanced parenthesis!", regex)
            }
            SyntaxError::InvalidRegex(regex) => {
                write!(f, "Error: Invalid regex provided: {}", regex)
            }
            SyntaxError::MalformedMicrosyntax(line) => {
                write!(f, "Error: Malformed microsyntax entry detected: {}", line)
            }
            SyntaxError::FileOpen(err_line) => write!(f, "{}", err_line),
            SyntaxError::FileRead(err_line) => write!(f, "{}", err_line),
            SyntaxError::InvalidCharacterRange(start, end) => write!(
                f,
                "Error: Invalid character range provided: {} - {}",
                start, end
            ),
            SyntaxError::InvalidEscapeCharacter(ch) => {
                write!(f, "Error: Invalid escape character {} provided!", ch)
            }
            SyntaxError::InvalidQuantifier(ch) => {
                write!(f, "Error: Invalid quantifier {} found!", ch)
            }
        }
    }
}

impl std::error::Error for SyntaxError {}

fn char_at(regex: &str, pos: usize) -> Option<char> {
    regex.chars().nth(pos)
}

fn balanced_brackets(regex: &str) -> bool {
    let mut stack = Vec::new();
    let mut chars = regex.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            chars.next();
            continue;
        }
        match ch {
            '(' | '[' | '{' => {
                stack.push(ch);
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

// If these characters appear bare where a base is expected, the regex
// is malformed.
fn nchar_is_valid(nchar: char) -> bool {
    !matches!(nchar, '*' | '+' | '|' | '?' | ')' | ']' | '{' | '}')
}

fn resolve_escape(escape_ch: char) -> Option<char> {
    match escape_ch {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '\\' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '*' | '+' | '?' | '.' | '-' | '^' => {
            Some(escape_ch)
        }
        _ => None,
    }
}

fn parse_char_class(regex: &str, start: usize) -> Result<(bool, CharRangeSet, usize), SyntaxError> {
    let mut pos = start;
    let mut set = CharRangeSet::new();
    let mut negated = false;

    if char_at(regex, pos) == Some('^') {
        negated = true;
        pos += 1;
    }

    loop {
        let nchar = match char_at(regex, pos) {
            Some(']') => break,
            Some(nchar) => nchar,
            None => return Err(SyntaxError::InvalidRegex(regex.to_string())),
        };
        if nchar == '\\' {
            let escape = char_at(regex, pos + 1)
                .ok_or_else(|| SyntaxError::InvalidRegex(regex.to_string()))?;
            let resolved =
                resolve_escape(escape).ok_or(SyntaxError::InvalidEscapeCharacter(escape))?;
            set.insert_char(resolved);
            pos += 2;
        } else if char_at(regex, pos + 1) == Some('-') && char_at(regex, pos + 2) != Some(']') {
            let char_end = char_at(regex, pos + 2)
                .ok_or_else(|| SyntaxError::InvalidRegex(regex.to_string()))?;
            let range = CharRange::new(nchar, char_end)
                .ok_or(SyntaxError::InvalidCharacterRange(nchar, char_end))?;
            set.insert(range);
            pos += 3;
        } else {
            set.insert_char(nchar);
            pos += 1;
        }
    }

    Ok((negated, set, pos))
}

fn parse_base(regex: &str, start: usize) -> Result<(Base, usize)> {
    let nchar = match char_at(regex, start) {
        Some(nchar) => nchar,
        None => {
            let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
            return Err(err);
        }
    };
    if nchar == '(' {
        let (inner_regex, new_start) = parse_regex(regex, start + 1)?;
        if char_at(regex, new_start) != Some(')') {
            let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
            return Err(err);
        }
        let new_base = Base::Exp(Box::new(inner_regex));
        let new_start = new_start + 1; // Consume the rparen
        Ok((new_base, new_start))
    } else if nchar == '[' {
        let (negated, set, new_start) = match parse_char_class(regex, start + 1) {
            Ok(parsed) => parsed,
            Err(err) => {
                let err = Report::new(err);
                return Err(err);
            }
        };
        let new_start = new_start + 1; // Consume the rbracket
        let single = match set.ranges() {
            [range] if !negated => Some(*range),
            _ => None,
        };
        let new_base = match single {
            Some(range) if range.is_single() => Base::Character(CharRange::min(&range)),
            Some(range) => Base::Range(range),
            None => Base::CharSet { negated, set },
        };
        Ok((new_base, new_start))
    } else if nchar == '.' {
        let new_base = Base::CharSet {
            negated: false,
            set: class_universe(),
        };
        Ok((new_base, start + 1))
    } else if nchar == '\\' {
        let escape = match char_at(regex, start + 1) {
            Some(escape) => escape,
            None => {
                let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
                return Err(err);
            }
        };
        let resolved = match resolve_escape(escape) {
            Some(resolved) => resolved,
            None => {
                let err = Report::new(SyntaxError::InvalidEscapeCharacter(escape));
                return Err(err);
            }
        };
        Ok((Base::EscapeCharacter(resolved), start + 2))
    } else if nchar_is_valid(nchar) {
        Ok((Base::Character(nchar), start + 1))
    } else {
        let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
        Err(err)
    }
}

fn parse_number(regex: &str, start: usize) -> Result<(u32, usize)> {
    let mut pos = start;
    let mut number = 0;
    let mut any_digit = false;

    loop {
        let nchar = match char_at(regex, pos) {
            Some(nchar) => nchar,
            None => {
                let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
                return Err(err);
            }
        };
        match nchar.to_digit(10) {
            Some(digit) => {
                number = (number * 10) + digit;
                any_digit = true;
                pos += 1;
            }
            None if any_digit => return Ok((number, pos)),
            None => {
                let err = Report::new(SyntaxError::InvalidQuantifier(nchar));
                return Err(err);
            }
        }
    }
}

fn skip_spaces(regex: &str, start: usize) -> usize {
    let mut pos = start;
    while char_at(regex, pos) == Some(' ') {
        pos += 1;
    }
    pos
}

/// Parses the interior of a `{...}` bound: `{n}`, `{m,n}`, `{m,}` and
/// `{,n}`. `start` points just past the opening brace.
fn get_numeric_quantifier(regex: &str, start: usize) -> Result<(Quantifier, usize)> {
    let mut pos = skip_spaces(regex, start);

    if char_at(regex, pos) == Some(',') {
        pos = skip_spaces(regex, pos + 1);
        let (upper, next) = parse_number(regex, pos)?;
        pos = skip_spaces(regex, next);
        if char_at(regex, pos) != Some('}') {
            let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
            return Err(err);
        }
        return Ok((Quantifier::Atmost(upper), pos + 1));
    }

    let (lower, next) = parse_number(regex, pos)?;
    pos = skip_spaces(regex, next);

    match char_at(regex, pos) {
        Some('}') => Ok((Quantifier::Exact(lower), pos + 1)),
        Some(',') => {
            pos = skip_spaces(regex, pos + 1);
            if char_at(regex, pos) == Some('}') {
                return Ok((Quantifier::Atleast(lower), pos + 1));
            }
            let (upper, next) = parse_number(regex, pos)?;
            pos = skip_spaces(regex, next);
            if char_at(regex, pos) != Some('}') {
                let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
                return Err(err);
            }
            if lower > upper {
                let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
                return Err(err);
            }
            Ok((Quantifier::Range(lower, upper), pos + 1))
        }
        Some(nchar) => {
            let err = Report::new(SyntaxError::InvalidQuantifier(nchar));
            Err(err)
        }
        None => {
            let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
            Err(err)
        }
    }
}

fn parse_factor(regex: &str, start: usize) -> Result<(Factor, usize)> {
    let (base, new_start) = parse_base(regex, start)?;

    let mut new_start = new_start;
    let quantifier = match char_at(regex, new_start) {
        Some('*') => {
            if char_at(regex, new_start + 1) == Some('?') {
                new_start += 2;
                Some(Quantifier::LazyStar)
            } else {
                new_start += 1;
                Some(Quantifier::Star)
            }
        }
        Some('+') => {
            if char_at(regex, new_start + 1) == Some('?') {
                new_start += 2;
                Some(Quantifier::LazyPlus)
            } else {
                new_start += 1;
                Some(Quantifier::Plus)
            }
        }
        Some('?') => {
            new_start += 1;
            Some(Quantifier::Question)
        }
        Some('{') => {
            let (quantifier, nstart) = get_numeric_quantifier(regex, new_start + 1)?;
            new_start = nstart;
            Some(quantifier)
        }
        _ => None,
    };
    let factor = Factor::SimpleFactor(base, quantifier);
    Ok((factor, new_start))
}

fn parse_term(regex: &str, start: usize) -> Result<(Term, usize)> {
    let (factor, mut new_start) = parse_factor(regex, start)?;

    let mut prev_term = Term::SimpleTerm(factor);

    while new_start < regex.chars().count() {
        let nchar = char_at(regex, new_start).unwrap();
        if nchar == '|' || nchar == ')' {
            break;
        }
        let (next_factor, tmp_start) = parse_factor(regex, new_start)?;
        let next_term = Term::ConcatTerm(next_factor, Box::new(prev_term));
        prev_term = next_term;
        new_start = tmp_start;
    }
    Ok((prev_term, new_start))
}

fn parse_regex(regex: &str, start: usize) -> Result<(RegEx, usize)> {
    let (term, new_start) = parse_term(regex, start)?;
    if char_at(regex, new_start) == Some('|') {
        let (next_regex, new_start) = parse_regex(regex, new_start + 1)?;
        Ok((RegEx::AlterRegex(term, Box::new(next_regex)), new_start))
    } else {
        Ok((RegEx::SimpleRegex(term), new_start))
    }
}

pub fn build_syntax_tree(regex: &str) -> Result<RegEx> {
    if !balanced_brackets(regex) {
        let err = Report::new(SyntaxError::UnbalancedParenthesis(regex.to_string()));
        return Err(err);
    }

    if regex.is_empty() {
        let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
        return Err(err);
    }

    let (syntax_tree, consumed) = parse_regex(regex, 0)?;
    if consumed < regex.chars().count() {
        let err = Report::new(SyntaxError::InvalidRegex(regex.to_string()));
        return Err(err);
    }
    Ok(syntax_tree)
}

/// Parse every microsyntax entry into a rule statement.
pub fn parse_microsyntax_list(entries: Vec<MicrosyntaxEntry>) -> Result<LexerDescription> {
    let mut description = LexerDescription::default();

    for entry in entries {
        let syntax_tree = build_syntax_tree(&entry.pattern)?;

        description.statements.push(RegexpStatement {
            name: entry.category,
            pattern: entry.pattern,
            regex: syntax_tree,
            action: entry.action,
            line: entry.line,
        });
    }
    Ok(description)
}

/// Read a microsyntax file: one `REGEX::CATEGORY` entry per line, with
/// an optional `::ACTION` third field. `\:\:` escapes a literal double
/// colon inside the regex.
pub fn read_microsyntax_file(file_path: &str) -> Result<Vec<MicrosyntaxEntry>, SyntaxError> {
    let file_path = PathBuf::from(file_path);

    let file = match File::open(file_path) {
        Ok(file) => file,
        Err(error) => {
            let err_line = format!("Error: Failed to open the microsyntax file {}", error);
            return Err(SyntaxError::FileOpen(err_line));
        }
    };
    let reader = BufReader::new(file);

    let mut entries: Vec<MicrosyntaxEntry> = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                let err_line = format!(
                    "Error: Failed to read line number {} in microsyntaxes file {}",
                    line_number + 1,
                    error
                );
                return Err(SyntaxError::FileRead(err_line));
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let content: Vec<&str> = line.split("::").collect();

        let (pattern, category, action) = match content[..] {
            [pattern, category] => (pattern, category, None),
            [pattern, category, action] => (pattern, category, Some(action.to_string())),
            _ => return Err(SyntaxError::MalformedMicrosyntax(line.clone())),
        };

        let pattern = pattern.replace("\\:\\:", "::"); // Unescape the double colons
        entries.push(MicrosyntaxEntry {
            pattern,
            category: category.to_string(),
            action,
            line: line_number + 1,
        });
    }

    Ok(entries)
}
