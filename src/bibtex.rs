//! Minimal BibTeX reader and writer for the citations returned by DOI content
//! negotiation.
//!
//! Handles `@string` definitions, `@comment`/`@preamble` blocks, braced and
//! quoted values, bare numbers, macro references (`month = jan`) and `#`
//! concatenation. Unlike a lenient bibliography importer, any entry that fails
//! to parse is an error: a citation we cannot read must not be written back.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map,
};
use std::collections::HashMap;
use std::fmt::Write;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BibtexError {
    #[error("no entry found in citation text")]
    NoEntry,
    #[error("malformed entry near byte {offset}")]
    Malformed { offset: usize },
}

/// A single parsed entry. Field order is preserved for re-serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub entry_type: String,
    pub key: String,
    pub fields: Vec<(String, String)>,
}

impl BibEntry {
    /// Field value by case-insensitive name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Authors split on the BibTeX ` and ` separator.
    pub fn authors(&self) -> Vec<String> {
        let Some(raw) = self.field("author") else {
            return Vec::new();
        };
        let mut authors = Vec::new();
        let mut current = Vec::new();
        for token in raw.split_whitespace() {
            if token == "and" {
                if !current.is_empty() {
                    authors.push(current.join(" "));
                    current.clear();
                }
            } else {
                current.push(token);
            }
        }
        if !current.is_empty() {
            authors.push(current.join(" "));
        }
        authors
    }

    /// Serialize the entry, one field per line.
    pub fn to_bibtex(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "@{}{{{},", self.entry_type, self.key);
        for (name, value) in &self.fields {
            if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
                let _ = writeln!(out, "    {name} = {value},");
            } else {
                let _ = writeln!(out, "    {name} = {{{value}}},");
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Parse every entry in `input`.
pub fn parse_entries(input: &str) -> Result<Vec<BibEntry>, BibtexError> {
    let mut entries = Vec::new();
    let mut strings: HashMap<String, String> = HashMap::new();
    let mut remaining = input;

    while let Some(pos) = remaining.find('@') {
        remaining = &remaining[pos..];
        let offset = input.len() - remaining.len();
        let (rest, item) =
            parse_at_item(remaining, &strings).map_err(|_| BibtexError::Malformed { offset })?;
        match item {
            AtItem::Entry(entry) => entries.push(entry),
            AtItem::String(key, value) => {
                strings.insert(key.to_lowercase(), value);
            }
            AtItem::Ignored => {}
        }
        remaining = rest;
    }

    Ok(entries)
}

/// Parse the first entry of a citation.
pub fn parse_first(input: &str) -> Result<BibEntry, BibtexError> {
    parse_entries(input)?
        .into_iter()
        .next()
        .ok_or(BibtexError::NoEntry)
}

/// Strip braces, LaTeX accent commands and combining marks, producing plain
/// text suitable for citation keys.
pub fn to_plain_ascii(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' | '}' => {}
            '\\' => {
                // accent commands such as \' \" \^ \~ \` \= \. drop their symbol
                if let Some(next) = chars.peek() {
                    if !next.is_alphanumeric() {
                        chars.next();
                    }
                }
            }
            _ => plain.push(c),
        }
    }

    plain
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| {
            let replacement: &str = match c {
                'ø' => "o",
                'Ø' => "O",
                'ł' => "l",
                'Ł' => "L",
                'ß' => "ss",
                'æ' => "ae",
                'Æ' => "AE",
                'œ' => "oe",
                'Œ' => "OE",
                'đ' => "d",
                'ı' => "i",
                _ => "",
            };
            if replacement.is_empty() {
                vec![c]
            } else {
                replacement.chars().collect()
            }
        })
        .collect()
}

enum AtItem {
    Entry(BibEntry),
    String(String, String),
    Ignored,
}

fn parse_at_item<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, AtItem> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, item_type) = take_while1(|c: char| c.is_ascii_alphanumeric())(rest)?;

    match item_type.to_lowercase().as_str() {
        "string" => {
            let (rest, _) = open_delimiter(rest)?;
            let (rest, (key, value)) = parse_field(rest, strings)?;
            let (rest, _) = close_delimiter(rest)?;
            Ok((rest, AtItem::String(key, value)))
        }
        "comment" | "preamble" => {
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = braced(rest)?;
            Ok((rest, AtItem::Ignored))
        }
        _ => {
            let (rest, entry) = parse_entry_body(rest, item_type, strings)?;
            Ok((rest, AtItem::Entry(entry)))
        }
    }
}

fn open_delimiter(input: &str) -> IResult<&str, char> {
    let (rest, _) = multispace0(input)?;
    let (rest, c) = alt((char('{'), char('(')))(rest)?;
    let (rest, _) = multispace0(rest)?;
    Ok((rest, c))
}

fn close_delimiter(input: &str) -> IResult<&str, char> {
    let (rest, _) = multispace0(input)?;
    alt((char('}'), char(')')))(rest)
}

fn parse_entry_body<'a>(
    input: &'a str,
    entry_type: &str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, BibEntry> {
    let (rest, _) = open_delimiter(input)?;
    let (rest, key) =
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, ',' | '{' | '}' | '(' | ')'))(
            rest,
        )?;
    let (rest, _) = multispace0(rest)?;
    let (mut rest, _) = char(',')(rest)?;

    let mut fields = Vec::new();
    loop {
        let (r, _) = multispace0(rest)?;
        if r.starts_with('}') || r.starts_with(')') {
            rest = r;
            break;
        }
        let (r, field) = parse_field(r, strings)?;
        fields.push(field);
        let (r, _) = multispace0(r)?;
        rest = r.strip_prefix(',').unwrap_or(r);
    }
    let (rest, _) = close_delimiter(rest)?;

    Ok((
        rest,
        BibEntry {
            entry_type: entry_type.to_lowercase(),
            key: key.to_string(),
            fields,
        },
    ))
}

fn parse_field<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, String)> {
    let (rest, _) = multispace0(input)?;
    let (rest, name) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, value) = parse_value(rest, strings)?;
    Ok((rest, (name.to_string(), value)))
}

fn parse_value<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, String> {
    let mut value = String::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        let (rest, part) = alt((
            map(braced, |s: &str| s[1..s.len() - 1].to_string()),
            quoted,
            map(take_while1(|c: char| c.is_ascii_digit()), str::to_string),
            map(
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
                |name: &str| {
                    strings
                        .get(&name.to_lowercase())
                        .cloned()
                        .unwrap_or_else(|| name.to_string())
                },
            ),
        ))(rest)?;
        value.push_str(&part);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(after) => remaining = after,
            None => return Ok((rest, value)),
        }
    }
}

/// Balanced `{...}` including the outer braces.
fn braced(input: &str) -> IResult<&str, &str> {
    if !input.starts_with('{') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )));
    }

    let mut depth = 0usize;
    let mut escaped = false;
    for (pos, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[pos + 1..], &input[..pos + 1]));
                }
            }
            _ => {}
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// `"..."` with braces allowed to protect inner quotes. Braces must balance.
fn quoted(input: &str) -> IResult<&str, String> {
    let Some(body) = input.strip_prefix('"') else {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )));
    };

    let mut depth = 0usize;
    for (pos, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => break,
            '}' => depth -= 1,
            '"' if depth == 0 => return Ok((&body[pos + 1..], body[..pos].to_string())),
            _ => {}
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}
