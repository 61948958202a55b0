//! Parsing a callout's reply
//!
//! The original parses the reply as a `dlist`, "designed to be similar
//! to the arguments of the STORE command" (`append.c` `callout_decode_results`
//! doc comment), e.g. `(+FLAGS \Flagged ANNOTATION (/comment (value.shared
//! "Hello")))`. This crate parses the same shape with a small recursive
//! s-expression grammar instead of porting the original's `dlist` type.

use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, multispace0};
use nom::combinator::map;
use nom::multi::many0;
use nom::sequence::delimited;
use nom::{Err as NomErr, IResult};
use tracing::warn;

use crate::annotation::Annotations;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SExpr {
    Atom(String),
    Str(String),
    List(Vec<SExpr>),
}

fn atom(input: &str) -> IResult<&str, SExpr> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')' && c != '"'),
        |s: &str| SExpr::Atom(s.to_string()),
    )(input)
}

/// A double-quoted string with `\"` and `\\` escapes. Hand-rolled rather
/// than composed from `nom`'s escape combinators: the alphabet is two
/// characters wide and a manual scan reads more plainly than the
/// combinator chain needed to express it.
fn quoted(input: &str) -> IResult<&str, SExpr> {
    let (opening, rest) = input
        .split_at_checked(1)
        .filter(|(open, _)| *open == "\"")
        .ok_or_else(|| NomErr::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))?;
    let _ = opening;

    let mut out = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&rest[i + 1..], SExpr::Str(out))),
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                } else {
                    return Err(NomErr::Error(nom::error::Error::new(input, nom::error::ErrorKind::Escaped)));
                }
            }
            other => out.push(other),
        }
    }
    Err(NomErr::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)))
}

fn list(input: &str) -> IResult<&str, SExpr> {
    map(
        delimited(char('('), many0(sexpr), char(')')),
        SExpr::List,
    )(input)
}

fn sexpr(input: &str) -> IResult<&str, SExpr> {
    let (input, _) = multispace0(input)?;
    let (input, expr) = alt((list, quoted, atom))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, expr))
}

impl SExpr {
    fn text(&self) -> Option<&str> {
        match self {
            Self::Atom(s) | Self::Str(s) => Some(s),
            Self::List(_) => None,
        }
    }

    fn items(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// One directive out of a decoded callout reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    AddFlags(Vec<String>),
    RemoveFlags(Vec<String>),
    Annotation { entry: String, attrib: String, value: String },
}

/// Parse the reply text into a flat list of directives, top to bottom.
/// Any shape the grammar doesn't recognize — an unrecognized key, a
/// malformed value, a key with no matching value — stops parsing right
/// there and logs a warning, but every directive parsed before it is
/// kept, matching the original's "unexpected data, keep going"
/// tolerance (`append.c` `callout_decode_results`). A reply that isn't
/// even a well-formed list at all yields no directives.
#[must_use]
pub fn parse_reply(input: &str) -> Vec<Directive> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let Ok((_, top)) = sexpr(trimmed) else {
        warn!("malformed callout reply, ignoring");
        return Vec::new();
    };
    let Some(items) = top.items() else {
        warn!("callout reply is not a list, ignoring");
        return Vec::new();
    };

    let mut directives = Vec::new();
    let mut iter = items.iter();
    loop {
        let Some(key) = iter.next() else { break };
        let Some(key) = key.text() else {
            warn!("callout reply key is not an atom, keeping directives parsed so far");
            break;
        };
        let Some(value) = iter.next() else {
            warn!(key, "callout reply directive is missing a value, keeping directives parsed so far");
            break;
        };

        let parsed = match key.to_ascii_uppercase().as_str() {
            "+FLAGS" => flag_list(value).map(|names| vec![Directive::AddFlags(names)]),
            "-FLAGS" => flag_list(value).map(|names| vec![Directive::RemoveFlags(names)]),
            "ANNOTATION" => annotation_directives(value),
            other => Err(Error::Parse(format!("unrecognized callout directive {other}"))),
        };
        match parsed {
            Ok(ds) => directives.extend(ds),
            Err(e) => {
                warn!(error = %e, "malformed callout directive, keeping directives parsed so far");
                break;
            }
        }
    }
    directives
}

fn flag_list(value: &SExpr) -> Result<Vec<String>, Error> {
    match value {
        SExpr::List(items) => items
            .iter()
            .map(|i| i.text().map(str::to_string).ok_or_else(|| Error::Parse("flag entry is not an atom".to_string())))
            .collect(),
        SExpr::Atom(s) | SExpr::Str(s) => Ok(vec![s.clone()]),
    }
}

fn annotation_directives(value: &SExpr) -> Result<Vec<Directive>, Error> {
    let items = value.items().ok_or_else(|| Error::Parse("ANNOTATION value is not a list".to_string()))?;
    let (entry, pairs) = items.split_first().ok_or_else(|| Error::Parse("ANNOTATION list is empty".to_string()))?;
    let entry = entry.text().ok_or_else(|| Error::Parse("ANNOTATION entry is not an atom".to_string()))?;

    pairs
        .iter()
        .map(|pair| {
            let fields = pair.items().ok_or_else(|| Error::Parse("ANNOTATION attrib/value is not a list".to_string()))?;
            let [attrib, value] = fields else {
                return Err(Error::Parse("ANNOTATION attrib/value must have exactly two fields".to_string()));
            };
            let attrib = attrib.text().ok_or_else(|| Error::Parse("ANNOTATION attrib is not an atom".to_string()))?;
            let value = value.text().ok_or_else(|| Error::Parse("ANNOTATION value is not a string".to_string()))?;
            Ok(Directive::Annotation { entry: entry.to_string(), attrib: attrib.to_string(), value: value.to_string() })
        })
        .collect()
}

/// Apply decoded directives to the session's in-flight flags and
/// annotations, per `append.c`'s merge rules: `+FLAGS`/`-FLAGS` add or
/// remove case-insensitively; `ANNOTATION` moves a setting out of the
/// user annotations (it bypasses ACL from here on) and into the system
/// annotations, which are applied with admin authority and whose
/// failure is logged, never fatal.
pub fn apply_directives(
    directives: &[Directive],
    flags: &mut Vec<String>,
    user_annots: &mut Annotations,
    system_annots: &mut Annotations,
) {
    for directive in directives {
        match directive {
            Directive::AddFlags(names) => {
                for name in names {
                    if !flags.iter().any(|f| f.eq_ignore_ascii_case(name)) {
                        flags.push(name.clone());
                    }
                }
            }
            Directive::RemoveFlags(names) => {
                flags.retain(|f| !names.iter().any(|n| n.eq_ignore_ascii_case(f)));
            }
            Directive::Annotation { entry, attrib, value } => {
                user_annots.remove(entry, attrib);
                system_annots.set(entry.clone(), attrib.clone(), value.clone());
            }
        }
    }
}
