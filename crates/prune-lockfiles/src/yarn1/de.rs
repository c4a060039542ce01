//! A lenient reader for the yarn v1 lockfile format.
//!
//! The format is an indentation based subset of YAML where keys and values
//! are separated by a space instead of a colon. Nested objects are
//! introduced by a trailing colon. Keys may be a comma separated list of
//! descriptors that all share the block below them.
//!
//! ```text
//! "@babel/code-frame@^7.0.0", "@babel/code-frame@^7.10.4":
//!   version "7.12.13"
//!   dependencies:
//!     "@babel/highlight" "^7.12.13"
//! ```
//!
//! Lockfiles previously written by the pruner use `key: value` pairs, both
//! styles are accepted.

use pest::{iterators::Pair, Parser};
use pest_derive::Parser;
use serde_json::{Map, Value};

use super::Error;

#[derive(Parser)]
#[grammar = "yarn1/syml.pest"]
struct SymlParser;

struct Line {
    number: usize,
    indent: usize,
    key: String,
    rest: Rest,
}

enum Rest {
    Object,
    Scalar(Value),
}

pub fn parse_syml(input: &str) -> Result<Value, Error> {
    let file = SymlParser::parse(Rule::file, input)
        .map_err(|e| Error::SymlParse(e.to_string()))?
        .next()
        .ok_or_else(|| Error::SymlParse("empty lockfile".to_string()))?;
    let lines = file
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::entry)
        .map(Line::from_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let mut pos = 0;
    let root = parse_block(&lines, &mut pos, 0)?;
    if let Some(line) = lines.get(pos) {
        return Err(Error::SymlParse(format!(
            "unexpected indentation on line {}",
            line.number
        )));
    }
    Ok(Value::Object(root))
}

impl Line {
    fn from_entry(entry: Pair<'_, Rule>) -> Result<Self, Error> {
        let number = entry.as_span().start_pos().line_col().0;
        let malformed = || Error::SymlParse(format!("malformed entry on line {number}"));

        let mut inner = entry.into_inner();
        let indent = inner.next().ok_or_else(malformed)?.as_str().len();
        let body = inner.next().ok_or_else(malformed)?;
        let (key, rest) = match body.as_rule() {
            Rule::header => {
                let key = body.into_inner().next().ok_or_else(malformed)?;
                // descriptors are joined with ", " so the key reads like the
                // header yarn writes
                let key = key.as_str().split(',').map(str::trim).collect::<Vec<_>>();
                (key.join(", "), Rest::Object)
            }
            Rule::pair => {
                let mut parts = body.into_inner();
                let keys = parts
                    .next()
                    .ok_or_else(malformed)?
                    .into_inner()
                    .map(|key| unquote(key, number))
                    .collect::<Result<Vec<_>, _>>()?;
                let rest = match parts.next() {
                    Some(value) if value.as_rule() == Rule::object => Rest::Object,
                    Some(value) => Rest::Scalar(parse_scalar(value, number)?),
                    None => return Err(malformed()),
                };
                (keys.join(", "), rest)
            }
            _ => return Err(malformed()),
        };

        Ok(Self {
            number,
            indent,
            key,
            rest,
        })
    }
}

fn parse_block(lines: &[Line], pos: &mut usize, indent: usize) -> Result<Map<String, Value>, Error> {
    let mut map = Map::new();
    while let Some(line) = lines.get(*pos) {
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(Error::SymlParse(format!(
                "unexpected indentation on line {}",
                line.number
            )));
        }
        *pos += 1;

        let value = match &line.rest {
            Rest::Object => match lines.get(*pos) {
                Some(next) if next.indent > indent => {
                    Value::Object(parse_block(lines, pos, next.indent)?)
                }
                _ => Value::Object(Map::new()),
            },
            Rest::Scalar(value) => value.clone(),
        };
        map.insert(line.key.clone(), value);
    }
    Ok(map)
}

fn unquote(pair: Pair<'_, Rule>, line: usize) -> Result<String, Error> {
    match pair.as_rule() {
        Rule::string => serde_json::from_str::<String>(pair.as_str())
            .map_err(|e| Error::SymlParse(format!("invalid string on line {line}: {e}"))),
        _ => Ok(pair.as_str().to_string()),
    }
}

fn parse_scalar(pair: Pair<'_, Rule>, line: usize) -> Result<Value, Error> {
    if pair.as_rule() == Rule::string {
        return unquote(pair, line).map(Value::String);
    }
    Ok(match pair.as_str().trim_end() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        raw => Value::String(raw.to_string()),
    })
}
