//! Placeholder scanning and local substitution.
//!
//! A placeholder is `{` identifier `}` where the identifier starts with an
//! ASCII letter or underscore and continues with ASCII letters, digits or
//! underscores. Nothing is escaped and nothing nests: any brace sequence that
//! does not form a placeholder is ordinary text.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// Identifier of a `{identifier}` token, braces excluded.
    Placeholder(&'a str),
}

/// Splits template content into literal text and placeholder tokens.
pub fn segments(content: &str) -> Segments<'_> {
    Segments { rest: content }
}

pub struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let mut search_from = 0;
        while let Some(offset) = self.rest[search_from..].find('{') {
            let open = search_from + offset;
            if let Some(len) = identifier_len(&self.rest[open + 1..]) {
                let close = open + 1 + len;
                if self.rest[close..].starts_with('}') {
                    if open > 0 {
                        let text = &self.rest[..open];
                        self.rest = &self.rest[open..];
                        return Some(Segment::Text(text));
                    }
                    let name = &self.rest[1..close];
                    self.rest = &self.rest[close + 1..];
                    return Some(Segment::Placeholder(name));
                }
            }
            search_from = open + 1;
        }

        let text = self.rest;
        self.rest = "";
        Some(Segment::Text(text))
    }
}

fn identifier_len(input: &str) -> Option<usize> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    let end = chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(input.len());
    Some(end)
}

/// Placeholder names in order of first occurrence, duplicates collapsed.
pub fn extract_placeholders(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in segments(content) {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|seen| seen == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Lookup used by [`substitute`]; implemented for the map types the session
/// and the wire protocol carry.
pub trait VariableValues {
    fn value(&self, name: &str) -> Option<&str>;
}

impl VariableValues for HashMap<String, String> {
    fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl VariableValues for BTreeMap<String, String> {
    fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Replaces every placeholder that has a non-empty value; all other tokens are
/// left exactly as written.
pub fn substitute<V>(content: &str, values: &V) -> String
where
    V: VariableValues + ?Sized,
{
    let mut rendered = String::with_capacity(content.len());
    for segment in segments(content) {
        match segment {
            Segment::Text(text) => rendered.push_str(text),
            Segment::Placeholder(name) => match values.value(name) {
                Some(value) if !value.is_empty() => rendered.push_str(value),
                _ => {
                    rendered.push('{');
                    rendered.push_str(name);
                    rendered.push('}');
                }
            },
        }
    }
    rendered
}
