//! Minimal CSS selector matching for the in-memory document.
//!
//! Supports what the engines query with: type, `.class`, `#id`, attribute
//! presence and `=`, `^=`, `*=` value tests, descendant and `>` combinators,
//! and comma-separated lists. Anything else fails to parse and matches nothing.

use super::NodeId;

/// Read access to an element tree for matching.
pub(crate) trait ElementTree {
    fn tag_of(&self, node: NodeId) -> Option<&str>;
    fn attribute_of(&self, node: NodeId, name: &str) -> Option<&str>;
    fn parent_of(&self, node: NodeId) -> Option<NodeId>;
}

#[derive(Debug, Clone, PartialEq)]
enum AttrTest {
    Exists,
    Equals(String),
    Prefix(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrTest)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

/// One complex selector, stored rightmost compound first.
#[derive(Debug, Clone, PartialEq)]
struct Complex {
    parts: Vec<(Compound, Combinator)>,
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    alternatives: Vec<Complex>,
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c == separator && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_attr(body: &str) -> Option<(String, AttrTest)> {
    let unquote = |v: &str| {
        let v = v.trim();
        v.strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| v.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(v)
            .to_string()
    };
    if let Some((name, value)) = body.split_once("^=") {
        return Some((name.trim().to_string(), AttrTest::Prefix(unquote(value))));
    }
    if let Some((name, value)) = body.split_once("*=") {
        return Some((name.trim().to_string(), AttrTest::Contains(unquote(value))));
    }
    if let Some((name, value)) = body.split_once('=') {
        return Some((name.trim().to_string(), AttrTest::Equals(unquote(value))));
    }
    let name = body.trim();
    (!name.is_empty() && name.chars().all(is_ident_char))
        .then(|| (name.to_string(), AttrTest::Exists))
}

/// Byte offset of the `]` closing an attribute test, skipping quoted text.
fn closing_bracket(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_compound(input: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut rest = input;

    let tag_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    if tag_len > 0 {
        compound.tag = Some(rest[..tag_len].to_ascii_lowercase());
        rest = &rest[tag_len..];
    } else if let Some(after) = rest.strip_prefix('*') {
        rest = after;
    }

    while let Some(c) = rest.chars().next() {
        match c {
            '.' | '#' => {
                let body = &rest[1..];
                let len = body.find(|c: char| !is_ident_char(c)).unwrap_or(body.len());
                if len == 0 {
                    return None;
                }
                let name = body[..len].to_string();
                if c == '.' {
                    compound.classes.push(name);
                } else {
                    compound.id = Some(name);
                }
                rest = &body[len..];
            }
            '[' => {
                let body = &rest[1..];
                let close = closing_bracket(body)?;
                compound.attrs.push(parse_attr(&body[..close])?);
                rest = &body[close + 1..];
            }
            _ => return None,
        }
    }
    Some(compound)
}

fn parse_complex(input: &str) -> Option<Complex> {
    // Normalize `a>b` into `a > b` outside of brackets.
    let mut spaced = String::with_capacity(input.len() + 4);
    let mut depth = 0usize;
    for c in input.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c == '>' && depth == 0 {
            spaced.push_str(" > ");
        } else {
            spaced.push(c);
        }
    }

    let mut tokens: Vec<&str> = Vec::new();
    for piece in split_top_level(&spaced, ' ') {
        if !piece.is_empty() {
            tokens.push(piece);
        }
    }

    let mut parts: Vec<(Compound, Combinator)> = Vec::new();
    let mut combinator = Combinator::Descendant;
    for token in tokens {
        if token == ">" {
            combinator = Combinator::Child;
            continue;
        }
        parts.push((parse_compound(token)?, combinator));
        combinator = Combinator::Descendant;
    }
    if parts.is_empty() {
        return None;
    }
    // Each combinator links its compound to the one on its left, so reading
    // right to left keeps every pair intact.
    parts.reverse();
    Some(Complex { parts })
}

impl Selector {
    pub fn parse(input: &str) -> Option<Self> {
        let alternatives: Option<Vec<Complex>> = split_top_level(input, ',')
            .into_iter()
            .map(|s| parse_complex(s.trim()))
            .collect();
        let alternatives = alternatives?;
        (!alternatives.is_empty()).then_some(Self { alternatives })
    }

    pub(crate) fn matches(&self, tree: &impl ElementTree, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|complex| match_from(tree, node, &complex.parts))
    }
}

fn compound_matches(tree: &impl ElementTree, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = tree.tag_of(node) else {
        return false;
    };
    if let Some(want) = &compound.tag
        && !tag.eq_ignore_ascii_case(want)
    {
        return false;
    }
    if let Some(id) = &compound.id
        && tree.attribute_of(node, "id") != Some(id.as_str())
    {
        return false;
    }
    if !compound.classes.is_empty() {
        let classes = tree.attribute_of(node, "class").unwrap_or("");
        if !compound
            .classes
            .iter()
            .all(|want| classes.split_whitespace().any(|c| c == want))
        {
            return false;
        }
    }
    compound.attrs.iter().all(|(name, test)| {
        let value = tree.attribute_of(node, name);
        match (test, value) {
            (_, None) => false,
            (AttrTest::Exists, Some(_)) => true,
            (AttrTest::Equals(want), Some(v)) => v == want,
            (AttrTest::Prefix(want), Some(v)) => v.starts_with(want.as_str()),
            (AttrTest::Contains(want), Some(v)) => v.contains(want.as_str()),
        }
    })
}

/// `parts[0]` is the rightmost compound and must match `node`; the rest are
/// matched against ancestors according to each part's combinator.
fn match_from(tree: &impl ElementTree, node: NodeId, parts: &[(Compound, Combinator)]) -> bool {
    let Some(((compound, link), rest)) = parts.split_first() else {
        return true;
    };
    if !compound_matches(tree, node, compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match link {
        Combinator::Child => tree
            .parent_of(node)
            .is_some_and(|parent| match_from(tree, parent, rest)),
        Combinator::Descendant => {
            let mut ancestor = tree.parent_of(node);
            while let Some(candidate) = ancestor {
                if match_from(tree, candidate, rest) {
                    return true;
                }
                ancestor = tree.parent_of(candidate);
            }
            false
        }
    }
}
