//! Route pattern compilation.
//!
//! # Responsibilities
//! - Split a route path into segments (braces protect `/` inside constraints)
//! - Classify segments: literal, `:name`, `:name{regex}`, `*`, `:name?`
//! - Expand trailing optional params into concrete alternatives
//! - Decide whether a constraint can be embedded into a combined regex
//!
//! # Design Decisions
//! - Constraints are compiled once, anchored, at registration time
//! - Optional params are only allowed at the end of a route
//! - Embedding is checked lazily; only the regex strategy needs it

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::routing::RouterError;

/// Name bound to the path remainder matched by a trailing wildcard.
pub const WILDCARD_PARAM: &str = "*";

/// A regex-constrained parameter.
#[derive(Debug, Clone)]
pub struct Constraint {
    name: Arc<str>,
    source: String,
    regex: Regex,
}

impl Constraint {
    fn new(path: &str, name: &str, source: &str) -> Result<Self, RouterError> {
        let regex = Regex::new(&format!("^(?:{source})$"))
            .map_err(|e| RouterError::invalid(path, format!("constraint for `{name}`: {e}")))?;
        Ok(Self {
            name: Arc::from(name),
            source: source.to_string(),
            regex,
        })
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// The constraint as written in the route.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if `value` matches the whole constraint.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// The constraint in a form that can be spliced into a larger regex
    /// without adding capture groups.
    ///
    /// A leading `^` and trailing `$` are dropped, since the constraint is
    /// always matched whole. `(a|b)` is rewritten to `(?:a|b)`. Any other
    /// capturing group, an anchor elsewhere, and the catch-all `.*` cannot be
    /// embedded.
    pub fn embeddable(&self) -> Result<String, RouterError> {
        let source = strip_anchors(&self.source);
        if source == ".*" || has_bare_anchor(source) {
            return Err(RouterError::UnsupportedPattern(format!(
                ":{}{{{}}}",
                self.name, self.source
            )));
        }
        let rewritten = rewrite_alternation_group(source);
        if has_capturing_group(&rewritten) {
            return Err(RouterError::UnsupportedPattern(format!(
                ":{}{{{}}}",
                self.name, self.source
            )));
        }
        Ok(rewritten)
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.source == other.source
    }
}

impl Eq for Constraint {}

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text; empty for `/` and trailing slashes.
    Static(String),
    /// `:name`, matches one non-empty segment.
    Param(Arc<str>),
    /// `:name{regex}`, may span several segments if the regex allows it.
    ParamConstrained(Constraint),
    /// `*`. Trailing: the rest of the path. Elsewhere: one segment.
    Wildcard,
    /// `:name?` before expansion; never present in a compiled pattern.
    Optional(Box<Segment>),
}

impl Segment {
    /// Text form, as written in a route.
    pub fn label(&self) -> String {
        match self {
            Segment::Static(s) => s.clone(),
            Segment::Param(name) => format!(":{name}"),
            Segment::ParamConstrained(c) => format!(":{}{{{}}}", c.name, c.source),
            Segment::Wildcard => "*".to_string(),
            Segment::Optional(inner) => format!("{}?", inner.label()),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Segment::Static(_))
    }

    /// Name bound by this segment, if any.
    pub fn param_name(&self) -> Option<&Arc<str>> {
        match self {
            Segment::Param(name) => Some(name),
            Segment::ParamConstrained(c) => Some(&c.name),
            _ => None,
        }
    }
}

/// A concrete route pattern: no optional segments left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    path: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    fn from_segments(segments: Vec<Segment>) -> Self {
        let path = format!(
            "/{}",
            segments
                .iter()
                .map(Segment::label)
                .collect::<Vec<_>>()
                .join("/")
        );
        Self { path, segments }
    }

    /// Canonical text of the pattern.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True if the pattern contains no params and no wildcard.
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(Segment::is_static)
    }

    /// True if the last segment is a wildcard.
    pub fn has_tail_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }

    /// Names this pattern binds, first occurrence order, without duplicates.
    pub fn param_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = Vec::new();
        for segment in &self.segments {
            if let Some(name) = segment.param_name() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        if self.has_tail_wildcard() {
            names.push(Arc::from(WILDCARD_PARAM));
        }
        names
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Compile a route path into one or more concrete patterns.
///
/// A route ending in optional params expands into one pattern per prefix:
/// `/a/:b?` compiles to `/a` and `/a/:b`.
pub fn compile(path: &str) -> Result<Vec<RoutePattern>, RouterError> {
    let segments = parse(path)?;

    let first_optional = segments
        .iter()
        .position(|s| matches!(s, Segment::Optional(_)));
    let Some(first_optional) = first_optional else {
        return Ok(vec![RoutePattern::from_segments(segments)]);
    };

    if segments[first_optional..]
        .iter()
        .any(|s| !matches!(s, Segment::Optional(_)))
    {
        return Err(RouterError::invalid(
            path,
            "optional params must be at the end of the route",
        ));
    }

    let mut base: Vec<Segment> = segments[..first_optional]
        .iter()
        .filter(|s| !matches!(s, Segment::Static(text) if text.is_empty()))
        .cloned()
        .collect();
    let mut patterns = vec![expansion(&base)];
    for segment in &segments[first_optional..] {
        if let Segment::Optional(inner) = segment {
            base.push((**inner).clone());
            patterns.push(expansion(&base));
        }
    }
    patterns.dedup_by(|a, b| a.path == b.path);
    Ok(patterns)
}

fn expansion(segments: &[Segment]) -> RoutePattern {
    if segments.is_empty() {
        RoutePattern::from_segments(vec![Segment::Static(String::new())])
    } else {
        RoutePattern::from_segments(segments.to_vec())
    }
}

fn parse(path: &str) -> Result<Vec<Segment>, RouterError> {
    let raw = split_route(path)?;
    let mut segments = Vec::with_capacity(raw.len());

    for piece in raw {
        let segment = if piece == "*" {
            Segment::Wildcard
        } else if let Some(label) = piece.strip_prefix(':') {
            let (label, optional) = match label.strip_suffix('?') {
                Some(rest) => (rest, true),
                None => (label, false),
            };
            let param = parse_param(path, label)?;
            if optional {
                Segment::Optional(Box::new(param))
            } else {
                param
            }
        } else {
            Segment::Static(piece.to_string())
        };

        segments.push(segment);
    }
    Ok(segments)
}

fn parse_param(path: &str, label: &str) -> Result<Segment, RouterError> {
    match label.find('{') {
        None => {
            if label.is_empty() || label.contains('}') {
                return Err(RouterError::invalid(path, format!("bad param name `{label}`")));
            }
            Ok(Segment::Param(Arc::from(label)))
        }
        Some(open) => {
            let name = &label[..open];
            let Some(source) = label[open + 1..].strip_suffix('}') else {
                return Err(RouterError::invalid(path, format!("unterminated constraint in `:{label}`")));
            };
            if name.is_empty() || source.is_empty() {
                return Err(RouterError::invalid(path, format!("bad constrained param `:{label}`")));
            }
            Ok(Segment::ParamConstrained(Constraint::new(path, name, source)?))
        }
    }
}

/// Split on `/` outside of `{...}`.
fn split_route(path: &str) -> Result<Vec<&str>, RouterError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in trimmed.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| RouterError::invalid(path, "unbalanced `}`"))?;
            }
            '/' if depth == 0 => {
                pieces.push(&trimmed[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(RouterError::invalid(path, "unbalanced `{`"));
    }
    pieces.push(&trimmed[start..]);
    Ok(pieces)
}

/// Drop one leading `^` and one unescaped trailing `$`.
fn strip_anchors(source: &str) -> &str {
    let source = source.strip_prefix('^').unwrap_or(source);
    match source.strip_suffix('$') {
        Some(rest) if rest.bytes().rev().take_while(|b| *b == b'\\').count() % 2 == 0 => rest,
        _ => source,
    }
}

/// True if `source` has an unescaped `^` or `$` outside a character class.
fn has_bare_anchor(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut in_class = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => {
                in_class = true;
                // `[^...]` and `[]...]` open the class, they do not close it.
                if bytes.get(i + 1) == Some(&b'^') {
                    i += 1;
                }
                if bytes.get(i + 1) == Some(&b']') {
                    i += 1;
                }
            }
            b']' if in_class => in_class = false,
            b'^' | b'$' if !in_class => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// `(a|b)` → `(?:a|b)` when one group wraps the whole source.
fn rewrite_alternation_group(source: &str) -> String {
    if !source.starts_with('(') || source.starts_with("(?") {
        return source.to_string();
    }
    match matching_paren(source, 0) {
        Some(close) if close == source.len() - 1 => {
            let inner = &source[1..close];
            if has_top_level_alternation(inner) {
                format!("(?:{inner})")
            } else {
                source.to_string()
            }
        }
        _ => source.to_string(),
    }
}

fn matching_paren(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => depth += 1,
            b')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn has_top_level_alternation(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => depth += 1,
            b')' if !in_class => depth = depth.saturating_sub(1),
            b'|' if !in_class && depth == 0 => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// True if `source` opens a group that captures (plain or named).
fn has_capturing_group(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut in_class = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => {
                let rest = &source[i + 1..];
                if !rest.starts_with('?') || rest.starts_with("?P<") || rest.starts_with("?<") {
                    return true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}
