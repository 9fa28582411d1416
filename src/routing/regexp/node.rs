//! Character-level fragment trie serialized into one alternation regex.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Regex for one plain path segment.
pub(super) const LABEL_REGEX: &str = "[^/]+";

/// Regex for a trailing wildcard: nothing, or a slash and the rest.
const TAIL_REGEX_OPEN: &str = "(?:|/(";
const TAIL_REGEX_CLOSE: &str = ".*))";

/// A token of a route after splitting literals into characters.
#[derive(Debug, Clone)]
pub(super) enum Token {
    Char(char),
    /// A param or mid-path wildcard occupying segment `segment`.
    Pattern { segment: usize, source: String },
    /// Trailing wildcard occupying segment `segment` (replaces its `/`).
    Tail { segment: usize },
}

/// Two routes disagree on what may follow a shared prefix.
#[derive(Debug)]
pub(super) struct PathConflict;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FragmentKey {
    Char(char),
    Pattern(String),
    Tail,
}

impl FragmentKey {
    fn rank(&self) -> u8 {
        match self {
            FragmentKey::Char(_) => 0,
            FragmentKey::Pattern(source) if source == LABEL_REGEX => 2,
            FragmentKey::Pattern(_) => 1,
            FragmentKey::Tail => 3,
        }
    }
}

// Alternation order: literals, constrained params (longest first),
// plain params, then trailing wildcards.
impl Ord for FragmentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FragmentKey::Char(a), FragmentKey::Char(b)) => a.cmp(b),
            (FragmentKey::Pattern(a), FragmentKey::Pattern(b)) if self.rank() == other.rank() => {
                b.len().cmp(&a.len()).then_with(|| a.cmp(b))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for FragmentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Capture group bookkeeping produced while serializing.
#[derive(Debug, Default)]
pub(super) struct GroupMap {
    count: usize,
    /// Variable index → capture group number.
    pub vars: HashMap<usize, usize>,
    /// (capture group number, arm index), in group order.
    pub arms: Vec<(usize, usize)>,
}

impl GroupMap {
    fn next(&mut self) -> usize {
        self.count += 1;
        self.count
    }
}

#[derive(Debug, Default)]
pub(super) struct FragmentNode {
    arm: Option<usize>,
    var: Option<usize>,
    children: BTreeMap<FragmentKey, FragmentNode>,
}

impl FragmentNode {
    /// Insert `tokens`, ending in `arm`. With `arm == None` the path is only
    /// checked for conflicts and nothing is added.
    ///
    /// Returns `(segment, variable)` for every param and wildcard on the path.
    pub fn insert(
        &mut self,
        tokens: &[Token],
        arm: Option<usize>,
        next_var: &mut usize,
    ) -> Result<Vec<(usize, usize)>, PathConflict> {
        let mut vars = Vec::new();
        self.insert_inner(tokens, arm, next_var, &mut vars)?;
        Ok(vars)
    }

    fn insert_inner(
        &mut self,
        tokens: &[Token],
        arm: Option<usize>,
        next_var: &mut usize,
        vars: &mut Vec<(usize, usize)>,
    ) -> Result<(), PathConflict> {
        let Some((token, rest)) = tokens.split_first() else {
            if self.arm.is_some() {
                return Err(PathConflict);
            }
            if arm.is_some() {
                self.arm = arm;
            }
            return Ok(());
        };
        let check_only = arm.is_none();

        let (key, segment) = match token {
            Token::Char(c) => (FragmentKey::Char(*c), None),
            Token::Pattern { segment, source } => (FragmentKey::Pattern(source.clone()), Some(*segment)),
            Token::Tail { segment } => (FragmentKey::Tail, Some(*segment)),
        };

        if !self.children.contains_key(&key) {
            let conflict = match &key {
                FragmentKey::Char(_) => self
                    .children
                    .keys()
                    .any(|k| matches!(k, FragmentKey::Pattern(_))),
                FragmentKey::Pattern(_) => self.children.keys().any(|k| *k != FragmentKey::Tail),
                FragmentKey::Tail => false,
            };
            if conflict {
                return Err(PathConflict);
            }
            if check_only {
                return Ok(());
            }
            let mut child = FragmentNode::default();
            if segment.is_some() {
                child.var = Some(*next_var);
                *next_var += 1;
            }
            self.children.insert(key.clone(), child);
        }

        let Some(child) = self.children.get_mut(&key) else {
            return Err(PathConflict);
        };
        if let (Some(segment), Some(var)) = (segment, child.var) {
            vars.push((segment, var));
        }
        child.insert_inner(rest, arm, next_var, vars)
    }

    /// Serialize this subtree, numbering capture groups left to right.
    pub fn write(&self, groups: &mut GroupMap) -> String {
        let mut alternatives = Vec::with_capacity(self.children.len() + 1);

        if let Some(arm) = self.arm {
            let group = groups.next();
            groups.arms.push((group, arm));
            alternatives.push("$()".to_string());
        }

        for (key, child) in &self.children {
            let mut fragment = String::new();
            match key {
                FragmentKey::Char(c) => {
                    let mut buf = [0u8; 4];
                    fragment.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                }
                FragmentKey::Pattern(source) => {
                    if let Some(var) = child.var {
                        let group = groups.next();
                        groups.vars.insert(var, group);
                    }
                    fragment.push('(');
                    fragment.push_str(source);
                    fragment.push(')');
                }
                FragmentKey::Tail => {
                    if let Some(var) = child.var {
                        let group = groups.next();
                        groups.vars.insert(var, group);
                    }
                    fragment.push_str(TAIL_REGEX_OPEN);
                    fragment.push_str(TAIL_REGEX_CLOSE);
                }
            }
            fragment.push_str(&child.write(groups));
            alternatives.push(fragment);
        }

        match alternatives.len() {
            0 => String::new(),
            1 => alternatives.remove(0),
            _ => format!("(?:{})", alternatives.join("|")),
        }
    }
}
