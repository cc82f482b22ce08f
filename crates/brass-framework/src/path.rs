//! Parameterized path matching for callback data.
//!
//! A pattern is a `/`-separated list of segments; a segment starting with
//! `:` is a named parameter, everything else is a literal:
//!
//! ```text
//! /grades/semester/:semester_id/subjects
//!  └────┘ └──────┘ └──────────┘ └──────┘
//!  literal literal    param     literal
//! ```
//!
//! A path matches a pattern when it has exactly the same number of segments,
//! every literal segment is equal, and every parameter segment is non-empty.
//!
//! # Lookup structure
//!
//! Patterns are grouped by segment count, and each group is a trie keyed by
//! segment. At every depth the literal child is tried before the parameter
//! child, backtracking into the parameter branch only when the literal branch
//! fails deeper down. A literal therefore always wins over a parameter at the
//! same position, whatever the registration order.
//!
//! ```rust,ignore
//! let mut tree = PathTree::new();
//! tree.add("/grades/semester/:semester_id", "semester")?;
//! tree.add("/grades/semester/current", "current")?;
//!
//! let found = tree.find("/grades/semester/42").unwrap();
//! assert_eq!(*found.value, "semester");
//! assert_eq!(found.params.get("semester_id"), Some("42"));
//!
//! assert_eq!(*tree.find("/grades/semester/current").unwrap().value, "current");
//! ```

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::error::PatternError;

/// One compiled segment of a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must match verbatim.
    Literal(String),
    /// Matches any non-empty segment and captures it under this name.
    Param(String),
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compiles `pattern`.
    ///
    /// Fails on an unnamed parameter (`:`) or on a parameter name used twice.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        for (position, raw) in pattern.split('/').enumerate() {
            match raw.strip_prefix(':') {
                Some("") => return Err(PatternError::EmptyParamName { position }),
                Some(name) => {
                    if names.contains(&name) {
                        return Err(PatternError::DuplicateParam(name.to_string()));
                    }
                    names.push(name);
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(raw.to_string())),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// Returns the pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the compiled segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the parameter names in order of appearance.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parameters captured from a matched path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value captured for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over `(name, value)` pairs in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of captured parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }
}

/// A successful lookup in a [`PathTree`].
#[derive(Debug)]
pub struct Match<'a, T> {
    /// The value registered for the matching pattern.
    pub value: &'a T,
    /// The matching pattern as registered.
    pub pattern: &'a str,
    /// Parameters captured from the path.
    pub params: Params,
}

struct Leaf<T> {
    pattern: String,
    /// `(segment index, name)` for each parameter of the pattern.
    params: Vec<(usize, String)>,
    value: T,
}

struct Node<T> {
    literals: HashMap<String, Node<T>>,
    param: Option<Box<Node<T>>>,
    leaf: Option<Leaf<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            param: None,
            leaf: None,
        }
    }
}

impl<T> Node<T> {
    fn walk(&self, segments: &[&str]) -> Option<&Leaf<T>> {
        let Some((first, rest)) = segments.split_first() else {
            return self.leaf.as_ref();
        };

        if let Some(child) = self.literals.get(*first)
            && let Some(leaf) = child.walk(rest)
        {
            return Some(leaf);
        }

        if !first.is_empty()
            && let Some(child) = &self.param
        {
            return child.walk(rest);
        }

        None
    }
}

/// A set of patterns mapped to values, resolved by path.
pub struct PathTree<T> {
    /// One trie per segment count.
    roots: HashMap<usize, Node<T>>,
    len: usize,
}

impl<T> Default for PathTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PathTree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            roots: HashMap::new(),
            len: 0,
        }
    }

    /// Compiles `pattern` and registers `value` for it.
    ///
    /// A pattern with the same shape as an existing one (same literals at
    /// the same positions, parameters renamed) is ignored: the earlier
    /// registration wins. Re-adding the exact same pattern replaces its value.
    pub fn add(&mut self, pattern: &str, value: T) -> Result<(), PatternError> {
        let compiled = Pattern::compile(pattern)?;
        self.insert(compiled, value);
        Ok(())
    }

    /// Registers `value` for an already compiled pattern.
    pub fn insert(&mut self, pattern: Pattern, value: T) {
        let mut node = self.roots.entry(pattern.segments.len()).or_default();
        let mut params = Vec::new();

        for (index, segment) in pattern.segments.iter().enumerate() {
            node = match segment {
                Segment::Literal(lit) => node.literals.entry(lit.clone()).or_default(),
                Segment::Param(name) => {
                    params.push((index, name.clone()));
                    node.param.get_or_insert_with(Default::default)
                }
            };
        }

        match &mut node.leaf {
            Some(existing) if existing.pattern == pattern.source => {
                warn!(
                    pattern = %existing.pattern,
                    "Callback pattern registered twice, keeping the latest"
                );
                existing.params = params;
                existing.value = value;
            }
            Some(existing) => warn!(
                kept = %existing.pattern,
                ignored = %pattern.source,
                "Callback pattern has the same shape as an earlier one and is ignored"
            ),
            None => {
                node.leaf = Some(Leaf {
                    pattern: pattern.source,
                    params,
                    value,
                });
                self.len += 1;
            }
        }
    }

    /// Resolves `path` to the registered value and its parameters.
    pub fn find(&self, path: &str) -> Option<Match<'_, T>> {
        let segments: Vec<&str> = path.split('/').collect();
        let root = self.roots.get(&segments.len())?;
        let leaf = root.walk(&segments)?;

        let mut params = Params {
            entries: Vec::with_capacity(leaf.params.len()),
        };
        for (index, name) in &leaf.params {
            params.push(name.as_str(), segments[*index]);
        }

        Some(Match {
            value: &leaf.value,
            pattern: &leaf.pattern,
            params,
        })
    }

    /// Returns the number of registered patterns.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> fmt::Debug for PathTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTree").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(patterns: &[&'static str]) -> PathTree<&'static str> {
        let mut tree = PathTree::new();
        for p in patterns {
            tree.add(p, *p).unwrap();
        }
        tree
    }

    #[test]
    fn test_compile_segments() {
        let p = Pattern::compile("/grades/semester/:semester_id").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Literal(String::new()),
                Segment::Literal("grades".into()),
                Segment::Literal("semester".into()),
                Segment::Param("semester_id".into()),
            ]
        );
        assert_eq!(p.param_names().collect::<Vec<_>>(), vec!["semester_id"]);
        assert_eq!(p.to_string(), "/grades/semester/:semester_id");
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            Pattern::compile("/a/:/b"),
            Err(PatternError::EmptyParamName { position: 2 })
        );
        assert_eq!(
            Pattern::compile("/:id/x/:id"),
            Err(PatternError::DuplicateParam("id".into()))
        );
    }

    #[test]
    fn test_grades_scenario() {
        let tree = tree(&[
            "/grades/semester/:semester_id",
            "/grades/semester/:semester_id/subjects",
        ]);

        let m = tree.find("/grades/semester/42").unwrap();
        assert_eq!(*m.value, "/grades/semester/:semester_id");
        assert_eq!(m.params.get("semester_id"), Some("42"));

        let m = tree.find("/grades/semester/42/subjects").unwrap();
        assert_eq!(*m.value, "/grades/semester/:semester_id/subjects");
        assert_eq!(m.pattern, "/grades/semester/:semester_id/subjects");
        assert_eq!(m.params.get("semester_id"), Some("42"));
    }

    #[test]
    fn test_segment_count_must_match() {
        let tree = tree(&["/grades/semester/:semester_id"]);
        assert!(tree.find("/grades/semester").is_none());
        assert!(tree.find("/grades/semester/1/extra").is_none());
        assert!(tree.find("grades/semester/1").is_none());
    }

    #[test]
    fn test_param_requires_non_empty_segment() {
        let tree = tree(&["/grades/semester/:semester_id"]);
        assert!(tree.find("/grades/semester/").is_none());
    }

    #[test]
    fn test_multiple_params() {
        let tree = tree(&["/schedule/:group/:week/day"]);
        let m = tree.find("/schedule/IU7-53/12/day").unwrap();
        assert_eq!(m.params.get("group"), Some("IU7-53"));
        assert_eq!(m.params.get("week"), Some("12"));
        assert_eq!(m.params.get("day"), None);
        assert_eq!(
            m.params.iter().collect::<Vec<_>>(),
            vec![("group", "IU7-53"), ("week", "12")]
        );
    }

    #[test]
    fn test_literal_beats_param_in_either_order() {
        let param_first = tree(&["/grades/:semester_id", "/grades/current"]);
        let literal_first = tree(&["/grades/current", "/grades/:semester_id"]);

        for t in [&param_first, &literal_first] {
            assert_eq!(*t.find("/grades/current").unwrap().value, "/grades/current");
            let m = t.find("/grades/7").unwrap();
            assert_eq!(*m.value, "/grades/:semester_id");
            assert_eq!(m.params.get("semester_id"), Some("7"));
        }
    }

    #[test]
    fn test_backtracks_into_param_branch() {
        let tree = tree(&["/a/b/c", "/a/:x/d"]);
        let m = tree.find("/a/b/d").unwrap();
        assert_eq!(*m.value, "/a/:x/d");
        assert_eq!(m.params.get("x"), Some("b"));
    }

    #[test]
    fn test_same_shape_keeps_earlier() {
        let mut tree = PathTree::new();
        tree.add("/menu/:id", "first").unwrap();
        tree.add("/menu/:item", "second").unwrap();

        assert_eq!(tree.len(), 1);
        let m = tree.find("/menu/5").unwrap();
        assert_eq!(*m.value, "first");
        assert_eq!(m.pattern, "/menu/:id");
        assert_eq!(m.params.get("id"), Some("5"));
        assert_eq!(m.params.get("item"), None);
    }

    #[test]
    fn test_same_pattern_replaces_value() {
        let mut tree = PathTree::new();
        tree.add("/menu/:id", 1).unwrap();
        tree.add("/menu/:id", 2).unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(*tree.find("/menu/5").unwrap().value, 2);
    }

    #[test]
    fn test_empty_tree() {
        let tree: PathTree<()> = PathTree::new();
        assert!(tree.is_empty());
        assert!(tree.find("/anything").is_none());
    }
}
