//! Path compiler
//!
//! Turns a dotted, escape-aware path string into the list of navigation
//! operations the mutation engine understands.
//!
//! ```text
//! "app.versions.3"   → [MapKey("app"), MapKey("versions"), ListIndex(3)]
//! "a\.b"             → [MapKey("a.b")]
//! "breadcrumbs."     → [MapKey("breadcrumbs"), ListAppend]
//! "threads.-1.name"  → [MapKey("threads"), ListLastIndex, MapKey("name")]
//! ""                 → []   (the whole document)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::core::{Result, StoreError};

pub const SEPARATOR: char = '.';
pub const ESCAPE: char = '\\';

/// One compiled navigation instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathOp {
    /// Navigate to (or create) a map entry.
    MapKey(String),
    /// Navigate to (or create) the list element at an absolute index.
    ListIndex(i64),
    /// Navigate to the last list element, or element 0 of an empty list.
    ListLastIndex,
    /// Create a new trailing list element. Never resolves on reads.
    ListAppend,
}

impl PathOp {
    fn from_component(component: String) -> Self {
        match component.parse::<i64>() {
            Ok(-1) => Self::ListLastIndex,
            Ok(index) => Self::ListIndex(index),
            Err(_) => Self::MapKey(component),
        }
    }
}

impl fmt::Display for PathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MapKey(key) => f.write_str(&escape_component(key)),
            Self::ListIndex(index) => write!(f, "{}", index),
            Self::ListLastIndex => f.write_str("-1"),
            Self::ListAppend => Ok(()),
        }
    }
}

/// An immutable, compiled path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DocumentPath {
    ops: Vec<PathOp>,
}

impl DocumentPath {
    pub fn parse(path: &str) -> Result<Self> {
        Ok(Self { ops: compile_path(path)? })
    }

    /// The path addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[PathOp] {
        &self.ops
    }

    pub fn is_root(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl FromStr for DocumentPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Vec<PathOp>> for DocumentPath {
    fn from(ops: Vec<PathOp>) -> Self {
        Self { ops }
    }
}

impl AsRef<[PathOp]> for DocumentPath {
    fn as_ref(&self) -> &[PathOp] {
        &self.ops
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}

/// Compiles a path string into navigation operations.
///
/// `.` separates components, `\` escapes the following character. Integer
/// components address list elements (`-1` being the last one), anything
/// else is a map key. An unescaped trailing `.` appends to a list.
///
/// # Errors
///
/// `StoreError::PathSyntax` if the path ends on a bare escape character.
pub fn compile_path(path: &str) -> Result<Vec<PathOp>> {
    let mut ops = Vec::new();
    if path.is_empty() {
        return Ok(ops);
    }

    let mut component = String::new();
    let mut escaping = false;

    for ch in path.chars() {
        if escaping {
            component.push(ch);
            escaping = false;
            continue;
        }
        match ch {
            ESCAPE => escaping = true,
            SEPARATOR => ops.push(PathOp::from_component(std::mem::take(&mut component))),
            _ => component.push(ch),
        }
    }

    if escaping {
        return Err(StoreError::PathSyntax(format!(
            "path '{}' ends with a bare escape character",
            path
        )));
    }

    if ends_with_unescaped_separator(path) {
        ops.push(PathOp::ListAppend);
    } else {
        ops.push(PathOp::from_component(component));
    }
    Ok(ops)
}

/// Escapes a literal map key so it survives `compile_path` unchanged.
///
/// Keys that look like integers still compile to list operations.
pub fn escape_component(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for ch in key.chars() {
        if ch == SEPARATOR || ch == ESCAPE {
            escaped.push(ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

fn ends_with_unescaped_separator(path: &str) -> bool {
    let Some(without_separator) = path.strip_suffix(SEPARATOR) else {
        return false;
    };
    let escapes = without_separator
        .chars()
        .rev()
        .take_while(|&ch| ch == ESCAPE)
        .count();
    escapes % 2 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> PathOp {
        PathOp::MapKey(k.to_string())
    }

    #[test]
    fn test_empty_path() {
        assert!(compile_path("").unwrap().is_empty());
        assert!(DocumentPath::parse("").unwrap().is_root());
    }

    #[test]
    fn test_nested_keys_and_index() {
        assert_eq!(
            compile_path("foo.bar.3").unwrap(),
            vec![key("foo"), key("bar"), PathOp::ListIndex(3)]
        );
    }

    #[test]
    fn test_escaped_separator() {
        assert_eq!(compile_path("a\\.b").unwrap(), vec![key("a.b")]);
        assert_eq!(compile_path("a\\\\.b").unwrap(), vec![key("a\\"), key("b")]);
    }

    #[test]
    fn test_last_index_and_negative_index() {
        assert_eq!(
            compile_path("list.-1").unwrap(),
            vec![key("list"), PathOp::ListLastIndex]
        );
        assert_eq!(
            compile_path("list.-2").unwrap(),
            vec![key("list"), PathOp::ListIndex(-2)]
        );
    }

    #[test]
    fn test_trailing_separator_appends() {
        assert_eq!(compile_path("x.").unwrap(), vec![key("x"), PathOp::ListAppend]);
        // escaped trailing dot is part of the key
        assert_eq!(compile_path("x\\.").unwrap(), vec![key("x.")]);
        // escaped backslash followed by an unescaped trailing dot
        assert_eq!(
            compile_path("x\\\\.").unwrap(),
            vec![key("x\\"), PathOp::ListAppend]
        );
    }

    #[test]
    fn test_empty_components_are_keys() {
        assert_eq!(compile_path("a..b").unwrap(), vec![key("a"), key(""), key("b")]);
    }

    #[test]
    fn test_bare_escape_is_syntax_error() {
        let err = compile_path("broken\\").unwrap_err();
        assert!(matches!(err, StoreError::PathSyntax(_)));
    }

    #[test]
    fn test_display_reencodes() {
        let path: DocumentPath = "meta.a\\.b.-1".parse().unwrap();
        assert_eq!(path.to_string(), "meta.a\\.b.-1");
        let append = DocumentPath::parse("crumbs.").unwrap();
        assert_eq!(append.to_string(), "crumbs.");
        assert_eq!(DocumentPath::parse(&append.to_string()).unwrap(), append);
    }
}
