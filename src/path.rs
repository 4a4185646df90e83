//! Slash-delimited reference paths into the tree.

use std::fmt;

use crate::error::{Error, Result};

/// A normalized reference into the tree.
///
/// Canonical form always begins with `/`; the root reference is the
/// literal string `/`. Adjacent and trailing slashes are normalized away
/// during construction, matching the original server's behavior of
/// splitting on `/` and skipping empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    canonical: Box<str>,
    segments: Vec<Box<str>>,
}

impl Ref {
    /// Parses a reference from its wire form (e.g. `"/a/b/c"`, `"a/b/c"`,
    /// `"a//b/"`, or `""`). Empty and root all normalize to `/`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for part in raw.split('/') {
            if part.is_empty() {
                continue;
            }
            if part.contains('/') {
                // unreachable after split('/'), kept as an explicit guard
                // per the storage interface contract.
                return Err(Error::InvalidRef {
                    reference: raw.to_string(),
                    reason: "segment contains '/'",
                });
            }
            segments.push(part.into());
        }

        let canonical = if segments.is_empty() {
            "/".to_string()
        } else {
            let mut s = String::with_capacity(raw.len() + 1);
            for seg in &segments {
                s.push('/');
                s.push_str(seg);
            }
            s
        };

        Ok(Ref { canonical: canonical.into(), segments })
    }

    pub fn root() -> Self {
        Ref { canonical: "/".into(), segments: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Box<str>] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Appends a child segment (used when fanning out a multi-path update),
    /// e.g. `/a/b`.join("c") -> `/a/b/c`.
    pub fn join(&self, child: &str) -> Result<Self> {
        let mut combined = self.canonical.to_string();
        if !combined.ends_with('/') {
            combined.push('/');
        }
        combined.push_str(child);
        Ref::parse(&combined)
    }

    /// Tests the symmetric prefix relationship used by the subscription
    /// registry's `find`: true if `self` is at or above `other`, or at or
    /// below it. The trailing-slash trick prevents `/foo` from matching
    /// `/foobar`.
    pub fn shares_ancestry_with(&self, other: &Ref) -> bool {
        if self.is_root() {
            return true;
        }
        let mine = self.with_trailing_slash();
        let theirs = other.with_trailing_slash();
        mine.starts_with(theirs.as_ref()) || theirs.starts_with(mine.as_ref())
    }

    fn with_trailing_slash(&self) -> std::borrow::Cow<'_, str> {
        if self.canonical.ends_with('/') {
            std::borrow::Cow::Borrowed(&self.canonical)
        } else {
            std::borrow::Cow::Owned(format!("{}/", self.canonical))
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl std::str::FromStr for Ref {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ref::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_slashes() {
        assert_eq!(Ref::parse("a/b/c").unwrap().as_str(), "/a/b/c");
        assert_eq!(Ref::parse("/a/b/c/").unwrap().as_str(), "/a/b/c");
        assert_eq!(Ref::parse("//a//b//").unwrap().as_str(), "/a/b");
        assert_eq!(Ref::parse("").unwrap().as_str(), "/");
        assert_eq!(Ref::parse("/").unwrap().as_str(), "/");
    }

    #[test]
    fn join_appends_segment() {
        let base = Ref::parse("/path").unwrap();
        assert_eq!(base.join("id1").unwrap().as_str(), "/path/id1");
        let root = Ref::root();
        assert_eq!(root.join("path").unwrap().as_str(), "/path");
    }

    #[test]
    fn root_listener_hears_everything() {
        let root = Ref::root();
        let change = Ref::parse("/a/b/c").unwrap();
        assert!(root.shares_ancestry_with(&change));
    }

    #[test]
    fn prefix_safety() {
        let foo = Ref::parse("/foo").unwrap();
        let foobar = Ref::parse("/foobar").unwrap();
        let write = Ref::parse("/foo/x").unwrap();
        assert!(foo.shares_ancestry_with(&write));
        assert!(!foobar.shares_ancestry_with(&write));
    }

    #[test]
    fn ancestor_and_descendant_both_match() {
        let listener_ancestor = Ref::parse("/a").unwrap();
        let listener_descendant = Ref::parse("/a/b/c/d").unwrap();
        let write = Ref::parse("/a/b/c").unwrap();
        assert!(listener_ancestor.shares_ancestry_with(&write));
        assert!(listener_descendant.shares_ancestry_with(&write));
    }
}
