//! Filter expressions for remote searches.
//!
//! A [`Query`] is a conjunction of [`Clause`]s. It renders to the Drive `q`
//! parameter and can also be evaluated locally, which the in-memory store uses
//! and which the gateway uses to re-check name clauses before deleting anything.

use super::RemoteFile;
use std::fmt;

/// One term of a conjunctive filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `name = '<literal>'`
    NameEquals(String),
    /// `name contains '<literal>'`
    NameContains(String),
    /// True prefix match. Drive has no `startswith` operator for file names, so
    /// it is sent as `contains` and narrowed locally.
    NameStartsWith(String),
    /// `'<id>' in parents`
    InParents(String),
    /// `trashed = false`
    NotTrashed,
}

impl Clause {
    fn matches_name(&self, name: &str) -> bool {
        match self {
            Clause::NameEquals(literal) => name == literal,
            Clause::NameContains(literal) => name.contains(literal.as_str()),
            Clause::NameStartsWith(literal) => name.starts_with(literal.as_str()),
            Clause::InParents(_) | Clause::NotTrashed => true,
        }
    }

    fn render(&self, out: &mut impl fmt::Write, prefix_as_contains: bool) -> fmt::Result {
        match self {
            Clause::NameEquals(v) => write!(out, "name = '{}'", escape_literal(v)),
            Clause::NameContains(v) => write!(out, "name contains '{}'", escape_literal(v)),
            Clause::NameStartsWith(v) if prefix_as_contains => {
                write!(out, "name contains '{}'", escape_literal(v))
            }
            Clause::NameStartsWith(v) => write!(out, "name startswith '{}'", escape_literal(v)),
            Clause::InParents(id) => write!(out, "'{}' in parents", escape_literal(id)),
            Clause::NotTrashed => out.write_str("trashed = false"),
        }
    }
}

/// Conjunctive search filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact name inside a container, excluding trashed items.
    pub fn exact(name: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self::new()
            .name_equals(name)
            .in_parents(container_id)
            .not_trashed()
    }

    /// Everything directly inside a container, excluding trashed items.
    pub fn children_of(container_id: impl Into<String>) -> Self {
        Self::new().in_parents(container_id).not_trashed()
    }

    pub fn name_equals(self, name: impl Into<String>) -> Self {
        self.with(Clause::NameEquals(name.into()))
    }

    pub fn name_contains(self, fragment: impl Into<String>) -> Self {
        self.with(Clause::NameContains(fragment.into()))
    }

    pub fn name_starts_with(self, prefix: impl Into<String>) -> Self {
        self.with(Clause::NameStartsWith(prefix.into()))
    }

    pub fn in_parents(self, container_id: impl Into<String>) -> Self {
        self.with(Clause::InParents(container_id.into()))
    }

    pub fn not_trashed(self) -> Self {
        self.with(Clause::NotTrashed)
    }

    pub fn with(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render for the Drive v3 `q` parameter.
    pub fn to_drive_query(&self) -> String {
        let mut rendered = String::new();
        // Writing into a String cannot fail.
        let _ = self.render(&mut rendered, true);
        rendered
    }

    /// Joins the clauses with `and`. With `prefix_as_contains`, `startswith`
    /// is written in the form Drive accepts.
    fn render(&self, out: &mut impl fmt::Write, prefix_as_contains: bool) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                out.write_str(" and ")?;
            }
            clause.render(out, prefix_as_contains)?;
        }
        Ok(())
    }

    /// Whether the name clauses hold for `name`.
    pub fn matches_name(&self, name: &str) -> bool {
        self.clauses.iter().all(|c| c.matches_name(name))
    }

    /// Full local evaluation against a file and its trash state.
    pub fn matches(&self, file: &RemoteFile, trashed: bool) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::InParents(id) => file.parents.iter().any(|p| p == id),
            Clause::NotTrashed => !trashed,
            other => other.matches_name(&file.name),
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, false)
    }
}

/// Escape a string literal for the Drive query language.
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
