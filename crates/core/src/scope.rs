//! Source visibility scopes and their merge priorities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Visibility tier of an upstream or static node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceScope {
    /// Visible to every user.
    Global,
    /// Visible to users holding a tag.
    Tag,
    /// Visible to a single user.
    User,
}

impl SourceScope {
    /// Parse from the stored/API string form (case-insensitive).
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GLOBAL" => Ok(Self::Global),
            "TAG" => Ok(Self::Tag),
            "USER" => Ok(Self::User),
            _ => Err(crate::Error::InvalidScope(format!(
                "unknown source scope: {s}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "GLOBAL",
            Self::Tag => "TAG",
            Self::User => "USER",
        }
    }

    /// Merge priority: higher wins when two nodes share a fingerprint.
    pub fn priority(&self) -> i32 {
        match self {
            Self::User => 3,
            Self::Tag => 2,
            Self::Global => 1,
        }
    }

    /// Label prefix for nodes coming from static entries.
    pub fn static_label(&self) -> &'static str {
        match self {
            Self::User => "Static User",
            Self::Tag => "Static Tag",
            Self::Global => "Static Global",
        }
    }

    /// Label prefix for nodes coming from fetched upstreams.
    pub fn upstream_label(&self) -> &'static str {
        match self {
            Self::User => "User Upstream",
            Self::Tag => "Tag Upstream",
            Self::Global => "Global Upstream",
        }
    }
}

impl fmt::Display for SourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a display label such as `"Tag Upstream: provider-a"`.
pub fn source_label(prefix: &str, name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{prefix}: {name}"),
        None => prefix.to_string(),
    }
}

/// A scope together with the entity it targets.
///
/// USER targets carry only a user, TAG targets only a tag, GLOBAL neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceTarget {
    Global,
    User(Uuid),
    Tag(Uuid),
}

impl SourceTarget {
    /// Validate and combine a scope with its optional target ids.
    pub fn new(
        scope: SourceScope,
        user_id: Option<Uuid>,
        tag_id: Option<Uuid>,
    ) -> crate::Result<Self> {
        match (scope, user_id, tag_id) {
            (SourceScope::Global, None, None) => Ok(Self::Global),
            (SourceScope::Global, _, _) => Err(crate::Error::InvalidTarget(
                "user_id/tag_id must not be set for GLOBAL scope".to_string(),
            )),
            (SourceScope::User, Some(user_id), None) => Ok(Self::User(user_id)),
            (SourceScope::User, None, _) => Err(crate::Error::InvalidTarget(
                "user_id is required for USER scope".to_string(),
            )),
            (SourceScope::User, Some(_), Some(_)) => Err(crate::Error::InvalidTarget(
                "tag_id must not be set for USER scope".to_string(),
            )),
            (SourceScope::Tag, None, Some(tag_id)) => Ok(Self::Tag(tag_id)),
            (SourceScope::Tag, _, None) => Err(crate::Error::InvalidTarget(
                "tag_id is required for TAG scope".to_string(),
            )),
            (SourceScope::Tag, Some(_), Some(_)) => Err(crate::Error::InvalidTarget(
                "user_id must not be set for TAG scope".to_string(),
            )),
        }
    }

    pub fn scope(&self) -> SourceScope {
        match self {
            Self::Global => SourceScope::Global,
            Self::User(_) => SourceScope::User,
            Self::Tag(_) => SourceScope::Tag,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(*id),
            _ => None,
        }
    }

    pub fn tag_id(&self) -> Option<Uuid> {
        match self {
            Self::Tag(id) => Some(*id),
            _ => None,
        }
    }
}
