//! Authorization predicate boundary.

use std::collections::BTreeSet;

/// Opaque, synchronous yes/no oracle deciding who may enter a building.
pub trait AuthorizedUsers: Send + Sync {
    fn has(&self, username: &str) -> bool;
}

impl<F> AuthorizedUsers for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn has(&self, username: &str) -> bool {
        self(username)
    }
}

/// Fixed set of authorized usernames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList(BTreeSet<String>);

impl AllowList {
    pub fn new(usernames: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(usernames.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AuthorizedUsers for AllowList {
    fn has(&self, username: &str) -> bool {
        self.0.contains(username)
    }
}
