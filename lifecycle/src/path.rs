// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the `ActorPath` type. A path identifies an actor by its position in
//! the supervision tree: the last segment is the name that is unique within the parent's child
//! set, and the remaining segments are the path of the parent. A restarted actor keeps its path.
//!

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::fmt::{Error, Formatter};

#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorPath(Vec<String>);

impl ActorPath {
    /// Path of the parent actor. The parent of a top level path is the empty path.
    pub fn parent(&self) -> Self {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => ActorPath(rest.to_vec()),
            _ => ActorPath(Vec::new()),
        }
    }

    /// Name of the actor inside its parent's child set.
    pub fn key(&self) -> String {
        self.0.last().cloned().unwrap_or_default()
    }

    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        !self.is_empty() && self.parent() == *other
    }

    pub fn is_parent_of(&self, other: &ActorPath) -> bool {
        other.is_child_of(self)
    }

    pub fn is_top_level(&self) -> bool {
        self.0.len() == 1
    }
}

fn tokens(str: &str) -> impl Iterator<Item = String> + '_ {
    str.split('/')
        .filter(|x| !x.trim().is_empty())
        .map(|s| s.to_string())
}

impl From<&str> for ActorPath {
    fn from(str: &str) -> Self {
        ActorPath(tokens(str).collect())
    }
}

impl From<String> for ActorPath {
    fn from(string: String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl From<&String> for ActorPath {
    fn from(string: &String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl std::ops::Div<&str> for ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        let mut keys = self.0;
        keys.extend(tokens(rhs));
        ActorPath(keys)
    }
}

impl std::ops::Div<&str> for &ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        self.clone() / rhs
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self.level().cmp(&1) {
            Ordering::Less => write!(f, "/"),
            Ordering::Equal => write!(f, "/{}", self.0[0]),
            Ordering::Greater => write!(f, "/{}", self.0.join("/")),
        }
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn parse_empty_string() {
        let path = ActorPath::from("");
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "/");
    }

    #[test]
    fn parse_three_deep() {
        let path = ActorPath::from("/user/parent//child/");
        assert_eq!(path.level(), 3);
        assert_eq!(path.key(), "child");
        assert_eq!(path.to_string(), "/user/parent/child");
    }

    #[test]
    fn parent_of_top_level_is_empty() {
        let path = ActorPath::from("/user");
        assert!(path.is_top_level());
        assert!(path.parent().is_empty());
    }

    #[test]
    fn test_if_parent_child() {
        let parent = ActorPath::from("/user/parent");
        let child = &parent / "child";
        assert_eq!(child, ActorPath::from("/user/parent/child"));
        assert!(child.is_child_of(&parent));
        assert!(parent.is_parent_of(&child));
        assert!(!parent.is_child_of(&child));
        assert!(!ActorPath::from("/user/parent/child/leaf").is_child_of(&parent));
    }

    #[test]
    fn empty_path_has_no_parent_relation() {
        let empty = ActorPath::from("");
        assert!(!empty.is_child_of(&ActorPath::from("")));
    }
}
