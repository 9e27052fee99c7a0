// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single message flag: one of the IMAP system flags or a user keyword.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    Recent,
    Custom(String),
}

impl Flag {
    pub fn is_system(&self) -> bool {
        !matches!(self, Flag::Custom(_))
    }

    pub fn to_imap_string(&self) -> String {
        match self {
            Flag::Seen => "\\Seen".into(),
            Flag::Answered => "\\Answered".into(),
            Flag::Flagged => "\\Flagged".into(),
            Flag::Deleted => "\\Deleted".into(),
            Flag::Draft => "\\Draft".into(),
            Flag::Recent => "\\Recent".into(),
            Flag::Custom(keyword) => keyword.clone(),
        }
    }

    /// Info letter used by the maildir filename encoding. Keywords and
    /// Recent have no letter; Recent is encoded as residence in `new/`.
    pub fn maildir_char(&self) -> Option<char> {
        match self {
            Flag::Draft => Some('D'),
            Flag::Flagged => Some('F'),
            Flag::Answered => Some('R'),
            Flag::Seen => Some('S'),
            Flag::Deleted => Some('T'),
            Flag::Recent | Flag::Custom(_) => None,
        }
    }

    pub fn from_maildir_char(c: char) -> Option<Flag> {
        match c {
            'D' => Some(Flag::Draft),
            'F' => Some(Flag::Flagged),
            'R' => Some(Flag::Answered),
            'S' => Some(Flag::Seen),
            'T' => Some(Flag::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_imap_string())
    }
}

/// An ordered flag set with the set operations `update_flags` needs.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Flags(BTreeSet<Flag>);

impl Flags {
    pub fn new() -> Self {
        Flags(BTreeSet::new())
    }

    pub fn with(mut self, flag: Flag) -> Self {
        self.0.insert(flag);
        self
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    pub fn insert(&mut self, flag: Flag) -> bool {
        self.0.insert(flag)
    }

    pub fn remove(&mut self, flag: &Flag) -> bool {
        self.0.remove(flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.0.iter()
    }

    /// Set union, returning the combined set.
    pub fn union_with(&self, other: &Flags) -> Flags {
        Flags(self.0.union(&other.0).cloned().collect())
    }

    /// Set difference, removing every flag of `other`.
    pub fn subtract(&self, other: &Flags) -> Flags {
        Flags(self.0.difference(&other.0).cloned().collect())
    }

    pub fn keywords(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|f| match f {
                Flag::Custom(keyword) => Some(keyword.clone()),
                _ => None,
            })
            .collect()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        Flags(iter.into_iter().collect())
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(Flag::to_imap_string).collect();
        write!(f, "({})", rendered.join(" "))
    }
}
