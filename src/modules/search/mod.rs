// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

use crate::modules::message::Flag;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub mod evaluator;

/// An inclusive uid interval of a `Criterion::Uid` node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NumericRange {
    pub low: u64,
    pub high: u64,
}

impl NumericRange {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub fn single(value: u64) -> Self {
        Self {
            low: value,
            high: value,
        }
    }

    pub fn is_in(&self, value: u64) -> bool {
        value >= self.low && value <= self.high
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DateComparison {
    Before,
    On,
    After,
}

/// Granularity both sides of a date comparison are truncated to, in UTC.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DateResolution {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NumericComparison {
    LessThan,
    GreaterThan,
    Equals,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HeaderOperator {
    /// Any header with the name is present.
    Exists,
    /// Some header with the name contains the text, case-insensitively.
    Contains(String),
    /// The header value parses as an RFC 5322 date-time and compares at the
    /// given resolution. Unparsable values never match.
    Date {
        op: DateComparison,
        date: DateTime<Utc>,
        resolution: DateResolution,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextScope {
    /// The decoded body only.
    Body,
    /// Headers concatenated with the body.
    Full,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConjunctionKind {
    And,
    Or,
    Nor,
}

/// One node of the search tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Criterion {
    All,
    Uid(Vec<NumericRange>),
    Flag { flag: Flag, set: bool },
    InternalDate {
        op: DateComparison,
        date: DateTime<Utc>,
        resolution: DateResolution,
    },
    Header { name: String, op: HeaderOperator },
    Size { op: NumericComparison, value: u64 },
    Text { scope: TextScope, value: String },
    Conjunction {
        kind: ConjunctionKind,
        criteria: Vec<Criterion>,
    },
}

/// A search request: top-level criteria are an implicit conjunction. The
/// session's recent-set rides on the query so `Flag(Recent)` consults the
/// observing session rather than a persisted bit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    pub criteria: Vec<Criterion>,
    pub recent_uids: BTreeSet<u64>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(criterion: Criterion) -> Self {
        Self {
            criteria: vec![criterion],
            recent_uids: BTreeSet::new(),
        }
    }

    pub fn and(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Matches everything when no criterion was given.
    pub fn all() -> Self {
        Self::of(Criterion::All)
    }

    /// The uid ranges when this query is a single pure uid criterion; such
    /// queries are satisfiable by a ranged lookup without evaluating
    /// candidates.
    pub fn as_single_uid_criterion(&self) -> Option<&[NumericRange]> {
        match self.criteria.as_slice() {
            [Criterion::Uid(ranges)] => Some(ranges),
            _ => None,
        }
    }
}
