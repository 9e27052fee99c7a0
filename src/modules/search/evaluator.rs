// Copyright © 2025 the mailstore authors
// Licensed under the Apache License, Version 2.0
// See the LICENSE file in the repository root for details.

//! Pure predicate over (criterion, message, recent-set) implementing IMAP
//! SEARCH semantics for backends without an external index.

use crate::modules::error::MailStoreResult;
use crate::modules::mailbox::MailboxId;
use crate::modules::message::{Flag, MailMessage};
use crate::modules::search::{
    ConjunctionKind, Criterion, DateComparison, DateResolution, HeaderOperator, NumericComparison,
    NumericRange, SearchQuery, TextScope,
};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Does the message match every criterion of the query?
pub fn matches_query<Id: MailboxId>(
    query: &SearchQuery,
    message: &MailMessage<Id>,
) -> MailStoreResult<bool> {
    for criterion in &query.criteria {
        if !matches_criterion(criterion, message, &query.recent_uids)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Does the message match one criterion? Evaluation is side-effect-free.
pub fn matches_criterion<Id: MailboxId>(
    criterion: &Criterion,
    message: &MailMessage<Id>,
    recent_uids: &BTreeSet<u64>,
) -> MailStoreResult<bool> {
    match criterion {
        Criterion::All => Ok(true),
        Criterion::Uid(ranges) => Ok(matches_uid(ranges, message.uid)),
        Criterion::Flag { flag, set } => Ok(matches_flag(flag, *set, message, recent_uids)),
        Criterion::InternalDate {
            op,
            date,
            resolution,
        } => Ok(matches_internal_date(*op, date, *resolution, message)),
        Criterion::Header { name, op } => Ok(matches_header(name, op, message)),
        Criterion::Size { op, value } => Ok(matches_size(*op, *value, message)),
        Criterion::Text { scope, value } => Ok(matches_text(*scope, value, message)),
        Criterion::Conjunction { kind, criteria } => {
            matches_conjunction(*kind, criteria, message, recent_uids)
        }
    }
}

fn matches_uid(ranges: &[NumericRange], uid: u64) -> bool {
    ranges.iter().any(|range| range.is_in(uid))
}

fn matches_flag<Id: MailboxId>(
    flag: &Flag,
    set: bool,
    message: &MailMessage<Id>,
    recent_uids: &BTreeSet<u64>,
) -> bool {
    // Recent is owned by the observing session, not the store.
    let has = match flag {
        Flag::Recent => recent_uids.contains(&message.uid),
        other => message.flags.contains(other),
    };
    has == set
}

fn matches_size<Id: MailboxId>(op: NumericComparison, value: u64, message: &MailMessage<Id>) -> bool {
    match op {
        NumericComparison::LessThan => message.size < value,
        NumericComparison::GreaterThan => message.size > value,
        NumericComparison::Equals => message.size == value,
    }
}

fn matches_internal_date<Id: MailboxId>(
    op: DateComparison,
    date: &DateTime<Utc>,
    resolution: DateResolution,
    message: &MailMessage<Id>,
) -> bool {
    let Some(internal) = Utc.timestamp_millis_opt(message.internal_date).single() else {
        return false;
    };
    compare_dates(op, &internal, date, resolution)
}

fn matches_header<Id: MailboxId>(
    name: &str,
    op: &HeaderOperator,
    message: &MailMessage<Id>,
) -> bool {
    match op {
        HeaderOperator::Exists => message
            .headers
            .iter()
            .any(|header| header.name.eq_ignore_ascii_case(name)),
        HeaderOperator::Contains(text) => {
            let needle = text.to_uppercase();
            message.headers.iter().any(|header| {
                header.name.eq_ignore_ascii_case(name)
                    && header.value.to_uppercase().contains(&needle)
            })
        }
        HeaderOperator::Date {
            op,
            date,
            resolution,
        } => {
            let Some(value) = message.header_value(name) else {
                return false;
            };
            // Unparsable values never match.
            match DateTime::parse_from_rfc2822(value) {
                Ok(parsed) => {
                    compare_dates(*op, &parsed.with_timezone(&Utc), date, *resolution)
                }
                Err(_) => false,
            }
        }
    }
}

fn matches_text<Id: MailboxId>(scope: TextScope, value: &str, message: &MailMessage<Id>) -> bool {
    let needle = value.to_uppercase();
    match scope {
        TextScope::Body => message.decoded_body_text().to_uppercase().contains(&needle),
        TextScope::Full => {
            message.headers_text().to_uppercase().contains(&needle)
                || message.decoded_body_text().to_uppercase().contains(&needle)
        }
    }
}

fn matches_conjunction<Id: MailboxId>(
    kind: ConjunctionKind,
    criteria: &[Criterion],
    message: &MailMessage<Id>,
    recent_uids: &BTreeSet<u64>,
) -> MailStoreResult<bool> {
    match kind {
        ConjunctionKind::And => {
            for criterion in criteria {
                if !matches_criterion(criterion, message, recent_uids)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConjunctionKind::Or => {
            for criterion in criteria {
                if matches_criterion(criterion, message, recent_uids)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ConjunctionKind::Nor => {
            for criterion in criteria {
                if matches_criterion(criterion, message, recent_uids)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

fn compare_dates(
    op: DateComparison,
    left: &DateTime<Utc>,
    right: &DateTime<Utc>,
    resolution: DateResolution,
) -> bool {
    let ordering = resolution_key(left, resolution).cmp(&resolution_key(right, resolution));
    match op {
        DateComparison::Before => ordering == Ordering::Less,
        DateComparison::On => ordering == Ordering::Equal,
        DateComparison::After => ordering == Ordering::Greater,
    }
}

/// Truncate a UTC instant to the comparison resolution by zeroing the finer
/// fields, expressed as an ordered tuple.
fn resolution_key(
    date: &DateTime<Utc>,
    resolution: DateResolution,
) -> (i32, u32, u32, u32, u32, u32) {
    let full = (
        date.year(),
        date.month(),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
    );
    match resolution {
        DateResolution::Year => (full.0, 0, 0, 0, 0, 0),
        DateResolution::Month => (full.0, full.1, 0, 0, 0, 0),
        DateResolution::Day => (full.0, full.1, full.2, 0, 0, 0),
        DateResolution::Hour => (full.0, full.1, full.2, full.3, 0, 0),
        DateResolution::Minute => (full.0, full.1, full.2, full.3, full.4, 0),
        DateResolution::Second => full,
    }
}
