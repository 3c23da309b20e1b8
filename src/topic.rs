// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Topic name and topic filter parsing, per MQTT 3.1.1 §4.7.

use crate::error::{Error, ErrorKind};

/// Reserved label marking "a subscribed filter terminates at this prefix" in
/// the trie child-counter maps (`topic_filter_child`). Chosen outside the
/// MQTT topic alphabet (`#` and `+` are already reserved by the protocol;
/// a NUL byte can never appear in a validated topic level) so it can never
/// collide with a literal level, `+`, or `#`.
pub const END: &str = "\u{0}END";

const SINGLE_WILDCARD: &str = "+";
const MULTI_WILDCARD: &str = "#";

/// Splits a topic name or filter into its levels. Empty levels are kept
/// (`"/a"` splits to `["", "a"]`, matching MQTT's level-counting rules).
#[must_use]
pub fn split(topic: &str) -> Vec<String> {
    topic.split('/').map(str::to_owned).collect()
}

/// True iff any level is `+` or `#`, i.e. `levels` names a filter rather
/// than a concrete topic name.
#[must_use]
pub fn is_filter(levels: &[String]) -> bool {
    levels
        .iter()
        .any(|level| level == SINGLE_WILDCARD || level == MULTI_WILDCARD)
}

/// True iff `levels` is a `$`-prefixed system topic (e.g. `$SYS/...`).
/// System topics are excluded from `#`/`+` matching at the root level
/// (MQTT 3.1.1 §4.7.2).
#[must_use]
pub fn is_system_topic(levels: &[String]) -> bool {
    levels
        .first()
        .is_some_and(|first| first.starts_with('$'))
}

/// Parses and validates a subscription filter, returning its levels.
///
/// Rules enforced (MQTT 3.1.1 §4.7.1):
/// - `#` is only valid as the last level, and must occupy the whole level.
/// - `+` is only valid as a whole level (never `a+` or `+a`).
/// - the filter must not be empty.
pub fn sanitize_filter(s: &str) -> Result<Vec<String>, Error> {
    if s.is_empty() {
        return Err(Error::new(
            ErrorKind::ContractViolation,
            "topic filter must not be empty",
        ));
    }
    let levels = split(s);
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains(MULTI_WILDCARD) && (level != MULTI_WILDCARD || i != last) {
            return Err(Error::from_string(
                ErrorKind::ContractViolation,
                format!("'#' must be the sole, last level of filter {s:?}"),
            ));
        }
        if level.contains(SINGLE_WILDCARD) && level != SINGLE_WILDCARD {
            return Err(Error::from_string(
                ErrorKind::ContractViolation,
                format!("'+' must occupy a whole level of filter {s:?}"),
            ));
        }
    }
    Ok(levels)
}

/// Validates a concrete topic name (no wildcards allowed).
pub fn sanitize_name(s: &str) -> Result<Vec<String>, Error> {
    if s.is_empty() {
        return Err(Error::new(
            ErrorKind::ContractViolation,
            "topic name must not be empty",
        ));
    }
    let levels = split(s);
    if is_filter(&levels) {
        return Err(Error::from_string(
            ErrorKind::ContractViolation,
            format!("topic name {s:?} must not contain wildcards"),
        ));
    }
    Ok(levels)
}

/// Joins levels back into the slash-separated string used as the
/// `subscription(clientId)` map key and for logging.
#[must_use]
pub fn join(levels: &[String]) -> String {
    levels.join("/")
}
