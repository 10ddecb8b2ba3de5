/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! IMAP sequence-set parsing.
//!
//! A set expression is a comma-separated list of numbers and colon-delimited
//! ranges; `*` on either side of a range (or alone) means the current
//! ceiling, supplied by the caller. The parser is pure and runs outside any
//! lock.
//!
//! Malformed tokens are skipped rather than failing the whole expression: a
//! partial FETCH result is preferable to aborting the command over one stale
//! token.

use tracing::debug;

/// Expands a set expression against the given ceiling into a sorted,
/// deduplicated list of concrete values.
///
/// Values of zero and values above the ceiling are dropped. A reversed range
/// such as `5:3` is normalized to ascending order. With a ceiling of zero
/// the result is always empty.
pub fn parse_sequence_set(expr: &str, ceiling: u32) -> Vec<u32> {
    let mut out = Vec::new();

    for token in expr.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        match parse_token(token, ceiling) {
            Some((start, end)) => {
                // Clamp to the ceiling before expanding; a range like
                // 1:4294967295 must not be walked numerically.
                let start = start.max(1);
                let end = end.min(ceiling);
                if start > end {
                    continue;
                }
                out.extend(start..=end);
            }
            None => {
                debug!(token, "skipping malformed sequence-set token");
            }
        }
    }

    out.sort_unstable();
    out.dedup();
    out
}

/// One token: a bare number, `*`, or `a:b`. Returns the inclusive bounds,
/// normalized ascending, or `None` if the token does not parse.
fn parse_token(token: &str, ceiling: u32) -> Option<(u32, u32)> {
    match token.split_once(':') {
        Some((left, right)) => {
            let start = parse_endpoint(left, ceiling)?;
            let end = parse_endpoint(right, ceiling)?;
            Some((start.min(end), start.max(end)))
        }
        None => {
            let value = parse_endpoint(token, ceiling)?;
            Some((value, value))
        }
    }
}

fn parse_endpoint(value: &str, ceiling: u32) -> Option<u32> {
    match value.trim() {
        "*" => Some(ceiling),
        other => other.parse().ok(),
    }
}
