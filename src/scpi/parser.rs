// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Expands the compact header definitions returned by
//! `:SYSTem:HELP:HEADers?` into every realizable command and inserts them
//! into a [`ScpiNode`] tree.
//!
//! The grammar packs several constructs into one line:
//!
//! ```text
//! [:SOURce]:FREQuency[:CW]          optional segments, 2^k expansions
//! :OUTPut{1:2}[:STATe]              numeric suffix range on a segment
//! Hello|Goodbye:My:Friend|Love      alternation at a segment position
//! :ABORt/nquery/                    command-only (no query form)
//! :SYSTem:ERRor?/qonly/             query-only
//! ```
//!
//! A line with no trailing marker emits both the command form and the
//! query form (`?` appended to the last segment). Suffix ranges are first
//! rewritten to an `@N#M` marker so segment splitting on `:` stays
//! unambiguous, then branched into one command per suffix value; the tree
//! merges the branches back into a single suffixed node spanning the
//! union of the values.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::scpi::node::{NodeInfo, ScpiNode};

/// A suffix position held something other than the expected digits. This
/// is the only fatal condition in the grammar; everything else is
/// tolerated or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse suffix in {line:?}")]
pub struct SuffixParseError {
    pub line: String,
}

static SUFFIX_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([0-9]):([0-9][0-9]?)\}").expect("suffix range pattern is valid")
});

static SUFFIX_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([0-9][0-9]?)\}").expect("suffix pattern is valid"));

/// A bare 1- or 2-digit number right before a `:`, not already part of a
/// rewritten marker.
static SUFFIX_IRREGULAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\d#@](\d{1,2}):").expect("irregular suffix pattern is valid")
});

static SUFFIX_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\d{1,2})#(\d{1,2})").expect("marker pattern is valid"));

/// Parses a batch of header lines into one tree. Empty lines are skipped.
pub fn parse_scpi<'a, I>(lines: I) -> Result<ScpiNode, SuffixParseError>
where I: IntoIterator<Item = &'a str> {
    let mut root = ScpiNode::default();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        for command in expand_line(line)? {
            root.insert_command(&command);
        }
    }
    Ok(root)
}

/// Expands one header line into every command it denotes.
pub fn expand_line(line: &str) -> Result<Vec<Vec<NodeInfo>>, SuffixParseError> {
    let stripped = line.replace('[', "");
    let stripped = stripped.trim_start_matches(':');
    let rewritten = reformat_irregular_suffixes(&reformat_suffixes(stripped));

    let segments: Vec<String> = rewritten.split(':').map(str::to_string).collect();
    let optionals = optional_indexes(&segments);
    let variants = expand_optionals(strip_closing_brackets(segments), &optionals);
    let variants = expand_queries(variants);
    let variants = expand_alternations(variants);

    let mut commands = Vec::with_capacity(variants.len());
    for variant in variants {
        commands.extend(branch_suffixes(variant, line)?);
    }
    Ok(commands)
}

/// Splits a raw headers payload into star-command and colon-command lines,
/// dropping blanks.
pub fn split_headers(payload: &str) -> (Vec<&str>, Vec<&str>) {
    let mut star = Vec::new();
    let mut colon = Vec::new();
    for line in payload.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with('*') {
            star.push(line);
        } else {
            colon.push(line);
        }
    }
    (star, colon)
}

/// Rewrites `{N:M}` (and `{N}`, read as `{N:N}`) into the `@N#M` marker so
/// no `:` or brace survives inside a suffix.
fn reformat_suffixes(s: &str) -> String {
    if let Some(caps) = SUFFIX_RANGE.captures(s) {
        let whole = caps.get(0).expect("capture 0 always present");
        let rewritten = format!(
            "{}@{}#{}{}",
            &s[..whole.start()],
            &caps[1],
            &caps[2],
            &s[whole.end()..]
        );
        return reformat_suffixes(&rewritten);
    }
    if let Some(caps) = SUFFIX_SINGLE.captures(s) {
        let whole = caps.get(0).expect("capture 0 always present");
        let value = &caps[1];
        let rewritten = format!(
            "{}@{value}#{value}{}",
            &s[..whole.start()],
            &s[whole.end()..]
        );
        return reformat_suffixes(&rewritten);
    }
    s.to_string()
}

/// Some instruments expose both `RAD1:` and `RAD{1:1}:` for the same
/// subtree. Rewriting the bare form through the same marker keeps the two
/// spellings on one suffixed node instead of growing a spurious sibling.
fn reformat_irregular_suffixes(s: &str) -> String {
    if let Some(caps) = SUFFIX_IRREGULAR.captures(s) {
        let digits = caps.get(1).expect("digit group always present");
        let value = digits.as_str();
        let rewritten = format!(
            "{}@{value}#{value}{}",
            &s[..digits.start()],
            &s[digits.end()..]
        );
        return reformat_irregular_suffixes(&rewritten);
    }
    s.to_string()
}

/// Indexes of the segments still carrying the optional sentinel `]`.
fn optional_indexes(segments: &[String]) -> Vec<usize> {
    segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| segment.contains(']'))
        .map(|(index, _)| index)
        .collect()
}

fn strip_closing_brackets(segments: Vec<String>) -> Vec<String> {
    segments
        .into_iter()
        .map(|segment| segment.replace(']', ""))
        .collect()
}

/// All 2^k subsets of a command's optional segments: the all-present
/// variant first, then progressively removed left to right.
fn expand_optionals(command: Vec<String>, optionals: &[usize]) -> Vec<Vec<String>> {
    let mut variants = vec![command.clone()];
    for (position, &index) in optionals.iter().enumerate() {
        let shortened = delete_segment_keeping_query_marker(&command, index);
        let remaining: Vec<usize> = optionals[position + 1..]
            .iter()
            .map(|&later| later - 1)
            .collect();
        variants.extend(expand_optionals(shortened, &remaining));
    }
    variants
}

/// Deletes one segment; when it is the last segment and carries a
/// query/no-query marker, the marker migrates to the preceding segment so
/// the command's query policy survives the removal.
fn delete_segment_keeping_query_marker(command: &[String], index: usize) -> Vec<String> {
    let mut shortened = command.to_vec();
    if index == shortened.len() - 1 && index > 0 {
        if shortened[index].ends_with("/nquery/") {
            shortened[index - 1].push_str("/nquery/");
        } else if shortened[index].ends_with("?/qonly/") {
            shortened[index - 1].push_str("?/qonly/");
        }
    }
    shortened.remove(index);
    shortened
}

/// Applies the trailing marker of the last segment: `?/qonly/` keeps only
/// the query form, `/nquery/` only the command form, and an unmarked
/// command emits both.
fn expand_queries(commands: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut result = Vec::with_capacity(commands.len() * 2);
    for mut command in commands {
        let Some(last) = command.len().checked_sub(1) else {
            continue;
        };
        if command[last].contains("?/qonly/") {
            command[last] = command[last].replace("?/qonly/", "?");
            result.push(command);
        } else if command[last].contains("/nquery/") {
            command[last] = command[last].replace("/nquery/", "");
            result.push(command);
        } else {
            let mut query = command.clone();
            query[last].push('?');
            result.push(command);
            result.push(query);
        }
    }
    result
}

fn expand_alternations(commands: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut result = Vec::with_capacity(commands.len());
    for command in commands {
        let bar_indexes: Vec<usize> = command
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.contains('|'))
            .map(|(index, _)| index)
            .collect();
        result.extend(extract_bar_commands(command, &bar_indexes));
    }
    result
}

/// Depth-first expansion of `A|B` segments. A `?` on either alternative is
/// copied to the other so both expansions stay consistently commands or
/// consistently queries.
fn extract_bar_commands(command: Vec<String>, bar_indexes: &[usize]) -> Vec<Vec<String>> {
    let Some((&first, rest)) = bar_indexes.split_first() else {
        return vec![command];
    };

    let mut parts = command[first].split('|');
    let mut left = parts.next().unwrap_or_default().to_string();
    let mut right = parts.next().unwrap_or_default().to_string();
    if left.ends_with('?') && !right.ends_with('?') {
        right.push('?');
    }
    if right.ends_with('?') && !left.ends_with('?') {
        left.push('?');
    }

    let mut result = Vec::new();
    for option in [left, right] {
        let mut replaced = command.clone();
        replaced[first] = option;
        result.extend(extract_bar_commands(replaced, rest));
    }
    result
}

/// Turns the `@N#M` markers into node infos, branching the command into
/// one variant per suffix value. The tree insert later merges the
/// branches back into a single node spanning `N..=M`.
fn branch_suffixes(
    command: Vec<String>,
    line: &str,
) -> Result<Vec<Vec<NodeInfo>>, SuffixParseError> {
    let mut variants: Vec<Vec<NodeInfo>> = vec![Vec::with_capacity(command.len())];
    for segment in command {
        let branches = segment_branches(&segment, line)?;
        let mut extended = Vec::with_capacity(variants.len() * branches.len());
        for variant in &variants {
            for branch in &branches {
                let mut longer = variant.clone();
                longer.push(branch.clone());
                extended.push(longer);
            }
        }
        variants = extended;
    }
    Ok(variants)
}

fn segment_branches(segment: &str, line: &str) -> Result<Vec<NodeInfo>, SuffixParseError> {
    let Some(caps) = SUFFIX_MARKER.captures(segment) else {
        return Ok(vec![NodeInfo::plain(segment)]);
    };
    let whole = caps.get(0).expect("capture 0 always present");

    let start = parse_suffix(&caps[1], line)?;
    let stop = parse_suffix(&caps[2], line)?.max(start);
    let mut text = segment[..whole.start()].to_string();
    if segment.ends_with('?') {
        text.push('?');
    }

    Ok((start..=stop)
        .map(|value| NodeInfo::suffixed(text.clone(), value, value))
        .collect())
}

fn parse_suffix(digits: &str, line: &str) -> Result<u32, SuffixParseError> {
    digits.parse().map_err(|_| SuffixParseError {
        line: line.to_string(),
    })
}
