// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Prefix tree of realized SCPI commands, shared by the completion
/// front-ends.
pub mod node;
/// Expansion of the compact `:SYSTem:HELP:HEADers?` grammar.
pub mod parser;
