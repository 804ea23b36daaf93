// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// An author-declared annotation on a suite or case.
///
/// A node marked [`TestMark::Only`] anywhere in a tree forces the whole run
/// into only-mode; see the execution engine for the filtering rules.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestMark {
    #[default]
    None,
    Skip,
    Only,
}

impl TestMark {
    pub fn is_only(self) -> bool {
        matches!(self, Self::Only)
    }

    pub fn is_skip(self) -> bool {
        matches!(self, Self::Skip)
    }
}
