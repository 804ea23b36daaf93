// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// The outcome of executing a single user function (hook or case body).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Timeout,
}

impl TestStatus {
    /// `fail > timeout > pass > skip`, as specified for status aggregation.
    fn precedence(self) -> u8 {
        match self {
            Self::Fail => 3,
            Self::Timeout => 2,
            Self::Pass => 1,
            Self::Skip => 0,
        }
    }

    /// Folds `other` into `self`, keeping whichever has higher precedence.
    pub fn combine(self, other: Self) -> Self {
        if other.precedence() > self.precedence() {
            other
        } else {
            self
        }
    }

    /// Folds a sequence of before/after statuses, then folds in `it`'s status
    /// per the special case: an all-pass before/after chain with a skipped
    /// test body yields `skip`, not `pass`.
    pub fn derive(before_after: impl IntoIterator<Item = Self>, it: Self) -> Self {
        let hooks = before_after
            .into_iter()
            .fold(Self::Pass, Self::combine);
        if hooks == Self::Pass && it == Self::Skip {
            Self::Skip
        } else {
            hooks.combine(it)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_dominates_everything() {
        for other in [TestStatus::Pass, TestStatus::Skip, TestStatus::Timeout] {
            assert_eq!(TestStatus::Fail.combine(other), TestStatus::Fail);
            assert_eq!(other.combine(TestStatus::Fail), TestStatus::Fail);
        }
    }

    #[test]
    fn timeout_beats_pass_and_skip_but_not_fail() {
        assert_eq!(TestStatus::Timeout.combine(TestStatus::Pass), TestStatus::Timeout);
        assert_eq!(TestStatus::Timeout.combine(TestStatus::Skip), TestStatus::Timeout);
        assert_eq!(TestStatus::Timeout.combine(TestStatus::Fail), TestStatus::Fail);
    }

    #[test]
    fn clean_skip_is_not_masked_to_pass() {
        let derived = TestStatus::derive([TestStatus::Pass, TestStatus::Pass], TestStatus::Skip);
        assert_eq!(derived, TestStatus::Skip);
    }

    #[test]
    fn skip_test_after_failing_hook_stays_fail() {
        let derived = TestStatus::derive([TestStatus::Fail], TestStatus::Skip);
        assert_eq!(derived, TestStatus::Fail);
    }

    #[test]
    fn all_pass_is_pass() {
        let derived = TestStatus::derive([TestStatus::Pass, TestStatus::Pass], TestStatus::Pass);
        assert_eq!(derived, TestStatus::Pass);
    }
}
