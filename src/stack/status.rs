//! Terminal classification of stack statuses.

use std::fmt;

/// Stack status as reported by `CloudFormation`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StackStatus {
    /// `CREATE_IN_PROGRESS`
    CreateInProgress,
    /// `CREATE_COMPLETE`
    CreateComplete,
    /// `CREATE_FAILED`
    CreateFailed,
    /// `ROLLBACK_IN_PROGRESS`
    RollbackInProgress,
    /// `ROLLBACK_COMPLETE`
    RollbackComplete,
    /// `ROLLBACK_FAILED`
    RollbackFailed,
    /// `UPDATE_IN_PROGRESS`
    UpdateInProgress,
    /// `UPDATE_COMPLETE_CLEANUP_IN_PROGRESS`
    UpdateCompleteCleanupInProgress,
    /// `UPDATE_COMPLETE`
    UpdateComplete,
    /// `UPDATE_FAILED`
    UpdateFailed,
    /// `UPDATE_ROLLBACK_IN_PROGRESS`
    UpdateRollbackInProgress,
    /// `UPDATE_ROLLBACK_COMPLETE`
    UpdateRollbackComplete,
    /// `UPDATE_ROLLBACK_FAILED`
    UpdateRollbackFailed,
    /// `DELETE_IN_PROGRESS`
    DeleteInProgress,
    /// `DELETE_COMPLETE`
    DeleteComplete,
    /// `DELETE_FAILED`
    DeleteFailed,
    /// `IMPORT_COMPLETE`
    ImportComplete,
    /// `IMPORT_ROLLBACK_COMPLETE`
    ImportRollbackComplete,
    /// `IMPORT_ROLLBACK_FAILED`
    ImportRollbackFailed,
    /// Any status this crate does not name; treated as still in progress.
    Other(String),
}

/// Coarse classification used by the poll loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Terminal {
    /// Still transitioning.
    Pending,
    /// Finished successfully.
    Success,
    /// Finished in a failure or rollback state.
    Failure,
}

impl StackStatus {
    /// Classifies the status for polling.
    #[must_use]
    pub const fn terminal(&self) -> Terminal {
        match self {
            Self::CreateComplete
            | Self::UpdateComplete
            | Self::DeleteComplete
            | Self::ImportComplete => Terminal::Success,
            Self::CreateFailed
            | Self::RollbackComplete
            | Self::RollbackFailed
            | Self::UpdateFailed
            | Self::UpdateRollbackComplete
            | Self::UpdateRollbackFailed
            | Self::DeleteFailed
            | Self::ImportRollbackComplete
            | Self::ImportRollbackFailed => Terminal::Failure,
            Self::CreateInProgress
            | Self::RollbackInProgress
            | Self::UpdateInProgress
            | Self::UpdateCompleteCleanupInProgress
            | Self::UpdateRollbackInProgress
            | Self::DeleteInProgress
            | Self::Other(_) => Terminal::Pending,
        }
    }

    /// Parses a provider status string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "CREATE_FAILED" => Self::CreateFailed,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "ROLLBACK_FAILED" => Self::RollbackFailed,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => Self::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => Self::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_COMPLETE" => Self::UpdateRollbackComplete,
            "UPDATE_ROLLBACK_FAILED" => Self::UpdateRollbackFailed,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "DELETE_FAILED" => Self::DeleteFailed,
            "IMPORT_COMPLETE" => Self::ImportComplete,
            "IMPORT_ROLLBACK_COMPLETE" => Self::ImportRollbackComplete,
            "IMPORT_ROLLBACK_FAILED" => Self::ImportRollbackFailed,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Provider spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::CreateFailed => "CREATE_FAILED",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::ImportComplete => "IMPORT_COMPLETE",
            Self::ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
            Self::ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CREATE_COMPLETE", Terminal::Success)]
    #[case("UPDATE_COMPLETE", Terminal::Success)]
    #[case("DELETE_COMPLETE", Terminal::Success)]
    #[case("ROLLBACK_COMPLETE", Terminal::Failure)]
    #[case("UPDATE_ROLLBACK_COMPLETE", Terminal::Failure)]
    #[case("DELETE_FAILED", Terminal::Failure)]
    #[case("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS", Terminal::Pending)]
    #[case("REVIEW_IN_PROGRESS", Terminal::Pending)]
    fn classifies_provider_statuses(#[case] raw: &str, #[case] expected: Terminal) {
        let status = StackStatus::parse(raw);
        assert_eq!(status.terminal(), expected);
        assert_eq!(status.as_str(), raw);
    }
}
