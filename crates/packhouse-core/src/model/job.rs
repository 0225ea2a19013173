// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

use sqlx::FromRow;
use strum::{Display, EnumString};

/// Resolves the Open Question in spec.md §9: several call sites in the
/// original system overload `failed IS NULL` as both "not yet reported" and
/// "ready to be assigned". Here the state is explicit, and `failed` is only
/// meaningful once `state == Reported`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, sqlx::Type)]
#[strum(serialize_all = "snake_case")]
#[sqlx(type_name = "job_state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Assigned,
    Finished,
    Reported,
}

#[derive(Clone, Debug, FromRow)]
pub struct Job {
    pub id: i64,
    pub source_id: i64,
    pub check_id: i64,
    pub arch_id: i64,
    pub binary_id: Option<i64>,
    pub builder_id: Option<i64>,
    pub state: JobState,
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    pub assigned_count: i64,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub failed: Option<bool>,
    pub dose_report: Option<String>,
}

impl Job {
    /// A job may be assigned iff all its prerequisites are complete and it
    /// has not itself already been touched, per the invariant in spec.md §3.
    pub fn is_assignable(&self) -> bool {
        self.state == JobState::Pending
            && self.dose_report.is_none()
            && self.assigned_at.is_none()
            && self.finished_at.is_none()
            && self.failed.is_none()
    }

    /// Whether this build job counts as "successful" for the rerun-refusal
    /// rule in spec.md §4.4: success is defined verbatim as "any built
    /// binary present", not as `failed == false`. Preserved as specified
    /// even though it reads oddly for a job whose `failed` flag disagrees.
    pub fn has_built_binary(&self) -> bool {
        self.binary_id.is_some()
    }

    pub fn conventional_name(&self, check_name: &str, arch_name: &str) -> String {
        format!("{check_name} [{arch_name}]")
    }
}

/// An intra-source "depends-on" edge between two jobs.
#[derive(Clone, Debug, FromRow)]
pub struct JobDependency {
    pub job_id: i64,
    pub depends_on_job_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job() -> Job {
        Job {
            id: 1,
            source_id: 1,
            check_id: 1,
            arch_id: 1,
            binary_id: None,
            builder_id: None,
            state: JobState::Pending,
            assigned_at: None,
            assigned_count: 0,
            finished_at: None,
            failed: None,
            dose_report: None,
        }
    }

    #[test]
    fn pending_untouched_job_is_assignable() {
        assert!(base_job().is_assignable());
    }

    #[test]
    fn assigned_job_is_not_assignable() {
        let job = Job {
            assigned_at: Some(chrono::Utc::now()),
            state: JobState::Assigned,
            ..base_job()
        };
        assert!(!job.is_assignable());
    }

    #[test]
    fn success_predicate_is_built_binary_presence_not_failed_flag() {
        let job = Job {
            failed: Some(true),
            binary_id: Some(9),
            ..base_job()
        };
        assert!(job.has_built_binary());
    }
}
