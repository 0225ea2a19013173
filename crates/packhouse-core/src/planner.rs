// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Enumerates the Jobs and dependency edges for a fresh Source, per
//! spec.md §4.2. Pure over already-loaded data: no I/O, no database.

use std::collections::HashMap;

use crate::model::{Arch, Check, ARCH_ALL};

/// An existing Binary, carried in just as much detail as the planner needs:
/// which arch it was built for and its row id, so a binary job can be
/// linked to it without the planner knowing anything else about Binary.
#[derive(Clone, Debug)]
pub struct ExistingBinary {
    pub arch_name: String,
    pub binary_id: i64,
}

pub struct PlannerInput<'a> {
    pub target_arches: &'a [Arch],
    pub affinity: &'a Arch,
    pub checks: &'a [Check],
    pub existing_binaries: &'a [ExistingBinary],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedJob {
    pub check_id: i64,
    pub check_name: String,
    pub arch_id: i64,
    pub arch_name: String,
    pub existing_binary_id: Option<i64>,
    /// Indices into the containing `Vec<PlannedJob>` this job depends on.
    pub depends_on: Vec<usize>,
}

/// Which architecture (if any) will host arch-independent build output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArchIndep {
    None,
    Affinity,
    Dedicated,
}

pub fn plan_jobs(input: &PlannerInput) -> Vec<PlannedJob> {
    let existing_by_arch: HashMap<&str, i64> = input
        .existing_binaries
        .iter()
        .map(|b| (b.arch_name.as_str(), b.binary_id))
        .collect();

    let declares_all = input.target_arches.iter().any(Arch::is_all);
    let all_already_built = existing_by_arch.contains_key(ARCH_ALL);
    let affinity_in_arches = input
        .target_arches
        .iter()
        .any(|a| a.name == input.affinity.name);
    let affinity_already_built = existing_by_arch.contains_key(input.affinity.name.as_str());

    let arch_indep = if declares_all && !all_already_built && affinity_in_arches && !affinity_already_built {
        ArchIndep::Affinity
    } else if declares_all && !all_already_built {
        ArchIndep::Dedicated
    } else {
        ArchIndep::None
    };

    let mut jobs: Vec<PlannedJob> = Vec::new();

    // 1. One job per "source" check, arch `source`, no dependencies.
    let source_arch = input
        .target_arches
        .iter()
        .find(|a| a.is_source())
        .cloned();
    for check in input.checks.iter().filter(|c| c.source) {
        if let Some(arch) = &source_arch {
            jobs.push(PlannedJob {
                check_id: check.id,
                check_name: check.name.clone(),
                arch_id: arch.id,
                arch_name: arch.name.clone(),
                existing_binary_id: None,
                depends_on: Vec::new(),
            });
        }
    }

    // 3. One job per "build" check and real/all arch with no existing binary.
    let mut build_job_index: HashMap<&str, usize> = HashMap::new();
    for check in input.checks.iter().filter(|c| c.build) {
        for arch in input.target_arches.iter().filter(|a| !a.is_source()) {
            if arch.is_all() && !matches!(arch_indep, ArchIndep::Dedicated) {
                continue;
            }
            if existing_by_arch.contains_key(arch.name.as_str()) {
                continue;
            }
            let idx = jobs.len();
            jobs.push(PlannedJob {
                check_id: check.id,
                check_name: check.name.clone(),
                arch_id: arch.id,
                arch_name: arch.name.clone(),
                existing_binary_id: None,
                depends_on: Vec::new(),
            });
            build_job_index.insert(arch.name.as_str(), idx);
        }
    }

    // 4. If indep rides the affinity build, every other arch build depends on it.
    if matches!(arch_indep, ArchIndep::Affinity) {
        if let Some(&indep_idx) = build_job_index.get(input.affinity.name.as_str()) {
            let other_indices: Vec<usize> = build_job_index
                .iter()
                .filter(|(name, _)| **name != input.affinity.name)
                .map(|(_, idx)| *idx)
                .collect();
            for idx in other_indices {
                jobs[idx].depends_on.push(indep_idx);
            }
        }
    }
    let indep_build_idx = match arch_indep {
        ArchIndep::Affinity => build_job_index.get(input.affinity.name.as_str()).copied(),
        ArchIndep::Dedicated => build_job_index.get(ARCH_ALL).copied(),
        ArchIndep::None => None,
    };

    // 5. One job per "binary" check and arch, depending on the matching
    // build job (if any) and the indep build job (if any and distinct).
    for check in input.checks.iter().filter(|c| c.binary) {
        for arch in input.target_arches.iter().filter(|a| !a.is_source()) {
            let mut depends_on = Vec::new();
            if let Some(&build_idx) = build_job_index.get(arch.name.as_str()) {
                depends_on.push(build_idx);
            }
            if let Some(indep_idx) = indep_build_idx {
                if build_job_index.get(arch.name.as_str()) != Some(&indep_idx) {
                    depends_on.push(indep_idx);
                }
            }
            let existing_binary_id = existing_by_arch.get(arch.name.as_str()).copied();
            jobs.push(PlannedJob {
                check_id: check.id,
                check_name: check.name.clone(),
                arch_id: arch.id,
                arch_name: arch.name.clone(),
                existing_binary_id,
                depends_on,
            });
        }
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arch(id: i64, name: &str) -> Arch {
        Arch { id, name: name.to_string() }
    }
    fn check(id: i64, name: &str, source: bool, binary: bool, build: bool) -> Check {
        Check { id, name: name.to_string(), source, binary, build }
    }

    #[test]
    fn scenario_a_indep_rides_affinity() {
        let amd64 = arch(1, "amd64");
        let armhf = arch(2, "armhf");
        let all = arch(3, "all");
        let source = arch(4, "source");
        let target_arches = vec![amd64.clone(), armhf.clone(), all.clone()];
        let checks = vec![check(1, "build", false, false, true)];
        let input = PlannerInput {
            target_arches: &target_arches,
            affinity: &amd64,
            checks: &checks,
            existing_binaries: &[],
        };
        let jobs = plan_jobs(&input);
        let arches: Vec<_> = jobs.iter().map(|j| j.arch_name.as_str()).collect();
        assert_eq!(arches, vec!["amd64", "armhf"]);
        let armhf_job = jobs.iter().find(|j| j.arch_name == "armhf").unwrap();
        let amd64_idx = jobs.iter().position(|j| j.arch_name == "amd64").unwrap();
        assert_eq!(armhf_job.depends_on, vec![amd64_idx]);
        let _ = source;
    }

    #[test]
    fn scenario_b_dedicated_indep_build() {
        let amd64 = arch(1, "amd64");
        let all = arch(3, "all");
        let target_arches = vec![all.clone()];
        let checks = vec![
            check(1, "build", false, false, true),
            check(2, "lintian", false, true, false),
        ];
        let input = PlannerInput {
            target_arches: &target_arches,
            affinity: &amd64,
            checks: &checks,
            existing_binaries: &[],
        };
        let jobs = plan_jobs(&input);
        let build_jobs: Vec<_> = jobs.iter().filter(|j| j.check_name == "build").collect();
        assert_eq!(build_jobs.len(), 1);
        assert_eq!(build_jobs[0].arch_name, "all");
        let binary_job = jobs.iter().find(|j| j.check_name == "lintian").unwrap();
        assert_eq!(binary_job.arch_name, "all");
        assert!(!binary_job.depends_on.is_empty());
    }

    #[test]
    fn binary_jobs_depend_on_build_and_indep() {
        let amd64 = arch(1, "amd64");
        let armhf = arch(2, "armhf");
        let all = arch(3, "all");
        let target_arches = vec![amd64.clone(), armhf.clone(), all.clone()];
        let checks = vec![
            check(1, "build", false, false, true),
            check(2, "lintian", false, true, false),
        ];
        let input = PlannerInput {
            target_arches: &target_arches,
            affinity: &amd64,
            checks: &checks,
            existing_binaries: &[],
        };
        let jobs = plan_jobs(&input);
        let armhf_binary_idx = jobs
            .iter()
            .position(|j| j.check_name == "lintian" && j.arch_name == "armhf")
            .unwrap();
        let armhf_build_idx = jobs
            .iter()
            .position(|j| j.check_name == "build" && j.arch_name == "armhf")
            .unwrap();
        let amd64_build_idx = jobs
            .iter()
            .position(|j| j.check_name == "build" && j.arch_name == "amd64")
            .unwrap();
        let mut deps = jobs[armhf_binary_idx].depends_on.clone();
        deps.sort();
        let mut expected = vec![armhf_build_idx, amd64_build_idx];
        expected.sort();
        assert_eq!(deps, expected);
    }

    #[test]
    fn existing_binary_skips_build_job_but_binary_job_still_created() {
        let amd64 = arch(1, "amd64");
        let target_arches = vec![amd64.clone()];
        let checks = vec![
            check(1, "build", false, false, true),
            check(2, "lintian", false, true, false),
        ];
        let existing = vec![ExistingBinary { arch_name: "amd64".into(), binary_id: 77 }];
        let input = PlannerInput {
            target_arches: &target_arches,
            affinity: &amd64,
            checks: &checks,
            existing_binaries: &existing,
        };
        let jobs = plan_jobs(&input);
        assert!(jobs.iter().all(|j| j.check_name != "build"));
        let binary_job = jobs.iter().find(|j| j.check_name == "lintian").unwrap();
        assert_eq!(binary_job.existing_binary_id, Some(77));
        assert!(binary_job.depends_on.is_empty());
    }
}
