// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Entities for archive topology, principals, and work units, per spec.md §3.

mod binary;
mod check;
mod job;
mod principal;
mod result;
mod source;
mod topology;

pub use binary::{pool_directory_for_section, Binary, Deb};
pub use check::{Check, CheckKind};
pub use job::{Job, JobDependency, JobState};
pub use principal::{Builder, Person, Principal, DISABLED_SENTINEL};
pub use result::{result_directory, CheckResult};
pub use source::{parse_maintainers, Maintainer, Source};
pub use topology::{Arch, Component, Group, GroupSuite, Suite, ARCH_ALL, ARCH_SOURCE};
