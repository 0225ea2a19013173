// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

use sqlx::FromRow;

/// A named analysis. The three booleans describe which stages this check
/// applies to: "build" checks are exactly the package-build jobs, "source"
/// checks run once per source on arch `source`, "binary" checks run once
/// per built binary arch.
#[derive(Clone, Debug, FromRow, PartialEq, Eq)]
pub struct Check {
    pub id: i64,
    pub name: String,
    pub source: bool,
    pub binary: bool,
    pub build: bool,
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        if self.build {
            CheckKind::Build
        } else if self.source {
            CheckKind::Source
        } else {
            CheckKind::Binary
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckKind {
    Source,
    Build,
    Binary,
}
