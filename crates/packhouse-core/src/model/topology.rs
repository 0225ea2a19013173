// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! The simple named entities that describe archive topology: groups,
//! suites, components, and architectures, plus the (Group × Suite) cross
//! product that carries what is enabled for a given combination.

use sqlx::FromRow;

use crate::config::{ArchiveResolver, ResolvedGroupPaths};

#[derive(Clone, Debug, FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

impl Group {
    /// Resolve this group's pool and file-area locations using the
    /// operator's configured resolver. Named resolvers are a pluggable
    /// extension point the embedding application registers; this crate
    /// only implements the templated form directly.
    pub fn resolve(&self, archive: &ArchiveResolver) -> crate::Result<ResolvedGroupPaths> {
        match archive {
            ArchiveResolver::Templated(t) => Ok(t.resolve(&self.name, self.id)),
            ArchiveResolver::Named { resolver } => Err(crate::Error::String(format!(
                "named archive resolver '{resolver}' is not implemented by this build"
            ))),
        }
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct Suite {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, FromRow)]
pub struct Component {
    pub id: i64,
    pub name: String,
}

/// Reserved pseudo-architecture names. `source` denotes sourceful work,
/// `all` denotes arch-independent binary work; anything else is a real
/// architecture such as `amd64`.
pub const ARCH_SOURCE: &str = "source";
pub const ARCH_ALL: &str = "all";

#[derive(Clone, Debug, FromRow, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Arch {
    pub id: i64,
    pub name: String,
}

impl Arch {
    pub fn is_source(&self) -> bool {
        self.name == ARCH_SOURCE
    }
    pub fn is_all(&self) -> bool {
        self.name == ARCH_ALL
    }
    pub fn is_real(&self) -> bool {
        !self.is_source() && !self.is_all()
    }
}

/// The (Group × Suite) cross product: the set of components, architectures,
/// and checks enabled for this combination.
#[derive(Clone, Debug, FromRow)]
pub struct GroupSuite {
    pub id: i64,
    pub group_id: i64,
    pub suite_id: i64,
}
