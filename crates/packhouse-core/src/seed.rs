// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Loads the YAML seed the `init-database` CLI reads, per spec.md §6.
//! Grounded on `examples/original_source/debile/master/dimport.py`'s
//! `import_dict`: a flat file naming checks, groups, and the suites each
//! group builds for, applied idempotently so rerunning the seed against an
//! already-initialized archive is a no-op.

use serde::Deserialize;
use sqlx::PgPool;

use crate::db;
use crate::Result;

#[derive(Clone, Debug, Deserialize)]
pub struct SeedCheck {
    pub name: String,
    #[serde(default)]
    pub source: bool,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub build: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SeedGroupSuite {
    pub suite: String,
    pub components: Vec<String>,
    pub architectures: Vec<String>,
    pub checks: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SeedGroup {
    pub name: String,
    pub suites: Vec<SeedGroupSuite>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub checks: Vec<SeedCheck>,
    pub groups: Vec<SeedGroup>,
}

impl Seed {
    pub fn from_yaml(text: &str) -> Result<Seed> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Apply a seed to the database, creating or updating every named group,
/// suite, component, architecture, and check, and wiring up each group's
/// (suite × component × architecture × check) enablement.
pub async fn apply(pool: &PgPool, seed: &Seed) -> Result<()> {
    let mut conn = pool.acquire().await?;

    for check in &seed.checks {
        db::upsert_check(&mut conn, &check.name, check.source, check.binary, check.build).await?;
    }

    for group in &seed.groups {
        let group_id = db::upsert_group(&mut conn, &group.name).await?;
        for gs in &group.suites {
            let suite_id = db::upsert_suite(&mut conn, &gs.suite).await?;
            let group_suite_id = db::upsert_group_suite(&mut conn, group_id, suite_id).await?;

            for component in &gs.components {
                let component_id = db::upsert_component(&mut conn, component).await?;
                db::add_group_suite_component(&mut conn, group_suite_id, component_id).await?;
            }
            for arch in &gs.architectures {
                let arch_id = db::upsert_arch(&mut conn, arch).await?;
                db::add_group_suite_arch(&mut conn, group_suite_id, arch_id).await?;
            }
            for check_name in &gs.checks {
                let check = db::find_check_by_name(&mut conn, check_name)
                    .await?
                    .ok_or_else(|| crate::Error::String(format!(
                        "seed: group '{}' suite '{}' references undeclared check '{check_name}'",
                        group.name, gs.suite,
                    )))?;
                db::add_group_suite_check(&mut conn, group_suite_id, check.id).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_seed() {
        let text = "\
checks:
  - name: build
    build: true
  - name: lintian
    binary: true
groups:
  - name: default
    suites:
      - suite: unstable
        components: [main]
        architectures: [amd64, arm64, all, source]
        checks: [lintian]
";
        let seed = Seed::from_yaml(text).unwrap();
        assert_eq!(seed.checks.len(), 2);
        assert_eq!(seed.groups.len(), 1);
        assert_eq!(seed.groups[0].suites[0].architectures.len(), 4);
    }
}
