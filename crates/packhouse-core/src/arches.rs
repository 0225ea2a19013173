// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Architecture wildcard matching and affinity selection, per spec.md §4.1.
//! Grounded on `examples/original_source/debile/master/arches.py`.

use crate::model::{Arch, ARCH_ALL, ARCH_SOURCE};
use crate::Error;

/// An oracle for the fallback case in [`matches`]: arch/alias pairs that
/// are not covered by the pseudo-arch and `*-any` rules (e.g. `armhf`
/// matching `arm`) are delegated to whatever knows the real Debian
/// architecture table, typically a `dpkg-architecture` invocation.
pub trait ArchOracle {
    fn matches(&self, arch: &str, alias: &str) -> bool;
}

/// An oracle that only ever knows exact matches; suitable for tests and for
/// suites that never rely on anything beyond the `any`/`linux-any`/`<os>-any`
/// rules.
pub struct NoFallbackOracle;

impl ArchOracle for NoFallbackOracle {
    fn matches(&self, _arch: &str, _alias: &str) -> bool {
        false
    }
}

/// Check if architecture `arch` matches wildcard `alias`.
pub fn matches(arch: &str, alias: &str, oracle: &dyn ArchOracle) -> bool {
    if arch == alias {
        return true;
    }
    if arch == ARCH_ALL || arch == ARCH_SOURCE {
        // Pseudo-arches match only themselves.
        return false;
    }
    if alias == "any" {
        return true;
    }
    if alias == "linux-any" {
        return !arch.contains('-') || arch.split('-').any(|tok| tok == "linux");
    }
    if let Some(os) = alias.strip_suffix("-any") {
        return arch.split('-').any(|tok| tok == os);
    }
    oracle.matches(arch, alias)
}

/// For every suite arch, include it iff any token in the dsc list matches.
pub fn source_arches(dsc_arch_list: &[String], suite_arches: &[Arch], oracle: &dyn ArchOracle) -> Vec<Arch> {
    suite_arches
        .iter()
        .filter(|arch| dsc_arch_list.iter().any(|alias| matches(&arch.name, alias, oracle)))
        .cloned()
        .collect()
}

/// Select the machine type that will compile arch:all binaries: the first
/// entry of `preference_list` that both appears in `candidate_arches` and
/// matches at least one token in `valid_affinity_tokens`.
pub fn preferred_affinity(
    preference_list: &[String],
    valid_affinity_tokens: &[String],
    candidate_arches: &[Arch],
    oracle: &dyn ArchOracle,
) -> crate::Result<Arch> {
    for preference in preference_list {
        let Some(arch) = candidate_arches.iter().find(|a| &a.name == preference) else {
            continue;
        };
        if valid_affinity_tokens
            .iter()
            .any(|token| matches(preference, token, oracle))
        {
            return Ok(arch.clone());
        }
    }
    Err(Error::NoValidAffinity {
        preferences: preference_list.to_vec(),
        valid: valid_affinity_tokens.to_vec(),
        arches: candidate_arches.iter().map(|a| a.name.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn arch(id: i64, name: &str) -> Arch {
        Arch { id, name: name.to_string() }
    }

    #[rstest]
    #[case("all", "all", true)]
    #[case("all", "any", false)]
    #[case("source", "source", true)]
    #[case("source", "any", false)]
    #[case("amd64", "any", true)]
    #[case("amd64", "linux-any", true)]
    #[case("hurd-i386", "linux-any", false)]
    #[case("hurd-i386", "hurd-any", true)]
    #[case("armhf", "any", true)]
    #[case("amd64", "amd64", true)]
    #[case("amd64", "armhf", false)]
    fn matches_rules(#[case] arch: &str, #[case] alias: &str, #[case] expected: bool) {
        assert_eq!(matches(arch, alias, &NoFallbackOracle), expected);
    }

    #[test]
    fn scenario_a_source_arches_any_all() {
        let suite_arches = vec![arch(1, "amd64"), arch(2, "armhf"), arch(3, "all"), arch(4, "source")];
        let dsc = vec!["any".to_string(), "all".to_string()];
        let got = source_arches(&dsc, &suite_arches, &NoFallbackOracle);
        let names: Vec<_> = got.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["amd64", "armhf", "all"]);
    }

    #[test]
    fn scenario_b_source_arches_all_only() {
        let suite_arches = vec![arch(1, "amd64"), arch(2, "armhf"), arch(3, "all"), arch(4, "source")];
        let dsc = vec!["all".to_string()];
        let got = source_arches(&dsc, &suite_arches, &NoFallbackOracle);
        let names: Vec<_> = got.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["all"]);
    }

    #[test]
    fn preferred_affinity_picks_first_matching_preference() {
        let candidates = vec![arch(1, "amd64"), arch(2, "armhf")];
        let affinity = preferred_affinity(
            &["amd64".to_string(), "armhf".to_string()],
            &["any".to_string()],
            &candidates,
            &NoFallbackOracle,
        )
        .unwrap();
        assert_eq!(affinity.name, "amd64");
    }

    #[test]
    fn preferred_affinity_raises_when_nothing_matches() {
        let candidates = vec![arch(1, "armhf")];
        let err = preferred_affinity(
            &["amd64".to_string()],
            &["any".to_string()],
            &candidates,
            &NoFallbackOracle,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoValidAffinity { .. }));
    }
}
