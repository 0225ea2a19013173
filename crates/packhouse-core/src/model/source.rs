// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

use sqlx::FromRow;

#[derive(Clone, Debug, FromRow)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub group_suite_id: i64,
    pub component_id: i64,
    pub affinity_arch_id: i64,
    pub uploader_id: i64,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
    pub directory: Option<String>,
    pub dsc_filename: Option<String>,
}

#[derive(Clone, Debug, FromRow)]
pub struct Maintainer {
    pub id: i64,
    pub source_id: i64,
    pub name: String,
    pub email: String,
    pub comaintainer: bool,
}

/// Parses the `Maintainer`, `XSBC-Original-Maintainer`, and comma-separated
/// `Uploaders` control fields into the maintainer rows a newly accepted
/// source should own. The primary maintainer is the `Maintainer` field
/// (falling back to `XSBC-Original-Maintainer` if absent, as dpkg-source
/// itself does when a source has been machine-repackaged); everyone named
/// in `Uploaders` is recorded as a co-maintainer.
pub fn parse_maintainers(
    maintainer: Option<&str>,
    xsbc_original_maintainer: Option<&str>,
    uploaders: Option<&str>,
) -> Vec<(String, String, bool)> {
    let mut out = Vec::new();
    if let Some((name, email)) = maintainer
        .or(xsbc_original_maintainer)
        .and_then(split_name_email)
    {
        out.push((name, email, false));
    }
    if let Some(uploaders) = uploaders {
        for entry in uploaders.split(',') {
            if let Some((name, email)) = split_name_email(entry) {
                out.push((name, email, true));
            }
        }
    }
    out
}

fn split_name_email(raw: &str) -> Option<(String, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (name, email) = match (raw.find('<'), raw.find('>')) {
        (Some(open), Some(close)) if open < close => {
            (raw[..open].trim().to_string(), raw[open + 1..close].to_string())
        }
        _ => (raw.to_string(), String::new()),
    };
    Some((name, email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_maintainer_and_uploaders() {
        let parsed = parse_maintainers(
            Some("Jane Maintainer <jane@example.org>"),
            None,
            Some("Bob One <bob@example.org>, Carol Two <carol@example.org>"),
        );
        assert_eq!(
            parsed,
            vec![
                ("Jane Maintainer".to_string(), "jane@example.org".to_string(), false),
                ("Bob One".to_string(), "bob@example.org".to_string(), true),
                ("Carol Two".to_string(), "carol@example.org".to_string(), true),
            ]
        );
    }

    #[test]
    fn falls_back_to_xsbc_original_maintainer() {
        let parsed = parse_maintainers(
            None,
            Some("Repack Bot <repack@example.org>"),
            None,
        );
        assert_eq!(
            parsed,
            vec![("Repack Bot".to_string(), "repack@example.org".to_string(), false)]
        );
    }
}
