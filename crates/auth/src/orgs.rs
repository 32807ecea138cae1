//! Reconciling the CLI's org-list result groupings.
//!
//! `sf org list --json` and its legacy counterpart split orgs across
//! several arrays with overlapping membership and slightly different
//! shapes. This module folds them into one deduplicated, sorted list.

use apexlog_core::OrgItem;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OrgListPayload {
    result: Option<OrgListResult>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OrgListResult {
    #[serde(rename = "nonScratchOrgs", default)]
    non_scratch_orgs: Vec<RawOrg>,
    #[serde(rename = "scratchOrgs", default)]
    scratch_orgs: Vec<RawOrg>,
    #[serde(default)]
    sandboxes: Vec<RawOrg>,
    #[serde(rename = "devHubs", default)]
    dev_hubs: Vec<RawOrg>,
    #[serde(default)]
    other: Vec<RawOrg>,
    #[serde(default)]
    results: Vec<RawOrg>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawOrg {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    alias: Option<String>,
    #[serde(rename = "isDefaultUsername", alias = "is_default_username", default)]
    is_default_username: Option<bool>,
    #[serde(
        rename = "isDefaultDevHubUsername",
        alias = "is_default_dev_hub_username",
        default
    )]
    is_default_dev_hub_username: Option<bool>,
    #[serde(rename = "isScratchOrg", alias = "is_scratch_org", default)]
    is_scratch_org: Option<bool>,
    #[serde(rename = "instanceUrl", alias = "instance_url", default)]
    instance_url: Option<String>,
}

/// Parse CLI stdout into the raw payload; `None` marks the candidate failed.
pub(crate) fn parse_org_list_payload(stdout: &str) -> Option<OrgListPayload> {
    let payload: OrgListPayload = serde_json::from_str(stdout).ok()?;
    payload.result.as_ref()?;
    Some(payload)
}

/// Fold every grouping into one list, deduplicated by username.
///
/// Later sightings of a username fill in fields earlier ones left empty;
/// boolean flags accumulate. Membership in the scratch-orgs grouping marks
/// an org scratch even when its record omits the flag. Sorted default org
/// first, then case-insensitively by alias-or-username.
pub(crate) fn merge_org_groupings(payload: OrgListPayload) -> Vec<OrgItem> {
    let result = payload.result.unwrap_or_default();

    // (grouping, every-member-is-scratch)
    let groupings: [(&[RawOrg], bool); 6] = [
        (&result.non_scratch_orgs, false),
        (&result.scratch_orgs, true),
        (&result.sandboxes, false),
        (&result.dev_hubs, false),
        (&result.other, false),
        (&result.results, false),
    ];

    let mut merged: HashMap<String, OrgItem> = HashMap::new();

    for (grouping, implies_scratch) in groupings {
        for raw in grouping {
            let Some(username) = raw.username.as_ref().filter(|u| !u.is_empty()) else {
                continue;
            };

            let entry = merged
                .entry(username.clone())
                .or_insert_with(|| OrgItem {
                    username: username.clone(),
                    alias: None,
                    is_default_username: false,
                    is_default_dev_hub_username: false,
                    is_scratch_org: false,
                    instance_url: None,
                });

            if entry.alias.is_none() {
                entry.alias = raw.alias.clone().filter(|a| !a.is_empty());
            }
            if entry.instance_url.is_none() {
                entry.instance_url = raw.instance_url.clone().filter(|u| !u.is_empty());
            }
            entry.is_default_username |= raw.is_default_username.unwrap_or(false);
            entry.is_default_dev_hub_username |= raw.is_default_dev_hub_username.unwrap_or(false);
            entry.is_scratch_org |= raw.is_scratch_org.unwrap_or(false) || implies_scratch;
        }
    }

    let mut orgs: Vec<OrgItem> = merged.into_values().collect();
    orgs.sort_by(|a, b| {
        b.is_default_username
            .cmp(&a.is_default_username)
            .then_with(|| {
                a.sort_label()
                    .to_lowercase()
                    .cmp(&b.sort_label().to_lowercase())
            })
    });
    orgs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> Vec<OrgItem> {
        let payload = parse_org_list_payload(&json.to_string()).unwrap();
        merge_org_groupings(payload)
    }

    #[test]
    fn test_non_json_stdout_is_rejected() {
        assert!(parse_org_list_payload("Warning: update available").is_none());
    }

    #[test]
    fn test_missing_result_is_rejected() {
        assert!(parse_org_list_payload(r#"{"status":0}"#).is_none());
    }

    #[test]
    fn test_duplicates_merge_preferring_non_empty_fields() {
        let orgs = parse(serde_json::json!({
            "result": {
                "nonScratchOrgs": [
                    { "username": "dev@corp.example", "alias": "", "instanceUrl": null }
                ],
                "devHubs": [
                    {
                        "username": "dev@corp.example",
                        "alias": "hub",
                        "isDefaultDevHubUsername": true,
                        "instanceUrl": "https://corp.my.salesforce.com"
                    }
                ]
            }
        }));

        assert_eq!(orgs.len(), 1);
        let org = &orgs[0];
        assert_eq!(org.alias.as_deref(), Some("hub"));
        assert_eq!(
            org.instance_url.as_deref(),
            Some("https://corp.my.salesforce.com")
        );
        assert!(org.is_default_dev_hub_username);
        assert!(!org.is_scratch_org);
    }

    #[test]
    fn test_scratch_grouping_implies_scratch_flag() {
        let orgs = parse(serde_json::json!({
            "result": {
                "scratchOrgs": [
                    { "username": "scratch@corp.example" }
                ]
            }
        }));
        assert!(orgs[0].is_scratch_org);
    }

    #[test]
    fn test_default_org_sorts_first_then_alphabetical() {
        let orgs = parse(serde_json::json!({
            "result": {
                "nonScratchOrgs": [
                    { "username": "zeta@corp.example", "alias": "zeta" },
                    { "username": "mid@corp.example", "alias": "Beta" },
                    { "username": "prod@corp.example", "isDefaultUsername": true },
                    { "username": "alpha@corp.example" }
                ]
            }
        }));

        let labels: Vec<&str> = orgs.iter().map(OrgItem::sort_label).collect();
        assert_eq!(
            labels,
            ["prod@corp.example", "alpha@corp.example", "Beta", "zeta"]
        );
    }

    #[test]
    fn test_generic_results_grouping_is_recognized() {
        let orgs = parse(serde_json::json!({
            "result": {
                "results": [
                    { "username": "legacy@corp.example", "is_default_username": true }
                ]
            }
        }));
        assert_eq!(orgs.len(), 1);
        assert!(orgs[0].is_default_username);
    }

    #[test]
    fn test_entries_without_username_are_dropped() {
        let orgs = parse(serde_json::json!({
            "result": {
                "nonScratchOrgs": [
                    { "alias": "nameless" },
                    { "username": "", "alias": "empty" },
                    { "username": "real@corp.example" }
                ]
            }
        }));
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].username, "real@corp.example");
    }
}
