//! The ordered CLI invocation table the resolver walks.
//!
//! The primary `sf` family is tried before the legacy `sfdx` family, and
//! verbose variants before plain ones: verbose output carries the instance
//! URL on older CLI versions that otherwise omit it.

/// One CLI invocation to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// CLI binary
    pub program: &'static str,
    /// Arguments, exec-style
    pub args: Vec<String>,
}

impl Candidate {
    fn new(program: &'static str, args: &[&str]) -> Self {
        Self {
            program,
            args: args.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Invocations that display credentials for one org, in resolution order.
pub fn auth_candidates(target: Option<&str>) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(4);

    for verbose in [true, false] {
        let mut args = vec!["org", "display", "--json"];
        if verbose {
            args.push("--verbose");
        }
        if let Some(target) = target {
            args.push("-o");
            args.push(target);
        }
        candidates.push(Candidate::new("sf", &args));
    }

    for verbose in [true, false] {
        let mut args = vec!["force:org:display", "--json"];
        if verbose {
            args.push("--verbose");
        }
        if let Some(target) = target {
            args.push("-u");
            args.push(target);
        }
        candidates.push(Candidate::new("sfdx", &args));
    }

    candidates
}

/// Invocations that list every authenticated org, in resolution order.
pub fn org_list_candidates() -> Vec<Candidate> {
    vec![
        Candidate::new("sf", &["org", "list", "--json"]),
        Candidate::new("sfdx", &["force:org:list", "--json"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_candidates_order_primary_family_first() {
        let candidates = auth_candidates(None);
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].program, "sf");
        assert_eq!(candidates[1].program, "sf");
        assert_eq!(candidates[2].program, "sfdx");
        assert_eq!(candidates[3].program, "sfdx");
        assert!(candidates[0].args.contains(&"--verbose".to_string()));
        assert!(!candidates[1].args.contains(&"--verbose".to_string()));
    }

    #[test]
    fn test_auth_candidates_carry_target_flags() {
        let candidates = auth_candidates(Some("dev-org"));
        assert_eq!(
            candidates[0].args,
            ["org", "display", "--json", "--verbose", "-o", "dev-org"]
        );
        assert_eq!(
            candidates[2].args,
            ["force:org:display", "--json", "--verbose", "-u", "dev-org"]
        );
    }

    #[test]
    fn test_auth_candidates_without_target_omit_flags() {
        let candidates = auth_candidates(None);
        for candidate in &candidates {
            assert!(!candidate.args.contains(&"-o".to_string()));
            assert!(!candidate.args.contains(&"-u".to_string()));
        }
    }

    #[test]
    fn test_org_list_candidates() {
        let candidates = org_list_candidates();
        assert_eq!(candidates[0].program, "sf");
        assert_eq!(candidates[0].args, ["org", "list", "--json"]);
        assert_eq!(candidates[1].program, "sfdx");
    }
}
