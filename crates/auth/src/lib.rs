//! Org credential resolution through the `sf`/`sfdx` CLI.
//!
//! This crate never stores credentials; it shells out to the locally
//! installed Salesforce CLI through the deduplicating executor, walking an
//! ordered candidate table across both CLI families and recovering the
//! PATH from the user's login shell when every candidate's binary is
//! missing.

pub mod candidates;
mod orgs;
pub mod resolver;

pub use candidates::{Candidate, auth_candidates, org_list_candidates};
pub use resolver::CredentialResolver;
