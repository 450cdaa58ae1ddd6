pub mod acl;
pub mod config;
pub mod error;
pub mod ldap;
pub mod metrics;
pub mod panic_handler;

pub use acl::{AclEngine, Decision, Policy, RequestContext, Verdict};
pub use config::Config;
pub use error::{IndexGateError, Result};
pub use ldap::{AuthenticationOutcome, DirectoryClient, DirectoryError, LdapClient};
