//! LDAP client built on `ldap3`.
//!
//! Every operation opens its own connection, walks it through the
//! DISCONNECTED -> CONNECTING -> CONNECTED -> BOUND/BIND_FAILED -> CLOSED
//! states and closes it before returning. A session dropped half-way (request
//! timeout, caller cancellation, panic) aborts its connection driver, so no
//! socket outlives the operation that opened it.

use super::{dn, AuthenticationOutcome, DirectoryClient, DirectoryError, LdifEntry, LdifReader};
use crate::config::LdapConnectorConfig;
use crate::error::Result;

use async_trait::async_trait;
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Scope, SearchResult};
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, trace, warn};

/// Lifecycle of a single directory connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Bound,
    BindFailed,
    Closed,
}

/// Non-zero result codes become [`DirectoryError::OperationFailed`].
fn refused(operation: &str, result: LdapResult) -> std::result::Result<(), DirectoryError> {
    if result.rc == 0 {
        return Ok(());
    }
    Err(DirectoryError::OperationFailed {
        operation: operation.to_string(),
        code: result.rc,
        message: result.text,
    })
}

/// LDAP connector used by `ldap_auth` rules.
#[derive(Debug, Clone)]
pub struct LdapClient {
    config: LdapConnectorConfig,
    url: String,
}

/// A connection scoped to one directory operation.
struct LdapSession {
    ldap: Ldap,
    driver: JoinHandle<()>,
    state: ConnectionState,
}

impl LdapSession {
    fn transition(&mut self, next: ConnectionState) {
        trace!("LDAP connection {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn bind(&mut self, bind_dn: &str, password: &str) -> std::result::Result<(), DirectoryError> {
        let result = self
            .ldap
            .simple_bind(bind_dn, password)
            .await
            .map_err(|e| DirectoryError::Protocol(e.to_string()))?;

        if result.rc == 0 {
            self.transition(ConnectionState::Bound);
            Ok(())
        } else {
            self.transition(ConnectionState::BindFailed);
            Err(DirectoryError::BindFailed { code: result.rc })
        }
    }

    async fn close(mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!("LDAP unbind failed: {}", e);
        }
        self.transition(ConnectionState::Closed);
    }
}

impl Drop for LdapSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl LdapClient {
    pub fn new(config: LdapConnectorConfig) -> Self {
        let scheme = if config.ssl_enabled { "ldaps" } else { "ldap" };
        let url = format!("{}://{}:{}", scheme, config.host, config.port);
        Self { config, url }
    }

    pub fn config(&self) -> &LdapConnectorConfig {
        &self.config
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect, retrying at a fixed interval until `window` has elapsed.
    async fn connect(&self, window: Duration) -> std::result::Result<LdapSession, DirectoryError> {
        let connect_timeout = self.config.connect_timeout();
        let retry_interval = self.config.retry_interval();
        let deadline = Instant::now() + window;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            trace!("LDAP connection {:?} -> {:?}", ConnectionState::Disconnected, ConnectionState::Connecting);

            let settings = LdapConnSettings::new().set_conn_timeout(connect_timeout);
            let reason = match timeout(connect_timeout, LdapConnAsync::with_settings(settings, &self.url)).await {
                Ok(Ok((conn, ldap))) => {
                    let driver = tokio::spawn(async move {
                        if let Err(e) = conn.drive().await {
                            debug!("LDAP connection driver stopped: {}", e);
                        }
                    });
                    debug!("Connected to {} on attempt {}", self.url, attempt);
                    let mut session = LdapSession {
                        ldap,
                        driver,
                        state: ConnectionState::Connecting,
                    };
                    session.transition(ConnectionState::Connected);
                    return Ok(session);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("connect timed out after {:?}", connect_timeout),
            };

            if Instant::now() + retry_interval >= deadline {
                warn!(
                    "Cannot connect to LDAP {} after {} attempt(s): {}",
                    self.url, attempt, reason
                );
                return Err(DirectoryError::ConnectionFailure {
                    address: self.url.clone(),
                    reason,
                });
            }

            debug!("LDAP connection attempt {} to {} failed: {}", attempt, self.url, reason);
            sleep(retry_interval).await;
        }
    }

    async fn bind_once(&self, bind_dn: &str, password: &str) -> std::result::Result<(), DirectoryError> {
        let mut session = self.connect(self.config.connect_retry_window()).await?;
        let result = session.bind(bind_dn, password).await;
        session.close().await;
        result
    }

    async fn membership_once(&self, user_dn: &str, group: &str) -> std::result::Result<bool, DirectoryError> {
        let mut session = self.connect(self.config.connect_retry_window()).await?;

        let result: std::result::Result<bool, DirectoryError> = async {
            if let Some(service_dn) = &self.config.bind_dn {
                let password = self.config.bind_password.as_deref().unwrap_or_default();
                session.bind(service_dn, password).await?;
            }

            let filter = format!(
                "(&(cn={})({}={}))",
                ldap_escape(group),
                self.config.unique_member_attribute,
                ldap_escape(user_dn)
            );
            let SearchResult(entries, done) = session
                .ldap
                .search(&self.config.search_groups_base_dn, Scope::Subtree, &filter, vec!["cn"])
                .await
                .map_err(|e| DirectoryError::Protocol(e.to_string()))?;
            refused("search", done)?;

            Ok(!entries.is_empty())
        }
        .await;

        session.close().await;
        result
    }

    async fn bounded<T, F>(&self, operation: F) -> std::result::Result<T, DirectoryError>
    where
        F: std::future::Future<Output = std::result::Result<T, DirectoryError>>,
    {
        let budget = self.config.request_timeout();
        timeout(budget, operation).await.unwrap_or_else(|_| {
            Err(DirectoryError::Timeout {
                elapsed_ms: budget.as_millis() as u64,
            })
        })
    }

    /// Wait for the directory to accept connections, retrying until
    /// `startup_timeout` has elapsed.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn wait_until_ready(&self, startup_timeout: Duration) -> std::result::Result<(), DirectoryError> {
        info!("Waiting for LDAP {} ...", self.url);
        let session = self.connect(startup_timeout).await?;
        session.close().await;
        info!("LDAP {} is reachable", self.url);
        Ok(())
    }

    /// Health probe: SUCCESS when a connection can be opened.
    pub async fn probe(&self) -> AuthenticationOutcome {
        match self.wait_until_ready(self.config.connect_retry_window()).await {
            Ok(()) => AuthenticationOutcome::Success,
            Err(e) => AuthenticationOutcome::from(&e),
        }
    }

    /// Bind as `admin_dn` and add every entry. Returns the number of entries added.
    #[instrument(skip(self, admin_password, entries), fields(url = %self.url, count = entries.len()))]
    pub async fn import_entries(
        &self,
        admin_dn: &str,
        admin_password: &str,
        entries: &[LdifEntry],
    ) -> std::result::Result<usize, DirectoryError> {
        let mut session = self.connect(self.config.connect_retry_window()).await?;

        let result: std::result::Result<usize, DirectoryError> = async {
            session.bind(admin_dn, admin_password).await?;
            let mut added = 0;
            for entry in entries {
                let result = session
                    .ldap
                    .add(&entry.dn, entry.to_add_attributes())
                    .await
                    .map_err(|e| DirectoryError::Protocol(format!("cannot add '{}': {}", entry.dn, e)))?;
                refused(&format!("add of '{}'", entry.dn), result)?;
                added += 1;
            }
            Ok(added)
        }
        .await;

        session.close().await;
        result
    }

    /// Load an LDIF file into the directory.
    pub async fn import_ldif(
        &self,
        admin_dn: &str,
        admin_password: &str,
        path: impl AsRef<Path>,
    ) -> Result<usize> {
        let entries = LdifReader::from_path(path)?.read_all()?;
        let added = self.import_entries(admin_dn, admin_password, &entries).await?;
        info!("Imported {} LDIF entries into {}", added, self.url);
        Ok(added)
    }
}

#[async_trait]
impl DirectoryClient for LdapClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn user_dn(&self, user_id: &str) -> String {
        dn::user_dn(
            &self.config.user_id_attribute,
            user_id,
            &self.config.search_user_base_dn,
        )
    }

    #[instrument(skip(self, password), fields(connector = %self.config.name))]
    async fn bind(&self, bind_dn: &str, password: &str) -> AuthenticationOutcome {
        // An empty password is an unauthenticated bind, which servers accept.
        if password.is_empty() {
            return AuthenticationOutcome::InvalidCredentials;
        }

        match self.bounded(self.bind_once(bind_dn, password)).await {
            Ok(()) => AuthenticationOutcome::Success,
            Err(e) => {
                let outcome = AuthenticationOutcome::from(&e);
                match outcome {
                    AuthenticationOutcome::InvalidCredentials => debug!("LDAP bind rejected for {}: {}", bind_dn, e),
                    _ => warn!("LDAP bind for {} failed: {}", bind_dn, e),
                }
                outcome
            }
        }
    }

    #[instrument(skip(self), fields(connector = %self.config.name))]
    async fn check_membership(&self, user_dn: &str, group: &str) -> std::result::Result<bool, DirectoryError> {
        self.bounded(self.membership_once(user_dn, group)).await
    }
}
