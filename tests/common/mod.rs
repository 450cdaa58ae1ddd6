//! Shared test fixtures: an in-memory directory and a minimal LDAP server.

#![allow(dead_code)]

use async_trait::async_trait;
use indexgate::config::LdapConnectorConfig;
use indexgate::ldap::{AuthenticationOutcome, DirectoryClient, DirectoryError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const BASE_DN: &str = "dc=example,dc=com";
pub const VALID_PASSWORD: &str = "password";

/// Deterministic directory keyed by user id.
#[derive(Default)]
pub struct FakeDirectory {
    users: HashMap<String, String>,
    groups: HashMap<String, Vec<String>>,
    unreachable: bool,
    delay: Option<Duration>,
    pub binds: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, uid: &str, password: &str) -> Self {
        self.users.insert(uid.to_string(), password.to_string());
        self
    }

    pub fn with_group(mut self, group: &str, members: &[&str]) -> Self {
        let members = members.iter().map(|m| self.dn(m)).collect();
        self.groups.insert(group.to_string(), members);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    fn dn(&self, uid: &str) -> String {
        format!("uid={},ou=People,{}", uid, BASE_DN)
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    fn name(&self) -> &str {
        "ldap1"
    }

    fn user_dn(&self, user_id: &str) -> String {
        self.dn(user_id)
    }

    async fn bind(&self, dn: &str, password: &str) -> AuthenticationOutcome {
        self.binds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return AuthenticationOutcome::ConnectionFailure;
        }

        let known = self
            .users
            .iter()
            .any(|(uid, pw)| self.dn(uid) == dn && pw == password);
        if known {
            AuthenticationOutcome::Success
        } else {
            AuthenticationOutcome::InvalidCredentials
        }
    }

    async fn check_membership(&self, dn: &str, group: &str) -> Result<bool, DirectoryError> {
        if self.unreachable {
            return Err(DirectoryError::ConnectionFailure {
                address: "fake".to_string(),
                reason: "unreachable".to_string(),
            });
        }
        Ok(self
            .groups
            .get(group)
            .map(|members| members.iter().any(|m| m == dn))
            .unwrap_or(false))
    }
}

/// Connector settings pointing at `127.0.0.1:port` with short timeouts.
pub fn connector(port: u16) -> LdapConnectorConfig {
    LdapConnectorConfig {
        name: "ldap1".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        search_user_base_dn: format!("ou=People,{}", BASE_DN),
        search_groups_base_dn: groups_base_dn(),
        connect_timeout_ms: 200,
        retry_interval_ms: 50,
        connect_retry_window_ms: 300,
        request_timeout_ms: 1_000,
        ..Default::default()
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// LDAP server that understands simple binds, searches, adds and unbinds.
///
/// Any DN binds with [`VALID_PASSWORD`]; other passwords get
/// `invalidCredentials` (49). A search returns one entry when its request
/// mentions one of `member_groups`; searches outside the groups base get
/// `noSuchObject` (32).
pub struct FakeLdapServer {
    pub port: u16,
    pub binds: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeLdapServer {
    pub async fn start(member_groups: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let binds = Arc::new(AtomicUsize::new(0));
        let groups: Arc<Vec<String>> = Arc::new(member_groups.iter().map(|g| g.to_string()).collect());

        let counter = binds.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, counter.clone(), groups.clone()));
            }
        });

        Self { port, binds, handle }
    }
}

impl Drop for FakeLdapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Accepts connections and never answers.
pub struct BlackHoleServer {
    pub port: u16,
    handle: JoinHandle<()>,
}

impl BlackHoleServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        Self { port, handle }
    }
}

impl Drop for BlackHoleServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const BIND_REQUEST: u8 = 0x60;
const BIND_RESPONSE: u8 = 0x61;
const UNBIND_REQUEST: u8 = 0x42;
const SEARCH_REQUEST: u8 = 0x63;
const SEARCH_ENTRY: u8 = 0x64;
const SEARCH_DONE: u8 = 0x65;
const ADD_REQUEST: u8 = 0x68;
const ADD_RESPONSE: u8 = 0x69;
const NO_SUCH_OBJECT: u8 = 32;

fn groups_base_dn() -> String {
    format!("ou=Groups,{}", BASE_DN)
}

async fn serve(mut socket: TcpStream, binds: Arc<AtomicUsize>, groups: Arc<Vec<String>>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        while let Some((tag, total)) = read_tlv(&buffer).map(|(tag, _, total)| (tag, total)) {
            let message: Vec<u8> = buffer.drain(..total).collect();
            if tag != 0x30 {
                return;
            }

            let content = match read_tlv(&message).map(|(_, v, _)| v) {
                Some(content) => content,
                None => return,
            };
            let (id_tag, id, id_len) = match read_tlv(content) {
                Some(tlv) => tlv,
                None => return,
            };
            if id_tag != 0x02 {
                return;
            }
            let (op_tag, op, _) = match read_tlv(&content[id_len..]) {
                Some(tlv) => tlv,
                None => return,
            };

            let reply = match op_tag {
                BIND_REQUEST => {
                    binds.fetch_add(1, Ordering::SeqCst);
                    let rc = if bind_password(op).as_deref() == Some(VALID_PASSWORD.as_bytes()) {
                        0
                    } else {
                        49
                    };
                    envelope(id, ldap_result(BIND_RESPONSE, rc))
                }
                SEARCH_REQUEST if search_base(op) != Some(groups_base_dn()) => {
                    envelope(id, ldap_result(SEARCH_DONE, NO_SUCH_OBJECT))
                }
                SEARCH_REQUEST => {
                    let mut reply = Vec::new();
                    if let Some(group) = groups.iter().find(|g| contains(op, g.as_bytes())) {
                        let dn = format!("cn={},ou=Groups,{}", group, BASE_DN);
                        let mut entry = tlv(0x04, dn.as_bytes());
                        entry.extend_from_slice(&[0x30, 0x00]);
                        reply.extend(envelope(id, tlv(SEARCH_ENTRY, &entry)));
                    }
                    reply.extend(envelope(id, ldap_result(SEARCH_DONE, 0)));
                    reply
                }
                ADD_REQUEST => envelope(id, ldap_result(ADD_RESPONSE, 0)),
                UNBIND_REQUEST => return,
                _ => return,
            };

            if socket.write_all(&reply).await.is_err() {
                return;
            }
        }

        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Password of a simple bind: `version`, `name`, then `[0] password`.
fn bind_password(op: &[u8]) -> Option<Vec<u8>> {
    let (_, _, version_len) = read_tlv(op)?;
    let rest = &op[version_len..];
    let (_, _, name_len) = read_tlv(rest)?;
    let (auth_tag, password, _) = read_tlv(&rest[name_len..])?;
    if auth_tag == 0x80 {
        Some(password.to_vec())
    } else {
        None
    }
}

/// Base object of a search request.
fn search_base(op: &[u8]) -> Option<String> {
    let (_, base, _) = read_tlv(op)?;
    String::from_utf8(base.to_vec()).ok()
}

/// `(tag, value, total encoded length)` of the TLV at the start of `data`.
fn read_tlv(data: &[u8]) -> Option<(u8, &[u8], usize)> {
    let tag = *data.first()?;
    let first = *data.get(1)?;
    let (length, header) = if first < 0x80 {
        (first as usize, 2)
    } else {
        let count = (first & 0x7f) as usize;
        let bytes = data.get(2..2 + count)?;
        let length = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (length, 2 + count)
    };
    let value = data.get(header..header + length)?;
    Some((tag, value, header + length))
}

fn encode_length(length: usize) -> Vec<u8> {
    if length < 0x80 {
        vec![length as u8]
    } else if length <= 0xff {
        vec![0x81, length as u8]
    } else {
        vec![0x82, (length >> 8) as u8, length as u8]
    }
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_length(value.len()));
    out.extend_from_slice(value);
    out
}

fn ldap_result(tag: u8, rc: u8) -> Vec<u8> {
    tlv(tag, &[0x0a, 0x01, rc, 0x04, 0x00, 0x04, 0x00])
}

fn envelope(id: &[u8], op: Vec<u8>) -> Vec<u8> {
    let mut content = tlv(0x02, id);
    content.extend(op);
    tlv(0x30, &content)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
