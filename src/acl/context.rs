//! Request Context
//!
//! Immutable view of the request attributes rules look at. Rewriting rules
//! never modify a context in place; they derive a new one.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use uuid::Uuid;

pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const X_FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlation id for logs
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(default = "localhost")]
    pub remote_address: IpAddr,

    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub uri: String,

    /// Engine action name, e.g. `indices:data/read/search`
    #[serde(default)]
    pub action: String,

    /// Requested indices; empty when the request does not involve indices
    #[serde(default)]
    pub indices: Vec<String>,

    /// Header names are stored lower-cased. Credentials never serialize.
    #[serde(default, deserialize_with = "lowercase_keys", serialize_with = "redact_credentials")]
    headers: BTreeMap<String, String>,

    #[serde(default)]
    pub content_length: u64,
}

/// Credentials carried in an `Authorization: Basic` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn redact_credentials<S>(headers: &BTreeMap<String, String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(headers.iter().map(|(name, value)| {
        let value = if name == AUTHORIZATION_HEADER { REDACTED } else { value.as_str() };
        (name, value)
    }))
}

fn lowercase_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect())
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn involves_indices(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Decoded `Authorization: Basic` credentials, if well-formed.
    pub fn basic_auth(&self) -> Option<BasicCredentials> {
        let value = self.header(AUTHORIZATION_HEADER)?;
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;

        Some(BasicCredentials {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Raw `user:password` from the basic auth header.
    pub fn basic_auth_pair(&self) -> Option<String> {
        self.basic_auth().map(|c| format!("{}:{}", c.user, c.password))
    }

    /// Originating client address from the first `X-Forwarded-For` entry.
    pub fn forwarded_for(&self) -> Option<IpAddr> {
        self.header(X_FORWARDED_FOR_HEADER)?
            .split(',')
            .next()
            .and_then(|first| first.trim().parse().ok())
    }

    /// Derive a context with the requested indices replaced.
    pub fn with_indices(&self, indices: Vec<String>) -> Self {
        Self {
            indices,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContextBuilder {
    context: RequestContext,
}

impl Default for RequestContextBuilder {
    fn default() -> Self {
        Self {
            context: RequestContext {
                id: Uuid::new_v4(),
                remote_address: localhost(),
                method: "GET".to_string(),
                uri: "/".to_string(),
                action: String::new(),
                indices: Vec::new(),
                headers: BTreeMap::new(),
                content_length: 0,
            },
        }
    }
}

impl RequestContextBuilder {
    pub fn remote_address(mut self, address: IpAddr) -> Self {
        self.context.remote_address = address;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.context.method = method.into();
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.context.uri = uri.into();
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.context.action = action.into();
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.context.indices.push(index.into());
        self
    }

    pub fn indices<I, S>(mut self, indices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.indices = indices.into_iter().map(Into::into).collect();
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.context
            .headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", user, password));
        self.header(AUTHORIZATION_HEADER, format!("Basic {}", encoded))
    }

    pub fn content_length(mut self, length: u64) -> Self {
        self.context.content_length = length;
        self
    }

    pub fn build(self) -> RequestContext {
        self.context
    }
}
