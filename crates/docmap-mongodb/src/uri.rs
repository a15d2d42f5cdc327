//! Connection string parsing and building
//!
//! Parses `mongodb://[user:pass@]host1[:port1][,host2[:port2]...]/database[?opt=val&...]`
//! into a [`ParsedUri`] and builds connection strings back from [`BuildOptions`].
//! Both directions are pure; the only outside input is the `MONGODB_URI` /
//! `MONGODB_URL` lookup used when no string is given.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use docmap_common::DocmapError;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default port for `mongodb://` hosts without an explicit port
pub const DEFAULT_PORT: u16 = 27017;

/// Database name used when the connection string has no path
pub const DEFAULT_PARSE_DATABASE: &str = "test";

/// Database name used by [`build_uri`] when none is given
pub const DEFAULT_BUILD_DATABASE: &str = "admin";

/// Host used by [`build_uri`] when none is given
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Environment variables consulted, in order, when no connection string is given
pub const URI_ENV_VARS: [&str; 2] = ["MONGODB_URI", "MONGODB_URL"];

const SCHEME: &str = "mongodb";
const SRV_SCHEME: &str = "mongodb+srv";

/// A single `host:port` pair from the host list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

impl HostAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Credentials from the user-info section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub user: String,
    pub pass: Option<String>,
}

/// Typed value of a query-string option
///
/// `true`/`false` become booleans and canonical integer literals become
/// integers; anything else, including `007` or `+1`, is kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UriOptionValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl UriOptionValue {
    fn from_raw(raw: &str) -> Self {
        match raw {
            "true" => UriOptionValue::Bool(true),
            "false" => UriOptionValue::Bool(false),
            _ => match raw.parse::<i64>() {
                // Only values that print back identically
                Ok(n) if n.to_string() == raw => UriOptionValue::Int(n),
                _ => UriOptionValue::String(raw.to_string()),
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            UriOptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            UriOptionValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            UriOptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for UriOptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriOptionValue::Bool(b) => write!(f, "{}", b),
            UriOptionValue::Int(n) => write!(f, "{}", n),
            UriOptionValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for UriOptionValue {
    fn from(value: bool) -> Self {
        UriOptionValue::Bool(value)
    }
}

impl From<i64> for UriOptionValue {
    fn from(value: i64) -> Self {
        UriOptionValue::Int(value)
    }
}

impl From<&str> for UriOptionValue {
    fn from(value: &str) -> Self {
        UriOptionValue::String(value.to_string())
    }
}

impl From<String> for UriOptionValue {
    fn from(value: String) -> Self {
        UriOptionValue::String(value)
    }
}

/// Structured form of a connection string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUri {
    /// `mongodb` or `mongodb+srv`
    pub scheme: String,
    pub hosts: Vec<HostAddr>,
    pub database: String,
    pub auth: Option<Auth>,
    pub options: BTreeMap<String, UriOptionValue>,
}

impl ParsedUri {
    /// True for `mongodb+srv://` strings
    pub fn is_srv(&self) -> bool {
        self.scheme == SRV_SCHEME
    }

    /// First host of the host list
    ///
    /// Always present for parsed strings; a hand-built value may have none.
    pub fn primary(&self) -> Option<&HostAddr> {
        self.hosts.first()
    }

    /// Rebuilt connection string with the password masked, for logs
    pub fn redacted(&self) -> String {
        let options = BuildOptions::from(self);
        let uri = build_uri(&options);
        match options.password.as_deref() {
            Some(pass) if !pass.is_empty() => {
                uri.replacen(&format!(":{}@", encode(pass)), ":****@", 1)
            }
            _ => uri,
        }
    }
}

impl fmt::Display for ParsedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&build_uri(&BuildOptions::from(self)))
    }
}

impl FromStr for ParsedUri {
    type Err = DocmapError;

    fn from_str(s: &str) -> Result<Self> {
        parse_str(s)
    }
}

/// Parse a connection string, falling back to `MONGODB_URI` / `MONGODB_URL`
pub fn parse_uri(uri: Option<&str>) -> Result<ParsedUri> {
    parse_uri_with(uri, |key| std::env::var(key).ok())
}

/// Same as [`parse_uri`] with the environment lookup injected
pub fn parse_uri_with<F>(uri: Option<&str>, lookup: F) -> Result<ParsedUri>
where
    F: Fn(&str) -> Option<String>,
{
    match uri {
        Some(raw) => parse_str(raw),
        None => {
            let raw = env_uri(lookup).ok_or_else(|| {
                DocmapError::Uri(format!(
                    "no connection string given and none of {} is set",
                    URI_ENV_VARS.join(", ")
                ))
            })?;
            parse_str(&raw)
        }
    }
}

/// First non-empty value of `MONGODB_URI`, `MONGODB_URL`
pub fn env_uri<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    URI_ENV_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn decode(raw: &str, what: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| DocmapError::Uri(format!("invalid percent-encoding in {}: {}", what, e)))
}

fn parse_str(input: &str) -> Result<ParsedUri> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DocmapError::Uri("connection string is empty".to_string()));
    }

    let (scheme, rest) = input
        .split_once("://")
        .ok_or_else(|| DocmapError::Uri(format!("missing scheme in '{}'", input)))?;
    if scheme != SCHEME && scheme != SRV_SCHEME {
        return Err(DocmapError::Uri(format!(
            "unsupported scheme '{}', expected '{}' or '{}'",
            scheme, SCHEME, SRV_SCHEME
        )));
    }

    let (before_query, query) = match rest.split_once('?') {
        Some((before, query)) => (before, Some(query)),
        None => (rest, None),
    };

    let (userinfo, host_and_path) = match before_query.rfind('@') {
        Some(at) => (Some(&before_query[..at]), &before_query[at + 1..]),
        None => (None, before_query),
    };

    let (host_list, path) = match host_and_path.split_once('/') {
        Some((hosts, path)) => (hosts, path),
        None => (host_and_path, ""),
    };

    let auth = userinfo.map(parse_userinfo).transpose()?;
    let hosts = parse_hosts(host_list, scheme == SRV_SCHEME)?;

    let database = if path.is_empty() {
        DEFAULT_PARSE_DATABASE.to_string()
    } else {
        let name = decode(path, "database name")?;
        if let Some(bad) = name.chars().find(|c| matches!(c, ' ' | '"' | '$' | '/' | '\\' | '\0')) {
            return Err(DocmapError::Uri(format!(
                "database name '{}' contains invalid character '{}'",
                name, bad
            )));
        }
        name
    };

    let options = match query {
        Some(q) => parse_options(q)?,
        None => BTreeMap::new(),
    };

    Ok(ParsedUri {
        scheme: scheme.to_string(),
        hosts,
        database,
        auth,
        options,
    })
}

fn parse_userinfo(userinfo: &str) -> Result<Auth> {
    let (user, pass) = match userinfo.split_once(':') {
        Some((user, pass)) => (user, Some(pass)),
        None => (userinfo, None),
    };
    if user.is_empty() {
        return Err(DocmapError::Uri("username must not be empty when '@' is present".to_string()));
    }
    // `user:@host` carries no password, same as `user@host`
    let pass = pass.filter(|p| !p.is_empty());
    Ok(Auth {
        user: decode(user, "username")?,
        pass: pass.map(|p| decode(p, "password")).transpose()?,
    })
}

fn parse_hosts(list: &str, srv: bool) -> Result<Vec<HostAddr>> {
    if list.is_empty() {
        return Err(DocmapError::Uri("host list is empty".to_string()));
    }

    let hosts = list
        .split(',')
        .map(parse_host)
        .collect::<Result<Vec<_>>>()?;

    if srv && hosts.len() != 1 {
        return Err(DocmapError::Uri(format!(
            "'{}' requires exactly one host, got {}",
            SRV_SCHEME,
            hosts.len()
        )));
    }
    Ok(hosts)
}

fn parse_host(entry: &str) -> Result<HostAddr> {
    if entry.is_empty() {
        return Err(DocmapError::Uri("empty host in host list".to_string()));
    }

    // IPv6 literal: [::1]:27017
    let (host, port) = if let Some(stripped) = entry.strip_prefix('[') {
        let (host, tail) = stripped
            .split_once(']')
            .ok_or_else(|| DocmapError::Uri(format!("unterminated IPv6 literal '{}'", entry)))?;
        let port = match tail {
            "" => None,
            t => Some(t.strip_prefix(':').ok_or_else(|| {
                DocmapError::Uri(format!("unexpected characters after IPv6 literal '{}'", entry))
            })?),
        };
        (host, port)
    } else {
        match entry.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (entry, None),
        }
    };

    if host.is_empty() {
        return Err(DocmapError::Uri(format!("empty host name in '{}'", entry)));
    }

    let port = match port {
        Some(raw) => match raw.parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => return Err(DocmapError::Uri(format!("invalid port '{}' for host '{}'", raw, host))),
        },
        None => DEFAULT_PORT,
    };

    Ok(HostAddr::new(decode(host, "host")?, port))
}

fn parse_options(query: &str) -> Result<BTreeMap<String, UriOptionValue>> {
    let mut options = BTreeMap::new();
    for pair in query.split(['&', ';']).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| DocmapError::Uri(format!("option '{}' is not a key=value pair", pair)))?;
        if key.is_empty() {
            return Err(DocmapError::Uri(format!("option '{}' has an empty key", pair)));
        }
        let key = decode(key, "option name")?;
        let value = decode(value, "option value")?;
        options.insert(key, UriOptionValue::from_raw(&value));
    }
    Ok(options)
}

/// Options for [`build_uri`]
///
/// Unset fields fall back to database `admin`, host `127.0.0.1`, port 27017
/// and no credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Additional hosts appended after the primary host
    pub replicas: Vec<HostAddr>,
    pub options: BTreeMap<String, UriOptionValue>,
    /// Emit `mongodb+srv://` and omit ports
    pub srv: bool,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn replica(mut self, replica: HostAddr) -> Self {
        self.replicas.push(replica);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<UriOptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl From<&ParsedUri> for BuildOptions {
    fn from(parsed: &ParsedUri) -> Self {
        let primary = parsed.primary();
        Self {
            database: Some(parsed.database.clone()),
            host: primary.map(|h| h.host.clone()),
            port: primary.map(|h| h.port),
            username: parsed.auth.as_ref().map(|a| a.user.clone()),
            password: parsed.auth.as_ref().and_then(|a| a.pass.clone()),
            replicas: parsed.hosts.get(1..).unwrap_or_default().to_vec(),
            options: parsed.options.clone(),
            srv: parsed.is_srv(),
        }
    }
}

fn encode(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

fn write_host(uri: &mut String, host: &str, port: u16, srv: bool) {
    if host.contains(':') {
        uri.push('[');
        uri.push_str(host);
        uri.push(']');
    } else {
        uri.push_str(host);
    }
    if !srv {
        uri.push(':');
        uri.push_str(&port.to_string());
    }
}

/// Build a connection string from options merged over the defaults
///
/// The same options always produce the same string: option keys are emitted
/// in sorted order.
pub fn build_uri(options: &BuildOptions) -> String {
    let mut uri = String::from(if options.srv { SRV_SCHEME } else { SCHEME });
    uri.push_str("://");

    let username = options.username.as_deref().unwrap_or_default();
    if !username.is_empty() {
        uri.push_str(&encode(username));
        let password = options.password.as_deref().unwrap_or_default();
        if !password.is_empty() {
            uri.push(':');
            uri.push_str(&encode(password));
        }
        uri.push('@');
    }

    let host = options
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .unwrap_or(DEFAULT_HOST);
    write_host(&mut uri, host, options.port.unwrap_or(DEFAULT_PORT), options.srv);

    for replica in &options.replicas {
        uri.push(',');
        write_host(&mut uri, &replica.host, replica.port, options.srv);
    }

    uri.push('/');
    let database = options
        .database
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_BUILD_DATABASE);
    uri.push_str(&encode(database));

    if !options.options.is_empty() {
        let query = options
            .options
            .iter()
            .map(|(key, value)| format!("{}={}", encode(key), encode(&value.to_string())))
            .collect::<Vec<_>>()
            .join("&");
        uri.push('?');
        uri.push_str(&query);
    }

    uri
}
