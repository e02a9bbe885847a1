//! Connection-string parsing and host rewriting.

use crate::error::{Result, SplitError};
use crate::store::traits::Namespace;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const SCHEME: &str = "mongodb://";

/// Matches: mongodb://[user:pass@]host1[:port1][,host2...][/db[.collection]][?options]
static URI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^mongodb://(?:([^@/]+)@)?([^/?@]+)(?:/([^?]*))?(?:\?(.*))?$")
        .expect("Invalid store URI regex")
});

/// A parsed store connection string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreUri {
    pub credentials: Option<String>,
    pub hosts: Vec<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub options: Option<String>,
}

impl StoreUri {
    /// Parse a single connection string.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the string is not a store URI.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let caps = URI_REGEX.captures(raw).ok_or_else(|| {
            SplitError::invalid_config(
                raw,
                "connection strings must look like mongodb://[user:pass@]host1[:port1][,host2...]/database.collection",
            )
        })?;

        let hosts: Vec<String> = caps[2]
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(SplitError::invalid_config(raw, "no hosts"));
        }

        let (database, collection) = match caps.get(3).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
            Some(path) => match path.split_once('.') {
                Some((db, coll)) => (Some(db.to_string()), Some(coll.to_string()).filter(|c| !c.is_empty())),
                None => (Some(path.to_string()), None),
            },
            None => (None, None),
        };

        Ok(Self {
            credentials: caps.get(1).map(|m| m.as_str().to_string()),
            hosts,
            database,
            collection,
            options: caps.get(4).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty()),
        })
    }

    /// Parse a value that may hold several connection strings.
    ///
    /// Separators between strings are forgiving: commas and whitespace are
    /// stripped around each `mongodb://` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if any entry fails to parse.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        raw.split(SCHEME)
            .map(|s| s.trim_matches(|c: char| c == ',' || c.is_whitespace()))
            .filter(|s| !s.is_empty())
            .map(|s| Self::parse(&format!("{SCHEME}{s}")))
            .collect()
    }

    /// The `db.collection` this URI targets.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] when either part is missing.
    pub fn namespace(&self) -> Result<Namespace> {
        match (&self.database, &self.collection) {
            (Some(db), Some(coll)) => Ok(Namespace::new(db, coll)),
            _ => Err(SplitError::invalid_config(
                self.to_string(),
                "URI must name both a database and a collection",
            )),
        }
    }

    /// Copy of this URI aimed at `hosts`, keeping credentials, path and options.
    #[must_use]
    pub fn with_hosts(&self, hosts: &[String]) -> Self {
        Self {
            hosts: hosts.to_vec(),
            ..self.clone()
        }
    }

    /// Copy of this URI that logs in with `auth`'s credentials, against `auth`'s
    /// database unless an `authSource` is already set.
    #[must_use]
    pub fn authenticated_by(&self, auth: &Self) -> Self {
        let mut options: Vec<String> = self
            .options
            .iter()
            .flat_map(|o| o.split('&'))
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(db) = &auth.database {
            if !options.iter().any(|o| o.starts_with("authSource=")) {
                options.push(format!("authSource={db}"));
            }
        }
        Self {
            credentials: auth.credentials.clone(),
            options: (!options.is_empty()).then(|| options.join("&")),
            ..self.clone()
        }
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SCHEME)?;
        if let Some(creds) = &self.credentials {
            write!(f, "{creds}@")?;
        }
        f.write_str(&self.hosts.join(","))?;
        if let Some(db) = &self.database {
            write!(f, "/{db}")?;
            if let Some(coll) = &self.collection {
                write!(f, ".{coll}")?;
            }
        }
        if let Some(opts) = &self.options {
            write!(f, "?{opts}")?;
        }
        Ok(())
    }
}

/// Host name without the port.
#[must_use]
pub fn host_name(host: &str) -> &str {
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let uri = StoreUri::parse("mongodb://fred:secret@a:27017,b:27018/shop.orders?readPreference=secondary").unwrap();
        assert_eq!(uri.credentials.as_deref(), Some("fred:secret"));
        assert_eq!(uri.hosts, vec!["a:27017", "b:27018"]);
        assert_eq!(uri.namespace().unwrap(), Namespace::new("shop", "orders"));
        assert_eq!(uri.options.as_deref(), Some("readPreference=secondary"));
    }

    #[test]
    fn rewrite_keeps_everything_but_hosts() {
        let uri = StoreUri::parse("mongodb://u:p@mongos:27017/db.coll?x=1").unwrap();
        let shard = uri.with_hosts(&["sh1:27018".to_string(), "sh2:27018".to_string()]);
        assert_eq!(shard.to_string(), "mongodb://u:p@sh1:27018,sh2:27018/db.coll?x=1");
    }

    #[test]
    fn auth_uri_supplies_login_only() {
        let input = StoreUri::parse("mongodb://sh1:27018/shop.orders?readPreference=secondary").unwrap();
        let auth = StoreUri::parse("mongodb://hadoop:pw@auth-host:27017/admin").unwrap();
        assert_eq!(
            input.authenticated_by(&auth).to_string(),
            "mongodb://hadoop:pw@sh1:27018/shop.orders?readPreference=secondary&authSource=admin"
        );
        let pinned = StoreUri::parse("mongodb://sh1/shop.orders?authSource=users").unwrap();
        assert_eq!(
            pinned.authenticated_by(&auth).to_string(),
            "mongodb://hadoop:pw@sh1/shop.orders?authSource=users"
        );
    }

    #[test]
    fn collection_may_contain_dots() {
        let uri = StoreUri::parse("mongodb://localhost/db.system.profile").unwrap();
        assert_eq!(uri.collection.as_deref(), Some("system.profile"));
    }

    #[test]
    fn list_is_forgiving_about_separators() {
        let uris = StoreUri::parse_list("mongodb://a/db.one, mongodb://b/db.two mongodb://c/db.three").unwrap();
        assert_eq!(uris.len(), 3);
        assert_eq!(uris[2].hosts, vec!["c"]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(StoreUri::parse("http://example.com").is_err());
        assert!(StoreUri::parse("mongodb://localhost/db").unwrap().namespace().is_err());
    }

    #[test]
    fn host_name_strips_port() {
        assert_eq!(host_name("mongo.sh01.dc1:27017"), "mongo.sh01.dc1");
        assert_eq!(host_name("bare"), "bare");
    }
}
