//! Per-job configuration.
//!
//! [`JobConf`] mirrors the scheduler's job configuration: a flat map of string
//! keys to string values. Structured values (queries, projections, split key
//! patterns) are JSON text and are parsed into BSON documents on access. Every
//! recognized key is listed in [`keys`], and typed accessors apply the defaults.
//!
//! ```
//! use docsplit::config::{keys, JobConf};
//!
//! let conf = JobConf::new()
//!     .with(keys::INPUT_URI, "mongodb://localhost:27017/shop.orders")
//!     .with(keys::SPLIT_SIZE, "16")
//!     .with(keys::QUERY, r#"{"status": "open"}"#);
//! assert_eq!(conf.split_size_mb().unwrap(), 16);
//! assert_eq!(conf.split_key().unwrap(), "_id");
//! ```

use crate::error::{Result, SplitError};
use crate::store::uri::StoreUri;
use bson::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Recognized configuration keys.
pub mod keys {
    pub const INPUT_URI: &str = "mongo.input.uri";
    /// Connection string whose credentials and database are used to log in.
    pub const AUTH_URI: &str = "mongo.auth.uri";
    /// Target split size in megabytes.
    pub const SPLIT_SIZE: &str = "mongo.input.split_size";
    pub const SPLIT_KEY_PATTERN: &str = "mongo.input.split.split_key_pattern";
    /// Field used as the record key by readers.
    pub const INPUT_KEY: &str = "mongo.input.key";
    pub const SPLIT_MIN_DOCS: &str = "mongo.input.split_min_docs";
    pub const SPLITTER_CLASS: &str = "mongo.splitter.class";
    pub const CREATE_INPUT_SPLITS: &str = "mongo.input.split.create_input_splits";
    pub const USE_RANGE_QUERIES: &str = "mongo.input.split.use_range_queries";
    pub const USE_SAMPLING: &str = "mongo.input.split.use_sampling";
    pub const READ_FROM_SHARDS: &str = "mongo.input.split.read_from_shards";
    pub const READ_SHARD_CHUNKS: &str = "mongo.input.split.read_shard_chunks";
    pub const FILTER_EMPTY: &str = "mongo.input.split.filter_empty";
    pub const SAMPLES_PER_SPLIT: &str = "mongo.input.splits.samples_per_split";
    pub const QUERY: &str = "mongo.input.query";
    pub const FIELDS: &str = "mongo.input.fields";
    pub const SORT: &str = "mongo.input.sort";
    pub const NO_TIMEOUT: &str = "mongo.input.notimeout";
    /// Whitespace-separated proxy hosts reachable from the workers.
    pub const MONGOS_HOSTS: &str = "mongo.input.mongos_hosts";
    pub const MULTI_URI_JSON: &str = "mongo.input.multi_uri.json";
    /// Name of the record handler workers bind to an input's splits.
    pub const RECORD_HANDLER: &str = "mongo.job.mapper";

    /// Glob of BSON dump files for a file input.
    pub const BSON_INPUT_PATH: &str = "mapreduce.input.fileinputformat.inputdir";

    pub const BSON_READ_SPLITS: &str = "bson.split.read_splits";
    pub const BSON_WRITE_SPLITS: &str = "bson.split.write_splits";
    pub const BSON_SPLITS_PATH: &str = "bson.split.splits_path";

    pub const SPLIT_MAXSIZE: &str = "mapreduce.input.fileinputformat.split.maxsize";
    pub const SPLIT_MINSIZE: &str = "mapreduce.input.fileinputformat.split.minsize";
    pub const LEGACY_SPLIT_MAXSIZE: &str = "mapred.max.split.size";
    pub const LEGACY_SPLIT_MINSIZE: &str = "mapred.min.split.size";
    pub const BLOCK_SIZE: &str = "dfs.blocksize";
}

pub const DEFAULT_SPLIT_SIZE_MB: u64 = 8;
pub const DEFAULT_SPLIT_MIN_DOCS: u64 = 1000;
pub const DEFAULT_SAMPLES_PER_SPLIT: u64 = 10;
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_RECORD_HANDLER: &str = "identity";

/// String key/value job configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobConf {
    values: BTreeMap<String, String>,
}

impl JobConf {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build from a JSON object. Strings are taken as-is; any other value is kept
    /// as its JSON text, so nested queries survive unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] unless `value` is an object.
    pub fn from_json_object(value: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(SplitError::invalid_config(
                "<json>",
                "configuration must be a JSON object",
            ));
        };
        Ok(Self {
            values: map
                .iter()
                .map(|(k, v)| {
                    let text = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), text)
                })
                .collect(),
        })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Overlay `other` on top of this configuration.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    // ------------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the value is not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(SplitError::invalid_config(key, format!("expected true or false, got '{v}'"))),
        }
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the value is not an unsigned integer.
    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        self.get(key).map_or(Ok(default), |v| {
            v.parse::<u64>()
                .map_err(|e| SplitError::invalid_config(key, format!("'{v}': {e}")))
        })
    }

    /// Optional unsigned integer, without a default.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the value is present but not a number.
    pub fn get_u64_opt(&self, key: &str) -> Result<Option<u64>> {
        self.get(key)
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|e| SplitError::invalid_config(key, format!("'{v}': {e}")))
            })
            .transpose()
    }

    /// Parse a JSON document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] naming `key` when the text is not a
    /// JSON object.
    pub fn get_document(&self, key: &str) -> Result<Option<Document>> {
        self.get(key).map(|text| parse_document(key, text)).transpose()
    }

    // ------------------------------------------------------------------------
    // Collection inputs
    // ------------------------------------------------------------------------

    /// Every URI listed under `mongo.input.uri`.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the key is missing or malformed.
    pub fn input_uris(&self) -> Result<Vec<StoreUri>> {
        let raw = self
            .get(keys::INPUT_URI)
            .ok_or_else(|| SplitError::invalid_config(keys::INPUT_URI, "no input URI configured"))?;
        StoreUri::parse_list(raw)
    }

    /// The single input URI of a collection input.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if zero or several URIs are configured.
    pub fn input_uri(&self) -> Result<StoreUri> {
        let mut uris = self.input_uris()?;
        match uris.len() {
            1 => Ok(uris.remove(0)),
            0 => Err(SplitError::invalid_config(keys::INPUT_URI, "no input URI configured")),
            n => Err(SplitError::invalid_config(
                keys::INPUT_URI,
                format!("{n} URIs configured where one is expected"),
            )),
        }
    }

    /// Login URI for planning and worker connections, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the URI is malformed or carries
    /// no `user:password`.
    pub fn auth_uri(&self) -> Result<Option<StoreUri>> {
        let Some(raw) = self.get(keys::AUTH_URI) else {
            return Ok(None);
        };
        let uri = StoreUri::parse(raw)?;
        match &uri.credentials {
            Some(creds) if creds.split_once(':').is_some_and(|(u, p)| !u.is_empty() && !p.is_empty()) => {
                Ok(Some(uri))
            }
            _ => Err(SplitError::invalid_config(
                keys::AUTH_URI,
                "auth URI must contain a user name and password",
            )),
        }
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-numeric or zero value.
    pub fn split_size_mb(&self) -> Result<u64> {
        let mb = self.get_u64(keys::SPLIT_SIZE, DEFAULT_SPLIT_SIZE_MB)?;
        if mb == 0 {
            return Err(SplitError::invalid_config(keys::SPLIT_SIZE, "must be positive"));
        }
        Ok(mb)
    }

    /// Index pattern used for split boundaries, `{"_id": 1}` by default.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the pattern does not parse or is empty.
    pub fn split_key_pattern(&self) -> Result<Document> {
        let pattern = self
            .get_document(keys::SPLIT_KEY_PATTERN)?
            .unwrap_or_else(|| bson::doc! { "_id": 1 });
        if pattern.is_empty() {
            return Err(SplitError::invalid_config(keys::SPLIT_KEY_PATTERN, "pattern is empty"));
        }
        Ok(pattern)
    }

    /// The single boundary field, for strategies that express bounds on one field.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a compound pattern.
    pub fn split_key(&self) -> Result<String> {
        let pattern = self.split_key_pattern()?;
        let mut fields = pattern.keys();
        match (fields.next(), fields.next()) {
            (Some(field), None) => Ok(field.clone()),
            _ => Err(SplitError::invalid_config(
                keys::SPLIT_KEY_PATTERN,
                "compound split keys cannot be used as range bounds",
            )),
        }
    }

    #[must_use]
    pub fn input_key(&self) -> String {
        self.get(keys::INPUT_KEY).unwrap_or("_id").to_string()
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-numeric or zero value.
    pub fn split_min_docs(&self) -> Result<u64> {
        let n = self.get_u64(keys::SPLIT_MIN_DOCS, DEFAULT_SPLIT_MIN_DOCS)?;
        if n == 0 {
            return Err(SplitError::invalid_config(keys::SPLIT_MIN_DOCS, "must be positive"));
        }
        Ok(n)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-numeric or zero value.
    pub fn samples_per_split(&self) -> Result<u64> {
        let n = self.get_u64(keys::SAMPLES_PER_SPLIT, DEFAULT_SAMPLES_PER_SPLIT)?;
        if n == 0 {
            return Err(SplitError::invalid_config(keys::SAMPLES_PER_SPLIT, "must be positive"));
        }
        Ok(n)
    }

    #[must_use]
    pub fn splitter_name(&self) -> Option<&str> {
        self.get(keys::SPLITTER_CLASS)
    }

    #[must_use]
    pub fn record_handler(&self) -> &str {
        self.get(keys::RECORD_HANDLER).unwrap_or(DEFAULT_RECORD_HANDLER)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the query does not parse.
    pub fn query(&self) -> Result<Document> {
        Ok(self.get_document(keys::QUERY)?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the projection does not parse.
    pub fn fields(&self) -> Result<Option<Document>> {
        self.get_document(keys::FIELDS)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] if the sort does not parse.
    pub fn sort(&self) -> Result<Option<Document>> {
        self.get_document(keys::SORT)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn no_timeout(&self) -> Result<bool> {
        self.get_bool(keys::NO_TIMEOUT, false)
    }

    #[must_use]
    pub fn mongos_hosts(&self) -> Vec<String> {
        self.get(keys::MONGOS_HOSTS)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn create_input_splits(&self) -> Result<bool> {
        self.get_bool(keys::CREATE_INPUT_SPLITS, true)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn use_range_queries(&self) -> Result<bool> {
        self.get_bool(keys::USE_RANGE_QUERIES, false)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn use_sampling(&self) -> Result<bool> {
        self.get_bool(keys::USE_SAMPLING, true)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn read_from_shards(&self) -> Result<bool> {
        self.get_bool(keys::READ_FROM_SHARDS, false)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn read_shard_chunks(&self) -> Result<bool> {
        self.get_bool(keys::READ_SHARD_CHUNKS, true)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn filter_empty(&self) -> Result<bool> {
        self.get_bool(keys::FILTER_EMPTY, false)
    }

    // ------------------------------------------------------------------------
    // File inputs
    // ------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn bson_read_splits(&self) -> Result<bool> {
        self.get_bool(keys::BSON_READ_SPLITS, true)
    }

    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a non-boolean value.
    pub fn bson_write_splits(&self) -> Result<bool> {
        self.get_bool(keys::BSON_WRITE_SPLITS, true)
    }

    #[must_use]
    pub fn bson_input_path(&self) -> Option<&str> {
        self.get(keys::BSON_INPUT_PATH)
    }

    #[must_use]
    pub fn bson_splits_path(&self) -> Option<PathBuf> {
        self.get(keys::BSON_SPLITS_PATH).map(PathBuf::from)
    }

    /// Target size of a file split: `max(min, min(max, block))`.
    ///
    /// The current split-size keys win over the legacy ones. `block_size`
    /// overrides `dfs.blocksize` when the file system reports one.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for non-numeric values.
    pub fn file_split_size(&self, block_size: Option<u64>) -> Result<u64> {
        let max = match self.get_u64_opt(keys::SPLIT_MAXSIZE)? {
            Some(v) => v,
            None => self.get_u64(keys::LEGACY_SPLIT_MAXSIZE, u64::MAX)?,
        };
        let min = match self.get_u64_opt(keys::SPLIT_MINSIZE)? {
            Some(v) => v,
            None => self.get_u64(keys::LEGACY_SPLIT_MINSIZE, 1)?,
        }
        .max(1);
        let block = match block_size {
            Some(b) => b,
            None => self.get_u64(keys::BLOCK_SIZE, DEFAULT_BLOCK_SIZE)?,
        };
        Ok(min.max(max.min(block)))
    }
}

/// Parse a JSON object into a BSON document. `key` labels errors.
///
/// # Errors
///
/// Returns [`SplitError::InvalidConfig`] if `text` is not a JSON object.
pub fn parse_document(key: &str, text: &str) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| SplitError::invalid_config(key, format!("not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(SplitError::invalid_config(key, "expected a JSON object"));
    }
    bson::to_document(&value).map_err(|e| SplitError::invalid_config(key, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Bson};

    #[test]
    fn defaults_apply() {
        let conf = JobConf::new();
        assert_eq!(conf.split_size_mb().unwrap(), DEFAULT_SPLIT_SIZE_MB);
        assert_eq!(conf.split_min_docs().unwrap(), DEFAULT_SPLIT_MIN_DOCS);
        assert!(conf.create_input_splits().unwrap());
        assert!(conf.use_sampling().unwrap());
        assert!(!conf.use_range_queries().unwrap());
        assert_eq!(conf.split_key_pattern().unwrap(), doc! { "_id": 1 });
        assert!(conf.query().unwrap().is_empty());
    }

    #[test]
    fn documents_parse_from_json() {
        let conf = JobConf::new().with(keys::QUERY, r#"{"age": {"$gte": 21}, "tags": ["a"]}"#);
        let q = conf.query().unwrap();
        assert_eq!(q.get_document("age").unwrap().get("$gte"), Some(&Bson::Int64(21)));
    }

    #[test]
    fn auth_uri_needs_credentials() {
        assert_eq!(JobConf::new().auth_uri().unwrap(), None);
        let conf = JobConf::new().with(keys::AUTH_URI, "mongodb://u:p@auth:27017/admin");
        assert_eq!(conf.auth_uri().unwrap().and_then(|u| u.credentials).as_deref(), Some("u:p"));
        let conf = JobConf::new().with(keys::AUTH_URI, "mongodb://auth:27017/admin");
        assert!(matches!(conf.auth_uri(), Err(SplitError::InvalidConfig { ref key, .. }) if key == keys::AUTH_URI));
    }

    #[test]
    fn bad_json_names_the_key() {
        let conf = JobConf::new().with(keys::SORT, "{not json");
        let err = conf.sort().unwrap_err();
        assert!(matches!(err, SplitError::InvalidConfig { ref key, .. } if key == keys::SORT));
    }

    #[test]
    fn compound_split_key_rejected() {
        let conf = JobConf::new().with(keys::SPLIT_KEY_PATTERN, r#"{"a": 1, "b": 1}"#);
        assert!(conf.split_key_pattern().is_ok());
        assert!(conf.split_key().unwrap_err().is_config_error());
    }

    #[test]
    fn file_split_size_prefers_new_keys() {
        let conf = JobConf::from_pairs([
            (keys::LEGACY_SPLIT_MAXSIZE, "1000"),
            (keys::SPLIT_MAXSIZE, "5000"),
            (keys::LEGACY_SPLIT_MINSIZE, "100"),
        ]);
        assert_eq!(conf.file_split_size(Some(1 << 20)).unwrap(), 5000);
        assert_eq!(conf.file_split_size(Some(50)).unwrap(), 100);
        assert_eq!(JobConf::new().file_split_size(None).unwrap(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn json_object_keeps_nested_values_as_text() {
        let value = serde_json::json!({
            "mongo.input.uri": "mongodb://h/db.c",
            "mongo.input.query": {"x": 1},
            "mongo.input.split.use_range_queries": true
        });
        let conf = JobConf::from_json_object(&value).unwrap();
        assert!(conf.use_range_queries().unwrap());
        assert_eq!(conf.query().unwrap(), doc! { "x": 1_i64 });
    }

    #[test]
    fn proxy_hosts_split_on_whitespace() {
        let conf = JobConf::new().with(keys::MONGOS_HOSTS, "a:27017  b:27017\nc:27017");
        assert_eq!(conf.mongos_hosts(), vec!["a:27017", "b:27017", "c:27017"]);
    }
}
