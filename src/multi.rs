//! Several inputs planned into one tagged split list.
//!
//! Each [`InputSource`] is planned on its own: collections go through the
//! factory and their own strategy, file inputs through the
//! [`BsonFileSplitter`]. Every resulting split carries an [`InputTag`] naming the
//! input it came from and the record handler its worker should bind, so a job
//! reading several inputs knows how to treat each split.
//!
//! Inputs come from configuration in one of two ways:
//!
//! - several URIs in `mongo.input.uri`: every collection shares the job's
//!   settings, and a splitter override is ignored.
//! - a JSON array in `mongo.input.multi_uri.json`: each element is a
//!   configuration object of its own, laid over the job's settings. An element
//!   with `mapreduce.input.fileinputformat.inputdir` is a file input.
//!
//! ```
//! use docsplit::config::{keys, JobConf};
//! use docsplit::multi::{inputs_from_conf, InputSource};
//!
//! let conf = JobConf::new().with(
//!     keys::INPUT_URI,
//!     "mongodb://h:27017/db.a mongodb://h:27017/db.b",
//! );
//! let inputs = inputs_from_conf(&conf).unwrap();
//! assert_eq!(inputs.len(), 2);
//! assert!(matches!(inputs[0], InputSource::Collection(_)));
//! ```

use crate::config::{keys, JobConf};
use crate::error::{Result, SplitError};
use crate::file_splitter::BsonFileSplitter;
use crate::io::glob::expand_glob_required;
use crate::split::InputSplit;
use crate::splitter::plan_collection;
use crate::store::traits::StoreConnector;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One named input of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A collection named by the configuration's single input URI.
    Collection(JobConf),
    /// Dump files matching a glob.
    BsonFile { pattern: String, conf: JobConf },
}

impl InputSource {
    #[must_use]
    pub const fn conf(&self) -> &JobConf {
        match self {
            Self::Collection(conf) | Self::BsonFile { conf, .. } => conf,
        }
    }

    /// Identity of this input: the namespace or the glob pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::InvalidConfig`] for a collection input without a
    /// usable URI.
    pub fn tag(&self) -> Result<InputTag> {
        let input = match self {
            Self::Collection(conf) => conf.input_uri()?.namespace()?.to_string(),
            Self::BsonFile { pattern, .. } => pattern.clone(),
        };
        Ok(InputTag {
            input,
            handler: self.conf().record_handler().to_string(),
        })
    }
}

/// Where a split came from and how its records are handled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputTag {
    pub input: String,
    pub handler: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSplit {
    pub tag: InputTag,
    pub split: InputSplit,
}

fn is_nested_aggregator(name: &str) -> bool {
    let simple = name.rsplit('.').next().unwrap_or(name).to_ascii_lowercase();
    matches!(simple.as_str(), "multi" | "multimongocollectionsplitter")
}

/// Inputs described by `conf`.
///
/// # Errors
///
/// - [`SplitError::InvalidConfig`] when neither key is set, the JSON is not an
///   array of objects, or an element names the aggregator as its splitter.
pub fn inputs_from_conf(conf: &JobConf) -> Result<Vec<InputSource>> {
    if conf.get(keys::INPUT_URI).is_some() {
        let uris = conf.input_uris()?;
        info!(inputs = uris.len(), "using shared split settings for every input URI");
        return Ok(uris
            .into_iter()
            .map(|uri| {
                let mut per = conf.clone().with(keys::INPUT_URI, uri.to_string());
                per.remove(keys::SPLITTER_CLASS);
                InputSource::Collection(per)
            })
            .collect());
    }

    let raw = conf.get(keys::MULTI_URI_JSON).ok_or_else(|| {
        SplitError::invalid_config(keys::INPUT_URI, "no input URI and no multi-input configuration")
    })?;
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| SplitError::invalid_config(keys::MULTI_URI_JSON, format!("not valid JSON: {e}")))?;
    let serde_json::Value::Array(items) = value else {
        return Err(SplitError::invalid_config(
            keys::MULTI_URI_JSON,
            "must be an array of per-input configuration objects",
        ));
    };

    let mut base = conf.clone();
    base.remove(keys::MULTI_URI_JSON);
    base.remove(keys::SPLITTER_CLASS);

    let mut inputs = Vec::with_capacity(items.len());
    for item in &items {
        let per = JobConf::from_json_object(item)
            .map_err(|_| SplitError::invalid_config(keys::MULTI_URI_JSON, "each element must be an object"))?;
        let merged = base.merged(&per);
        if merged.splitter_name().is_some_and(is_nested_aggregator) {
            return Err(SplitError::invalid_config(
                keys::SPLITTER_CLASS,
                "the multi-input aggregator cannot be nested",
            ));
        }
        let source = match merged.bson_input_path().map(str::to_string) {
            Some(pattern) => InputSource::BsonFile { pattern, conf: merged },
            None => InputSource::Collection(merged),
        };
        inputs.push(source);
    }
    info!(inputs = inputs.len(), "loaded per-input configuration");
    Ok(inputs)
}

/// Plan every input and tag the results. Order follows `inputs`, and within an
/// input the order its planner produced.
///
/// # Errors
///
/// Fails on the first input that cannot be planned.
pub fn aggregate(inputs: &[InputSource], connector: &dyn StoreConnector) -> Result<Vec<TaggedSplit>> {
    let mut out = Vec::new();
    for source in inputs {
        let tag = source.tag()?;
        let splits: Vec<InputSplit> = match source {
            InputSource::Collection(conf) => plan_collection(conf, connector)?
                .splits
                .into_iter()
                .map(InputSplit::Collection)
                .collect(),
            InputSource::BsonFile { pattern, conf } => {
                let files = expand_glob_required(pattern)?;
                BsonFileSplitter::from_conf(conf)?
                    .splits_for_paths(&files)?
                    .into_iter()
                    .map(InputSplit::File)
                    .collect()
            }
        };
        info!(input = %tag.input, handler = %tag.handler, splits = splits.len(), "planned input");
        out.extend(splits.into_iter().map(|split| TaggedSplit {
            tag: tag.clone(),
            split,
        }));
    }
    Ok(out)
}

/// [`inputs_from_conf`] followed by [`aggregate`].
///
/// # Errors
///
/// As for both.
pub fn plan_job(conf: &JobConf, connector: &dyn StoreConnector) -> Result<Vec<TaggedSplit>> {
    aggregate(&inputs_from_conf(conf)?, connector)
}
