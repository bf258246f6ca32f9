//! Job catalog entries and the per-run parameter bundle derived from them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{ExecutionRequest, HostProfile, InputValue, WpsError};

/// Named transformation applied to a raw configuration value before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessor {
    /// Comma-separated text becomes several literal entries.
    SplitComma,
    /// The value is a single by-reference input.
    Reference,
    /// Comma-separated hrefs become several by-reference inputs.
    ReferenceList,
}

impl Preprocessor {
    pub fn apply(&self, raw: &str) -> Vec<InputValue> {
        match self {
            Preprocessor::SplitComma => split_comma(raw).map(InputValue::Literal).collect(),
            Preprocessor::Reference => vec![InputValue::Reference(raw.trim().to_string())],
            Preprocessor::ReferenceList => split_comma(raw).map(InputValue::Reference).collect(),
        }
    }

    /// Apply an optional preprocessor; `None` keeps the value as a single literal.
    pub fn apply_optional(preprocessor: Option<Preprocessor>, raw: &str) -> Vec<InputValue> {
        match preprocessor {
            Some(preprocessor) => preprocessor.apply(raw),
            None => vec![InputValue::Literal(raw.to_string())],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preprocessor::SplitComma => "split_comma",
            Preprocessor::Reference => "reference",
            Preprocessor::ReferenceList => "reference_list",
        }
    }
}

fn split_comma(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',').map(str::trim).filter(|piece| !piece.is_empty()).map(str::to_string)
}

impl fmt::Display for Preprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preprocessor {
    type Err = WpsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "split_comma" => Ok(Preprocessor::SplitComma),
            "reference" => Ok(Preprocessor::Reference),
            "reference_list" => Ok(Preprocessor::ReferenceList),
            other => Err(WpsError::configuration(format!("unknown preprocessor '{other}'"))),
        }
    }
}

/// Where a parameter value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamSource {
    Literal(String),
    /// Looked up as `<job>/<param>` in the layered configuration.
    FromConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub source: ParamSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocess: Option<Preprocessor>,
}

impl ParamSpec {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            source: ParamSource::Literal(value.into()),
            preprocess: None,
        }
    }

    pub fn from_config() -> Self {
        Self {
            source: ParamSource::FromConfig,
            preprocess: None,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocess = Some(preprocessor);
        self
    }
}

/// A catalog entry describing one remote job and how to parametrize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Catalog identifier, also the prefix of its configuration keys.
    pub identifier: String,
    /// Remote process identifier.
    pub process_identifier: String,
    pub output_name: String,
    pub params: IndexMap<String, ParamSpec>,
    pub max_chain_depth: u32,
    /// Store the downloaded artifact by basename only.
    pub strip_download: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl JobDefinition {
    pub const DEFAULT_CHAIN_DEPTH: u32 = 1;

    /// New job whose remote process identifier equals its catalog identifier.
    pub fn new(identifier: impl Into<String>, output_name: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            process_identifier: identifier.clone(),
            identifier,
            output_name: output_name.into(),
            params: IndexMap::new(),
            max_chain_depth: Self::DEFAULT_CHAIN_DEPTH,
            strip_download: false,
            description: None,
        }
    }

    pub fn with_process(mut self, process_identifier: impl Into<String>) -> Self {
        self.process_identifier = process_identifier.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(name.into(), spec);
        self
    }

    pub fn with_chain_depth(mut self, max_chain_depth: u32) -> Self {
        self.max_chain_depth = max_chain_depth;
        self
    }

    pub fn with_strip(mut self, strip_download: bool) -> Self {
        self.strip_download = strip_download;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Composite configuration key for one of this job's parameters.
    pub fn config_key(&self, param: &str) -> String {
        format!("{}/{}", self.identifier, param)
    }
}

/// A job bound to a host with fully resolved parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRun {
    pub job: Arc<JobDefinition>,
    pub host: Arc<HostProfile>,
    pub params: IndexMap<String, Vec<InputValue>>,
}

impl ResolvedRun {
    /// Flatten the parameters into a request; list values become repeated inputs.
    pub fn to_request(&self) -> ExecutionRequest {
        let inputs = self
            .params
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| (name.clone(), value.clone())))
            .collect();
        ExecutionRequest {
            process_identifier: self.job.process_identifier.clone(),
            inputs,
            output_name: self.job.output_name.clone(),
        }
    }

    /// `<host>/<job>` label used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}/{}", self.host.name, self.job.identifier)
    }
}
