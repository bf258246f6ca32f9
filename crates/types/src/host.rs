//! Host profiles and the include/exclude job filter attached to each one.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::WpsError;

/// Which catalog jobs a host wants to run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "jobs", rename_all = "snake_case")]
pub enum JobFilter {
    #[default]
    All,
    Include(IndexSet<String>),
    Exclude(IndexSet<String>),
    /// `exclude: "*"`; the host runs nothing.
    Nothing,
}

impl JobFilter {
    /// Build a filter from the raw comma-separated `include` and `exclude` settings.
    ///
    /// Declaring both keys is an error, even when one of them is empty. `*` stands
    /// for every known job.
    pub fn from_raw(include: Option<&str>, exclude: Option<&str>) -> Result<Self, WpsError> {
        match (include, exclude) {
            (Some(_), Some(_)) => Err(WpsError::configuration("'include' and 'exclude' cannot both be set for one host")),
            (include, None) => match trimmed(include) {
                None | Some("*") => Ok(JobFilter::All),
                Some(list) => Ok(JobFilter::Include(split_list(list))),
            },
            (None, exclude) => match trimmed(exclude) {
                None => Ok(JobFilter::All),
                Some("*") => Ok(JobFilter::Nothing),
                Some(list) => Ok(JobFilter::Exclude(split_list(list))),
            },
        }
    }

    pub fn allows(&self, job_id: &str) -> bool {
        match self {
            JobFilter::All => true,
            JobFilter::Nothing => false,
            JobFilter::Include(jobs) => jobs.contains(job_id),
            JobFilter::Exclude(jobs) => !jobs.contains(job_id),
        }
    }

    /// Job identifiers named explicitly by the filter.
    pub fn named_jobs(&self) -> impl Iterator<Item = &str> {
        let jobs = match self {
            JobFilter::Include(jobs) | JobFilter::Exclude(jobs) => Some(jobs),
            JobFilter::All | JobFilter::Nothing => None,
        };
        jobs.into_iter().flat_map(|set| set.iter().map(String::as_str))
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn split_list(raw: &str) -> IndexSet<String> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

/// A configured WPS server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProfile {
    pub name: String,
    pub endpoint: Url,
    pub filter: JobFilter,
    /// Parameter values set for this host, keyed `<job>/<param>`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub overrides: IndexMap<String, String>,
}

impl HostProfile {
    pub fn new(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            filter: JobFilter::All,
            overrides: IndexMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: JobFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// The raw value this host sets for `key`; an empty string is still a value.
    pub fn override_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }
}
