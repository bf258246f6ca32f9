//! The host × job test matrix.
//!
//! Host profiles and their filters are validated when the matrix is built;
//! parameters are resolved lazily while iterating, so a missing setting only
//! turns the affected pair into a skipped entry.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};
use wpsprobe_registry::{ConfigStore, JobCatalog};
use wpsprobe_types::{HostProfile, JobDefinition, ResolvedRun, WpsError};

use crate::config::ConfigResolver;

/// Which host layers take part in a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostSelector {
    /// Every layer except `default`, in configuration order.
    #[default]
    All,
    Named(Vec<String>),
}

impl FromStr for HostSelector {
    type Err = WpsError;

    /// `all` or a comma-separated list of host names.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("all") {
            return Ok(HostSelector::All);
        }
        let names: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(WpsError::configuration("host selection is empty"));
        }
        Ok(HostSelector::Named(names))
    }
}

impl fmt::Display for HostSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostSelector::All => f.write_str("all"),
            HostSelector::Named(names) => f.write_str(&names.join(",")),
        }
    }
}

/// One host × job pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixEntry {
    Runnable(ResolvedRun),
    Skipped { job: String, host: String, reason: String },
}

impl MatrixEntry {
    pub fn host(&self) -> &str {
        match self {
            MatrixEntry::Runnable(run) => &run.host.name,
            MatrixEntry::Skipped { host, .. } => host,
        }
    }

    pub fn job(&self) -> &str {
        match self {
            MatrixEntry::Runnable(run) => &run.job.identifier,
            MatrixEntry::Skipped { job, .. } => job,
        }
    }
}

/// Validated hosts and the catalog they run against.
#[derive(Debug, Clone)]
pub struct TestMatrix {
    catalog: Arc<JobCatalog>,
    resolver: ConfigResolver,
    hosts: Vec<Arc<HostProfile>>,
}

impl TestMatrix {
    /// Select hosts and validate their profiles.
    ///
    /// # Errors
    /// [`WpsError::Configuration`] for an unknown host, an empty selection, or a
    /// host that sets both `include` and `exclude`.
    pub fn build(catalog: Arc<JobCatalog>, store: Arc<ConfigStore>, selector: &HostSelector) -> Result<Self, WpsError> {
        let names = match selector {
            HostSelector::All => store.host_names(),
            HostSelector::Named(names) if names.is_empty() => {
                return Err(WpsError::configuration("host selection is empty"));
            }
            HostSelector::Named(names) => names.clone(),
        };

        let mut hosts = Vec::with_capacity(names.len());
        for name in &names {
            if !store.has_host(name) {
                return Err(WpsError::configuration(format!("unknown host '{name}'")));
            }
            let profile = store.host_profile(name)?;
            for job in profile.filter.named_jobs().filter(|job| !catalog.contains(job)) {
                warn!(host = %name, job, "host filter names a job that is not in the catalog");
            }
            hosts.push(Arc::new(profile));
        }
        debug!(selector = %selector, hosts = hosts.len(), jobs = catalog.len(), "built test matrix");

        Ok(Self {
            catalog,
            resolver: ConfigResolver::new(store),
            hosts,
        })
    }

    pub fn hosts(&self) -> &[Arc<HostProfile>] {
        &self.hosts
    }

    pub fn catalog(&self) -> &JobCatalog {
        &self.catalog
    }

    /// Iterate the matrix: hosts in selection order, jobs in catalog order.
    ///
    /// Each call starts a fresh pass.
    pub fn entries(&self) -> impl Iterator<Item = MatrixEntry> + '_ {
        self.hosts.iter().flat_map(move |host| {
            self.catalog
                .iter()
                .filter(|job| host.filter.allows(&job.identifier))
                .map(move |job| self.entry(job, host))
        })
    }

    fn entry(&self, job: &Arc<JobDefinition>, host: &Arc<HostProfile>) -> MatrixEntry {
        match self.resolver.resolve_params(job, host) {
            Ok(params) => MatrixEntry::Runnable(ResolvedRun {
                job: Arc::clone(job),
                host: Arc::clone(host),
                params,
            }),
            Err(error) => {
                debug!(host = %host.name, job = %job.identifier, %error, "skipping matrix entry");
                MatrixEntry::Skipped {
                    job: job.identifier.clone(),
                    host: host.name.clone(),
                    reason: error.to_string(),
                }
            }
        }
    }
}
