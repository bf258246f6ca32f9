//! The fixed catalog of WPS jobs.

use std::sync::Arc;

use indexmap::IndexMap;
use wpsprobe_types::{JobDefinition, ParamSpec, Preprocessor, WpsError};

/// Ordered, identifier-unique collection of job definitions.
///
/// Iteration order is registration order; the run matrix relies on it.
#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    jobs: IndexMap<String, Arc<JobDefinition>>,
}

impl JobCatalog {
    /// Build a catalog from explicit definitions.
    ///
    /// # Errors
    /// A duplicated identifier is a configuration error.
    pub fn new(definitions: impl IntoIterator<Item = JobDefinition>) -> Result<Self, WpsError> {
        let mut jobs = IndexMap::new();
        for definition in definitions {
            let identifier = definition.identifier.clone();
            if jobs.insert(identifier.clone(), Arc::new(definition)).is_some() {
                return Err(WpsError::configuration(format!("job '{identifier}' is defined twice")));
            }
        }
        Ok(Self { jobs })
    }

    /// The jobs shipped with wpsprobe.
    ///
    /// Every data-dependent parameter is read from configuration so the same job can
    /// target different datasets on each host.
    pub fn builtin() -> Self {
        let spatial = |identifier: &str, description: &str| {
            JobDefinition::new(identifier, "output")
                .with_description(description)
                .with_param("resource", ParamSpec::from_config().with_preprocessor(Preprocessor::Reference))
                .with_param("typename", ParamSpec::from_config())
                .with_param("featureids", ParamSpec::from_config())
                .with_param("geoserver", ParamSpec::from_config())
        };

        let definitions = [
            JobDefinition::new("ncmerge", "output")
                .with_description("Merge several NetCDF files along the time dimension")
                .with_param("resource", ParamSpec::from_config().with_preprocessor(Preprocessor::ReferenceList)),
            spatial("subset", "Clip a dataset to WFS polygon features"),
            spatial("averager", "Spatially average a dataset over WFS polygon features"),
            JobDefinition::new("subset_bbox", "output")
                .with_description("Clip a dataset to a longitude/latitude bounding box")
                .with_param("resource", ParamSpec::from_config().with_preprocessor(Preprocessor::Reference))
                .with_param("lon0", ParamSpec::from_config())
                .with_param("lon1", ParamSpec::from_config())
                .with_param("lat0", ParamSpec::from_config())
                .with_param("lat1", ParamSpec::from_config()),
            JobDefinition::new("temporal_subset", "output")
                .with_description("Restrict a dataset to a date range")
                .with_param("resource", ParamSpec::from_config().with_preprocessor(Preprocessor::Reference))
                .with_param("initial_datetime", ParamSpec::from_config())
                .with_param("final_datetime", ParamSpec::from_config()),
        ];

        Self {
            jobs: definitions
                .into_iter()
                .map(|definition| (definition.identifier.clone(), Arc::new(definition)))
                .collect(),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&Arc<JobDefinition>> {
        self.jobs.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.jobs.contains_key(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<JobDefinition>> {
        self.jobs.values()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
