//! Parameter resolution against the layered configuration store.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;
use wpsprobe_registry::ConfigStore;
use wpsprobe_types::{HostProfile, InputValue, JobDefinition, ParamSource, Preprocessor, WpsError};

/// Resolves job parameters for a host.
///
/// Keys are `<job>/<param>`, looked up in `default` then in the host's
/// overrides; the host wins and empty values count as missing.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    store: Arc<ConfigStore>,
}

impl ConfigResolver {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Resolve one configuration-sourced parameter of `job` for `host`.
    ///
    /// The parameter's preprocessor, if any, is applied to the raw value.
    pub fn resolve(&self, job: &JobDefinition, param: &str, host: &HostProfile) -> Result<Vec<InputValue>, WpsError> {
        let key = job.config_key(param);
        let missing = || WpsError::MissingConfiguration {
            key: key.clone(),
            host: host.name.clone(),
        };

        let raw = self.store.lookup(host, &key).ok_or_else(missing)?;
        let preprocessor = job.params.get(param).and_then(|spec| spec.preprocess);
        let values = Preprocessor::apply_optional(preprocessor, raw);
        if values.is_empty() {
            return Err(missing());
        }
        trace!(key = %key, host = %host.name, count = values.len(), "resolved parameter");
        Ok(values)
    }

    /// Resolve every parameter of `job` in declaration order.
    ///
    /// Literal parameters go through their preprocessor too.
    pub fn resolve_params(&self, job: &JobDefinition, host: &HostProfile) -> Result<IndexMap<String, Vec<InputValue>>, WpsError> {
        job.params
            .iter()
            .map(|(name, spec)| {
                let values = match &spec.source {
                    ParamSource::Literal(value) => Preprocessor::apply_optional(spec.preprocess, value),
                    ParamSource::FromConfig => self.resolve(job, name, host)?,
                };
                Ok((name.clone(), values))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use wpsprobe_types::ParamSpec;

    use super::*;

    fn resolver(yaml: &str) -> ConfigResolver {
        ConfigResolver::new(Arc::new(ConfigStore::from_yaml_str(yaml).expect("config")))
    }

    fn host(resolver: &ConfigResolver, name: &str) -> HostProfile {
        resolver.store().host_profile(name).expect("host profile")
    }

    #[test]
    fn host_layer_overrides_default() {
        let resolver = resolver("default:\n  J/p: \"1\"\nH:\n  wps: http://h/wps\n  J/p: \"2\"\nG:\n  wps: http://g/wps\n");
        let job = JobDefinition::new("J", "output").with_param("p", ParamSpec::from_config());

        assert_eq!(resolver.resolve(&job, "p", &host(&resolver, "H")).unwrap(), vec![InputValue::Literal("2".into())]);
        assert_eq!(resolver.resolve(&job, "p", &host(&resolver, "G")).unwrap(), vec![InputValue::Literal("1".into())]);
    }

    #[test]
    fn profile_overrides_are_the_host_layer() {
        let resolver = resolver("default:\n  J/p: \"1\"\n");
        let job = JobDefinition::new("J", "output").with_param("p", ParamSpec::from_config());
        let endpoint = url::Url::parse("http://h/wps").unwrap();

        let plain = HostProfile::new("H", endpoint.clone());
        assert_eq!(resolver.resolve(&job, "p", &plain).unwrap(), vec![InputValue::Literal("1".into())]);

        let overriding = HostProfile::new("H", endpoint.clone()).with_override("J/p", "3");
        assert_eq!(resolver.resolve(&job, "p", &overriding).unwrap(), vec![InputValue::Literal("3".into())]);

        let blanked = HostProfile::new("H", endpoint).with_override("J/p", " ");
        assert!(matches!(
            resolver.resolve(&job, "p", &blanked),
            Err(WpsError::MissingConfiguration { .. })
        ));
    }

    #[test]
    fn missing_and_empty_values_name_the_key_and_host() {
        let resolver = resolver("default:\n  J/empty: \"\"\nH:\n  wps: http://h/wps\n  J/blank: \" , \"\n");
        let job = JobDefinition::new("J", "output")
            .with_param("blank", ParamSpec::from_config().with_preprocessor(Preprocessor::SplitComma));

        for param in ["absent", "empty", "blank"] {
            let error = resolver.resolve(&job, param, &host(&resolver, "H")).unwrap_err();
            match error {
                WpsError::MissingConfiguration { key, host } => {
                    assert_eq!(key, format!("J/{param}"));
                    assert_eq!(host, "H");
                }
                other => panic!("unexpected error {other}"),
            }
        }
    }

    #[test]
    fn resolve_params_applies_preprocessors_in_declaration_order() {
        let resolver = resolver("default:\n  merge/resource: a.nc, b.nc\nH:\n  wps: http://h/wps\n");
        let job = JobDefinition::new("merge", "output")
            .with_param("resource", ParamSpec::from_config().with_preprocessor(Preprocessor::SplitComma))
            .with_param("variable", ParamSpec::literal("tas"))
            .with_param("mask", ParamSpec::literal("http://d/mask.nc").with_preprocessor(Preprocessor::Reference));

        let params = resolver.resolve_params(&job, &host(&resolver, "H")).unwrap();
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["resource", "variable", "mask"]);
        assert_eq!(
            params["resource"],
            vec![InputValue::Literal("a.nc".into()), InputValue::Literal("b.nc".into())]
        );
        assert_eq!(params["variable"], vec![InputValue::Literal("tas".into())]);
        assert_eq!(params["mask"], vec![InputValue::Reference("http://d/mask.nc".into())]);
    }
}
