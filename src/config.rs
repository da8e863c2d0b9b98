//! Configuration: property lookup, pipeline bindings, and file loading.
//!
//! Destination resolution in [`crate::invoke`] talks to configuration
//! through the [`PropertySource`] lookup contract. [`PipelineSettings`] is
//! the TOML-friendly settings struct implementing it; [`Config`] loads such
//! a struct from a TOML file with environment-variable overrides, and
//! [`create_config_file`] generates a documented sample file.
//!
//! The implementation uses [figment](https://docs.rs/figment) for
//! configuration loading and [doku](https://docs.rs/doku) for sample-file
//! generation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format as _, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use snafu::ResultExt as _;

use crate::{ConfigFileWriteSnafu, ConfigLoadSnafu, Error};

/// Key prefix for per-function binding-name overrides
/// (`pipeline.function.bindings.<function>-in-0` and `...-out-0`).
pub const FUNCTION_BINDINGS_PREFIX: &str = "pipeline.function.bindings.";

/// Key prefix for binding destinations
/// (`pipeline.bindings.<binding>.destination`).
pub const BINDINGS_PREFIX: &str = "pipeline.bindings.";

/// Key suffix for binding destinations.
pub const BINDING_DESTINATION_SUFFIX: &str = ".destination";

/// String property lookup, the configuration contract destination
/// resolution depends on.
///
/// A missing key is not an error; callers fall back to a deterministic
/// default.
pub trait PropertySource: Send + Sync {
    /// The value for `key`, if configured.
    fn property(&self, key: &str) -> Option<String>;
}

/// [`PropertySource`] over a plain map of fully-qualified keys. Useful for
/// tests and for hosts with their own configuration machinery.
#[derive(Clone, Debug, Default)]
pub struct MapProperties {
    entries: HashMap<String, String>,
}

impl MapProperties {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<(String, String)> for MapProperties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl PropertySource for MapProperties {
    fn property(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

/// Pipeline binding configuration.
///
/// `bindings` renames a function's default binding (keys look like
/// `uppercase-in-0`); `destinations` maps a binding name to the destination
/// (topic/queue) it is bound to. A function with no entries in either map
/// resolves to its own name.
#[derive(Clone, Debug, Default, Serialize, Deserialize, doku::Document)]
pub struct PipelineSettings {
    /// Binding-name overrides, keyed by `<function>-in-0` / `<function>-out-0`.
    pub bindings: HashMap<String, String>,

    /// Destination names, keyed by binding name.
    pub destinations: HashMap<String, String>,
}

impl PropertySource for PipelineSettings {
    fn property(&self, key: &str) -> Option<String> {
        if let Some(binding_key) = key.strip_prefix(FUNCTION_BINDINGS_PREFIX) {
            return self.bindings.get(binding_key).cloned();
        }
        key.strip_prefix(BINDINGS_PREFIX)
            .and_then(|rest| rest.strip_suffix(BINDING_DESTINATION_SUFFIX))
            .and_then(|binding| self.destinations.get(binding).cloned())
    }
}

/// Generates a documented configuration file at the specified path.
///
/// Uses [doku](https://docs.rs/doku) to render the doc comments of a
/// `doku::Document` settings type into a commented sample TOML file.
///
/// # Errors
/// - `ConfigFileWrite` if the config file cannot be written.
pub fn create_config_file<C>(config_path: impl Into<PathBuf>) -> Result<(), Error>
where
    C: doku::Document,
{
    let path = config_path.into();
    let config_contents = doku::to_toml::<C>();
    std::fs::write(&path, config_contents).with_context(|_| ConfigFileWriteSnafu { path })?;
    Ok(())
}

/// Container for loaded and merged configuration.
///
/// Loading order, lowest to highest precedence:
///
/// 1. Values from the TOML configuration file
/// 2. Environment variables with the given prefix, nesting expressed with
///    double underscores (`WEFT_DESTINATIONS__UPPERCASE=custom-topic`
///    overrides `destinations.uppercase`)
pub struct Config<C> {
    /// The fully loaded and merged configuration instance.
    pub config: C,
}

impl<'a, C> Config<C>
where
    C: Deserialize<'a>,
{
    /// Loads and merges configuration from the given file and environment
    /// prefix; either source may be omitted.
    ///
    /// # Errors
    /// - `ConfigLoad` if the config file cannot be loaded or parsed.
    pub fn new<P, E>(config_path: Option<P>, env_prefix: Option<E>) -> Result<Self, Error>
    where
        P: AsRef<Path>,
        E: AsRef<str>,
    {
        let f = Figment::new();

        // from the config file
        let f = match config_path {
            Some(config_file) => f.merge(Toml::file(config_file)),
            None => f,
        };

        // and from the environment
        let f = match env_prefix {
            Some(env_prefix) => f.merge(Env::prefixed(env_prefix.as_ref()).split("__")),
            None => f,
        };

        let config = f.extract().context(ConfigLoadSnafu)?;
        Ok(Self { config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            bindings: [("uppercase-in-0".to_string(), "renamed".to_string())].into(),
            destinations: [
                ("renamed".to_string(), "custom-topic".to_string()),
                ("uppercase-out-0".to_string(), "replies".to_string()),
            ]
            .into(),
        }
    }

    #[test]
    fn pipeline_settings_answer_binding_override_keys() {
        let settings = settings();
        assert_eq!(
            settings.property("pipeline.function.bindings.uppercase-in-0"),
            Some("renamed".to_string())
        );
        assert_eq!(
            settings.property("pipeline.function.bindings.uppercase-out-0"),
            None
        );
    }

    #[test]
    fn pipeline_settings_answer_destination_keys() {
        let settings = settings();
        assert_eq!(
            settings.property("pipeline.bindings.renamed.destination"),
            Some("custom-topic".to_string())
        );
        assert_eq!(
            settings.property("pipeline.bindings.uppercase-out-0.destination"),
            Some("replies".to_string())
        );
        assert_eq!(
            settings.property("pipeline.bindings.unknown.destination"),
            None
        );
    }

    #[test]
    fn unrelated_keys_are_absent() {
        let settings = settings();
        assert_eq!(settings.property("pipeline.bindings.renamed"), None);
        assert_eq!(settings.property("other.namespace.key"), None);
    }

    #[test]
    fn map_properties_round_trip() {
        let props = MapProperties::from_iter([("a.b".to_string(), "c".to_string())]);
        assert_eq!(props.property("a.b"), Some("c".to_string()));
        assert_eq!(props.property("a.c"), None);
    }

    #[test]
    fn config_loads_from_file_with_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "pipeline.toml",
                r#"
[bindings]

[destinations]
uppercase = "from-file"
lowercase = "kept"
"#,
            )?;
            jail.set_env("WEFT_DESTINATIONS__UPPERCASE", "from-env");

            let config: Config<PipelineSettings> =
                Config::new(Some("pipeline.toml"), Some("WEFT_")).expect("config should load");

            assert_eq!(
                config.config.destinations.get("uppercase"),
                Some(&"from-env".to_string())
            );
            assert_eq!(
                config.config.destinations.get("lowercase"),
                Some(&"kept".to_string())
            );
            Ok(())
        });
    }

    #[test]
    fn config_rejects_invalid_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("broken.toml", "this is not valid toml {{{{")?;
            let result: Result<Config<PipelineSettings>, _> =
                Config::new(Some("broken.toml"), None::<&str>);
            assert!(result.is_err());
            Ok(())
        });
    }

    #[test]
    fn generated_sample_file_documents_the_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        create_config_file::<PipelineSettings>(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[bindings]"));
        assert!(contents.contains("[destinations]"));
    }
}
