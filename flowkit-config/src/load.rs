use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;
use crate::shared::ValidationError;

/// Directory, relative to the working directory, holding the configuration layers.
const CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried, in order, for every layer.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Stem of the layer every environment starts from.
const BASE_LAYER: &str = "base";

/// Environment variables starting with `APP_` override file values.
const ENV_PREFIX: &str = "APP";

/// `APP_RATE_LIMITER__LIMIT` addresses `rate_limiter.limit`.
const ENV_KEY_SEPARATOR: &str = "__";

/// A configuration document that can be loaded with [`load_config`].
///
/// Loading rejects documents that deserialize but fail [`Config::validate`], so callers never
/// see a configuration the toolkit would refuse at startup.
pub trait Config: DeserializeOwned {
    /// Checks the loaded values.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingDirectory(PathBuf),

    /// No file exists for one of the layers.
    #[error("no `{layer}` configuration in `{directory}` (tried {extensions})")]
    MissingLayer {
        layer: &'static str,
        directory: PathBuf,
        extensions: String,
    },

    /// A layer file or an override could not be parsed or merged.
    #[error("failed to read configuration: {0}")]
    Read(#[source] rust_cli_config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    /// The configuration was read but holds values the toolkit refuses.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

/// Loads `configuration/base.*`, then `configuration/{APP_ENVIRONMENT}.*`, then `APP_`
/// environment variable overrides, and validates the result.
pub fn load_config<T: Config>() -> Result<T, LoadConfigError> {
    let directory = std::env::current_dir()
        .map_err(LoadConfigError::CurrentDir)?
        .join(CONFIGURATION_DIR);
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&directory, environment)
}

/// Same layering as [`load_config`] for an explicit directory and environment.
pub fn load_config_from<T: Config>(
    directory: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError> {
    load_layers(directory, environment, env_overrides())
}

fn env_overrides() -> rust_cli_config::Environment {
    rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator(ENV_KEY_SEPARATOR)
        // Overrides arrive as strings; numbers and booleans must keep their types.
        .try_parsing(true)
}

fn load_layers<T: Config>(
    directory: &Path,
    environment: Environment,
    overrides: rust_cli_config::Environment,
) -> Result<T, LoadConfigError> {
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingDirectory(directory.to_path_buf()));
    }

    let mut builder: ConfigBuilder<DefaultState> = rust_cli_config::Config::builder();
    for layer in [BASE_LAYER, environment.as_str()] {
        let file = layer_file(directory, layer)?;
        builder = builder.add_source(rust_cli_config::File::from(file));
    }

    let config: T = builder
        .add_source(overrides)
        .build()
        .map_err(LoadConfigError::Read)?
        .try_deserialize()
        .map_err(LoadConfigError::Deserialization)?;

    config.validate()?;

    Ok(config)
}

/// Returns the first existing `{layer}.{extension}` in `directory`.
fn layer_file(directory: &Path, layer: &'static str) -> Result<PathBuf, LoadConfigError> {
    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{layer}.{extension}")))
        .find(|path| path.is_file())
        .ok_or_else(|| LoadConfigError::MissingLayer {
            layer,
            directory: directory.to_path_buf(),
            extensions: CONFIG_FILE_EXTENSIONS.join(", "),
        })
}
