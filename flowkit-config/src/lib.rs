//! Configuration types and loading for flowkit.
//!
//! Every tunable of the toolkit lives in a serde struct under [`shared`] with defaults and a
//! `validate` method. [`load_config`] layers `configuration/base.*`,
//! `configuration/{environment}.*` and `APP_`-prefixed environment variables, then validates the
//! result through [`Config::validate`].

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
