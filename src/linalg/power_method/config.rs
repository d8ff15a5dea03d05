use json::JsonValue;
use std::fs::read_to_string;
use thiserror::Error;

/// Default maximum number of Power Method iterations
pub const DEFAULT_ITERATION_MAX: u64 = 500;

/// Default tolerance on the change in the first-norm delta between iterations
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// Power Method settings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Maximum number of iterations before giving up
    pub iteration_max: u64,
    /// Iteration stops once the first-norm delta changes by less than this amount
    pub tolerance: f64,
    /// Seed for the starting vector. `None` draws the seed from OS entropy.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iteration_max: DEFAULT_ITERATION_MAX,
            tolerance: DEFAULT_TOLERANCE,
            seed: None,
        }
    }
}

impl Config {
    pub fn new(iteration_max: u64, tolerance: f64) -> Self {
        Self {
            iteration_max,
            tolerance,
            seed: None,
        }
    }

    /// Pin the starting vector
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse a Config from a JSON object with the following (optional) keys
    ///
    /// Missing keys take their default values
    ///
    /// ```JSON
    /// {
    ///     "iteration_max": 1000,
    ///     "tolerance": 1e-8,
    ///     "seed": 42
    /// }
    /// ```
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let parsed = json::parse(contents).map_err(|e| ConfigError::Json(e.to_string()))?;
        if !parsed.is_object() {
            return Err(ConfigError::NotAnObject);
        }

        let mut config = Self::default();
        if let Some(iteration_max) = optional_field(&parsed, "iteration_max", JsonValue::as_u64)? {
            config.iteration_max = iteration_max;
        }
        if let Some(tolerance) = optional_field(&parsed, "tolerance", JsonValue::as_f64)? {
            config.tolerance = tolerance;
        }
        config.seed = optional_field(&parsed, "seed", JsonValue::as_u64)?;

        Ok(config)
    }

    /// Read a JSON Config file (see [Config::from_json] for the format)
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        let contents =
            read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&contents)
    }
}

fn optional_field<T>(
    object: &JsonValue,
    key: &'static str,
    extract: fn(&JsonValue) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    let value = &object[key];
    if value.is_null() {
        Ok(None)
    } else {
        extract(value).map(Some).ok_or(ConfigError::BadField(key))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Error type for Config loading
pub enum ConfigError {
    #[error("unable to read config file: {0}")]
    Io(String),
    #[error("unable to parse config as JSON: {0}")]
    Json(String),
    #[error("config must be a JSON object")]
    NotAnObject,
    #[error("config field `{0}` has the wrong type")]
    BadField(&'static str),
}
