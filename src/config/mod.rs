#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;

use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{validate_extension, validate_path, Validate};

/// Fully resolved settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub source_extension: String,
    pub verbose: bool,
}

impl ConverterConfig {
    pub fn new(input_dir: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            source_extension: toml_config::DEFAULT_SOURCE_EXTENSION.to_string(),
            verbose: false,
        }
    }
}

impl ConfigProvider for ConverterConfig {
    fn input_dir(&self) -> &str {
        &self.input_dir
    }

    fn output_dir(&self) -> &str {
        &self.output_dir
    }

    fn source_extension(&self) -> &str {
        &self.source_extension
    }
}

impl Validate for ConverterConfig {
    fn validate(&self) -> Result<()> {
        validate_path("input_dir", &self.input_dir)?;
        validate_path("output_dir", &self.output_dir)?;
        validate_extension("extension", &self.source_extension)
    }
}
