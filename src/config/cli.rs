use crate::config::toml_config::{TomlConfig, DEFAULT_SOURCE_EXTENSION};
use crate::config::ConverterConfig;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ConvertError, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "pkl-convert")]
#[command(about = "Batch-convert pickle files into NumPy .npz containers")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory scanned for source files (overrides the config file)
    #[arg(long)]
    pub input_dir: Option<String>,

    /// Directory receiving the .npz files (overrides the config file)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Source file extension, without the dot
    #[arg(long)]
    pub extension: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// List what would be converted or skipped without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the datasets stored in an existing .npz file and exit
    #[arg(long, value_name = "NPZ")]
    pub inspect: Option<PathBuf>,
}

impl CliConfig {
    /// 合併設定檔與命令列參數，命令列優先
    pub fn resolve(&self) -> Result<ConverterConfig> {
        let file = self.config.as_ref().map(TomlConfig::from_file).transpose()?;

        let input_dir = self
            .input_dir
            .clone()
            .or_else(|| file.as_ref().map(|f| f.input_dir().to_string()))
            .ok_or_else(|| ConvertError::MissingConfigError {
                field: "input_dir".to_string(),
            })?;
        let output_dir = self
            .output_dir
            .clone()
            .or_else(|| file.as_ref().map(|f| f.output_dir().to_string()))
            .ok_or_else(|| ConvertError::MissingConfigError {
                field: "output_dir".to_string(),
            })?;
        let source_extension = self
            .extension
            .clone()
            .or_else(|| file.as_ref().map(|f| f.source_extension().to_string()))
            .unwrap_or_else(|| DEFAULT_SOURCE_EXTENSION.to_string());
        let verbose = self.verbose || file.as_ref().is_some_and(TomlConfig::verbose);

        Ok(ConverterConfig {
            input_dir,
            output_dir,
            source_extension,
            verbose,
        })
    }
}
