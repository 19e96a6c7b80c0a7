pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{toml_config::TomlConfig, ConverterConfig};

pub use adapters::{NpzReader, NpzWriter, PickleDecoder};
pub use crate::core::{
    batch::{BatchConverter, BatchSummary, PlannedFile},
    engine::ConversionEngine,
    normalize::normalize,
    writer::{build_datasets, write_record, DEFAULT_DATASET_KEY},
};
pub use utils::error::{ConvertError, Result};
