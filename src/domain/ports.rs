use crate::domain::model::{Dataset, Object};
use crate::utils::error::Result;
use std::path::Path;

/// Turns the bytes of one source file into an object graph.
pub trait Decoder {
    /// Extension (without the dot) of the files this decoder understands.
    fn extension(&self) -> &str;
    fn decode(&self, bytes: &[u8]) -> Result<Object>;
}

/// Persists a set of named arrays as one container file.
pub trait ContainerWriter {
    fn extension(&self) -> &str;
    /// Creates or truncates `destination`. Nothing is cleaned up on failure.
    fn write(&self, datasets: &[Dataset], destination: &Path) -> Result<()>;
}

pub trait ConfigProvider {
    fn input_dir(&self) -> &str;
    fn output_dir(&self) -> &str;
    fn source_extension(&self) -> &str;
}
