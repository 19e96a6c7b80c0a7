pub mod batch;
pub mod engine;
pub mod normalize;
pub mod writer;

pub use crate::domain::model::{Dataset, Normalized, Object, Scalar};
pub use crate::domain::ports::{ConfigProvider, ContainerWriter, Decoder};
pub use crate::utils::error::Result;
