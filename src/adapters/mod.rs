// Adapters layer: concrete source decoders and container writers.

pub mod npz;
pub mod pickle;

pub use npz::{NpzReader, NpzWriter};
pub use pickle::PickleDecoder;
