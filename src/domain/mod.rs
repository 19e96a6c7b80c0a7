// Domain layer: object graph, arrays and ports.

pub mod array;
pub mod model;
pub mod ports;
