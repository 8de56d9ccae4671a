// Domain layer: request/response values and the ports the core talks through.

pub mod model;
pub mod ports;
