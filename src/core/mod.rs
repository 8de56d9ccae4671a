pub mod endpoints;
pub mod engine;
pub mod probe;
pub mod resolver;

pub use crate::domain::model::{Coordinate, ExistenceResult, ResolutionResult};
pub use crate::domain::ports::{Notifier, Transport};
pub use crate::utils::error::Result;
pub use engine::PartidaEngine;
pub use resolver::ParcelResolver;
