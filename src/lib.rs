pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::email::BrevoNotifier;
pub use adapters::http::HttpTransport;
pub use config::AppConfig;
pub use core::{ParcelResolver, PartidaEngine};
pub use domain::model::{Coordinate, ExistenceResult, ResolutionResult, SubUnit};
pub use utils::error::{AppError, Result};
