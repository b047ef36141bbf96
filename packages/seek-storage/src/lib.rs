pub mod db;
pub mod models;
pub mod qdrant;
pub mod queries;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
