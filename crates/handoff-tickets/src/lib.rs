pub mod error;
pub mod file_store;
pub mod lifecycle;
pub mod repository;
pub mod sqlite_store;
pub mod store;

pub use error::*;
pub use file_store::*;
pub use lifecycle::*;
pub use repository::*;
pub use sqlite_store::*;
pub use store::*;
