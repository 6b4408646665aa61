pub mod classifier;
pub mod config;
pub mod customer;
pub mod entities;
pub mod error;
pub mod escalation;
pub mod maintenance;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod tenant;

pub use classifier::*;
pub use config::*;
pub use customer::*;
pub use entities::*;
pub use error::*;
pub use escalation::*;
pub use maintenance::*;
pub use metrics::*;
pub use orchestrator::*;
pub use session::*;
pub use storage::*;
pub use tenant::*;
