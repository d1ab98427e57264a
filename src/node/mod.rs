pub mod config;
pub mod error;
pub mod local;
pub mod middleware;
pub mod record;

pub use config::NodeConfig;
pub use error::NodeError;
pub use local::LocalNode;
pub use middleware::{Middleware, MiddlewareStore};
pub use record::{join_host_port, resolve_declared_addr, split_host_port, NodeRecord};
