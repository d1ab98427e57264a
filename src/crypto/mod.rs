pub mod identity;
pub mod storage;

pub use identity::{Identity, NodeId};
pub use storage::default_key_path;
