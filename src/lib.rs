pub mod config;
pub mod error;
pub mod db;
pub mod literal;
pub mod model;
pub mod store;
pub mod import;
pub mod chat;
pub mod api;

pub use config::Config;
pub use error::{BizgraphError, Result};
pub use literal::{parse_declaration, Delimiter, UnbalancedPolicy};
