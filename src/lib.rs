pub mod cli;
pub mod config;
pub mod discovery;
pub mod edit;
pub mod error;
pub mod index;
pub mod logging;
pub mod model;
pub mod parser;
pub mod pool;
pub mod resolver;
pub mod rewrite;

pub use error::{PromoteError, Result};
pub use rewrite::{find_dependents, plan, promote, PromotePlan, PromoteReport};
