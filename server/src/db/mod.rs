//! Database module for PostgreSQL persistence.

mod entities;
mod pool;
mod sync_log;
mod watermarks;

pub use entities::*;
pub use pool::*;
pub use sync_log::*;
pub use watermarks::*;
