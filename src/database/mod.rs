mod cache;
mod connection;
mod manager;
mod pool;
mod statement;

pub use cache::*;
pub use connection::*;
pub use manager::*;
pub use pool::*;
pub use statement::*;
