pub mod error;
pub mod models;
pub mod plan;
pub mod strategy_builder;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::Store;
