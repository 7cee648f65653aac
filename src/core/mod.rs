pub mod error;
pub mod value;

pub use error::{Result, StoreError};
pub use value::{List, MAX_NESTING_DEPTH, Map, Value};
