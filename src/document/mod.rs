//! Path-addressed JSON documents
//!
//! - `path`: compiles dotted path strings into [`PathOp`] lists
//! - `mutation`: applies a path and a value to a document
//! - `shared`: the concurrently readable live document

pub mod mutation;
pub mod path;
pub mod shared;

pub use mutation::{get_at, modify};
pub use path::{DocumentPath, PathOp, compile_path, escape_component};
pub use shared::SharedDocument;
