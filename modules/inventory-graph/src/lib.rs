pub mod client;
pub mod dql;
pub mod lifecycle;
pub mod model;
pub mod mutation;
pub mod naming;
pub mod predicate;
pub mod query;
pub mod reader;
pub mod related;
pub mod sanitizer;
pub mod schema;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod value;
pub mod writer;

pub use client::DgraphClient;
pub use model::inventory_schema;
pub use reader::EntryReader;
pub use sanitizer::{Sanitizer, Submission, SubmissionContext};
pub use schema::Schema;
pub use store::GraphStore;
pub use writer::EntryWriter;
