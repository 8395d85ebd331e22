pub mod sqlite;

pub use sqlite::{QueryLog, QueryRecord};
