pub mod dates;
pub mod search_terms;

pub use dates::*;
pub use search_terms::*;
