pub mod schema;
pub mod generation_writer;
pub mod generation_repo;
pub mod orange_book_repo;
pub mod purple_book_repo;

pub use generation_writer::*;
pub use generation_repo::*;
pub use orange_book_repo::*;
pub use purple_book_repo::*;
