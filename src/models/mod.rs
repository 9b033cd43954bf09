pub mod generation;
pub mod orange_book;
pub mod purple_book;
pub mod queries;

pub use generation::*;
pub use orange_book::*;
pub use purple_book::*;
pub use queries::*;
