pub mod error;
pub mod extendible;

pub use error::HashIndexError;
pub use extendible::ExtendibleHashIndex;
