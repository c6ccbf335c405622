pub mod bucket_page;
pub mod directory_page;
pub mod key;

pub use bucket_page::HashBucketPage;
pub use directory_page::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_DEPTH};
pub use key::{GenericKey, KeyCodec};
