mod buffer_pool;
mod error;
mod heap_file;

pub use buffer_pool::{BufferPool, PageHandle};
pub use error::{FileError, FileResult};
pub use heap_file::{DbFileIterator, HeapFile, HeapFileIterator};

/// Page size in bytes (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Number of pages in the buffer pool
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;
