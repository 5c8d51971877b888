mod error;
mod page;
mod record;
mod schema;
mod value;

pub use error::{RecordError, RecordResult};
pub use page::{HeapPage, Page, PageLayout};
pub use record::{PageId, RecordId, SlotId, Tuple};
pub use schema::{ColumnDef, TupleDesc};
pub use value::{DEFAULT_STRING_LEN, DataType, Value};

/// Table identifier, derived from the table file's location
pub type TableId = u64;
