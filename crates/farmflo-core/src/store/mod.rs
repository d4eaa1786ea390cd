//! Remote collection gateway: document shapes, live queries, and backends.

mod collection;
mod gateway;
mod live;
mod memory;
mod record;

pub use collection::{Collection, Delivery, Document, Filter, Snapshot, StoredDocument};
pub use gateway::{fetch, insert, put, RemoteGateway};
pub use live::{CancelHandle, LiveQuery, SubscriptionId};
pub use memory::MemoryGateway;
pub use record::{decode_document, encode_record, Record};
