mod error;
pub mod key;
mod memory;
mod store;

pub use error::KvError;
pub use key::KeyPart;
pub use memory::MemoryKv;
pub use store::{AtomicWrite, Check, Commit, Entry, EntryIter, Kv, Op, Versionstamp};
