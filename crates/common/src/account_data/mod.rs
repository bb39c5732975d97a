pub mod memory;
pub mod provider;

pub use memory::{MemoryAccountDataProvider, MemoryAccountDataProviderError};
pub use provider::{AccountDataError, AccountDataEvent, AccountDataProvider};
