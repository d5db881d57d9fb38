pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;
pub mod version;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use record::{
    AddressBookRecord, AddressCommit, AddressWrite, CartCommit, CartRecord, CartWrite,
};
pub use store::{AddressStore, CartStore, CartStoreExt, CommitValidationError};
pub use version::Version;
