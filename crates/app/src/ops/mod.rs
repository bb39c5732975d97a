pub mod get;
pub mod init;
pub mod is_stored;
pub mod key;
pub mod recovery_key;
pub mod store;
pub mod version;

pub use get::Get;
pub use init::Init;
pub use is_stored::IsStored;
pub use key::Key;
pub use recovery_key::RecoveryKey;
pub use store::Store;
pub use version::Version;
