pub mod keystore;
pub mod rpc;

pub use keystore::{parse_encryption_key, FileKeyStore};
pub use rpc::SolanaClient;
