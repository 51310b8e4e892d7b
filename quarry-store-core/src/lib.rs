pub mod content_address;
pub mod derivation;
pub mod fingerprint;
pub mod placeholder;
pub mod references;
pub mod store_dir;
pub mod store_path;

pub use content_address::{ContentAddress, IngestionMethod, ParseContentAddressError};
pub use derivation::{Derivation, DerivationOutput, DEFAULT_OUTPUT_NAME, DERIVATION_EXT};
pub use fingerprint::{compress_hash, fixed_ca_output_path, make_store_path, FingerprintError};
pub use placeholder::{hash_placeholder, unknown_ca_output_placeholder};
pub use references::References;
pub use store_dir::{StoreDir, StoreDirError};
pub use store_path::{ParseStorePathError, StorePath, DIGEST_LEN};
