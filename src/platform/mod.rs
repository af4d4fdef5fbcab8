//! Layer-2 Platform Integration
//!
//! The bridge treats the Platform SDK as an external collaborator behind
//! the `PlatformDriver` trait: identity create/top-up/update, asset-lock
//! funding and the DPNS naming flow. `MemoryPlatform` is the in-process
//! implementation used for tests and dry runs; production deployments
//! supply an SDK-backed implementation of the same trait.

pub mod address;
pub mod dpns;
pub mod driver;
pub mod memory;

pub use address::{validate_identity_id, validate_platform_address};
pub use driver::{CreditOutput, Identity, PlatformDriver, PlatformError, PlatformSigner};
pub use memory::MemoryPlatform;
