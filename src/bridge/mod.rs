//! Bridge State Machine
//!
//! Session state, the pipeline driver and the key-backup export. The
//! state is a single owned value advanced only by named transitions; the
//! driver is the one cooperative task that awaits collaborators and emits
//! new states.

pub mod backup;
pub mod driver;
pub mod state;

pub use backup::{backup_filename, backup_from_state, write_backup, KeyBackup};
pub use driver::{
    BridgeDriver, BridgeEvent, DEPOSIT_POLL_INTERVAL, DEPOSIT_TIMEOUT, ISLOCK_TIMEOUT,
    MIN_DEPOSIT_DUFFS,
};
pub use state::{BridgeMode, BridgeState, BridgeStep, NewKeyRequest};
