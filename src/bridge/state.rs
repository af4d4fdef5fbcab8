//! Bridge State
//!
//! The single state value driving a bridge session. Transitions are pure:
//! every named transition consumes the state and returns a new one, and
//! the driver is the only caller. A session's state is discarded at the
//! end unless exported through the key-backup artifact.

use serde::Serialize;

use crate::config::Network;
use crate::insight::Utxo;
use crate::keys::{IdentityKey, KeyPair, Purpose, SecurityLevel};
use crate::retry::RetryStatus;
use crate::tx::AssetLockProof;

/// Pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStep {
    Init,
    ConfiguringKeys,
    GeneratingKeys,
    AwaitingDeposit,
    DetectingDeposit,
    BuildingTransaction,
    SigningTransaction,
    Broadcasting,
    WaitingIslock,
    RegisteringIdentity,
    ToppingUp,
    FundingAddress,
    SendingToAddress,
    RegisteringName,
    UpdatingIdentity,
    Complete,
    Error,
}

impl std::fmt::Display for BridgeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::ConfiguringKeys => "configuring_keys",
            Self::GeneratingKeys => "generating_keys",
            Self::AwaitingDeposit => "awaiting_deposit",
            Self::DetectingDeposit => "detecting_deposit",
            Self::BuildingTransaction => "building_transaction",
            Self::SigningTransaction => "signing_transaction",
            Self::Broadcasting => "broadcasting",
            Self::WaitingIslock => "waiting_islock",
            Self::RegisteringIdentity => "registering_identity",
            Self::ToppingUp => "topping_up",
            Self::FundingAddress => "funding_address",
            Self::SendingToAddress => "sending_to_address",
            Self::RegisteringName => "registering_name",
            Self::UpdatingIdentity => "updating_identity",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A key to add in manage mode; the pair itself is generated fresh
#[derive(Debug, Clone)]
pub struct NewKeyRequest {
    pub purpose: Purpose,
    pub security_level: SecurityLevel,
}

/// Bridge mode. Each variant owns its mode-specific inputs; the common
/// asset-lock prefix of the pipeline is shared by the first four.
#[derive(Debug, Clone)]
pub enum BridgeMode {
    /// Create a new identity from a mnemonic-derived asset lock
    Create,
    /// Credit an existing identity
    TopUp { target_identity_id: String },
    /// Fund a platform address the operator controls
    FundAddress { address: String, wif: String },
    /// Send credits to a third-party platform address
    SendToAddress { recipient: String },
    /// Register a DPNS name for an existing identity
    Dpns {
        identity_id: String,
        wif: String,
        label: String,
    },
    /// Add or disable identity keys
    Manage {
        identity_id: String,
        wif: String,
        add_keys: Vec<NewKeyRequest>,
        disable_key_ids: Vec<u32>,
    },
}

impl BridgeMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::TopUp { .. } => "topup",
            Self::FundAddress { .. } => "fundAddress",
            Self::SendToAddress { .. } => "sendToAddress",
            Self::Dpns { .. } => "dpns",
            Self::Manage { .. } => "manage",
        }
    }

    /// Whether this mode runs the asset-lock pipeline (derive, deposit,
    /// build, sign, broadcast, islock, proof)
    pub fn uses_asset_lock(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::TopUp { .. } | Self::FundAddress { .. } | Self::SendToAddress { .. }
        )
    }

    /// The mode-specific final pipeline step
    pub fn final_step(&self) -> BridgeStep {
        match self {
            Self::Create => BridgeStep::RegisteringIdentity,
            Self::TopUp { .. } => BridgeStep::ToppingUp,
            Self::FundAddress { .. } => BridgeStep::FundingAddress,
            Self::SendToAddress { .. } => BridgeStep::SendingToAddress,
            Self::Dpns { .. } => BridgeStep::RegisteringName,
            Self::Manage { .. } => BridgeStep::UpdatingIdentity,
        }
    }
}

/// The bridge session state
#[derive(Debug, Clone)]
pub struct BridgeState {
    pub network: Network,
    pub mode: BridgeMode,
    pub step: BridgeStep,

    /// Create mode only; top-up and funding use one-shot random keys
    pub mnemonic: Option<String>,
    pub asset_lock_key: Option<KeyPair>,
    pub asset_lock_path: Option<String>,
    pub identity_keys: Vec<IdentityKey>,

    pub deposit_address: Option<String>,
    pub detected_utxo: Option<Utxo>,
    /// Aggregate seen on the deposit address, in duffs
    pub detected_deposit_amount: u64,
    pub deposit_timed_out: bool,

    pub signed_tx_hex: Option<String>,
    pub broadcast_txid: Option<String>,
    pub islock: Option<Vec<u8>>,
    pub proof: Option<AssetLockProof>,
    pub identity_id: Option<String>,

    pub retry: Option<RetryStatus>,
    pub last_error: Option<String>,
}

impl BridgeState {
    /// Fresh session state for a network and mode
    pub fn new(network: Network, mode: BridgeMode) -> Self {
        Self {
            network,
            mode,
            step: BridgeStep::Init,
            mnemonic: None,
            asset_lock_key: None,
            asset_lock_path: None,
            identity_keys: Vec::new(),
            deposit_address: None,
            detected_utxo: None,
            detected_deposit_amount: 0,
            deposit_timed_out: false,
            signed_tx_hex: None,
            broadcast_txid: None,
            islock: None,
            proof: None,
            identity_id: None,
            retry: None,
            last_error: None,
        }
    }

    /// Switching networks drops all session secrets and starts over
    pub fn switch_network(self, network: Network) -> Self {
        Self::new(network, self.mode)
    }

    pub fn with_step(mut self, step: BridgeStep) -> Self {
        self.step = step;
        self
    }

    /// Keys derived (or generated); the session now has a deposit address
    pub fn keys_generated(
        mut self,
        mnemonic: Option<String>,
        asset_lock_key: KeyPair,
        asset_lock_path: Option<String>,
        identity_keys: Vec<IdentityKey>,
        deposit_address: String,
    ) -> Self {
        self.mnemonic = mnemonic;
        self.asset_lock_key = Some(asset_lock_key);
        self.asset_lock_path = asset_lock_path;
        self.identity_keys = identity_keys;
        self.deposit_address = Some(deposit_address);
        self.step = BridgeStep::AwaitingDeposit;
        self
    }

    /// A sufficient UTXO arrived
    pub fn deposit_detected(mut self, utxo: Utxo, total_amount: u64) -> Self {
        self.detected_utxo = Some(utxo);
        self.detected_deposit_amount = total_amount;
        self.deposit_timed_out = false;
        self.step = BridgeStep::BuildingTransaction;
        self
    }

    /// The deposit wait expired. Keys and deposit address are kept so a
    /// recheck re-enters the wait without re-deriving anything.
    pub fn deposit_wait_expired(mut self, total_amount: u64) -> Self {
        self.detected_deposit_amount = total_amount;
        self.deposit_timed_out = true;
        self.step = BridgeStep::DetectingDeposit;
        self
    }

    pub fn tx_signed(mut self, signed_hex: String) -> Self {
        self.signed_tx_hex = Some(signed_hex);
        self.step = BridgeStep::Broadcasting;
        self
    }

    pub fn broadcast_accepted(mut self, txid: String) -> Self {
        self.broadcast_txid = Some(txid);
        self.step = BridgeStep::WaitingIslock;
        self
    }

    /// Quorum lock received; assemble the proof and enter the final step
    pub fn proof_assembled(mut self, islock: Vec<u8>, proof: AssetLockProof) -> Self {
        self.islock = Some(islock);
        self.proof = Some(proof);
        self.step = self.mode.final_step();
        self
    }

    pub fn completed(mut self, identity_id: Option<String>) -> Self {
        if identity_id.is_some() {
            self.identity_id = identity_id;
        }
        self.retry = None;
        self.step = BridgeStep::Complete;
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(message.into());
        self.step = BridgeStep::Error;
        self
    }

    pub fn retrying(mut self, status: RetryStatus) -> Self {
        self.retry = Some(status);
        self
    }

    /// "Try Again" from the error state: same network, all secrets dropped
    pub fn reset(self) -> Self {
        Self::new(self.network, self.mode)
    }
}
