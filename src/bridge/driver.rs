//! Bridge Pipeline Driver
//!
//! The single cooperative task that advances a session: derive keys, wait
//! for the deposit, build and sign the asset-lock transaction, broadcast,
//! wait for the quorum lock, assemble the proof and run the mode-specific
//! final step. Every transition publishes the new state to the optional
//! event channel; the presenter is any consumer of those events.
//!
//! DPNS and manage modes skip the asset-lock pipeline entirely: they fetch
//! the identity, match the supplied WIF against its keys and call the SDK.

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::bridge::backup::{backup_from_state, write_backup};
use crate::bridge::state::{BridgeMode, BridgeState, BridgeStep};
use crate::config::NetworkParams;
use crate::error::{BridgeError, BridgeResult};
use crate::hdwallet::{self, parse_mnemonic};
use crate::insight::{InsightClient, Utxo};
use crate::islock::IslockClient;
use crate::keys::{
    self, find_matching_key, public_key_to_address, IdentityKey, KeyPair, KeyType, Purpose,
    SecurityLevel,
};
use crate::platform::{
    dpns, validate_identity_id, validate_platform_address, CreditOutput, Identity,
    PlatformDriver, PlatformError, PlatformSigner,
};
use crate::retry::{default_should_retry, with_retry, RetryOptions, RetryStatus};
use crate::tx::{build_asset_lock, build_instant_asset_lock_proof, sign_transaction};
use crate::units::CREDITS_PER_DUFF;

/// Minimum deposit the bridge acts on, in duffs
pub const MIN_DEPOSIT_DUFFS: u64 = 300_000;
/// Default overall deposit wait
pub const DEPOSIT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default deposit poll cadence
pub const DEPOSIT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default InstantSend-lock wait
pub const ISLOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Events published to the presenter
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A new state after a transition
    State(BridgeState),
    /// One deposit poll completed
    DepositProgress {
        remaining_ms: u64,
        current_total: u64,
    },
    /// A transient failure is being retried
    Retry(RetryStatus),
}

/// The pipeline driver for one session
pub struct BridgeDriver<D> {
    params: NetworkParams,
    insight: InsightClient,
    islock: IslockClient,
    platform: D,
    retry_opts: RetryOptions,
    events: Option<UnboundedSender<BridgeEvent>>,
    backup_dir: Option<PathBuf>,
    deposit_timeout: Duration,
    deposit_poll: Duration,
    islock_timeout: Duration,
}

impl<D: PlatformDriver> BridgeDriver<D> {
    pub fn new(params: NetworkParams, platform: D) -> Self {
        let insight = InsightClient::new(&params.insight_url);
        let islock = IslockClient::new(&params.islock_url);
        Self {
            params,
            insight,
            islock,
            platform,
            retry_opts: RetryOptions::default(),
            events: None,
            backup_dir: None,
            deposit_timeout: DEPOSIT_TIMEOUT,
            deposit_poll: DEPOSIT_POLL_INTERVAL,
            islock_timeout: ISLOCK_TIMEOUT,
        }
    }

    /// Publish state transitions and progress to this channel
    pub fn with_events(mut self, events: UnboundedSender<BridgeEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Write key backups into this directory
    pub fn with_backup_dir(mut self, dir: PathBuf) -> Self {
        self.backup_dir = Some(dir);
        self
    }

    pub fn with_retry_options(mut self, opts: RetryOptions) -> Self {
        self.retry_opts = opts;
        self
    }

    pub fn with_deposit_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.deposit_timeout = timeout;
        self.deposit_poll = poll_interval;
        self
    }

    pub fn with_islock_timeout(mut self, timeout: Duration) -> Self {
        self.islock_timeout = timeout;
        self
    }

    pub fn platform(&self) -> &D {
        &self.platform
    }

    /// Drive a session from its current state until it completes, fails,
    /// or parks on a deposit timeout (recoverable via [`recheck`]).
    ///
    /// Mode inputs are validated before any key material is touched, so a
    /// bad destination never locks funds.
    ///
    /// [`recheck`]: BridgeDriver::recheck
    pub async fn run(&self, state: BridgeState) -> BridgeState {
        if let Err(e) = validate_mode(&state.mode, &self.params) {
            return self.fail(state, e);
        }

        if state.mode.uses_asset_lock() {
            self.run_asset_lock(state).await
        } else if matches!(state.mode, BridgeMode::Dpns { .. }) {
            self.run_dpns(state).await
        } else {
            self.run_manage(state).await
        }
    }

    /// Re-enter the deposit wait after a timeout. The asset-lock key and
    /// deposit address must already exist and are never regenerated here;
    /// fund safety depends on the address staying stable across rechecks.
    pub async fn recheck(&self, state: BridgeState) -> BridgeState {
        if state.asset_lock_key.is_none() || state.deposit_address.is_none() {
            return self.fail_msg(state, "recheck before keys were generated");
        }
        self.await_deposit_and_continue(state).await
    }

    // =========================================================================
    // Asset-lock pipeline
    // =========================================================================

    async fn run_asset_lock(&self, state: BridgeState) -> BridgeState {
        // Create mode offers a key-configuration stage before derivation
        let state = if matches!(state.mode, BridgeMode::Create) {
            self.publish(state.with_step(BridgeStep::ConfiguringKeys))
        } else {
            state
        };
        let state = self.publish(state.with_step(BridgeStep::GeneratingKeys));

        let session = match self.derive_session_keys(&state) {
            Ok(s) => s,
            Err(e) => return self.fail(state, e),
        };
        let deposit_address =
            public_key_to_address(&session.asset_key.public_bytes(), &self.params);
        info!(target: "bridge::pipeline", %deposit_address, "deposit address ready");

        let state = self.publish(state.keys_generated(
            session.mnemonic,
            session.asset_key,
            session.path,
            session.identity_keys,
            deposit_address,
        ));

        // A reload or crash between here and completion must not strand
        // funds; the backup is the only recovery path.
        self.export_backup(&state);

        self.await_deposit_and_continue(state).await
    }

    async fn await_deposit_and_continue(&self, state: BridgeState) -> BridgeState {
        let Some(address) = state.deposit_address.clone() else {
            return self.fail_msg(state, "no deposit address");
        };

        let state = self.publish(state.with_step(BridgeStep::DetectingDeposit));

        let events = self.events.clone();
        let wait = self
            .insight
            .wait_for_utxo(
                &address,
                MIN_DEPOSIT_DUFFS,
                self.deposit_timeout,
                self.deposit_poll,
                |remaining_ms, current_total| {
                    if let Some(tx) = &events {
                        let _ = tx.send(BridgeEvent::DepositProgress {
                            remaining_ms,
                            current_total,
                        });
                    }
                },
            )
            .await;

        match wait.utxo {
            Some(utxo) => {
                let state = self.publish(state.deposit_detected(utxo.clone(), wait.total_amount));
                self.continue_pipeline(state, utxo).await
            }
            None => {
                info!(
                    target: "bridge::pipeline",
                    total = wait.total_amount,
                    "deposit wait expired"
                );
                self.publish(state.deposit_wait_expired(wait.total_amount))
            }
        }
    }

    async fn continue_pipeline(&self, state: BridgeState, utxo: Utxo) -> BridgeState {
        let Some(asset_key) = state.asset_lock_key.clone() else {
            return self.fail_msg(state, "missing asset-lock key");
        };

        let fee = self.params.min_fee;
        let tx = match build_asset_lock(&utxo, &asset_key.public_bytes(), fee) {
            Ok(tx) => tx,
            Err(e) => return self.fail(state, e.into()),
        };
        let lock_duffs = utxo.value - fee;

        let state = self.publish(state.with_step(BridgeStep::SigningTransaction));
        let signed = match sign_transaction(&tx, std::slice::from_ref(&utxo), &asset_key) {
            Ok(signed) => signed,
            Err(e) => return self.fail(state, e.into()),
        };
        let signed_hex = signed.to_hex();
        let state = self.publish(state.tx_signed(signed_hex.clone()));

        let txid = match self
            .with_pipeline_retry(|| async {
                self.insight
                    .broadcast(&signed_hex)
                    .await
                    .map_err(BridgeError::from)
            })
            .await
        {
            Ok(txid) => txid,
            Err(e) => return self.fail(state, e),
        };
        info!(target: "bridge::pipeline", %txid, "transaction broadcast");
        let state = self.publish(state.broadcast_accepted(txid.clone()));

        let islock_bytes = match self.islock.wait_for_islock(&txid, self.islock_timeout).await {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(state, e.into()),
        };

        let proof = build_instant_asset_lock_proof(&signed, islock_bytes.clone());
        let state = self.publish(state.proof_assembled(islock_bytes, proof.clone()));
        // The txid is known now; refresh the recovery artifact
        self.export_backup(&state);

        match self.finalize(&state, &proof, &asset_key, lock_duffs).await {
            Ok(identity_id) => {
                let state = self.publish(state.completed(identity_id));
                self.export_backup(&state);
                state
            }
            Err(e) => self.fail(state, e),
        }
    }

    /// The mode-specific final step of the asset-lock pipeline
    async fn finalize(
        &self,
        state: &BridgeState,
        proof: &crate::tx::AssetLockProof,
        asset_key: &KeyPair,
        lock_duffs: u64,
    ) -> BridgeResult<Option<String>> {
        let credits = lock_duffs.saturating_mul(CREDITS_PER_DUFF);

        match &state.mode {
            BridgeMode::Create => {
                let public_keys: Vec<_> =
                    state.identity_keys.iter().map(|k| k.to_public()).collect();
                // Ownership proofs need the private half of every declared key
                let mut signer = PlatformSigner::empty();
                for key in &state.identity_keys {
                    signer.add_key(key.key_pair.clone());
                }

                let identity = self
                    .with_pipeline_retry(|| async {
                        self.platform
                            .create_identity(&public_keys, proof, asset_key, &signer)
                            .await
                            .map_err(BridgeError::from)
                    })
                    .await?;
                Ok(Some(identity.id))
            }

            BridgeMode::TopUp { target_identity_id } => {
                let identity = self.fetch_required_identity(target_identity_id).await?;
                self.with_pipeline_retry(|| async {
                    self.platform
                        .top_up_identity(&identity, proof, asset_key)
                        .await
                        .map_err(BridgeError::from)
                })
                .await?;
                Ok(Some(target_identity_id.clone()))
            }

            BridgeMode::FundAddress { address, wif } => {
                let signer = PlatformSigner::from_wifs(&[wif.as_str()], &self.params)?;
                let outputs = vec![CreditOutput {
                    address: address.clone(),
                    amount: credits,
                }];
                self.with_pipeline_retry(|| async {
                    self.platform
                        .fund_from_asset_lock(proof, asset_key, &outputs, &signer)
                        .await
                        .map_err(BridgeError::from)
                })
                .await?;
                Ok(None)
            }

            BridgeMode::SendToAddress { recipient } => {
                // The recipient does not sign to receive
                let signer = PlatformSigner::empty();
                let outputs = vec![CreditOutput {
                    address: recipient.clone(),
                    amount: credits,
                }];
                self.with_pipeline_retry(|| async {
                    self.platform
                        .fund_from_asset_lock(proof, asset_key, &outputs, &signer)
                        .await
                        .map_err(BridgeError::from)
                })
                .await?;
                Ok(None)
            }

            BridgeMode::Dpns { .. } | BridgeMode::Manage { .. } => Err(PlatformError::Sdk(
                "mode does not use the asset-lock pipeline".to_string(),
            )
            .into()),
        }
    }

    // =========================================================================
    // DPNS and manage flows
    // =========================================================================

    async fn run_dpns(&self, state: BridgeState) -> BridgeState {
        let BridgeMode::Dpns {
            identity_id,
            wif,
            label,
        } = state.mode.clone()
        else {
            return self.fail_msg(state, "not a dpns session");
        };

        let state = self.publish(state.with_step(BridgeStep::RegisteringName));

        let identity = match self.fetch_required_identity(&identity_id).await {
            Ok(identity) => identity,
            Err(e) => return self.fail(state, e),
        };
        let matched = match find_matching_key(&wif, &identity.public_keys, &self.params) {
            Ok(matched) => matched,
            Err(e) => return self.fail(state, e.into()),
        };
        let signer = PlatformSigner::empty().with_key(matched.key_pair.clone());

        let result = dpns::register_name(
            &self.platform,
            &label,
            &identity,
            &matched,
            &signer,
            |label| info!(target: "bridge::dpns", %label, "preorder submitted"),
        )
        .await;

        match result {
            Ok(()) => {
                info!(target: "bridge::dpns", %label, "name registered");
                self.publish(state.completed(Some(identity_id)))
            }
            Err(e) => self.fail(state, e),
        }
    }

    async fn run_manage(&self, state: BridgeState) -> BridgeState {
        let BridgeMode::Manage {
            identity_id,
            wif,
            add_keys,
            disable_key_ids,
        } = state.mode.clone()
        else {
            return self.fail_msg(state, "not a manage session");
        };

        let mut state = self.publish(state.with_step(BridgeStep::UpdatingIdentity));

        let identity = match self.fetch_required_identity(&identity_id).await {
            Ok(identity) => identity,
            Err(e) => return self.fail(state, e),
        };
        let matched = match find_matching_key(&wif, &identity.public_keys, &self.params) {
            Ok(matched) => matched,
            Err(e) => return self.fail(state, e.into()),
        };
        if let Err(e) = keys::validate_for_identity_update(&matched) {
            return self.fail(state, e.into());
        }

        // Fresh random pairs for added keys; the signer carries the master
        // key plus every new private half for ownership proofs
        let mut next_id = identity
            .public_keys
            .iter()
            .map(|k| k.id)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        let mut signer = PlatformSigner::empty().with_key(matched.key_pair.clone());
        let mut new_keys = Vec::with_capacity(add_keys.len());
        for request in &add_keys {
            let pair = KeyPair::generate();
            let key = IdentityKey::new(
                next_id,
                format!("key-{}", next_id),
                KeyType::EcdsaSecp256k1,
                request.purpose,
                request.security_level,
                pair.clone(),
                None,
            );
            signer.add_key(pair);
            new_keys.push(key);
            next_id += 1;
        }
        let added_public: Vec<_> = new_keys.iter().map(|k| k.to_public()).collect();

        let result = self
            .with_pipeline_retry(|| async {
                self.platform
                    .update_identity(&identity, &signer, &added_public, &disable_key_ids)
                    .await
                    .map_err(BridgeError::from)
            })
            .await;

        match result {
            Ok(updated) => {
                info!(
                    target: "bridge::manage",
                    identity = %updated.id,
                    revision = updated.revision,
                    "identity updated"
                );
                // New private keys exist only here; export them
                state.identity_keys = new_keys;
                let state = self.publish(state.completed(Some(identity_id)));
                self.export_backup(&state);
                state
            }
            Err(e) => self.fail(state, e),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn derive_session_keys(&self, state: &BridgeState) -> BridgeResult<SessionKeys> {
        match &state.mode {
            BridgeMode::Create => {
                let mnemonic = match &state.mnemonic {
                    Some(phrase) => parse_mnemonic(phrase)?,
                    None => hdwallet::generate_mnemonic(12)?,
                };
                let coin_type = self.params.coin_type();
                let (asset_key, path) = hdwallet::derive_asset_lock_key(&mnemonic, "", coin_type)?;
                let identity_keys = derive_identity_key_set(&mnemonic, coin_type)?;

                Ok(SessionKeys {
                    mnemonic: Some(mnemonic.to_string()),
                    asset_key,
                    path: Some(path.to_string()),
                    identity_keys,
                })
            }
            // One-shot random keys: deliberately not derivable from any
            // mnemonic, so top-ups cannot be linked to the create mnemonic
            _ => Ok(SessionKeys {
                mnemonic: None,
                asset_key: KeyPair::generate(),
                path: None,
                identity_keys: Vec::new(),
            }),
        }
    }

    async fn fetch_required_identity(&self, id: &str) -> BridgeResult<Identity> {
        let identity = self
            .with_pipeline_retry(|| async {
                self.platform.fetch_identity(id).await.map_err(BridgeError::from)
            })
            .await?;
        identity.ok_or_else(|| PlatformError::IdentityNotFound(id.to_string()).into())
    }

    async fn with_pipeline_retry<T, F, Fut>(&self, op: F) -> BridgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BridgeResult<T>>,
    {
        with_retry(
            op,
            &self.retry_opts,
            default_should_retry,
            |attempt, max_attempts, err| {
                warn!(
                    target: "bridge::pipeline",
                    attempt, max_attempts, error = %err, "retrying"
                );
                self.send_event(BridgeEvent::Retry(RetryStatus {
                    is_retrying: true,
                    attempt,
                    max_attempts,
                    last_error: err.to_string(),
                }));
            },
        )
        .await
    }

    fn publish(&self, state: BridgeState) -> BridgeState {
        info!(target: "bridge::pipeline", step = %state.step, "transition");
        self.send_event(BridgeEvent::State(state.clone()));
        state
    }

    fn send_event(&self, event: BridgeEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn fail(&self, state: BridgeState, err: BridgeError) -> BridgeState {
        warn!(target: "bridge::pipeline", error = %err, code = err.error_code(), "pipeline failed");
        self.publish(state.failed(err.to_string()))
    }

    fn fail_msg(&self, state: BridgeState, message: &str) -> BridgeState {
        warn!(target: "bridge::pipeline", message, "pipeline failed");
        self.publish(state.failed(message))
    }

    fn export_backup(&self, state: &BridgeState) {
        let Some(dir) = &self.backup_dir else { return };
        let backup = backup_from_state(state, &self.params);
        match write_backup(dir, &backup) {
            Ok(path) => info!(target: "bridge::backup", path = %path.display(), "backup written"),
            Err(e) => warn!(target: "bridge::backup", error = %e, "backup write failed"),
        }
    }
}

struct SessionKeys {
    mnemonic: Option<String>,
    asset_key: KeyPair,
    path: Option<String>,
    identity_keys: Vec<IdentityKey>,
}

/// The standard key set registered for a new identity: a MASTER and a HIGH
/// authentication key plus a CRITICAL transfer key, all on DIP-0013 paths
fn derive_identity_key_set(
    mnemonic: &bip39::Mnemonic,
    coin_type: u32,
) -> BridgeResult<Vec<IdentityKey>> {
    let specs = [
        ("master-auth", Purpose::Authentication, SecurityLevel::Master),
        ("high-auth", Purpose::Authentication, SecurityLevel::High),
        ("transfer", Purpose::Transfer, SecurityLevel::Critical),
    ];

    let mut identity_keys = Vec::with_capacity(specs.len());
    for (index, (name, purpose, level)) in specs.iter().enumerate() {
        let (pair, path) =
            hdwallet::derive_identity_key(mnemonic, "", coin_type, 0, index as u32)?;
        identity_keys.push(IdentityKey::new(
            index as u32,
            *name,
            KeyType::EcdsaSecp256k1,
            *purpose,
            *level,
            pair,
            Some(path.to_string()),
        ));
    }
    Ok(identity_keys)
}

/// Validate mode inputs. Runs before any keys are derived or deposits
/// polled so a bad destination fails the session immediately.
fn validate_mode(mode: &BridgeMode, params: &NetworkParams) -> BridgeResult<()> {
    match mode {
        BridgeMode::Create => Ok(()),
        BridgeMode::TopUp { target_identity_id } => {
            validate_identity_id(target_identity_id)?;
            Ok(())
        }
        BridgeMode::FundAddress { address, wif } => {
            validate_platform_address(address, params.platform_hrp)?;
            let parsed = keys::wif_to_private_key(wif)?;
            if parsed.prefix != params.wif_prefix {
                return Err(
                    keys::KeyError::WifNetworkMismatch(parsed.prefix, params.network).into(),
                );
            }
            Ok(())
        }
        BridgeMode::SendToAddress { recipient } => {
            validate_platform_address(recipient, params.platform_hrp)?;
            Ok(())
        }
        BridgeMode::Dpns { identity_id, .. } | BridgeMode::Manage { identity_id, .. } => {
            validate_identity_id(identity_id)?;
            Ok(())
        }
    }
}
