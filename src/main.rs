//! Bridge CLI
//!
//! Drives one bridge session per invocation against the in-memory
//! platform driver (production deployments supply an SDK-backed
//! `PlatformDriver`). Key backups are written into the working directory.
//!
//! Run modes:
//!   platform-bridge create                    - Create a new identity
//!   platform-bridge topup --identity <id>     - Top up an identity
//!   platform-bridge fund --address <a> --wif <w>  - Fund an owned address
//!   platform-bridge send --address <a>        - Send credits to an address
//!   platform-bridge dpns --identity <id> --wif <w> --label <l>
//!   platform-bridge manage --identity <id> --wif <w> [...]
//!   platform-bridge faucet --address <a>      - Testnet faucet drip

use std::env;

use platform_bridge::bridge::{BridgeDriver, BridgeEvent, BridgeMode, BridgeState, NewKeyRequest};
use platform_bridge::config::{Network, NetworkParams};
use platform_bridge::faucet::FaucetClient;
use platform_bridge::keys::{Purpose, SecurityLevel};
use platform_bridge::platform::MemoryPlatform;
use platform_bridge::units;

#[tokio::main]
async fn main() {
    if let Err(e) = platform_bridge::logging::init_from_env() {
        eprintln!("Warning: logging init failed: {}", e);
    }

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let opts = CliOptions::parse(&args[2..]);
    let mut params = NetworkParams::from_env();
    if let Some(network) = &opts.network {
        params = NetworkParams::for_network(Network::from_arg(network));
    }

    match args[1].as_str() {
        "create" => {
            let mut state = BridgeState::new(params.network, BridgeMode::Create);
            state.mnemonic = opts.mnemonic.clone();
            run_session(params, state, &opts).await;
        }
        "topup" => {
            let Some(identity) = opts.identity.clone() else {
                return missing("--identity");
            };
            let state = BridgeState::new(
                params.network,
                BridgeMode::TopUp {
                    target_identity_id: identity,
                },
            );
            run_session(params, state, &opts).await;
        }
        "fund" => {
            let (Some(address), Some(wif)) = (opts.address.clone(), opts.wif.clone()) else {
                return missing("--address and --wif");
            };
            let state =
                BridgeState::new(params.network, BridgeMode::FundAddress { address, wif });
            run_session(params, state, &opts).await;
        }
        "send" => {
            let Some(recipient) = opts.address.clone() else {
                return missing("--address");
            };
            let state = BridgeState::new(params.network, BridgeMode::SendToAddress { recipient });
            run_session(params, state, &opts).await;
        }
        "dpns" => {
            let (Some(identity_id), Some(wif), Some(label)) =
                (opts.identity.clone(), opts.wif.clone(), opts.label.clone())
            else {
                return missing("--identity, --wif and --label");
            };
            let state = BridgeState::new(
                params.network,
                BridgeMode::Dpns {
                    identity_id,
                    wif,
                    label,
                },
            );
            run_session(params, state, &opts).await;
        }
        "manage" => {
            let (Some(identity_id), Some(wif)) = (opts.identity.clone(), opts.wif.clone()) else {
                return missing("--identity and --wif");
            };
            let state = BridgeState::new(
                params.network,
                BridgeMode::Manage {
                    identity_id,
                    wif,
                    add_keys: opts.add_keys.clone(),
                    disable_key_ids: opts.disable_key_ids.clone(),
                },
            );
            run_session(params, state, &opts).await;
        }
        "faucet" => run_faucet(params, &opts).await,
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
        }
    }
}

fn print_usage() {
    println!("platform-bridge - Dash to Platform credit bridge");
    println!();
    println!("Usage:");
    println!("  platform-bridge create [--mnemonic <phrase>]      Create a new identity");
    println!("  platform-bridge topup --identity <id>             Top up an identity");
    println!("  platform-bridge fund --address <a> --wif <w>      Fund an owned platform address");
    println!("  platform-bridge send --address <a>                Send credits to a platform address");
    println!("  platform-bridge dpns --identity <id> --wif <w> --label <l>");
    println!("  platform-bridge manage --identity <id> --wif <w> [--disable <ids>] [--add <purpose:level>]");
    println!("  platform-bridge faucet --address <a> [--amount <duffs>]");
    println!();
    println!("Options:");
    println!("  --network <name>   'mainnet' selects mainnet; anything else is testnet");
    println!();
    println!("Environment Variables:");
    println!("  BRIDGE_NETWORK     Network selection (same rule as --network)");
    println!("  BRIDGE_INSIGHT_URL Insight API base URL override");
    println!("  BRIDGE_ISLOCK_URL  InstantSend-lock RPC URL override");
    println!("  BRIDGE_FAUCET_URL  Testnet faucet base URL");
    println!("  BRIDGE_LOG_LEVEL   Logging level (debug, info, warn, error)");
}

fn missing(what: &str) {
    eprintln!("Missing required option(s): {}", what);
    print_usage();
}

#[derive(Default)]
struct CliOptions {
    network: Option<String>,
    mnemonic: Option<String>,
    identity: Option<String>,
    address: Option<String>,
    wif: Option<String>,
    label: Option<String>,
    amount: Option<u64>,
    add_keys: Vec<NewKeyRequest>,
    disable_key_ids: Vec<u32>,
}

impl CliOptions {
    fn parse(args: &[String]) -> Self {
        let mut opts = Self::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--network" if i + 1 < args.len() => {
                    opts.network = Some(args[i + 1].clone());
                    i += 2;
                }
                "--mnemonic" if i + 1 < args.len() => {
                    opts.mnemonic = Some(args[i + 1].clone());
                    i += 2;
                }
                "--identity" if i + 1 < args.len() => {
                    opts.identity = Some(args[i + 1].clone());
                    i += 2;
                }
                "--address" if i + 1 < args.len() => {
                    opts.address = Some(args[i + 1].clone());
                    i += 2;
                }
                "--wif" if i + 1 < args.len() => {
                    opts.wif = Some(args[i + 1].clone());
                    i += 2;
                }
                "--label" if i + 1 < args.len() => {
                    opts.label = Some(args[i + 1].clone());
                    i += 2;
                }
                "--amount" if i + 1 < args.len() => {
                    opts.amount = args[i + 1].parse().ok();
                    i += 2;
                }
                "--disable" if i + 1 < args.len() => {
                    opts.disable_key_ids = args[i + 1]
                        .split(',')
                        .filter_map(|s| s.trim().parse().ok())
                        .collect();
                    i += 2;
                }
                "--add" if i + 1 < args.len() => {
                    if let Some(request) = parse_key_request(&args[i + 1]) {
                        opts.add_keys.push(request);
                    } else {
                        eprintln!("Warning: ignoring malformed --add {}", args[i + 1]);
                    }
                    i += 2;
                }
                _ => i += 1,
            }
        }
        opts
    }
}

/// Parse "purpose:level", e.g. "transfer:critical" or "authentication:high"
fn parse_key_request(raw: &str) -> Option<NewKeyRequest> {
    let (purpose, level) = raw.split_once(':')?;
    let purpose = match purpose.to_lowercase().as_str() {
        "authentication" | "auth" => Purpose::Authentication,
        "encryption" => Purpose::Encryption,
        "decryption" => Purpose::Decryption,
        "transfer" => Purpose::Transfer,
        "voting" => Purpose::Voting,
        _ => return None,
    };
    let security_level = match level.to_lowercase().as_str() {
        "master" => SecurityLevel::Master,
        "critical" => SecurityLevel::Critical,
        "high" => SecurityLevel::High,
        "medium" => SecurityLevel::Medium,
        _ => return None,
    };
    Some(NewKeyRequest {
        purpose,
        security_level,
    })
}

async fn run_session(params: NetworkParams, state: BridgeState, _opts: &CliOptions) {
    params.print_summary();

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                BridgeEvent::State(state) => {
                    println!("[{}]", state.step);
                    if let Some(address) = &state.deposit_address {
                        if state.step == platform_bridge::bridge::BridgeStep::AwaitingDeposit {
                            println!("  Deposit address: {}", address);
                            println!(
                                "  Send at least {}",
                                units::format_duffs(platform_bridge::bridge::MIN_DEPOSIT_DUFFS)
                            );
                        }
                    }
                    if let Some(txid) = &state.broadcast_txid {
                        if state.step == platform_bridge::bridge::BridgeStep::WaitingIslock {
                            println!("  Broadcast txid: {}", txid);
                        }
                    }
                }
                BridgeEvent::DepositProgress {
                    remaining_ms,
                    current_total,
                } => {
                    println!(
                        "  waiting... {}s left, seen {}",
                        remaining_ms / 1000,
                        units::format_duffs(current_total)
                    );
                }
                BridgeEvent::Retry(status) => {
                    println!(
                        "  retrying ({}/{}): {}",
                        status.attempt, status.max_attempts, status.last_error
                    );
                }
            }
        }
    });

    let backup_dir = env::current_dir().unwrap_or_else(|_| ".".into());
    let driver = BridgeDriver::new(params, MemoryPlatform::new())
        .with_events(events_tx)
        .with_backup_dir(backup_dir);

    let final_state = driver.run(state).await;
    // Let the printer drain before reporting
    drop(driver);
    let _ = printer.await;

    println!();
    match final_state.step {
        platform_bridge::bridge::BridgeStep::Complete => {
            println!("=== Complete ===");
            if let Some(id) = &final_state.identity_id {
                println!("Identity: {}", id);
            }
            if let Some(txid) = &final_state.broadcast_txid {
                println!("Asset-lock txid: {}", txid);
            }
        }
        platform_bridge::bridge::BridgeStep::DetectingDeposit
            if final_state.deposit_timed_out =>
        {
            println!("=== Deposit not seen yet ===");
            println!(
                "Seen so far: {}",
                units::format_duffs(final_state.detected_deposit_amount)
            );
            println!("Keys were backed up; re-run with the same mnemonic to recheck.");
        }
        _ => {
            println!("=== Failed ===");
            if let Some(error) = &final_state.last_error {
                println!("Error: {}", error);
            }
        }
    }
}

async fn run_faucet(params: NetworkParams, opts: &CliOptions) {
    let Some(address) = opts.address.clone() else {
        return missing("--address");
    };
    let Some(base_url) = params.faucet_url.clone() else {
        eprintln!("No faucet configured for {} (set BRIDGE_FAUCET_URL)", params.network);
        return;
    };

    let amount = opts.amount.unwrap_or(500_000);
    let client = FaucetClient::new(&base_url);
    match client.request_funds(&address, amount).await {
        Ok(drip) => {
            println!("Faucet sent {} to {}", units::format_duffs(drip.amount), drip.address);
            println!("txid: {}", drip.txid);
        }
        Err(platform_bridge::faucet::FaucetError::RateLimited { retry_after_secs }) => {
            eprintln!("Faucet rate limited; retry in {} seconds", retry_after_secs);
        }
        Err(e) => eprintln!("Faucet error: {}", e),
    }
}
