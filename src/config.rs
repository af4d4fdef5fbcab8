//! Network Configuration for the Bridge Core
//!
//! Every session runs against exactly one network. `NetworkParams` collects
//! the immutable per-network constants (address and WIF version bytes, fee
//! floor, endpoint URLs, BIP-44 coin type) plus environment overrides.
//!
//! # Environment Variables
//!
//! - `BRIDGE_NETWORK` - "mainnet" selects mainnet; anything else is testnet
//! - `BRIDGE_INSIGHT_URL` - Insight API base URL override
//! - `BRIDGE_ISLOCK_URL` - InstantSend-lock RPC URL override
//! - `BRIDGE_FAUCET_URL` - testnet faucet base URL (optional)
//! - `BRIDGE_LOG_LEVEL` - logging level (debug, info, warn, error)

use std::env;

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Parse a network selector. Only an explicit "mainnet" (or "main")
    /// selects mainnet; any other value falls back to testnet.
    pub fn from_arg(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Network::Mainnet,
            _ => Network::Testnet,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    /// BIP-44 coin type used in derivation paths
    pub fn coin_type(&self) -> u32 {
        match self {
            Network::Mainnet => 5,
            Network::Testnet => 1,
        }
    }

    /// Default Insight API base URL
    pub fn default_insight_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://insight.dash.org/insight-api",
            Network::Testnet => "https://insight.testnet.networks.dash.org/insight-api",
        }
    }

    /// Default InstantSend-lock RPC URL
    pub fn default_islock_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://rpc.digitalcash.dev",
            Network::Testnet => "https://trpc.digitalcash.dev",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable per-session network parameters
#[derive(Debug, Clone)]
pub struct NetworkParams {
    /// Network environment
    pub network: Network,

    /// Insight API base URL
    pub insight_url: String,

    /// InstantSend-lock RPC URL
    pub islock_url: String,

    /// Testnet faucet base URL, if any
    pub faucet_url: Option<String>,

    /// P2PKH address version byte
    pub address_version: u8,

    /// WIF prefix byte
    pub wif_prefix: u8,

    /// Minimum transaction fee in duffs
    pub min_fee: u64,

    /// Dust threshold in duffs
    pub dust_threshold: u64,

    /// Bech32m HRP for platform addresses
    pub platform_hrp: &'static str,
}

impl NetworkParams {
    /// Parameters for Dash mainnet
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            insight_url: Network::Mainnet.default_insight_url().to_string(),
            islock_url: Network::Mainnet.default_islock_url().to_string(),
            faucet_url: None,
            address_version: 76,
            wif_prefix: 204,
            min_fee: 1000,
            dust_threshold: 546,
            platform_hrp: "dash",
        }
    }

    /// Parameters for Dash testnet
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            insight_url: Network::Testnet.default_insight_url().to_string(),
            islock_url: Network::Testnet.default_islock_url().to_string(),
            faucet_url: None,
            address_version: 140,
            wif_prefix: 239,
            min_fee: 1000,
            dust_threshold: 546,
            platform_hrp: "tdash",
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
        }
    }

    /// Load parameters from the environment, starting from the defaults of
    /// the network named in `BRIDGE_NETWORK`
    pub fn from_env() -> Self {
        let network = Network::from_arg(&env::var("BRIDGE_NETWORK").unwrap_or_default());
        let mut params = Self::for_network(network);

        if let Ok(url) = env::var("BRIDGE_INSIGHT_URL") {
            params.insight_url = url;
        }
        if let Ok(url) = env::var("BRIDGE_ISLOCK_URL") {
            params.islock_url = url;
        }
        if let Ok(url) = env::var("BRIDGE_FAUCET_URL") {
            if network == Network::Testnet && !url.is_empty() {
                params.faucet_url = Some(url);
            }
        }

        params
    }

    /// BIP-44 coin type for this network
    pub fn coin_type(&self) -> u32 {
        self.network.coin_type()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("=== Bridge Configuration ===");
        println!("Network: {}", self.network);
        println!("Insight API: {}", self.insight_url);
        println!("Islock RPC: {}", self.islock_url);
        if let Some(faucet) = &self.faucet_url {
            println!("Faucet: {}", faucet);
        }
        println!("Min Fee: {} duffs", self.min_fee);
        println!("============================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_from_arg() {
        assert_eq!(Network::from_arg("mainnet"), Network::Mainnet);
        assert_eq!(Network::from_arg("MAINNET"), Network::Mainnet);
        assert_eq!(Network::from_arg("main"), Network::Mainnet);
        // Anything else falls back to testnet
        assert_eq!(Network::from_arg("testnet"), Network::Testnet);
        assert_eq!(Network::from_arg("devnet"), Network::Testnet);
        assert_eq!(Network::from_arg(""), Network::Testnet);
    }

    #[test]
    fn test_version_bytes() {
        let testnet = NetworkParams::testnet();
        assert_eq!(testnet.address_version, 0x8c);
        assert_eq!(testnet.wif_prefix, 0xef);
        assert_eq!(testnet.platform_hrp, "tdash");
        assert_eq!(testnet.coin_type(), 1);

        let mainnet = NetworkParams::mainnet();
        assert_eq!(mainnet.address_version, 0x4c);
        assert_eq!(mainnet.wif_prefix, 0xcc);
        assert_eq!(mainnet.platform_hrp, "dash");
        assert_eq!(mainnet.coin_type(), 5);
    }

    #[test]
    fn test_env_defaults() {
        let params = NetworkParams::testnet();
        assert!(params.insight_url.contains("testnet"));
        assert!(params.faucet_url.is_none());
    }
}
