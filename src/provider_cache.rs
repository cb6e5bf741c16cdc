//! Provider registry built from environment variables.
//!
//! One provider is constructed per network that has an `RPC_URL_<NETWORK>` set; networks
//! without an RPC URL are skipped and simply not served. Signing credentials come from
//! `SIGNER_TYPE` (currently only `"private-key"`), `EVM_PRIVATE_KEY`, and
//! `SVM_PRIVATE_KEY`.

use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Keypair;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::chain::evm::EvmProvider;
use crate::chain::solana::SolanaProvider;
use crate::chain::{NetworkProvider, NetworkProviderOps};
use crate::network::{Network, NetworkFamily};

const ENV_SIGNER_TYPE: &str = "SIGNER_TYPE";
const ENV_EVM_PRIVATE_KEY: &str = "EVM_PRIVATE_KEY";
const ENV_SVM_PRIVATE_KEY: &str = "SVM_PRIVATE_KEY";
const ENV_RPC_BASE: &str = "RPC_URL_BASE";
const ENV_RPC_BASE_SEPOLIA: &str = "RPC_URL_BASE_SEPOLIA";
const ENV_RPC_AVALANCHE_FUJI: &str = "RPC_URL_AVALANCHE_FUJI";
const ENV_RPC_AVALANCHE: &str = "RPC_URL_AVALANCHE";
const ENV_RPC_SOLANA: &str = "RPC_URL_SOLANA";
const ENV_RPC_SOLANA_DEVNET: &str = "RPC_URL_SOLANA_DEVNET";
const ENV_RPC_SEI: &str = "RPC_URL_SEI";
const ENV_RPC_SEI_TESTNET: &str = "RPC_URL_SEI_TESTNET";

/// Connected providers keyed by network.
///
/// Use [`ProviderCache::from_env`] to load credentials and connect using environment
/// variables.
#[derive(Clone)]
pub struct ProviderCache {
    providers: HashMap<Network, NetworkProvider>,
}

/// Lookup of a configured provider by network.
pub trait ProviderMap {
    type Value;

    fn by_network<N: Borrow<Network>>(&self, network: N) -> Option<&Self::Value>;
}

impl<'a> IntoIterator for &'a ProviderCache {
    type Item = (&'a Network, &'a NetworkProvider);
    type IntoIter = std::collections::hash_map::Iter<'a, Network, NetworkProvider>;

    fn into_iter(self) -> Self::IntoIter {
        self.providers.iter()
    }
}

fn rpc_env_var(network: Network) -> &'static str {
    match network {
        Network::BaseSepolia => ENV_RPC_BASE_SEPOLIA,
        Network::Base => ENV_RPC_BASE,
        Network::AvalancheFuji => ENV_RPC_AVALANCHE_FUJI,
        Network::Avalanche => ENV_RPC_AVALANCHE,
        Network::Solana => ENV_RPC_SOLANA,
        Network::SolanaDevnet => ENV_RPC_SOLANA_DEVNET,
        Network::Sei => ENV_RPC_SEI,
        Network::SeiTestnet => ENV_RPC_SEI_TESTNET,
    }
}

/// Whether the network prices transactions with EIP-1559 fee fields. Legacy networks get
/// an explicit gas price on settlement transactions instead.
fn is_eip1559(network: Network) -> bool {
    match network {
        Network::BaseSepolia
        | Network::Base
        | Network::AvalancheFuji
        | Network::Avalanche
        | Network::Sei
        | Network::SeiTestnet => true,
        Network::Solana | Network::SolanaDevnet => false,
    }
}

impl ProviderCache {
    pub fn new(providers: HashMap<Network, NetworkProvider>) -> Self {
        Self { providers }
    }

    /// Connects a provider for every network with a configured RPC URL.
    ///
    /// Networks without an RPC URL and chain families without signing credentials are
    /// skipped with a warning. A configured RPC URL that cannot be connected or serves
    /// the wrong chain fails startup.
    pub async fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut providers = HashMap::new();
        for network in Network::variants() {
            let Ok(rpc_url) = env::var(rpc_env_var(*network)) else {
                tracing::warn!("No RPC URL configured for {} (skipped)", network);
                continue;
            };
            let provider = match network.family() {
                NetworkFamily::Evm => {
                    let signer = match SignerType::from_env().and_then(|s| s.make_evm_signer()) {
                        Ok(signer) => signer,
                        Err(error) => {
                            tracing::warn!("No EVM signer for {}: {} (skipped)", network, error);
                            continue;
                        }
                    };
                    let provider =
                        EvmProvider::try_new(signer, &rpc_url, is_eip1559(*network), *network)
                            .await?;
                    NetworkProvider::Evm(provider)
                }
                NetworkFamily::Solana => {
                    let keypair =
                        match SignerType::from_env().and_then(|s| s.make_solana_keypair()) {
                            Ok(keypair) => keypair,
                            Err(error) => {
                                tracing::warn!(
                                    "No Solana keypair for {}: {} (skipped)",
                                    network,
                                    error
                                );
                                continue;
                            }
                        };
                    let provider = SolanaProvider::try_new(keypair, &rpc_url, *network).await?;
                    NetworkProvider::Solana(provider)
                }
            };
            tracing::info!(
                "Initialized provider for {} at {} using {}",
                network,
                rpc_url,
                provider.signer_address()
            );
            providers.insert(*network, provider);
        }
        Ok(Self { providers })
    }
}

impl ProviderMap for ProviderCache {
    type Value = NetworkProvider;

    fn by_network<N: Borrow<Network>>(&self, network: N) -> Option<&NetworkProvider> {
        self.providers.get(network.borrow())
    }
}

impl ProviderMap for HashMap<Network, NetworkProvider> {
    type Value = NetworkProvider;

    fn by_network<N: Borrow<Network>>(&self, network: N) -> Option<&NetworkProvider> {
        self.get(network.borrow())
    }
}

/// How signing credentials are sourced from the environment.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerType {
    /// Local private keys in `EVM_PRIVATE_KEY` / `SVM_PRIVATE_KEY`.
    #[serde(rename = "private-key")]
    PrivateKey,
}

impl SignerType {
    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let signer_type_string =
            env::var(ENV_SIGNER_TYPE).map_err(|_| format!("env {ENV_SIGNER_TYPE} not set"))?;
        match signer_type_string.as_str() {
            "private-key" => Ok(SignerType::PrivateKey),
            _ => Err(format!("Unknown signer type {signer_type_string}").into()),
        }
    }

    /// EVM signing key from `EVM_PRIVATE_KEY` (0x-prefixed hex).
    pub fn make_evm_signer(&self) -> Result<PrivateKeySigner, Box<dyn std::error::Error>> {
        match self {
            SignerType::PrivateKey => {
                let raw_key = env::var(ENV_EVM_PRIVATE_KEY)
                    .map_err(|_| format!("env {ENV_EVM_PRIVATE_KEY} not set"))?;
                let signer = PrivateKeySigner::from_str(raw_key.trim())
                    .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
                Ok(signer)
            }
        }
    }

    /// Solana fee-payer keypair from `SVM_PRIVATE_KEY` (base58 of the 64-byte keypair).
    pub fn make_solana_keypair(&self) -> Result<Keypair, Box<dyn std::error::Error>> {
        match self {
            SignerType::PrivateKey => {
                let private_key = env::var(ENV_SVM_PRIVATE_KEY)
                    .map_err(|_| format!("env {ENV_SVM_PRIVATE_KEY} not set"))?;
                Ok(Keypair::from_base58_string(private_key.trim()))
            }
        }
    }
}
