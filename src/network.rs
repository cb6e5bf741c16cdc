//! Supported networks and their USDC deployments.
//!
//! The [`Network`] enum is the routing key for the whole facilitator: it selects the
//! chain family, the RPC provider, and the token deployment used for EIP-712 domain
//! reconstruction on EVM chains.

use alloy::primitives::address;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey;
use std::collections::HashMap;
use std::fmt;

use crate::types::{EvmAddress, MixedAddress, TransactionHash, USDC_DECIMALS};

/// Networks this facilitator can serve.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "avalanche-fuji")]
    AvalancheFuji,
    #[serde(rename = "avalanche")]
    Avalanche,
    #[serde(rename = "solana-devnet")]
    SolanaDevnet,
    #[serde(rename = "solana")]
    Solana,
    #[serde(rename = "sei")]
    Sei,
    #[serde(rename = "sei-testnet")]
    SeiTestnet,
}

impl Network {
    pub fn variants() -> &'static [Network] {
        &[
            Network::BaseSepolia,
            Network::Base,
            Network::AvalancheFuji,
            Network::Avalanche,
            Network::SolanaDevnet,
            Network::Solana,
            Network::Sei,
            Network::SeiTestnet,
        ]
    }

    pub fn family(&self) -> NetworkFamily {
        match self {
            Network::BaseSepolia
            | Network::Base
            | Network::AvalancheFuji
            | Network::Avalanche
            | Network::Sei
            | Network::SeiTestnet => NetworkFamily::Evm,
            Network::SolanaDevnet | Network::Solana => NetworkFamily::Solana,
        }
    }

    /// EIP-155 chain id for EVM networks, `None` for Solana.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Network::BaseSepolia => Some(84532),
            Network::Base => Some(8453),
            Network::AvalancheFuji => Some(43113),
            Network::Avalanche => Some(43114),
            Network::Sei => Some(1329),
            Network::SeiTestnet => Some(1328),
            Network::SolanaDevnet | Network::Solana => None,
        }
    }

    /// Block explorer URL for a settled transaction, for operator logs.
    pub fn explorer_tx_url(&self, tx: &TransactionHash) -> String {
        match self {
            Network::BaseSepolia => format!("https://sepolia.basescan.org/tx/{tx}"),
            Network::Base => format!("https://basescan.org/tx/{tx}"),
            Network::AvalancheFuji => format!("https://testnet.snowtrace.io/tx/{tx}"),
            Network::Avalanche => format!("https://snowtrace.io/tx/{tx}"),
            Network::Sei => format!("https://seitrace.com/tx/{tx}?chain=pacific-1"),
            Network::SeiTestnet => format!("https://seitrace.com/tx/{tx}?chain=atlantic-2"),
            Network::SolanaDevnet => {
                format!("https://explorer.solana.com/tx/{tx}?cluster=devnet")
            }
            Network::Solana => format!("https://explorer.solana.com/tx/{tx}"),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Network::BaseSepolia => "base-sepolia",
            Network::Base => "base",
            Network::AvalancheFuji => "avalanche-fuji",
            Network::Avalanche => "avalanche",
            Network::SolanaDevnet => "solana-devnet",
            Network::Solana => "solana",
            Network::Sei => "sei",
            Network::SeiTestnet => "sei-testnet",
        };
        write!(f, "{}", s)
    }
}

/// Chain family, used to match a payload body to an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkFamily {
    Evm,
    Solana,
}

/// EIP-712 domain parameters of a token contract. Only meaningful for EVM deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: &'static str,
    pub version: &'static str,
}

/// A known USDC deployment on a specific network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdcDeployment {
    pub network: Network,
    pub address: MixedAddress,
    pub decimals: u32,
    pub eip712: Option<Eip712Domain>,
}

impl UsdcDeployment {
    const fn evm(
        network: Network,
        address: alloy::primitives::Address,
        name: &'static str,
    ) -> Self {
        UsdcDeployment {
            network,
            address: MixedAddress::Evm(EvmAddress(address)),
            decimals: USDC_DECIMALS,
            eip712: Some(Eip712Domain { name, version: "2" }),
        }
    }

    const fn solana(network: Network, mint: solana_sdk::pubkey::Pubkey) -> Self {
        UsdcDeployment {
            network,
            address: MixedAddress::Solana(mint),
            decimals: USDC_DECIMALS,
            eip712: None,
        }
    }

    pub fn by_network(network: Network) -> &'static UsdcDeployment {
        static BY_NETWORK: Lazy<HashMap<Network, &'static UsdcDeployment>> =
            Lazy::new(|| USDC_DEPLOYMENTS.iter().map(|d| (d.network, d)).collect());
        BY_NETWORK[&network]
    }
}

/// Canonical USDC deployments, one per supported network.
pub static USDC_DEPLOYMENTS: Lazy<Vec<UsdcDeployment>> = Lazy::new(|| {
    vec![
        UsdcDeployment::evm(
            Network::BaseSepolia,
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            "USDC",
        ),
        UsdcDeployment::evm(
            Network::Base,
            address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            "USD Coin",
        ),
        UsdcDeployment::evm(
            Network::AvalancheFuji,
            address!("0x5425890298aed601595a70AB815c96711a31Bc65"),
            "USD Coin",
        ),
        UsdcDeployment::evm(
            Network::Avalanche,
            address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
            "USD Coin",
        ),
        UsdcDeployment::evm(
            Network::Sei,
            address!("0xe15fc38f6d8c56af07bbcbe3baf5708a2bf42392"),
            "USDC",
        ),
        UsdcDeployment::evm(
            Network::SeiTestnet,
            address!("0x4fcf1784b31630811181f670aea7a7bef803eaed"),
            "USDC",
        ),
        UsdcDeployment::solana(
            Network::SolanaDevnet,
            pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
        ),
        UsdcDeployment::solana(
            Network::Solana,
            pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_names_are_kebab_case() {
        assert_eq!(
            serde_json::to_value(Network::BaseSepolia).unwrap(),
            json!("base-sepolia")
        );
        assert_eq!(
            serde_json::from_value::<Network>(json!("avalanche-fuji")).unwrap(),
            Network::AvalancheFuji
        );
        assert!(serde_json::from_value::<Network>(json!("mainnet")).is_err());
    }

    #[test]
    fn every_network_has_a_deployment() {
        for network in Network::variants() {
            let deployment = UsdcDeployment::by_network(*network);
            assert_eq!(deployment.network, *network);
            assert_eq!(deployment.decimals, USDC_DECIMALS);
            match network.family() {
                NetworkFamily::Evm => {
                    assert!(matches!(deployment.address, MixedAddress::Evm(_)));
                    assert!(deployment.eip712.is_some());
                    assert!(network.chain_id().is_some());
                }
                NetworkFamily::Solana => {
                    assert!(matches!(deployment.address, MixedAddress::Solana(_)));
                    assert!(deployment.eip712.is_none());
                    assert!(network.chain_id().is_none());
                }
            }
        }
    }

    #[test]
    fn explorer_urls_embed_the_reference() {
        let tx = TransactionHash::Evm([0xab; 32]);
        let url = Network::Base.explorer_tx_url(&tx);
        assert!(url.starts_with("https://basescan.org/tx/0x"));
        let sig = TransactionHash::Solana([1u8; 64]);
        let url = Network::SolanaDevnet.explorer_tx_url(&sig);
        assert!(url.contains("cluster=devnet"));
    }
}
