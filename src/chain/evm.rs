//! EVM adapter: verifies EIP-3009 `transferWithAuthorization` payloads and settles them
//! by submitting the authorization through the facilitator's own signer.
//!
//! Verification is ordered so the cheapest checks run first and the payer address is
//! attached to every failure once it is known: requirements sanity, recipient, value,
//! time window, signature recovery, then a `balanceOf` call.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, FixedBytes, Signature, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::{SolStruct, eip712_domain};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use crate::chain::PaymentError;
use crate::network::{Network, UsdcDeployment};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    ExactEvmPayload, ExactEvmPayloadAuthorization, ExactPaymentPayload, EvmAddress, MixedAddress,
    PaymentPayload, PaymentRequirements, SettleResponse, TokenAmount, TransactionHash,
    TransferWithAuthorization, VerifyResponse,
};

sol! {
    #[sol(rpc)]
    contract IEip3009 {
        function balanceOf(address account) external view returns (uint256);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvmProviderError {
    #[error("Failed to connect to {network}: {message}")]
    Connect { network: Network, message: String },
    #[error("Chain id mismatch for {network}: expected {expected}, RPC reports {actual}")]
    ChainIdMismatch {
        network: Network,
        expected: u64,
        actual: u64,
    },
    #[error("Network {0} is not an EVM network")]
    UnsupportedNetwork(Network),
}

/// Connected EVM provider with the facilitator's signer attached for settlement.
#[derive(Clone)]
pub struct EvmProvider {
    network: Network,
    provider: DynProvider,
    signer_address: Address,
    eip1559: bool,
}

impl EvmProvider {
    /// Connects to `rpc_url` and validates that it serves the chain `network` claims.
    pub async fn try_new(
        signer: PrivateKeySigner,
        rpc_url: &str,
        eip1559: bool,
        network: Network,
    ) -> Result<Self, EvmProviderError> {
        let expected_chain_id = network
            .chain_id()
            .ok_or(EvmProviderError::UnsupportedNetwork(network))?;
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect(rpc_url)
            .await
            .map_err(|e| EvmProviderError::Connect {
                network,
                message: e.to_string(),
            })?
            .erased();
        let actual_chain_id =
            provider
                .get_chain_id()
                .await
                .map_err(|e| EvmProviderError::Connect {
                    network,
                    message: e.to_string(),
                })?;
        if actual_chain_id != expected_chain_id {
            return Err(EvmProviderError::ChainIdMismatch {
                network,
                expected: expected_chain_id,
                actual: actual_chain_id,
            });
        }
        Ok(EvmProvider {
            network,
            provider,
            signer_address,
            eip1559,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn signer_address(&self) -> MixedAddress {
        self.signer_address.into()
    }

    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, PaymentError> {
        let evm_payload = match &payload.payload {
            ExactPaymentPayload::Evm(evm_payload) => evm_payload,
            ExactPaymentPayload::Svm(_) => return Err(PaymentError::PayloadMismatch),
        };
        let payer = evm_payload.authorization.from;
        let deployment = assert_requirements(self.network, requirements)?;
        assert_recipient(&evm_payload.authorization, requirements)?;
        assert_enough_value(&evm_payload.authorization, requirements)?;
        assert_time(&evm_payload.authorization, UnixTimestamp::now())?;
        assert_signature(evm_payload, requirements, deployment, self.network)?;
        self.assert_enough_balance(&evm_payload.authorization, requirements)
            .await?;
        Ok(VerifyResponse::valid(payer.into()))
    }

    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, PaymentError> {
        let evm_payload = match &payload.payload {
            ExactPaymentPayload::Evm(evm_payload) => evm_payload,
            ExactPaymentPayload::Svm(_) => return Err(PaymentError::PayloadMismatch),
        };
        // Failed verification surfaces as an error here; on success the payer is the
        // authorization signer.
        self.verify(payload, requirements).await?;
        let payer: MixedAddress = evm_payload.authorization.from.into();
        let authorization = &evm_payload.authorization;
        let asset: Address = requirements
            .asset
            .clone()
            .try_into()
            .map_err(|_| PaymentError::InvalidRequirements("asset is not an EVM address".into()))?;
        let contract = IEip3009::new(asset, &self.provider);

        let signature = evm_payload.signature.0;
        let r = B256::from_slice(&signature[0..32]);
        let s = B256::from_slice(&signature[32..64]);
        let v = signature[64];

        let mut call = contract.transferWithAuthorization(
            authorization.from.into(),
            authorization.to.into(),
            authorization.value.into(),
            U256::from(authorization.valid_after.as_secs()),
            U256::from(authorization.valid_before.as_secs()),
            FixedBytes(authorization.nonce.0),
            v,
            r,
            s,
        );
        if !self.eip1559 {
            // Pre-EIP-1559 chains need an explicit gas price on the legacy transaction.
            let gas_price = self
                .provider
                .get_gas_price()
                .await
                .map_err(|e| PaymentError::Unexpected(e.to_string()))?;
            call = call.gas_price(gas_price);
        }
        let pending = call
            .send()
            .await
            .map_err(|e| PaymentError::TransactionState {
                payer: Some(payer.clone()),
                detail: e.to_string(),
            })?;
        let wait = Duration::from_secs(requirements.max_timeout_seconds);
        let receipt = tokio::time::timeout(wait, pending.get_receipt())
            .await
            .map_err(|_| {
                PaymentError::Unexpected(format!(
                    "no receipt within {}s",
                    requirements.max_timeout_seconds
                ))
            })?
            .map_err(|e| PaymentError::Unexpected(e.to_string()))?;

        if !receipt.status() {
            return Err(PaymentError::TransactionState {
                payer: Some(payer),
                detail: "transaction reverted".into(),
            });
        }
        let transaction = TransactionHash::Evm(receipt.transaction_hash.0);
        tracing::info!(
            network = %self.network,
            tx = %self.network.explorer_tx_url(&transaction),
            "settled payment"
        );
        Ok(SettleResponse {
            success: true,
            error_reason: None,
            payer: Some(payer),
            transaction: Some(transaction),
            network: self.network,
        })
    }

    #[instrument(skip_all, err)]
    async fn assert_enough_balance(
        &self,
        authorization: &ExactEvmPayloadAuthorization,
        requirements: &PaymentRequirements,
    ) -> Result<(), PaymentError> {
        let asset: Address = requirements
            .asset
            .clone()
            .try_into()
            .map_err(|_| PaymentError::InvalidRequirements("asset is not an EVM address".into()))?;
        let contract = IEip3009::new(asset, &self.provider);
        let balance = contract
            .balanceOf(authorization.from.into())
            .call()
            .await
            .map_err(|e| PaymentError::Unexpected(e.to_string()))?;
        let required: U256 = authorization.value.into();
        if balance < required {
            return Err(PaymentError::InsufficientFunds {
                payer: authorization.from.into(),
                balance: balance.into(),
                required: authorization.value,
            });
        }
        Ok(())
    }
}

/// EIP-712 domain parameters a resource server may pin via `requirements.extra`.
#[derive(Debug, Deserialize)]
struct ExtraDomain {
    name: Option<String>,
    version: Option<String>,
}

/// Checks that the requirements name a known USDC deployment on this network.
#[instrument(skip_all, err)]
fn assert_requirements(
    network: Network,
    requirements: &PaymentRequirements,
) -> Result<&'static UsdcDeployment, PaymentError> {
    if requirements.network != network {
        return Err(PaymentError::NetworkMismatch(format!(
            "requirements are for {}, provider serves {}",
            requirements.network, network
        )));
    }
    let deployment = UsdcDeployment::by_network(network);
    if requirements.asset != deployment.address {
        return Err(PaymentError::InvalidRequirements(format!(
            "asset {} is not the USDC deployment on {}",
            requirements.asset, network
        )));
    }
    if !matches!(requirements.pay_to, MixedAddress::Evm(_)) {
        return Err(PaymentError::InvalidRequirements(
            "payTo is not an EVM address".into(),
        ));
    }
    Ok(deployment)
}

#[instrument(skip_all, err)]
fn assert_recipient(
    authorization: &ExactEvmPayloadAuthorization,
    requirements: &PaymentRequirements,
) -> Result<(), PaymentError> {
    let pay_to: EvmAddress = requirements.pay_to.clone().try_into().map_err(|_| {
        PaymentError::InvalidRequirements("payTo is not an EVM address".into())
    })?;
    if authorization.to != pay_to {
        return Err(PaymentError::RecipientMismatch {
            payer: Some(authorization.from.into()),
            expected: requirements.pay_to.clone(),
        });
    }
    Ok(())
}

#[instrument(skip_all, err)]
fn assert_enough_value(
    authorization: &ExactEvmPayloadAuthorization,
    requirements: &PaymentRequirements,
) -> Result<(), PaymentError> {
    if authorization.value < requirements.max_amount_required {
        return Err(PaymentError::ValueTooLow {
            payer: authorization.from.into(),
            value: authorization.value,
            required: requirements.max_amount_required,
        });
    }
    Ok(())
}

/// The authorization window is half-open: `validAfter <= now < validBefore`.
#[instrument(skip_all, err)]
fn assert_time(
    authorization: &ExactEvmPayloadAuthorization,
    now: UnixTimestamp,
) -> Result<(), PaymentError> {
    if now < authorization.valid_after {
        return Err(PaymentError::NotValidYet {
            payer: authorization.from.into(),
        });
    }
    if now >= authorization.valid_before {
        return Err(PaymentError::Expired {
            payer: authorization.from.into(),
        });
    }
    Ok(())
}

/// Recomputes the EIP-712 digest and requires the recovered signer to equal
/// `authorization.from`.
#[instrument(skip_all, err)]
fn assert_signature(
    payload: &ExactEvmPayload,
    requirements: &PaymentRequirements,
    deployment: &UsdcDeployment,
    network: Network,
) -> Result<(), PaymentError> {
    let payer: MixedAddress = payload.authorization.from.into();
    let digest = signing_hash(&payload.authorization, requirements, deployment, network)?;
    let signature =
        Signature::from_raw_array(&payload.signature.0).map_err(|e| PaymentError::InvalidSignature {
            payer: Some(payer.clone()),
            reason: e.to_string(),
        })?;
    let recovered = signature
        .recover_address_from_prehash(&digest)
        .map_err(|e| PaymentError::InvalidSignature {
            payer: Some(payer.clone()),
            reason: e.to_string(),
        })?;
    if payload.authorization.from != recovered {
        return Err(PaymentError::InvalidSignature {
            payer: Some(payer),
            reason: format!("recovered signer {recovered} does not match authorization.from"),
        });
    }
    Ok(())
}

/// EIP-712 digest of the transfer authorization under the token's domain.
///
/// Domain name/version come from the deployment table unless the resource server pinned
/// them in `requirements.extra`.
fn signing_hash(
    authorization: &ExactEvmPayloadAuthorization,
    requirements: &PaymentRequirements,
    deployment: &UsdcDeployment,
    network: Network,
) -> Result<B256, PaymentError> {
    let defaults = deployment
        .eip712
        .as_ref()
        .ok_or_else(|| PaymentError::InvalidRequirements("no EIP-712 domain for asset".into()))?;
    let chain_id = network.chain_id().ok_or_else(|| {
        PaymentError::NetworkMismatch(format!("{network} is not an EVM network"))
    })?;
    let verifying_contract: Address = requirements
        .asset
        .clone()
        .try_into()
        .map_err(|_| PaymentError::InvalidRequirements("asset is not an EVM address".into()))?;

    let extra: Option<ExtraDomain> = requirements
        .extra
        .clone()
        .and_then(|value| serde_json::from_value(value).ok());
    let name = extra
        .as_ref()
        .and_then(|e| e.name.clone())
        .unwrap_or_else(|| defaults.name.to_string());
    let version = extra
        .as_ref()
        .and_then(|e| e.version.clone())
        .unwrap_or_else(|| defaults.version.to_string());

    let domain = eip712_domain! {
        name: name,
        version: version,
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    };
    let message = TransferWithAuthorization {
        from: authorization.from.into(),
        to: authorization.to.into(),
        value: authorization.value.into(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: FixedBytes(authorization.nonce.0),
    };
    Ok(message.eip712_signing_hash(&domain))
}
