//! Chain adapters and the shared payment error taxonomy.
//!
//! Each supported network family gets one adapter: [`evm`] for EIP-3009
//! `transferWithAuthorization` networks and [`solana`] for fee-payer co-signed SPL
//! transfers. The engine dispatches to an adapter through [`NetworkProvider`].

use std::fmt;

use crate::network::Network;
use crate::types::{
    ErrorReason, MixedAddress, PaymentPayload, PaymentRequirements, SettleResponse, TokenAmount,
    VerifyResponse,
};

pub mod evm;
pub mod solana;

/// Why a payment failed verification or settlement.
///
/// Variants carry the payer address when it was established before the failing check, so
/// responses can still identify who attempted to pay.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Unsupported x402 version")]
    VersionMismatch,
    #[error("Unsupported payment scheme")]
    UnsupportedScheme,
    #[error("Scheme mismatch between payload and requirements")]
    SchemeMismatch,
    #[error("Network mismatch: {0}")]
    NetworkMismatch(String),
    #[error("Payload body does not match the declared network family")]
    PayloadMismatch,
    #[error("Invalid payment requirements: {0}")]
    InvalidRequirements(String),
    #[error("Recipient mismatch: authorization does not pay {expected}")]
    RecipientMismatch {
        payer: Option<MixedAddress>,
        expected: MixedAddress,
    },
    #[error("Authorized value {value} is below required {required}")]
    ValueTooLow {
        payer: MixedAddress,
        value: TokenAmount,
        required: TokenAmount,
    },
    #[error("Authorization is not valid yet")]
    NotValidYet { payer: MixedAddress },
    #[error("Authorization has expired")]
    Expired { payer: MixedAddress },
    #[error("Invalid signature: {reason}")]
    InvalidSignature {
        payer: Option<MixedAddress>,
        reason: String,
    },
    #[error("Insufficient funds: balance {balance} below {required}")]
    InsufficientFunds {
        payer: MixedAddress,
        balance: TokenAmount,
        required: TokenAmount,
    },
    #[error("Invalid transaction payload")]
    InvalidSvmTransaction,
    #[error("Transaction rejected on-chain: {detail}")]
    TransactionState {
        payer: Option<MixedAddress>,
        detail: String,
    },
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl PaymentError {
    /// The payer address, when it was established before the failure.
    pub fn payer(&self) -> Option<MixedAddress> {
        match self {
            PaymentError::RecipientMismatch { payer, .. } => payer.clone(),
            PaymentError::ValueTooLow { payer, .. } => Some(payer.clone()),
            PaymentError::NotValidYet { payer } => Some(payer.clone()),
            PaymentError::Expired { payer } => Some(payer.clone()),
            PaymentError::InvalidSignature { payer, .. } => payer.clone(),
            PaymentError::InsufficientFunds { payer, .. } => Some(payer.clone()),
            PaymentError::TransactionState { payer, .. } => payer.clone(),
            _ => None,
        }
    }

    /// Protocol reason reported when this error surfaces from `verify`.
    pub fn verify_reason(&self) -> ErrorReason {
        match self {
            PaymentError::VersionMismatch => ErrorReason::InvalidX402Version,
            PaymentError::UnsupportedScheme => ErrorReason::UnsupportedScheme,
            PaymentError::SchemeMismatch => ErrorReason::InvalidScheme,
            PaymentError::NetworkMismatch(_) => ErrorReason::InvalidNetwork,
            PaymentError::PayloadMismatch => ErrorReason::InvalidPayload,
            PaymentError::InvalidRequirements(_) => ErrorReason::InvalidPaymentRequirements,
            PaymentError::RecipientMismatch { .. } => ErrorReason::RecipientMismatch,
            PaymentError::ValueTooLow { .. } => ErrorReason::InsufficientFunds,
            PaymentError::NotValidYet { .. } => ErrorReason::InvalidAuthorizationValidAfter,
            PaymentError::Expired { .. } => ErrorReason::InvalidAuthorizationValidBefore,
            PaymentError::InvalidSignature { .. } => ErrorReason::InvalidSignature,
            PaymentError::InsufficientFunds { .. } => ErrorReason::InsufficientFunds,
            PaymentError::InvalidSvmTransaction => ErrorReason::InvalidSvmTransaction,
            PaymentError::TransactionState { .. } => ErrorReason::InvalidTransactionState,
            PaymentError::Unexpected(_) => ErrorReason::UnexpectedVerifyError,
        }
    }

    /// Protocol reason reported when this error surfaces from `settle`.
    pub fn settle_reason(&self) -> ErrorReason {
        match self {
            PaymentError::Unexpected(_) => ErrorReason::UnexpectedSettleError,
            other => other.verify_reason(),
        }
    }

    /// Builds the failure body for a settlement attempt on `network`.
    pub fn as_settle_response(&self, network: Network) -> SettleResponse {
        SettleResponse {
            success: false,
            error_reason: Some(self.settle_reason()),
            payer: self.payer(),
            transaction: None,
            network,
        }
    }
}

impl From<&PaymentError> for VerifyResponse {
    fn from(error: &PaymentError) -> Self {
        VerifyResponse::invalid(error.payer(), error.verify_reason())
    }
}

/// Operations every chain adapter provides to the engine.
pub trait NetworkProviderOps {
    /// Network this provider is connected to.
    fn network(&self) -> Network;

    /// Address of the facilitator's signer, for `GET /supported` metadata and logs.
    fn signer_address(&self) -> MixedAddress;

    /// Checks a payment payload against requirements without touching chain state.
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<VerifyResponse, PaymentError>> + Send;

    /// Executes the payment on-chain and waits for inclusion.
    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<SettleResponse, PaymentError>> + Send;
}

/// A connected chain provider for a single network.
#[derive(Clone)]
pub enum NetworkProvider {
    Evm(evm::EvmProvider),
    Solana(solana::SolanaProvider),
}

impl fmt::Debug for NetworkProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkProvider::Evm(provider) => f
                .debug_tuple("NetworkProvider::Evm")
                .field(&provider.network())
                .finish(),
            NetworkProvider::Solana(provider) => f
                .debug_tuple("NetworkProvider::Solana")
                .field(&provider.network())
                .finish(),
        }
    }
}

impl NetworkProviderOps for NetworkProvider {
    fn network(&self) -> Network {
        match self {
            NetworkProvider::Evm(provider) => provider.network(),
            NetworkProvider::Solana(provider) => provider.network(),
        }
    }

    fn signer_address(&self) -> MixedAddress {
        match self {
            NetworkProvider::Evm(provider) => provider.signer_address(),
            NetworkProvider::Solana(provider) => provider.signer_address(),
        }
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, PaymentError> {
        match self {
            NetworkProvider::Evm(provider) => provider.verify(payload, requirements).await,
            NetworkProvider::Solana(provider) => provider.verify(payload, requirements).await,
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, PaymentError> {
        match self {
            NetworkProvider::Evm(provider) => provider.settle(payload, requirements).await,
            NetworkProvider::Solana(provider) => provider.settle(payload, requirements).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payer() -> MixedAddress {
        "0x857b06519E91e3A54538791bDbb0E22373e36b66"
            .parse::<crate::types::EvmAddress>()
            .unwrap()
            .into()
    }

    #[test]
    fn verify_and_settle_reasons_diverge_only_on_unexpected() {
        let unexpected = PaymentError::Unexpected("rpc down".into());
        assert_eq!(unexpected.verify_reason(), ErrorReason::UnexpectedVerifyError);
        assert_eq!(unexpected.settle_reason(), ErrorReason::UnexpectedSettleError);

        let expired = PaymentError::Expired { payer: payer() };
        assert_eq!(
            expired.verify_reason(),
            ErrorReason::InvalidAuthorizationValidBefore
        );
        assert_eq!(expired.settle_reason(), expired.verify_reason());
    }

    #[test]
    fn value_shortfall_reports_insufficient_funds() {
        let error = PaymentError::ValueTooLow {
            payer: payer(),
            value: TokenAmount::from(5u64),
            required: TokenAmount::from(10u64),
        };
        assert_eq!(error.verify_reason(), ErrorReason::InsufficientFunds);
        let response = VerifyResponse::from(&error);
        assert_eq!(
            response,
            VerifyResponse::invalid(Some(payer()), ErrorReason::InsufficientFunds)
        );
    }

    #[test]
    fn settle_failure_body_carries_payer_and_network() {
        let error = PaymentError::TransactionState {
            payer: Some(payer()),
            detail: "authorization already used".into(),
        };
        let response = error.as_settle_response(Network::Base);
        assert!(!response.success);
        assert_eq!(
            response.error_reason,
            Some(ErrorReason::InvalidTransactionState)
        );
        assert_eq!(response.payer, Some(payer()));
        assert!(response.transaction.is_none());
    }
}
