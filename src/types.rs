//! Wire types for the x402 protocol.
//!
//! This mirrors the structures and validation logic of the official x402 SDKs.
//! The key objects are `PaymentPayload`, `PaymentRequirements`, `VerifyResponse`, and
//! `SettleResponse`, which encode payment intent, authorization, and the result of
//! verification/settlement.
//!
//! Every format-constrained field is a newtype with its own serde implementation, so a
//! value that deserializes is already structurally valid: addresses match their chain
//! format, amounts are decimal strings, nonces are exactly 32 bytes.

use alloy::primitives::U256;
use alloy::{hex, sol};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use url::Url;

use crate::network::Network;
use crate::timestamp::UnixTimestamp;

/// Represents the protocol version. Currently only version 1 is supported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum X402Version {
    /// Version `1`.
    V1,
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            X402Version::V1 => serializer.serialize_u8(1),
        }
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X402Version::V1 => write!(f, "1"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported x402Version: {0}")]
pub struct X402VersionError(pub u8);

impl TryFrom<u8> for X402Version {
    type Error = X402VersionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(X402Version::V1),
            _ => Err(X402VersionError(value)),
        }
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        X402Version::try_from(num).map_err(serde::de::Error::custom)
    }
}

/// Enumerates payment schemes. Only "exact" is supported: the authorized amount must
/// cover the required amount, nothing is left open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scheme::Exact => "exact",
        };
        write!(f, "{}", s)
    }
}

/// Machine-readable reasons a verification or settlement can fail.
///
/// This is a closed enumeration shared with the official SDKs; the string forms are part
/// of the wire protocol and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ErrorReason {
    /// Payer balance or authorized value does not cover the required amount.
    #[error("insufficient_funds")]
    #[serde(rename = "insufficient_funds")]
    InsufficientFunds,
    /// The authorization is not valid yet (`validAfter` is in the future).
    #[error("invalid_exact_evm_payload_authorization_valid_after")]
    #[serde(rename = "invalid_exact_evm_payload_authorization_valid_after")]
    InvalidAuthorizationValidAfter,
    /// The authorization has expired (`validBefore` has passed).
    #[error("invalid_exact_evm_payload_authorization_valid_before")]
    #[serde(rename = "invalid_exact_evm_payload_authorization_valid_before")]
    InvalidAuthorizationValidBefore,
    /// The authorized value is malformed or out of bounds.
    #[error("invalid_exact_evm_payload_authorization_value")]
    #[serde(rename = "invalid_exact_evm_payload_authorization_value")]
    InvalidAuthorizationValue,
    /// Signature recovery failed or recovered a different signer.
    #[error("invalid_exact_evm_payload_signature")]
    #[serde(rename = "invalid_exact_evm_payload_signature")]
    InvalidSignature,
    /// The payment does not pay the recipient the requirements name.
    #[error("invalid_exact_evm_payload_recipient_mismatch")]
    #[serde(rename = "invalid_exact_evm_payload_recipient_mismatch")]
    RecipientMismatch,
    /// The Solana transaction could not be decoded or has an unexpected shape.
    #[error("invalid_exact_svm_payload_transaction")]
    #[serde(rename = "invalid_exact_svm_payload_transaction")]
    InvalidSvmTransaction,
    /// Network mismatch, or the network is not served by this facilitator.
    #[error("invalid_network")]
    #[serde(rename = "invalid_network")]
    InvalidNetwork,
    /// The payload body does not match the declared scheme/network.
    #[error("invalid_payload")]
    #[serde(rename = "invalid_payload")]
    InvalidPayload,
    /// The payment requirements themselves are inconsistent.
    #[error("invalid_payment_requirements")]
    #[serde(rename = "invalid_payment_requirements")]
    InvalidPaymentRequirements,
    /// Payload and requirements declare different schemes.
    #[error("invalid_scheme")]
    #[serde(rename = "invalid_scheme")]
    InvalidScheme,
    /// The declared scheme is not supported by this facilitator.
    #[error("unsupported_scheme")]
    #[serde(rename = "unsupported_scheme")]
    UnsupportedScheme,
    /// The declared x402 version is not supported.
    #[error("invalid_x402_version")]
    #[serde(rename = "invalid_x402_version")]
    InvalidX402Version,
    /// The transaction was submitted or simulated and rejected by the chain.
    #[error("invalid_transaction_state")]
    #[serde(rename = "invalid_transaction_state")]
    InvalidTransactionState,
    /// Catch-all for unexpected verification failures (transport, RPC).
    #[error("unexpected_verify_error")]
    #[serde(rename = "unexpected_verify_error")]
    UnexpectedVerifyError,
    /// Catch-all for unexpected settlement failures (transport, RPC).
    #[error("unexpected_settle_error")]
    #[serde(rename = "unexpected_settle_error")]
    UnexpectedSettleError,
}

/// Represents a 65-byte EVM signature used in EIP-712 typed data.
/// Serialized as 0x-prefixed hex string with 130 characters.
/// Used to authorize an ERC-3009 transferWithAuthorization.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

impl From<[u8; 65]> for EvmSignature {
    fn from(bytes: [u8; 65]) -> Self {
        EvmSignature(bytes)
    }
}

impl Debug for EvmSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmSignature(0x{})", hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        static SIG_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("Invalid regex for EVM signature")
        });

        if SIG_REGEX.is_match(&s) {
            let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|_| {
                serde::de::Error::custom("Failed to decode EVM signature hex string")
            })?;

            let array: [u8; 65] = bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom("Signature must be exactly 65 bytes"))?;

            Ok(EvmSignature(array))
        } else {
            Err(serde::de::Error::custom(
                "Invalid EVM signature format: must be 0x-prefixed and 130 hex chars",
            ))
        }
    }
}

impl Serialize for EvmSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex_string = format!("0x{}", hex::encode(self.0));
        serializer.serialize_str(&hex_string)
    }
}

/// Represents an EVM address.
///
/// Wrapper around `alloy::primitives::Address`, providing display/serialization support.
/// Equality is checksum-agnostic since the underlying bytes are compared.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct EvmAddress(pub alloy::primitives::Address);

impl Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to decode EVM address")]
pub struct EvmAddressDecodingError;

impl FromStr for EvmAddress {
    type Err = EvmAddressDecodingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address =
            alloy::primitives::Address::from_str(s).map_err(|_| EvmAddressDecodingError)?;
        Ok(Self(address))
    }
}

impl TryFrom<&str> for EvmAddress {
    type Error = EvmAddressDecodingError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl From<EvmAddress> for alloy::primitives::Address {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl From<alloy::primitives::Address> for EvmAddress {
    fn from(address: alloy::primitives::Address) -> Self {
        EvmAddress(address)
    }
}

impl PartialEq<alloy::primitives::Address> for EvmAddress {
    fn eq(&self, other: &alloy::primitives::Address) -> bool {
        self.0 == *other
    }
}

/// Represents a 32-byte random nonce, hex-encoded with 0x prefix.
/// Must be exactly 64 hex characters long.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct HexEncodedNonce(pub [u8; 32]);

impl Debug for HexEncodedNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexEncodedNonce(0x{})", hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for HexEncodedNonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        static NONCE_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("Invalid nonce regex"));

        if !NONCE_REGEX.is_match(&s) {
            return Err(serde::de::Error::custom("Invalid nonce format"));
        }

        let bytes =
            hex::decode(&s[2..]).map_err(|_| serde::de::Error::custom("Invalid hex in nonce"))?;

        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid length for nonce"))?;

        Ok(HexEncodedNonce(array))
    }
}

impl Serialize for HexEncodedNonce {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex_string = format!("0x{}", hex::encode(self.0));
        serializer.serialize_str(&hex_string)
    }
}

/// A precise on-chain token amount in base units (e.g., USDC with 6 decimals).
/// Represented as a stringified decimal integer in JSON to prevent precision loss.
///
/// Parsing is strict: plain ASCII digits only, so signs, whitespace, hex prefixes,
/// and empty strings are all rejected.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self.0)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid token amount: expected a decimal digit string")]
pub struct TokenAmountParseError;

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenAmountParseError);
        }
        let value = U256::from_str_radix(s, 10).map_err(|_| TokenAmountParseError)?;
        Ok(TokenAmount(value))
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        TokenAmount(value)
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Maximum number of decimal digits accepted for an EVM authorization `value`.
pub const EVM_MAX_ATOMIC_UNITS: usize = 18;

/// Deserializer for the EVM authorization `value` field, which is bounded to
/// [`EVM_MAX_ATOMIC_UNITS`] digits on the wire.
fn deserialize_evm_value<'de, D>(deserializer: D) -> Result<TokenAmount, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.len() > EVM_MAX_ATOMIC_UNITS {
        return Err(serde::de::Error::custom(format!(
            "value exceeds {EVM_MAX_ATOMIC_UNITS} digits"
        )));
    }
    s.parse().map_err(serde::de::Error::custom)
}

/// EIP-712 structured data for ERC-3009-based authorization.
/// Defines who can transfer how much USDC and when.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    pub from: EvmAddress,
    pub to: EvmAddress,
    #[serde(deserialize_with = "deserialize_evm_value")]
    pub value: TokenAmount,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    pub nonce: HexEncodedNonce,
}

/// Full payload required to authorize an ERC-3009 transfer:
/// includes the signature and the EIP-712 struct.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: EvmSignature,
    pub authorization: ExactEvmPayloadAuthorization,
}

/// Payload for the `exact` scheme on Solana: a base64-encoded, bincode-serialized
/// `VersionedTransaction` built and partially signed by the payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSvmPayload {
    pub transaction: String,
}

/// Chain-family-specific body of a [`PaymentPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExactPaymentPayload {
    Evm(ExactEvmPayload),
    Svm(ExactSvmPayload),
}

/// Describes a signed request to transfer a specific amount of funds on-chain.
/// Includes the scheme, network, and signed payload contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    pub payload: ExactPaymentPayload,
}

/// Represents an EVM address (0x...), a Solana public key (base58), or an off-chain
/// identifier. The format is validated on deserialization and used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MixedAddress {
    /// EVM address
    Evm(EvmAddress),
    /// Solana base58 public key.
    Solana(Pubkey),
    /// Off-chain address in `^[A-Za-z0-9][A-Za-z0-9-]{0,34}[A-Za-z0-9]$` format.
    Offchain(String),
}

impl From<alloy::primitives::Address> for MixedAddress {
    fn from(value: alloy::primitives::Address) -> Self {
        MixedAddress::Evm(value.into())
    }
}

impl From<EvmAddress> for MixedAddress {
    fn from(address: EvmAddress) -> Self {
        MixedAddress::Evm(address)
    }
}

impl From<Pubkey> for MixedAddress {
    fn from(pubkey: Pubkey) -> Self {
        MixedAddress::Solana(pubkey)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MixedAddressError {
    #[error("Not an EVM address")]
    NotEvmAddress,
    #[error("Not a Solana address")]
    NotSolanaAddress,
    #[error("Invalid address format")]
    InvalidAddressFormat,
}

impl TryFrom<MixedAddress> for alloy::primitives::Address {
    type Error = MixedAddressError;

    fn try_from(value: MixedAddress) -> Result<Self, Self::Error> {
        match value {
            MixedAddress::Evm(address) => Ok(address.into()),
            _ => Err(MixedAddressError::NotEvmAddress),
        }
    }
}

impl TryFrom<MixedAddress> for EvmAddress {
    type Error = MixedAddressError;

    fn try_from(value: MixedAddress) -> Result<Self, Self::Error> {
        match value {
            MixedAddress::Evm(address) => Ok(address),
            _ => Err(MixedAddressError::NotEvmAddress),
        }
    }
}

impl TryFrom<MixedAddress> for Pubkey {
    type Error = MixedAddressError;

    fn try_from(value: MixedAddress) -> Result<Self, Self::Error> {
        match value {
            MixedAddress::Solana(pubkey) => Ok(pubkey),
            _ => Err(MixedAddressError::NotSolanaAddress),
        }
    }
}

impl Display for MixedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixedAddress::Evm(address) => write!(f, "{}", address),
            MixedAddress::Solana(pubkey) => write!(f, "{}", pubkey),
            MixedAddress::Offchain(address) => write!(f, "{}", address),
        }
    }
}

impl<'de> Deserialize<'de> for MixedAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        static OFFCHAIN_ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{0,34}[A-Za-z0-9]$")
                .expect("Invalid regex for offchain address")
        });

        let s = String::deserialize(deserializer)?;
        if let Ok(address) = EvmAddress::from_str(&s) {
            return Ok(MixedAddress::Evm(address));
        }
        if let Ok(pubkey) = Pubkey::from_str(&s) {
            return Ok(MixedAddress::Solana(pubkey));
        }
        if OFFCHAIN_ADDRESS_REGEX.is_match(&s) {
            Ok(MixedAddress::Offchain(s))
        } else {
            Err(serde::de::Error::custom("Invalid address format"))
        }
    }
}

impl Serialize for MixedAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A chain transaction reference: a 32-byte EVM transaction hash (0x-hex) or a 64-byte
/// Solana signature (base58).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionHash {
    Evm([u8; 32]),
    Solana([u8; 64]),
}

impl Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionHash::Evm(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            TransactionHash::Solana(bytes) => {
                write!(f, "{}", solana_sdk::signature::Signature::from(*bytes))
            }
        }
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        static TX_HASH_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("invalid regex"));

        if TX_HASH_REGEX.is_match(&s) {
            let bytes = hex::decode(s.trim_start_matches("0x"))
                .map_err(|_| serde::de::Error::custom("Invalid hex in transaction hash"))?;
            let array: [u8; 32] = bytes.try_into().map_err(|_| {
                serde::de::Error::custom("Transaction hash must be exactly 32 bytes")
            })?;
            Ok(TransactionHash::Evm(array))
        } else {
            let signature = solana_sdk::signature::Signature::from_str(&s)
                .map_err(|_| serde::de::Error::custom("Invalid transaction reference format"))?;
            Ok(TransactionHash::Solana(*signature.as_array()))
        }
    }
}

/// Requirements set by the payment-gated endpoint for an acceptable payment.
/// This includes amount, recipient, asset, network, and metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    pub max_amount_required: TokenAmount,
    pub resource: Url,
    pub description: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub pay_to: MixedAddress,
    pub max_timeout_seconds: u64,
    pub asset: MixedAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Wrapper for a payment payload and requirements sent by a resource server
/// to be verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: X402Version,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Wrapper for a payment payload and requirements sent by a resource server
/// to be settled on-chain.
pub type SettleRequest = VerifyRequest;

/// Result returned after verifying a [`PaymentPayload`] against the provided
/// [`PaymentRequirements`].
///
/// Indicates whether the payment authorization is valid and identifies the payer. If
/// invalid, it includes an [`ErrorReason`] describing why verification failed.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid { payer: MixedAddress },
    /// The payload was well-formed but failed verification for the given reason.
    Invalid {
        reason: ErrorReason,
        payer: Option<MixedAddress>,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response with the given `payer` address.
    pub fn valid(payer: MixedAddress) -> Self {
        VerifyResponse::Valid { payer }
    }

    /// Constructs a failed verification response. The `payer` is included when it could
    /// be established before the failing check.
    pub fn invalid(payer: Option<MixedAddress>, reason: ErrorReason) -> Self {
        VerifyResponse::Invalid { reason, payer }
    }
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            VerifyResponse::Valid { payer } => {
                let mut s = serializer.serialize_struct("VerifyResponse", 2)?;
                s.serialize_field("isValid", &true)?;
                s.serialize_field("payer", payer)?;
                s.end()
            }
            VerifyResponse::Invalid { reason, payer } => {
                let fields = if payer.is_some() { 3 } else { 2 };
                let mut s = serializer.serialize_struct("VerifyResponse", fields)?;
                s.serialize_field("isValid", &false)?;
                s.serialize_field("invalidReason", reason)?;
                if let Some(payer) = payer {
                    s.serialize_field("payer", payer)?;
                }
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            is_valid: bool,
            #[serde(default)]
            payer: Option<MixedAddress>,
            #[serde(default)]
            invalid_reason: Option<ErrorReason>,
        }

        let raw = Raw::deserialize(deserializer)?;

        match (raw.is_valid, raw.invalid_reason) {
            (true, None) => {
                let payer = raw
                    .payer
                    .ok_or_else(|| serde::de::Error::custom("`payer` required when valid"))?;
                Ok(VerifyResponse::Valid { payer })
            }
            (false, Some(reason)) => Ok(VerifyResponse::Invalid {
                payer: raw.payer,
                reason,
            }),
            (true, Some(_)) => Err(serde::de::Error::custom(
                "`invalidReason` must be absent when `isValid` is true",
            )),
            (false, None) => Err(serde::de::Error::custom(
                "`invalidReason` must be present when `isValid` is false",
            )),
        }
    }
}

/// Returned after attempting to settle a payment on-chain.
/// Indicates success/failure, the transaction reference, and payer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<MixedAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionHash>,
    pub network: Network,
}

/// A simple error structure returned on unexpected or fatal server errors.
/// Used when no structured protocol-level response is appropriate.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

/// One supported (version, scheme, network) combination, as listed by `GET /supported`.
/// Solana entries carry the facilitator fee payer in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKindsResponse {
    pub kinds: Vec<SupportedPaymentKind>,
}

/// A payment-gated resource advertised through the discovery endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredResource {
    pub resource: Url,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub x402_version: X402Version,
    pub accepts: Vec<PaymentRequirements>,
    pub last_updated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPagination {
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDiscoveryResourcesResponse {
    pub x402_version: X402Version,
    pub items: Vec<DiscoveredResource>,
    pub pagination: DiscoveryPagination,
}

/// Number of decimals used by all known USDC deployments.
pub const USDC_DECIMALS: u32 = 6;

#[derive(Debug, thiserror::Error)]
pub enum UsdcAmountError {
    #[error("Invalid amount: expected a decimal digit string")]
    InvalidFormat,
    #[error("Amount is too large to display")]
    OutOfRange,
}

/// Formats an atomic USDC amount (6 decimals) for human display.
///
/// Shows at least 2 and at most 4 fraction digits, trimming trailing zeros beyond 2.
/// Nonzero amounts below the displayable minimum round up to `0.0001`, so a payment
/// never displays as free.
pub fn format_usdc_amount(atomic: &str) -> Result<String, UsdcAmountError> {
    let units: u128 = if atomic.is_empty() || !atomic.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UsdcAmountError::InvalidFormat);
    } else {
        atomic.parse().map_err(|_| UsdcAmountError::OutOfRange)?
    };
    let scale = 10u128.pow(USDC_DECIMALS);
    let mut whole = units / scale;
    let remainder = units % scale;
    // Round up to 4 fraction digits.
    let mut frac4 = remainder.div_ceil(100);
    if frac4 == 10_000 {
        whole += 1;
        frac4 = 0;
    }
    let mut frac = format!("{:04}", frac4);
    while frac.len() > 2 && frac.ends_with('0') {
        frac.pop();
    }
    Ok(format!("{whole}.{frac}"))
}

sol!(
    /// Solidity-compatible struct definition for ERC-3009 `transferWithAuthorization`.
    ///
    /// This matches the EIP-3009 format used in EIP-712 typed data:
    /// it defines the authorization to transfer tokens from `from` to `to`
    /// for a specific `value`, valid only between `validAfter` and `validBefore`
    /// and identified by a unique `nonce`.
    ///
    /// This struct is primarily used to reconstruct the typed data domain/message
    /// when verifying a client's signature.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn x402_version_accepts_only_v1() {
        let v1: X402Version = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(v1, X402Version::V1);
        assert!(serde_json::from_value::<X402Version>(json!(2)).is_err());
        assert!(serde_json::from_value::<X402Version>(json!(0)).is_err());
        assert_eq!(serde_json::to_value(X402Version::V1).unwrap(), json!(1));
    }

    #[test]
    fn scheme_accepts_only_exact() {
        let scheme: Scheme = serde_json::from_value(json!("exact")).unwrap();
        assert_eq!(scheme, Scheme::Exact);
        assert!(serde_json::from_value::<Scheme>(json!("upto")).is_err());
    }

    #[test]
    fn error_reason_wire_strings() {
        assert_eq!(
            serde_json::to_value(ErrorReason::InsufficientFunds).unwrap(),
            json!("insufficient_funds")
        );
        assert_eq!(
            serde_json::to_value(ErrorReason::InvalidAuthorizationValidAfter).unwrap(),
            json!("invalid_exact_evm_payload_authorization_valid_after")
        );
        assert_eq!(
            serde_json::to_value(ErrorReason::InvalidSvmTransaction).unwrap(),
            json!("invalid_exact_svm_payload_transaction")
        );
        let round: ErrorReason =
            serde_json::from_value(json!("unexpected_settle_error")).unwrap();
        assert_eq!(round, ErrorReason::UnexpectedSettleError);
        assert!(serde_json::from_value::<ErrorReason>(json!("no_such_reason")).is_err());
    }

    #[test]
    fn token_amount_parses_decimal_strings_only() {
        let amount: TokenAmount = serde_json::from_value(json!("1000000")).unwrap();
        assert_eq!(amount, TokenAmount::from(1_000_000u64));
        assert!(serde_json::from_value::<TokenAmount>(json!("")).is_err());
        assert!(serde_json::from_value::<TokenAmount>(json!("-5")).is_err());
        assert!(serde_json::from_value::<TokenAmount>(json!(" 5")).is_err());
        assert!(serde_json::from_value::<TokenAmount>(json!("0x10")).is_err());
        assert!(serde_json::from_value::<TokenAmount>(json!("1.5")).is_err());
        assert_eq!(
            serde_json::to_value(TokenAmount::from(42u64)).unwrap(),
            json!("42")
        );
    }

    fn authorization_json(value: &str) -> serde_json::Value {
        json!({
            "from": "0x857b06519E91e3A54538791bDbb0E22373e36b66",
            "to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "value": value,
            "validAfter": "1740672089",
            "validBefore": "1740672154",
            "nonce": "0xf3746613c2d920b5fdabc0856f2aeb2d4f88ee6037b8cc5d04a71a4462f13480"
        })
    }

    #[test]
    fn evm_authorization_value_bounded_to_18_digits() {
        let ok: ExactEvmPayloadAuthorization =
            serde_json::from_value(authorization_json("999999999999999999")).unwrap();
        assert_eq!(ok.value, TokenAmount::from(999_999_999_999_999_999u64));
        let too_long = serde_json::from_value::<ExactEvmPayloadAuthorization>(
            authorization_json("1000000000000000000"),
        );
        assert!(too_long.is_err());
    }

    #[test]
    fn nonce_requires_exactly_32_bytes() {
        let nonce: HexEncodedNonce = serde_json::from_value(json!(
            "0xf3746613c2d920b5fdabc0856f2aeb2d4f88ee6037b8cc5d04a71a4462f13480"
        ))
        .unwrap();
        assert_eq!(nonce.0[0], 0xf3);
        assert!(serde_json::from_value::<HexEncodedNonce>(json!("0xf37466")).is_err());
        assert!(
            serde_json::from_value::<HexEncodedNonce>(json!(
                "f3746613c2d920b5fdabc0856f2aeb2d4f88ee6037b8cc5d04a71a4462f13480"
            ))
            .is_err()
        );
    }

    #[test]
    fn mixed_address_distinguishes_families() {
        let evm: MixedAddress =
            serde_json::from_value(json!("0x036CbD53842c5426634e7929541eC2318f3dCF7e")).unwrap();
        assert!(matches!(evm, MixedAddress::Evm(_)));

        let solana: MixedAddress =
            serde_json::from_value(json!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")).unwrap();
        assert!(matches!(solana, MixedAddress::Solana(_)));

        let offchain: MixedAddress = serde_json::from_value(json!("some-account-id")).unwrap();
        assert!(matches!(offchain, MixedAddress::Offchain(_)));

        assert!(serde_json::from_value::<MixedAddress>(json!("has spaces!")).is_err());
    }

    #[test]
    fn transaction_hash_round_trips_both_families() {
        let evm: TransactionHash = serde_json::from_value(json!(
            "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef"
        ))
        .unwrap();
        assert!(matches!(evm, TransactionHash::Evm(_)));
        let reencoded = serde_json::to_value(&evm).unwrap();
        assert_eq!(
            reencoded,
            json!("0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef")
        );

        let sig = solana_sdk::signature::Signature::from([7u8; 64]);
        let solana: TransactionHash =
            serde_json::from_value(json!(sig.to_string())).unwrap();
        assert_eq!(solana, TransactionHash::Solana([7u8; 64]));
        assert_eq!(serde_json::to_value(&solana).unwrap(), json!(sig.to_string()));
    }

    #[test]
    fn verify_response_wire_shape() {
        let payer: MixedAddress = "0x857b06519E91e3A54538791bDbb0E22373e36b66"
            .parse::<EvmAddress>()
            .unwrap()
            .into();
        let valid = VerifyResponse::valid(payer.clone());
        let value = serde_json::to_value(&valid).unwrap();
        assert_eq!(value["isValid"], json!(true));
        assert!(value.get("invalidReason").is_none());
        let round: VerifyResponse = serde_json::from_value(value).unwrap();
        assert_eq!(round, valid);

        let invalid =
            VerifyResponse::invalid(Some(payer), ErrorReason::InsufficientFunds);
        let value = serde_json::to_value(&invalid).unwrap();
        assert_eq!(value["isValid"], json!(false));
        assert_eq!(value["invalidReason"], json!("insufficient_funds"));
        let round: VerifyResponse = serde_json::from_value(value).unwrap();
        assert_eq!(round, invalid);

        // invalidReason and isValid must agree
        assert!(
            serde_json::from_value::<VerifyResponse>(json!({
                "isValid": false,
                "payer": "0x857b06519E91e3A54538791bDbb0E22373e36b66"
            }))
            .is_err()
        );
    }

    #[test]
    fn payment_payload_dispatches_on_body_shape() {
        let evm = json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "base-sepolia",
            "payload": {
                "signature": format!("0x{}", "ab".repeat(65)),
                "authorization": authorization_json("10000")
            }
        });
        let payload: PaymentPayload = serde_json::from_value(evm).unwrap();
        assert!(matches!(payload.payload, ExactPaymentPayload::Evm(_)));

        let svm = json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "solana-devnet",
            "payload": { "transaction": "AQAAAA==" }
        });
        let payload: PaymentPayload = serde_json::from_value(svm).unwrap();
        assert!(matches!(payload.payload, ExactPaymentPayload::Svm(_)));
    }

    fn sample_requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: Network::BaseSepolia,
            max_amount_required: TokenAmount::from(10_000u64),
            resource: Url::parse("https://example.com/weather").unwrap(),
            description: "weather report".into(),
            mime_type: "application/json".into(),
            output_schema: Some(json!({"type": "object"})),
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
                .parse::<EvmAddress>()
                .unwrap()
                .into(),
            max_timeout_seconds: 60,
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
                .parse::<EvmAddress>()
                .unwrap()
                .into(),
            extra: Some(json!({"name": "USDC", "version": "2"})),
        }
    }

    #[test]
    fn composite_types_round_trip() {
        let request = VerifyRequest {
            x402_version: X402Version::V1,
            payment_payload: serde_json::from_value(json!({
                "x402Version": 1,
                "scheme": "exact",
                "network": "base-sepolia",
                "payload": {
                    "signature": format!("0x{}", "ab".repeat(65)),
                    "authorization": authorization_json("10000")
                }
            }))
            .unwrap(),
            payment_requirements: sample_requirements(),
        };
        let round: VerifyRequest =
            serde_json::from_value(serde_json::to_value(&request).unwrap()).unwrap();
        assert_eq!(round, request);

        let settled = SettleResponse {
            success: true,
            error_reason: None,
            payer: Some("0x857b06519E91e3A54538791bDbb0E22373e36b66"
                .parse::<EvmAddress>()
                .unwrap()
                .into()),
            transaction: Some(TransactionHash::Evm([0x12; 32])),
            network: Network::BaseSepolia,
        };
        let round: SettleResponse =
            serde_json::from_value(serde_json::to_value(&settled).unwrap()).unwrap();
        assert_eq!(round, settled);

        let resource = DiscoveredResource {
            resource: Url::parse("https://example.com/weather").unwrap(),
            resource_type: "http".into(),
            x402_version: X402Version::V1,
            accepts: vec![sample_requirements()],
            last_updated: 1_740_672_089,
            metadata: None,
        };
        let round: DiscoveredResource =
            serde_json::from_value(serde_json::to_value(&resource).unwrap()).unwrap();
        assert_eq!(round, resource);
    }

    #[test]
    fn format_usdc_amount_display_rules() {
        assert_eq!(format_usdc_amount("1000000").unwrap(), "1.00");
        assert_eq!(format_usdc_amount("0").unwrap(), "0.00");
        assert_eq!(format_usdc_amount("1").unwrap(), "0.0001");
        assert_eq!(format_usdc_amount("10000").unwrap(), "0.01");
        assert_eq!(format_usdc_amount("1234500").unwrap(), "1.2345");
        assert_eq!(format_usdc_amount("1200000").unwrap(), "1.20");
        assert!(format_usdc_amount("12.5").is_err());
        assert!(format_usdc_amount("").is_err());
    }
}
