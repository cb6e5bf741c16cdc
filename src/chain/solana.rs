//! Solana adapter: verifies fee-payer co-signed SPL token transfers and settles them by
//! adding the facilitator's signature and broadcasting.
//!
//! A payment transaction has a fixed shape: compute unit limit, compute unit price, an
//! optional `CreateIdempotent` for the recipient's associated token account, and a
//! `TransferChecked` paying the recipient. Anything else is rejected. Every decode or
//! shape failure collapses into the single `invalid_exact_svm_payload_transaction`
//! reason; internals are logged, never returned to callers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::instruction::CompiledInstruction;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::PaymentError;
use crate::network::{Network, UsdcDeployment};
use crate::types::{
    ExactPaymentPayload, MixedAddress, PaymentPayload, PaymentRequirements, SettleResponse,
    TokenAmount, TransactionHash, VerifyResponse,
};

const ATA_PROGRAM: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Network-wide per-transaction compute ceiling; anything above is malformed.
const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;
/// Cap on the priority fee the fee payer is willing to subsidize, in microlamports.
const MAX_COMPUTE_UNIT_PRICE: u64 = 5_000_000;

/// Confirmation poll interval during settlement.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum SolanaProviderError {
    #[error("Failed to connect to {network}: {message}")]
    Connect { network: Network, message: String },
    #[error("Genesis hash mismatch for {network}: RPC reports {actual}")]
    GenesisMismatch { network: Network, actual: String },
    #[error("Network {0} is not a Solana network")]
    UnsupportedNetwork(Network),
}

/// Connected Solana provider holding the facilitator's fee-payer keypair.
#[derive(Clone)]
pub struct SolanaProvider {
    network: Network,
    keypair: Arc<Keypair>,
    rpc_client: Arc<RpcClient>,
}

/// First 32 base58 characters of the cluster genesis hash, used like an EVM chain id.
fn genesis_prefix(network: Network) -> Option<&'static str> {
    match network {
        Network::Solana => Some("5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"),
        Network::SolanaDevnet => Some("EtWTRABZaYq6iMfeYKouRu166VU2xqa1"),
        _ => None,
    }
}

impl SolanaProvider {
    /// Connects to `rpc_url` and validates the cluster against the expected genesis hash.
    pub async fn try_new(
        keypair: Keypair,
        rpc_url: &str,
        network: Network,
    ) -> Result<Self, SolanaProviderError> {
        let expected_prefix =
            genesis_prefix(network).ok_or(SolanaProviderError::UnsupportedNetwork(network))?;
        let rpc_client = RpcClient::new(rpc_url.to_string());
        let genesis = rpc_client
            .get_genesis_hash()
            .await
            .map_err(|e| SolanaProviderError::Connect {
                network,
                message: e.to_string(),
            })?
            .to_string();
        if !genesis.starts_with(expected_prefix) {
            return Err(SolanaProviderError::GenesisMismatch {
                network,
                actual: genesis,
            });
        }
        tracing::info!(
            network = %network,
            fee_payer = %keypair.pubkey(),
            "Initialized Solana provider"
        );
        Ok(SolanaProvider {
            network,
            keypair: Arc::new(keypair),
            rpc_client: Arc::new(rpc_client),
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn signer_address(&self) -> MixedAddress {
        MixedAddress::Solana(self.keypair.pubkey())
    }

    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, PaymentError> {
        let verification = self.verify_transfer(payload, requirements).await?;
        Ok(VerifyResponse::valid(MixedAddress::Solana(
            verification.payer,
        )))
    }

    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, PaymentError> {
        let verification = self.verify_transfer(payload, requirements).await?;
        let payer = verification.payer;
        let transaction = co_sign(verification.transaction, &self.keypair)?;
        if !is_fully_signed(&transaction) {
            return Err(PaymentError::Unexpected(
                "transaction is not fully signed after fee-payer signature".into(),
            ));
        }
        let wait = Duration::from_secs(requirements.max_timeout_seconds);
        let signature = tokio::time::timeout(wait, self.send_and_confirm(&transaction))
            .await
            .map_err(|_| {
                PaymentError::Unexpected(format!(
                    "no confirmation within {}s",
                    requirements.max_timeout_seconds
                ))
            })??;
        let transaction = TransactionHash::Solana(*signature.as_array());
        tracing::info!(
            network = %self.network,
            tx = %self.network.explorer_tx_url(&transaction),
            "settled payment"
        );
        Ok(SettleResponse {
            success: true,
            error_reason: None,
            payer: Some(MixedAddress::Solana(payer)),
            transaction: Some(transaction),
            network: self.network,
        })
    }

    /// Decodes and validates the payment transaction, then dry-runs it with the
    /// fee-payer signature attached.
    async fn verify_transfer(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifiedTransfer, PaymentError> {
        let svm_payload = match &payload.payload {
            ExactPaymentPayload::Svm(svm_payload) => svm_payload,
            ExactPaymentPayload::Evm(_) => return Err(PaymentError::PayloadMismatch),
        };
        assert_requirements(self.network, requirements)?;
        let transaction = decode_transaction(&svm_payload.transaction)?;
        let payer = validate_transfer(&transaction, requirements, &self.keypair.pubkey())?;

        let signed = co_sign(transaction.clone(), &self.keypair)?;
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(CommitmentConfig::confirmed()),
            encoding: None,
            accounts: None,
            inner_instructions: false,
            min_context_slot: None,
        };
        let simulation = self
            .rpc_client
            .simulate_transaction_with_config(&signed, config)
            .await
            .map_err(|e| PaymentError::Unexpected(e.to_string()))?;
        if let Some(err) = simulation.value.err {
            return Err(PaymentError::TransactionState {
                payer: Some(MixedAddress::Solana(payer)),
                detail: err.to_string(),
            });
        }
        Ok(VerifiedTransfer { payer, transaction })
    }

    async fn send_and_confirm(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, PaymentError> {
        let signature = self
            .rpc_client
            .send_transaction_with_config(
                transaction,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| PaymentError::Unexpected(e.to_string()))?;
        loop {
            let confirmed = self
                .rpc_client
                .confirm_transaction_with_commitment(&signature, CommitmentConfig::confirmed())
                .await
                .map_err(|e| PaymentError::Unexpected(e.to_string()))?;
            if confirmed.value {
                return Ok(signature);
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

struct VerifiedTransfer {
    payer: Pubkey,
    transaction: VersionedTransaction,
}

/// All decode and shape failures collapse into one protocol reason. The detail is only
/// logged.
fn malformed(detail: &str) -> PaymentError {
    tracing::debug!(detail, "rejected solana transaction");
    PaymentError::InvalidSvmTransaction
}

fn assert_requirements(
    network: Network,
    requirements: &PaymentRequirements,
) -> Result<(), PaymentError> {
    if requirements.network != network {
        return Err(PaymentError::NetworkMismatch(format!(
            "requirements are for {}, provider serves {}",
            requirements.network, network
        )));
    }
    let deployment = UsdcDeployment::by_network(network);
    if requirements.asset != deployment.address {
        return Err(PaymentError::InvalidRequirements(format!(
            "asset {} is not the USDC mint on {}",
            requirements.asset, network
        )));
    }
    if !matches!(requirements.pay_to, MixedAddress::Solana(_)) {
        return Err(PaymentError::InvalidRequirements(
            "payTo is not a Solana address".into(),
        ));
    }
    Ok(())
}

/// Base64 + bincode decode of the wire transaction.
fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, PaymentError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| malformed(&format!("base64: {e}")))?;
    bincode::deserialize::<VersionedTransaction>(&bytes)
        .map_err(|e| malformed(&format!("bincode: {e}")))
}

/// Resolved view over one compiled instruction.
struct InstructionView<'a> {
    instruction: &'a CompiledInstruction,
    account_keys: &'a [Pubkey],
}

impl<'a> InstructionView<'a> {
    fn at(
        transaction: &'a VersionedTransaction,
        index: usize,
    ) -> Result<InstructionView<'a>, PaymentError> {
        let instruction = transaction
            .message
            .instructions()
            .get(index)
            .ok_or_else(|| malformed("missing instruction"))?;
        Ok(InstructionView {
            instruction,
            account_keys: transaction.message.static_account_keys(),
        })
    }

    fn program_id(&self) -> Result<Pubkey, PaymentError> {
        self.account_keys
            .get(self.instruction.program_id_index as usize)
            .copied()
            .ok_or_else(|| malformed("program id index out of bounds"))
    }

    fn data(&self) -> &[u8] {
        self.instruction.data.as_slice()
    }

    fn account(&self, index: usize) -> Result<Pubkey, PaymentError> {
        let account_index = self
            .instruction
            .accounts
            .get(index)
            .copied()
            .ok_or_else(|| malformed("missing instruction account"))?;
        self.account_keys
            .get(account_index as usize)
            .copied()
            .ok_or_else(|| malformed("account index out of bounds"))
    }
}

/// Instruction 0: `SetComputeUnitLimit` (discriminator 2, u32 limit).
fn check_compute_limit_instruction(
    transaction: &VersionedTransaction,
    index: usize,
) -> Result<(), PaymentError> {
    let instruction = InstructionView::at(transaction, index)?;
    let data = instruction.data();
    if instruction.program_id()? != solana_sdk::compute_budget::ID
        || data.first().copied() != Some(2)
        || data.len() != 5
    {
        return Err(malformed("not a compute unit limit instruction"));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[1..5]);
    let limit = u32::from_le_bytes(buf);
    if limit > MAX_COMPUTE_UNIT_LIMIT {
        return Err(malformed("compute unit limit above network maximum"));
    }
    Ok(())
}

/// Instruction 1: `SetComputeUnitPrice` (discriminator 3, u64 microlamports).
fn check_compute_price_instruction(
    transaction: &VersionedTransaction,
    index: usize,
) -> Result<(), PaymentError> {
    let instruction = InstructionView::at(transaction, index)?;
    let data = instruction.data();
    if instruction.program_id()? != solana_sdk::compute_budget::ID
        || data.first().copied() != Some(3)
        || data.len() != 9
    {
        return Err(malformed("not a compute unit price instruction"));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[1..9]);
    let microlamports = u64::from_le_bytes(buf);
    if microlamports > MAX_COMPUTE_UNIT_PRICE {
        return Err(malformed("compute unit price above facilitator maximum"));
    }
    Ok(())
}

/// Optional instruction 2: ATA `Create` (0) or `CreateIdempotent` (1) for the recipient.
fn check_create_ata_instruction(
    transaction: &VersionedTransaction,
    index: usize,
    requirements: &PaymentRequirements,
) -> Result<(), PaymentError> {
    let instruction = InstructionView::at(transaction, index)?;
    if instruction.program_id()? != ATA_PROGRAM {
        return Err(malformed("not an associated token account instruction"));
    }
    let data = instruction.data();
    if data.is_empty() || (data[0] != 0 && data[0] != 1) {
        return Err(malformed("not an ATA create instruction"));
    }
    if instruction.instruction.accounts.len() < 6 {
        return Err(malformed("ATA create instruction is missing accounts"));
    }
    // Accounts: funder, ata, owner, mint, system program, token program.
    let owner = instruction.account(2)?;
    let mint = instruction.account(3)?;
    let pay_to: Pubkey = requirements
        .pay_to
        .clone()
        .try_into()
        .map_err(|_| malformed("payTo is not a Solana address"))?;
    let asset: Pubkey = requirements
        .asset
        .clone()
        .try_into()
        .map_err(|_| malformed("asset is not a Solana address"))?;
    if owner != pay_to {
        return Err(malformed("ATA created for a different owner"));
    }
    if mint != asset {
        return Err(malformed("ATA created for a different mint"));
    }
    Ok(())
}

/// Associated token account of `owner` for `mint` under `token_program`.
fn derive_ata(owner: &Pubkey, token_program: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM,
    )
    .0
}

struct CheckedTransfer {
    amount: u64,
    authority: Pubkey,
    destination: Pubkey,
    mint: Pubkey,
    token_program: Pubkey,
}

/// Final instruction: `TransferChecked` on spl-token or spl-token-2022.
fn check_transfer_instruction(
    transaction: &VersionedTransaction,
    index: usize,
) -> Result<CheckedTransfer, PaymentError> {
    let instruction = InstructionView::at(transaction, index)?;
    let program_id = instruction.program_id()?;
    let amount = if program_id == spl_token::ID {
        let token_instruction = spl_token::instruction::TokenInstruction::unpack(
            instruction.data(),
        )
        .map_err(|_| malformed("undecodable token instruction"))?;
        match token_instruction {
            spl_token::instruction::TokenInstruction::TransferChecked { amount, .. } => amount,
            _ => return Err(malformed("not a TransferChecked instruction")),
        }
    } else if program_id == spl_token_2022::ID {
        let token_instruction = spl_token_2022::instruction::TokenInstruction::unpack(
            instruction.data(),
        )
        .map_err(|_| malformed("undecodable token instruction"))?;
        match token_instruction {
            spl_token_2022::instruction::TokenInstruction::TransferChecked { amount, .. } => {
                amount
            }
            _ => return Err(malformed("not a TransferChecked instruction")),
        }
    } else {
        return Err(malformed("transfer uses an unknown token program"));
    };
    // Accounts: source, mint, destination, authority.
    Ok(CheckedTransfer {
        amount,
        mint: instruction.account(1)?,
        destination: instruction.account(2)?,
        authority: instruction.account(3)?,
        token_program: program_id,
    })
}

/// Structural validation of the whole transaction. Returns the paying authority.
fn validate_transfer(
    transaction: &VersionedTransaction,
    requirements: &PaymentRequirements,
    fee_payer: &Pubkey,
) -> Result<Pubkey, PaymentError> {
    let instruction_count = transaction.message.instructions().len();
    check_compute_limit_instruction(transaction, 0)?;
    check_compute_price_instruction(transaction, 1)?;
    let transfer = match instruction_count {
        3 => check_transfer_instruction(transaction, 2)?,
        4 => {
            check_create_ata_instruction(transaction, 2, requirements)?;
            check_transfer_instruction(transaction, 3)?
        }
        _ => return Err(malformed("unexpected instruction count")),
    };

    // The facilitator pays the fees, so it must sit at the fee-payer position.
    if transaction.message.static_account_keys().first() != Some(fee_payer) {
        return Err(malformed("facilitator is not the transaction fee payer"));
    }
    if transfer.authority == *fee_payer {
        return Err(malformed("fee payer is the transfer authority"));
    }
    // The fee payer only pays fees; it must not appear inside any instruction.
    for instruction in transaction.message.instructions() {
        for account_index in instruction.accounts.iter() {
            let account = transaction
                .message
                .static_account_keys()
                .get(*account_index as usize)
                .ok_or_else(|| malformed("account index out of bounds"))?;
            if account == fee_payer {
                return Err(malformed("fee payer appears in instruction accounts"));
            }
        }
    }

    let pay_to: Pubkey = requirements
        .pay_to
        .clone()
        .try_into()
        .map_err(|_| malformed("payTo is not a Solana address"))?;
    let asset: Pubkey = requirements
        .asset
        .clone()
        .try_into()
        .map_err(|_| malformed("asset is not a Solana address"))?;
    if transfer.mint != asset {
        return Err(malformed("transfer uses a different mint"));
    }
    let expected_destination = derive_ata(&pay_to, &transfer.token_program, &asset);
    if transfer.destination != expected_destination {
        return Err(malformed("transfer pays an unexpected token account"));
    }
    let amount: TokenAmount = transfer.amount.into();
    if amount < requirements.max_amount_required {
        return Err(PaymentError::ValueTooLow {
            payer: MixedAddress::Solana(transfer.authority),
            value: amount,
            required: requirements.max_amount_required,
        });
    }
    Ok(transfer.authority)
}

/// Adds the fee-payer signature without disturbing payer-contributed signatures.
fn co_sign(
    mut transaction: VersionedTransaction,
    keypair: &Keypair,
) -> Result<VersionedTransaction, PaymentError> {
    let message_bytes = transaction.message.serialize();
    let signature = keypair
        .try_sign_message(&message_bytes)
        .map_err(|e| PaymentError::Unexpected(e.to_string()))?;
    let num_required = transaction.message.header().num_required_signatures as usize;
    let static_keys = transaction.message.static_account_keys();
    let position = static_keys[..num_required.min(static_keys.len())]
        .iter()
        .position(|key| *key == keypair.pubkey())
        .ok_or_else(|| malformed("fee payer is not among required signers"))?;
    if transaction.signatures.len() < num_required {
        transaction
            .signatures
            .resize(num_required, Signature::default());
    }
    transaction.signatures[position] = signature;
    Ok(transaction)
}

fn is_fully_signed(transaction: &VersionedTransaction) -> bool {
    let num_required = transaction.message.header().num_required_signatures as usize;
    if transaction.signatures.len() < num_required {
        return false;
    }
    let default = Signature::default();
    transaction
        .signatures
        .iter()
        .all(|signature| *signature != default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scheme;
    use solana_sdk::compute_budget::ComputeBudgetInstruction;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::{Message, VersionedMessage};
    use url::Url;

    fn requirements(pay_to: Pubkey) -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: Network::SolanaDevnet,
            max_amount_required: TokenAmount::from(10_000u64),
            resource: Url::parse("https://example.com/weather").unwrap(),
            description: "weather report".into(),
            mime_type: "application/json".into(),
            output_schema: None,
            pay_to: MixedAddress::Solana(pay_to),
            max_timeout_seconds: 60,
            asset: UsdcDeployment::by_network(Network::SolanaDevnet)
                .address
                .clone(),
            extra: None,
        }
    }

    fn devnet_mint() -> Pubkey {
        UsdcDeployment::by_network(Network::SolanaDevnet)
            .address
            .clone()
            .try_into()
            .unwrap()
    }

    /// Payment transaction in the canonical shape, signed by the authority only.
    fn payment_transaction(
        fee_payer: &Pubkey,
        authority: &Keypair,
        pay_to: &Pubkey,
        amount: u64,
    ) -> VersionedTransaction {
        let mint = devnet_mint();
        let source = derive_ata(&authority.pubkey(), &spl_token::ID, &mint);
        let destination = derive_ata(pay_to, &spl_token::ID, &mint);
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            ComputeBudgetInstruction::set_compute_unit_price(1_000),
            spl_token::instruction::transfer_checked(
                &spl_token::ID,
                &source,
                &mint,
                &destination,
                &authority.pubkey(),
                &[],
                amount,
                6,
            )
            .unwrap(),
        ];
        let message = Message::new_with_blockhash(&instructions, Some(fee_payer), &Hash::new_unique());
        let message = VersionedMessage::Legacy(message);
        let authority_signature = authority.sign_message(&message.serialize());
        let num_required = message.header().num_required_signatures as usize;
        let mut signatures = vec![Signature::default(); num_required];
        let position = message.static_account_keys()[..num_required]
            .iter()
            .position(|key| *key == authority.pubkey())
            .unwrap();
        signatures[position] = authority_signature;
        VersionedTransaction {
            signatures,
            message,
        }
    }

    #[test]
    fn decode_failures_collapse_into_one_reason() {
        assert!(matches!(
            decode_transaction("not base64 at all!"),
            Err(PaymentError::InvalidSvmTransaction)
        ));
        let garbage = BASE64.encode([0u8, 1, 2, 3]);
        assert!(matches!(
            decode_transaction(&garbage),
            Err(PaymentError::InvalidSvmTransaction)
        ));
    }

    #[test]
    fn well_formed_transfer_passes_and_names_the_authority() {
        let fee_payer = Keypair::new();
        let authority = Keypair::new();
        let pay_to = Pubkey::new_unique();
        let transaction = payment_transaction(&fee_payer.pubkey(), &authority, &pay_to, 10_000);
        let payer =
            validate_transfer(&transaction, &requirements(pay_to), &fee_payer.pubkey()).unwrap();
        assert_eq!(payer, authority.pubkey());
    }

    #[test]
    fn transfer_to_wrong_account_is_rejected() {
        let fee_payer = Keypair::new();
        let authority = Keypair::new();
        let pay_to = Pubkey::new_unique();
        let someone_else = Pubkey::new_unique();
        let transaction =
            payment_transaction(&fee_payer.pubkey(), &authority, &someone_else, 10_000);
        assert!(matches!(
            validate_transfer(&transaction, &requirements(pay_to), &fee_payer.pubkey()),
            Err(PaymentError::InvalidSvmTransaction)
        ));
    }

    #[test]
    fn short_amount_is_insufficient_funds() {
        let fee_payer = Keypair::new();
        let authority = Keypair::new();
        let pay_to = Pubkey::new_unique();
        let transaction = payment_transaction(&fee_payer.pubkey(), &authority, &pay_to, 9_999);
        assert!(matches!(
            validate_transfer(&transaction, &requirements(pay_to), &fee_payer.pubkey()),
            Err(PaymentError::ValueTooLow { .. })
        ));
    }

    #[test]
    fn facilitator_must_be_the_fee_payer() {
        let someone_else = Keypair::new();
        let facilitator = Keypair::new();
        let authority = Keypair::new();
        let pay_to = Pubkey::new_unique();
        // Transaction built around a different fee payer: the facilitator would not be
        // paying the fees, so it must refuse to co-sign it.
        let transaction =
            payment_transaction(&someone_else.pubkey(), &authority, &pay_to, 10_000);
        assert!(matches!(
            validate_transfer(&transaction, &requirements(pay_to), &facilitator.pubkey()),
            Err(PaymentError::InvalidSvmTransaction)
        ));
    }

    #[test]
    fn fee_payer_must_not_move_funds() {
        let fee_payer = Keypair::new();
        let pay_to = Pubkey::new_unique();
        // Fee payer doubles as the transfer authority.
        let transaction = payment_transaction(&fee_payer.pubkey(), &fee_payer, &pay_to, 10_000);
        assert!(matches!(
            validate_transfer(&transaction, &requirements(pay_to), &fee_payer.pubkey()),
            Err(PaymentError::InvalidSvmTransaction)
        ));
    }

    #[test]
    fn missing_compute_budget_prefix_is_rejected() {
        let fee_payer = Keypair::new();
        let authority = Keypair::new();
        let pay_to = Pubkey::new_unique();
        let mint = devnet_mint();
        let destination = derive_ata(&pay_to, &spl_token::ID, &mint);
        let source = derive_ata(&authority.pubkey(), &spl_token::ID, &mint);
        let instructions = vec![
            spl_token::instruction::transfer_checked(
                &spl_token::ID,
                &source,
                &mint,
                &destination,
                &authority.pubkey(),
                &[],
                10_000,
                6,
            )
            .unwrap(),
        ];
        let message = Message::new_with_blockhash(
            &instructions,
            Some(&fee_payer.pubkey()),
            &Hash::new_unique(),
        );
        let transaction = VersionedTransaction {
            signatures: vec![Signature::default(); 2],
            message: VersionedMessage::Legacy(message),
        };
        assert!(matches!(
            validate_transfer(&transaction, &requirements(pay_to), &fee_payer.pubkey()),
            Err(PaymentError::InvalidSvmTransaction)
        ));
    }

    #[test]
    fn co_sign_adds_fee_payer_without_touching_payer_signature() {
        let fee_payer = Keypair::new();
        let authority = Keypair::new();
        let pay_to = Pubkey::new_unique();
        let transaction = payment_transaction(&fee_payer.pubkey(), &authority, &pay_to, 10_000);
        assert!(!is_fully_signed(&transaction));
        let authority_signature_before = transaction.signatures[1];

        let signed = co_sign(transaction, &fee_payer).unwrap();
        assert!(is_fully_signed(&signed));
        assert_eq!(signed.signatures[1], authority_signature_before);
        assert_ne!(signed.signatures[0], Signature::default());
    }

    #[test]
    fn co_sign_requires_fee_payer_among_signers() {
        let fee_payer = Keypair::new();
        let authority = Keypair::new();
        let pay_to = Pubkey::new_unique();
        let transaction = payment_transaction(&fee_payer.pubkey(), &authority, &pay_to, 10_000);
        let outsider = Keypair::new();
        assert!(matches!(
            co_sign(transaction, &outsider),
            Err(PaymentError::InvalidSvmTransaction)
        ));
    }

    #[test]
    fn requirements_must_target_this_network_and_mint() {
        let pay_to = Pubkey::new_unique();
        let ok = requirements(pay_to);
        assert!(assert_requirements(Network::SolanaDevnet, &ok).is_ok());

        let mut wrong_mint = requirements(pay_to);
        wrong_mint.asset = MixedAddress::Solana(Pubkey::new_unique());
        assert!(matches!(
            assert_requirements(Network::SolanaDevnet, &wrong_mint),
            Err(PaymentError::InvalidRequirements(_))
        ));

        assert!(matches!(
            assert_requirements(Network::Solana, &requirements(pay_to)),
            Err(PaymentError::NetworkMismatch(_))
        ));
    }
}
