//! Rust implementation of an [x402](https://www.x402.org) payment facilitator.
//!
//! The x402 protocol enables HTTP-native payments using the `402 Payment Required`
//! status code. A facilitator is the server a payment-gated resource delegates to: it
//! verifies that a submitted payment payload satisfies the declared requirements, and
//! settles accepted payments on-chain.
//!
//! Two chain families are supported:
//!
//! - **EVM** (Base, Avalanche, Sei and their testnets) via EIP-3009
//!   `transferWithAuthorization` over USDC.
//! - **Solana** (mainnet and devnet) via fee-payer co-signed SPL `TransferChecked`
//!   transactions.
//!
//! # Modules
//!
//! - [`types`] — wire schemas shared with the official x402 SDKs.
//! - [`network`] — supported networks and USDC deployments.
//! - [`chain`] — per-family adapters and the payment error taxonomy.
//! - [`facilitator`] / [`facilitator_local`] — the facilitator trait and the dispatching
//!   engine.
//! - [`provider_cache`] — providers constructed from environment configuration.
//! - [`handlers`] / [`discovery`] — the HTTP surface.
//! - [`telemetry`] / [`sig_down`] — tracing/OTLP setup and graceful shutdown.

pub mod chain;
pub mod discovery;
pub mod facilitator;
pub mod facilitator_local;
pub mod handlers;
pub mod network;
pub mod provider_cache;
pub mod sig_down;
pub mod telemetry;
pub mod timestamp;
pub mod types;
