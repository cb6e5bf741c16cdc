//! Local facilitator engine: dispatches verify/settle requests to the chain adapter
//! serving the requested network.
//!
//! The pipeline is a fixed sequence so failure reporting is deterministic: version,
//! scheme agreement, network agreement, payload family, provider lookup, then the
//! adapter's own checks. The first failing step decides the reported reason.

use tracing::instrument;

use crate::chain::{NetworkProvider, NetworkProviderOps, PaymentError};
use crate::network::NetworkFamily;
use crate::provider_cache::{ProviderCache, ProviderMap};
use crate::types::{
    ExactPaymentPayload, Scheme, SettleRequest, SettleResponse, SupportedPaymentKind,
    SupportedPaymentKindsResponse, VerifyRequest, VerifyResponse, X402Version,
};
use crate::facilitator::Facilitator;

#[derive(Clone)]
pub struct FacilitatorLocal<P = ProviderCache> {
    providers: P,
}

impl<P> FacilitatorLocal<P>
where
    P: ProviderMap<Value = NetworkProvider>,
{
    pub fn new(providers: P) -> Self {
        FacilitatorLocal { providers }
    }

    /// Runs the dispatch pipeline and returns the adapter for this request.
    fn assert_valid(&self, request: &VerifyRequest) -> Result<&NetworkProvider, PaymentError> {
        let payload = &request.payment_payload;
        let requirements = &request.payment_requirements;

        // Version and scheme gates. The schema layer already rejects unknown values, so
        // these matches stay total when new versions or schemes are added.
        match request.x402_version {
            X402Version::V1 => {}
        }
        match payload.scheme {
            Scheme::Exact => {}
        }
        if payload.scheme != requirements.scheme {
            return Err(PaymentError::SchemeMismatch);
        }
        if payload.network != requirements.network {
            return Err(PaymentError::NetworkMismatch(format!(
                "payload is for {}, requirements are for {}",
                payload.network, requirements.network
            )));
        }
        let family_matches = match (&payload.payload, payload.network.family()) {
            (ExactPaymentPayload::Evm(_), NetworkFamily::Evm) => true,
            (ExactPaymentPayload::Svm(_), NetworkFamily::Solana) => true,
            _ => false,
        };
        if !family_matches {
            return Err(PaymentError::PayloadMismatch);
        }
        let provider = self
            .providers
            .by_network(payload.network)
            .ok_or_else(|| {
                PaymentError::NetworkMismatch(format!("network {} is not served", payload.network))
            })?;
        Ok(provider)
    }
}

impl<P> Facilitator for FacilitatorLocal<P>
where
    P: ProviderMap<Value = NetworkProvider> + Sync + Send,
{
    type Error = PaymentError;

    #[instrument(skip_all, err, fields(network = %request.payment_payload.network))]
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, PaymentError> {
        let provider = self.assert_valid(request)?;
        provider
            .verify(&request.payment_payload, &request.payment_requirements)
            .await
    }

    #[instrument(skip_all, err, fields(network = %request.payment_payload.network))]
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, PaymentError> {
        // Adapters re-run full verification before submitting anything on-chain.
        let provider = self.assert_valid(request)?;
        provider
            .settle(&request.payment_payload, &request.payment_requirements)
            .await
    }

    async fn supported(&self) -> Result<SupportedPaymentKindsResponse, PaymentError> {
        let mut kinds = Vec::new();
        for network in crate::network::Network::variants() {
            let Some(provider) = self.providers.by_network(*network) else {
                continue;
            };
            let extra = match network.family() {
                NetworkFamily::Evm => None,
                // Clients need the fee payer to build their transaction around it.
                NetworkFamily::Solana => Some(serde_json::json!({
                    "feePayer": provider.signer_address(),
                })),
            };
            kinds.push(SupportedPaymentKind {
                x402_version: X402Version::V1,
                scheme: Scheme::Exact,
                network: *network,
                extra,
            });
        }
        Ok(SupportedPaymentKindsResponse { kinds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::types::{
        EvmAddress, EvmSignature, ExactEvmPayload, ExactEvmPayloadAuthorization, ExactSvmPayload,
        HexEncodedNonce, PaymentPayload, PaymentRequirements, TokenAmount,
    };
    use crate::timestamp::UnixTimestamp;
    use std::collections::HashMap;
    use url::Url;

    fn evm_payload(network: Network) -> PaymentPayload {
        let address: EvmAddress = "0x857b06519E91e3A54538791bDbb0E22373e36b66".parse().unwrap();
        PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Exact,
            network,
            payload: ExactPaymentPayload::Evm(ExactEvmPayload {
                signature: EvmSignature([0u8; 65]),
                authorization: ExactEvmPayloadAuthorization {
                    from: address,
                    to: address,
                    value: TokenAmount::from(10_000u64),
                    valid_after: UnixTimestamp::from_secs(0),
                    valid_before: UnixTimestamp::from_secs(u32::MAX as u64),
                    nonce: HexEncodedNonce([0u8; 32]),
                },
            }),
        }
    }

    fn requirements(network: Network) -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network,
            max_amount_required: TokenAmount::from(10_000u64),
            resource: Url::parse("https://example.com/weather").unwrap(),
            description: String::new(),
            mime_type: "application/json".into(),
            output_schema: None,
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
                .parse::<EvmAddress>()
                .unwrap()
                .into(),
            max_timeout_seconds: 60,
            asset: crate::network::UsdcDeployment::by_network(network).address.clone(),
            extra: None,
        }
    }

    fn engine() -> FacilitatorLocal<HashMap<Network, NetworkProvider>> {
        FacilitatorLocal::new(HashMap::new())
    }

    #[test]
    fn network_disagreement_fails_before_provider_lookup() {
        let request = VerifyRequest {
            x402_version: X402Version::V1,
            payment_payload: evm_payload(Network::Base),
            payment_requirements: requirements(Network::BaseSepolia),
        };
        assert!(matches!(
            engine().assert_valid(&request),
            Err(PaymentError::NetworkMismatch(_))
        ));
    }

    #[test]
    fn unserved_network_is_invalid_network() {
        let request = VerifyRequest {
            x402_version: X402Version::V1,
            payment_payload: evm_payload(Network::Base),
            payment_requirements: requirements(Network::Base),
        };
        let error = engine().assert_valid(&request).unwrap_err();
        assert!(matches!(error, PaymentError::NetworkMismatch(_)));
        assert_eq!(
            error.verify_reason(),
            crate::types::ErrorReason::InvalidNetwork
        );
    }

    #[test]
    fn svm_body_on_evm_network_is_invalid_payload() {
        let mut payload = evm_payload(Network::Base);
        payload.payload = ExactPaymentPayload::Svm(ExactSvmPayload {
            transaction: "AQAB".into(),
        });
        let request = VerifyRequest {
            x402_version: X402Version::V1,
            payment_payload: payload,
            payment_requirements: requirements(Network::Base),
        };
        let error = engine().assert_valid(&request).unwrap_err();
        assert!(matches!(error, PaymentError::PayloadMismatch));
        assert_eq!(
            error.verify_reason(),
            crate::types::ErrorReason::InvalidPayload
        );
    }

    #[tokio::test]
    async fn supported_lists_only_configured_networks() {
        let kinds = engine().supported().await.unwrap().kinds;
        assert!(kinds.is_empty());
    }

    #[test]
    fn payer_is_dropped_from_mismatch_errors() {
        let error = PaymentError::SchemeMismatch;
        assert_eq!(error.payer(), None);
        let response: VerifyResponse = (&error).into();
        assert_eq!(
            response,
            VerifyResponse::invalid(None, crate::types::ErrorReason::InvalidScheme)
        );
    }
}
