//! The [`Facilitator`] trait: verify and settle x402 payments, and report which
//! (version, scheme, network) combinations are available.

use std::sync::Arc;

use crate::types::{
    SettleRequest, SettleResponse, SupportedPaymentKindsResponse, VerifyRequest, VerifyResponse,
};

pub trait Facilitator {
    type Error;

    /// Verifies a payment payload against the accompanying requirements.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Settles a payment on-chain and waits for inclusion.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;

    /// Lists the payment kinds this facilitator can serve.
    fn supported(
        &self,
    ) -> impl Future<Output = Result<SupportedPaymentKindsResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Sync + Send> Facilitator for Arc<T> {
    type Error = T::Error;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        self.as_ref().verify(request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        self.as_ref().settle(request).await
    }

    async fn supported(&self) -> Result<SupportedPaymentKindsResponse, Self::Error> {
        self.as_ref().supported().await
    }
}
