//! Invoice creation against the payment provider.
//!
//! The core contract is `prepare`: pick a credit package, mint an order
//! token, and produce the signed request body. Submitting the result to the
//! provider is a thin bounded-timeout HTTP call — the provider itself is an
//! external collaborator, not part of the ledger core.

use super::order;
use super::signing::{self, SignedPayload};
use crate::config::PaymentConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Predefined credit package for purchase.
#[derive(Debug, Clone, Serialize)]
pub struct CreditPackage {
    /// Package identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Invoice amount, decimal string in the configured currency.
    pub amount: &'static str,
    /// Credits granted upon confirmation.
    pub credits: u32,
}

/// Available credit packages.
pub const CREDIT_PACKAGES: &[CreditPackage] = &[
    CreditPackage {
        id: "starter_20",
        name: "Starter",
        amount: "1.99",
        credits: 20,
    },
    CreditPackage {
        id: "standard_60",
        name: "Standard",
        amount: "4.99",
        credits: 60,
    },
    CreditPackage {
        id: "premium_150",
        name: "Premium",
        amount: "9.99",
        credits: 150,
    },
    CreditPackage {
        id: "pro_400",
        name: "Pro",
        amount: "19.99",
        credits: 400,
    },
];

/// Look up a credit package by ID.
pub fn find_package(package_id: &str) -> Option<&'static CreditPackage> {
    CREDIT_PACKAGES.iter().find(|p| p.id == package_id)
}

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("payment features are disabled: no merchant credentials configured")]
    Disabled,

    #[error(transparent)]
    Order(#[from] order::OrderError),

    #[error("failed to encode invoice body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invoice provider failure: {0}")]
    Provider(String),
}

/// Invoice request body sent to the provider. Field order is the canonical
/// serialization order — do not reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceBody {
    pub amount: String,
    pub currency: String,
    pub order_id: String,
}

/// A prepared, signed invoice request ready for submission.
#[derive(Debug, Clone)]
pub struct PreparedInvoice {
    /// Token the provider round-trips back in the payment webhook.
    pub order_token: String,
    pub body: InvoiceBody,
    pub signed: SignedPayload,
    /// Credits this invoice purchases.
    pub credits: u32,
}

/// Provider response envelope.
#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    #[serde(default)]
    result: Option<InvoiceResult>,
}

#[derive(Debug, Deserialize)]
struct InvoiceResult {
    #[serde(default)]
    url: Option<String>,
}

/// Client for the payment provider's invoice API.
pub struct InvoiceClient {
    http: reqwest::Client,
    invoice_url: String,
    currency: String,
    merchant_id: Option<String>,
    signing_key: Option<String>,
}

impl InvoiceClient {
    pub fn new(config: &PaymentConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            http,
            invoice_url: config.invoice_url.clone(),
            currency: config.currency.clone(),
            merchant_id: config.merchant_id.clone(),
            signing_key: config.signing_key.clone(),
        }
    }

    /// Whether merchant credentials are configured.
    pub fn is_enabled(&self) -> bool {
        self.merchant_id.is_some() && self.signing_key.is_some()
    }

    /// Build the signed invoice request for an arbitrary amount + credit
    /// count. Pure — no provider round-trip happens here.
    pub fn prepare_amount(
        &self,
        account_id: &str,
        amount: &str,
        credits: u32,
    ) -> Result<PreparedInvoice, InvoiceError> {
        let key = self.signing_key.as_deref().ok_or(InvoiceError::Disabled)?;

        let order_token = order::encode(account_id, credits)?;
        let body = InvoiceBody {
            amount: amount.to_string(),
            currency: self.currency.clone(),
            order_id: order_token.clone(),
        };
        let signed = signing::sign(&body, key)?;

        Ok(PreparedInvoice {
            order_token,
            body,
            signed,
            credits,
        })
    }

    /// Build the signed invoice request for a predefined package.
    pub fn prepare(
        &self,
        account_id: &str,
        package: &CreditPackage,
    ) -> Result<PreparedInvoice, InvoiceError> {
        self.prepare_amount(account_id, package.amount, package.credits)
    }

    /// Submit a prepared invoice to the provider and return the hosted
    /// payment URL, if the provider supplied one. Bounded by the client
    /// timeout; no ledger state is touched on any path.
    pub async fn submit(&self, invoice: &PreparedInvoice) -> Result<Option<String>, InvoiceError> {
        let merchant = self.merchant_id.as_deref().ok_or(InvoiceError::Disabled)?;

        let response = self
            .http
            .post(&self.invoice_url)
            .header("merchant", merchant)
            .header("sign", &invoice.signed.signature)
            .json(&invoice.body)
            .send()
            .await
            .map_err(|e| InvoiceError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InvoiceError::Provider(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let parsed: InvoiceResponse = response
            .json()
            .await
            .map_err(|e| InvoiceError::Provider(e.to_string()))?;

        Ok(parsed.result.and_then(|r| r.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::order;

    fn make_client() -> InvoiceClient {
        InvoiceClient::new(&PaymentConfig {
            merchant_id: Some("merchant-1".into()),
            signing_key: Some("merchant-key".into()),
            ..PaymentConfig::default()
        })
    }

    #[test]
    fn packages_defined_and_findable() {
        assert_eq!(CREDIT_PACKAGES.len(), 4);
        let pkg = find_package("standard_60").unwrap();
        assert_eq!(pkg.amount, "4.99");
        assert_eq!(pkg.credits, 60);
        assert!(find_package("nonexistent").is_none());
    }

    #[test]
    fn prepare_builds_decodable_token() {
        let client = make_client();
        let pkg = find_package("premium_150").unwrap();

        let invoice = client.prepare("42", pkg).unwrap();
        assert_eq!(invoice.credits, 150);
        assert_eq!(invoice.body.order_id, invoice.order_token);

        let decoded = order::decode(&invoice.order_token).unwrap();
        assert_eq!(decoded.account_id, "42");
        assert_eq!(decoded.credits, 150);
    }

    #[test]
    fn prepare_signature_matches_body() {
        let client = make_client();
        let pkg = find_package("starter_20").unwrap();

        let invoice = client.prepare("42", pkg).unwrap();
        let resigned = crate::payment::signing::sign(&invoice.body, "merchant-key").unwrap();
        assert_eq!(invoice.signed, resigned);
    }

    #[test]
    fn prepare_amount_accepts_custom_values() {
        let client = make_client();
        let invoice = client.prepare_amount("42", "2.50", 33).unwrap();
        assert_eq!(invoice.body.amount, "2.50");
        assert_eq!(invoice.credits, 33);
        assert!(matches!(
            client.prepare_amount("42", "2.50", 0),
            Err(InvoiceError::Order(order::OrderError::ZeroCredits))
        ));
    }

    #[test]
    fn prepare_rejects_separator_account_id() {
        let client = make_client();
        let pkg = find_package("starter_20").unwrap();
        assert!(matches!(
            client.prepare("bad_id", pkg),
            Err(InvoiceError::Order(_))
        ));
    }

    #[test]
    fn unconfigured_client_is_disabled() {
        let client = InvoiceClient::new(&PaymentConfig::default());
        assert!(!client.is_enabled());

        let pkg = find_package("starter_20").unwrap();
        assert!(matches!(
            client.prepare("42", pkg),
            Err(InvoiceError::Disabled)
        ));
    }
}
