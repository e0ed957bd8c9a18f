//! Stripe REST API client.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::error::StripeError;
use super::form::form_encode;
use super::types::{Customer, DataList, Invoice, LineItem, Metadata, PaymentIntent, Price};

/// Stripe API base URL.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Header selecting the connected account a request acts on.
const STRIPE_ACCOUNT_HEADER: &str = "Stripe-Account";

/// Stripe API client.
///
/// Every method takes the connected account to act as; `None` means our
/// own account.
#[derive(Clone)]
pub struct StripeClient {
    /// HTTP client.
    client: Client,
    /// Secret API key, sent as the basic auth username.
    api_key: SecretString,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(client: Client, api_key: SecretString) -> Self {
        Self { client, api_key }
    }

    fn request(&self, method: Method, url: &str, account: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .basic_auth(self.api_key.expose_secret(), None::<&str>);
        match account {
            Some(account) => builder.header(STRIPE_ACCOUNT_HEADER, account),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, StripeError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| StripeError::Response(e.to_string()))
    }

    /// Fetch a price.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn get_price(
        &self,
        price_id: &str,
        account: Option<&str>,
    ) -> Result<Price, StripeError> {
        let url = format!("{STRIPE_API_BASE}/prices/{price_id}");
        Self::send(self.request(Method::GET, &url, account)).await
    }

    /// Create a checkout session from nested parameters.
    ///
    /// Returns Stripe's session object unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self, params))]
    pub async fn create_checkout_session(
        &self,
        params: &serde_json::Value,
        account: Option<&str>,
    ) -> Result<serde_json::Value, StripeError> {
        let url = format!("{STRIPE_API_BASE}/checkout/sessions");
        let form = form_encode(params);
        Self::send(self.request(Method::POST, &url, account).form(&form)).await
    }

    /// Fetch an invoice with its lines.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn get_invoice(
        &self,
        invoice_id: &str,
        account: Option<&str>,
    ) -> Result<Invoice, StripeError> {
        let url = format!("{STRIPE_API_BASE}/invoices/{invoice_id}");
        Self::send(self.request(Method::GET, &url, account)).await
    }

    /// Fetch the line items of a checkout session.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn get_checkout_session_line_items(
        &self,
        session_id: &str,
        account: Option<&str>,
    ) -> Result<DataList<LineItem>, StripeError> {
        let url = format!("{STRIPE_API_BASE}/checkout/sessions/{session_id}/line_items");
        Self::send(self.request(Method::GET, &url, account)).await
    }

    /// Fetch a payment intent with its invoice expanded.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn get_payment_intent_with_invoice(
        &self,
        payment_intent_id: &str,
        account: Option<&str>,
    ) -> Result<PaymentIntent, StripeError> {
        let url = format!("{STRIPE_API_BASE}/payment_intents/{payment_intent_id}?expand[]=invoice");
        Self::send(self.request(Method::GET, &url, account)).await
    }

    /// Fetch a customer.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn get_customer(
        &self,
        customer_id: &str,
        account: Option<&str>,
    ) -> Result<Customer, StripeError> {
        let url = format!("{STRIPE_API_BASE}/customers/{customer_id}");
        Self::send(self.request(Method::GET, &url, account)).await
    }

    /// Merge metadata into a customer's metadata.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self, metadata))]
    pub async fn set_customer_metadata(
        &self,
        customer_id: &str,
        metadata: &Metadata,
        account: Option<&str>,
    ) -> Result<(), StripeError> {
        let url = format!("{STRIPE_API_BASE}/customers/{customer_id}");
        let form = form_encode(&serde_json::json!({ "metadata": metadata }));
        let _: Customer = Self::send(self.request(Method::POST, &url, account).form(&form)).await?;
        debug!(customer_id = %customer_id, "Customer metadata updated");
        Ok(())
    }

    /// Cancel a subscription through its API URL.
    ///
    /// Returns Stripe's status code; non-success statuses are logged, not
    /// turned into errors, so callers can report them.
    ///
    /// # Errors
    ///
    /// Returns error if the request can't be sent.
    #[instrument(skip(self))]
    pub async fn cancel_subscription(
        &self,
        subscription_url: &str,
        account: Option<&str>,
    ) -> Result<StatusCode, StripeError> {
        let response = self
            .request(Method::DELETE, subscription_url, account)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Stripe refused subscription cancel");
        }
        Ok(status)
    }
}
