use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ack::{plain_ack, soap_ack, CallbackAck},
    callback::GatewayCallback,
    request::{build_request, persisted_order_id, RedsysRequest, SignedParameters},
};
use crate::{
    config::RedsysConfig,
    domain::{Collaboration, Order},
    error::Result,
};

/// Outbound leg of a direct payment.
#[async_trait]
pub trait CardTransport: Send + Sync {
    /// Posts the signed fields and returns the response body.
    async fn post(&self, url: &str, fields: &SignedParameters) -> Result<String>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CardTransport for ReqwestTransport {
    async fn post(&self, url: &str, fields: &SignedParameters) -> Result<String> {
        let response = self
            .client
            .post(url)
            .form(fields)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// Markers the gateway leaves as HTML comments in a direct-payment answer,
/// e.g. `<!-- RSisReciboOK -->`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPaymentResponse {
    pub markers: Vec<String>,
}

impl DirectPaymentResponse {
    pub fn parse(body: &str) -> Self {
        let mut markers = Vec::new();
        let mut rest = body;

        while let Some(start) = rest.find("<!--") {
            rest = &rest[start + 4..];
            let Some(end) = rest.find("-->") else { break };
            if let Some(word) = comment_word(&rest[..end]) {
                markers.push(word.to_string());
            }
            rest = &rest[end + 3..];
        }

        Self { markers }
    }

    pub fn is_ok(&self) -> bool {
        self.markers.first().map(String::as_str) == Some("RSisReciboOK")
    }

    /// The gateway's error code, reported as the last marker.
    pub fn code(&self) -> Option<&str> {
        self.markers.last().map(String::as_str)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.markers).unwrap_or_default()
    }
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A comment holding one word surrounded by punctuation or whitespace.
fn comment_word(inner: &str) -> Option<&str> {
    let trimmed = inner.trim_start_matches(|c: char| !is_word(c));
    let len = trimmed.find(|c: char| !is_word(c)).unwrap_or(trimmed.len());
    let (word, tail) = trimmed.split_at(len);
    tail.chars().all(|c| !is_word(c)).then_some(word)
}

/// Card gateway adapter: signs requests with the injected merchant
/// configuration and talks to the gateway through a `CardTransport`.
pub struct RedsysGateway {
    config: RedsysConfig,
    transport: Arc<dyn CardTransport>,
}

impl RedsysGateway {
    pub fn new(config: RedsysConfig, transport: Arc<dyn CardTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &RedsysConfig {
        &self.config
    }

    /// Signed form the payer's browser posts to the gateway for the first,
    /// tokenizing payment.
    pub fn payment_form(
        &self,
        order: &Order,
        collaboration: &Collaboration,
        merchant_order_id: &str,
    ) -> Result<RedsysRequest> {
        build_request(&self.config, order, collaboration, merchant_order_id)
    }

    /// Charges a stored token server to server.
    pub async fn direct_payment(
        &self,
        order: &Order,
        collaboration: &Collaboration,
    ) -> Result<DirectPaymentResponse> {
        let request = build_request(&self.config, order, collaboration, &persisted_order_id(order.id))?;

        tracing::info!(
            "Sending direct payment for order {} (collaboration {}, merchant order {})",
            order.id,
            collaboration.id,
            request.merchant_order_id
        );

        let body = self.transport.post(&request.url, &request.fields).await?;
        let response = DirectPaymentResponse::parse(&body);

        tracing::info!(
            "Direct payment for order {} answered {:?}",
            order.id,
            response.markers
        );

        Ok(response)
    }

    pub fn verify_callback(&self, callback: &GatewayCallback) -> bool {
        callback.signature_valid(&self.config.secret_key)
    }

    /// Acknowledgement in the encoding the notification came in.
    pub fn callback_ack(&self, callback: Option<&GatewayCallback>, paid: bool) -> CallbackAck {
        let Some(callback) = callback.filter(|cb| cb.is_soap()) else {
            return plain_ack(paid);
        };

        let order_id = callback.order_id().unwrap_or_default();
        match soap_ack(&self.config.secret_key, order_id, paid) {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!("Could not sign SOAP acknowledgement for {}: {}", order_id, e);
                plain_ack(paid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok_page() {
        let r = DirectPaymentResponse::parse("<html><!-- RSisReciboOK --><body>ok</body></html>");
        assert!(r.is_ok());
        assert_eq!(r.markers, vec!["RSisReciboOK"]);
    }

    #[test]
    fn test_parse_error_page() {
        let r = DirectPaymentResponse::parse("<!--RSisReciboKO--> <!-- SIS0321 --> <!-- not a marker -->");
        assert!(!r.is_ok());
        assert_eq!(r.markers, vec!["RSisReciboKO", "SIS0321"]);
        assert_eq!(r.code(), Some("SIS0321"));
        assert_eq!(r.to_json(), r#"["RSisReciboKO","SIS0321"]"#);
    }

    #[test]
    fn test_parse_empty() {
        let r = DirectPaymentResponse::parse("timeout page");
        assert!(!r.is_ok());
        assert_eq!(r.code(), None);
    }
}
