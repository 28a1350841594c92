//! Fixtures for integration tests: a scripted card gateway and a notifier
//! that keeps what it receives.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::{AppError, Result},
    notifications::{BillingEvent, Notifier},
    payments::redsys::{CardTransport, MerchantParameters, SignedParameters},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const OK_PAGE: &str = "<html><!-- RSisReciboOK --></html>";
pub const KO_PAGE: &str = "<html><!-- RSisReciboKO --><!-- SIS0051 --></html>";

/// Answers every direct payment with a fixed body, or fails like a timeout.
pub struct FakeCardTransport {
    body: Option<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<MerchantParameters>>,
}

impl FakeCardTransport {
    pub fn answering(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn timing_out() -> Self {
        Self {
            body: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Decoded parameters of every request received so far.
    pub async fn requests(&self) -> Vec<MerchantParameters> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl CardTransport for FakeCardTransport {
    async fn post(&self, _url: &str, fields: &SignedParameters) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let json = STANDARD
            .decode(&fields.merchant_parameters)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let parameters: MerchantParameters =
            serde_json::from_slice(&json).map_err(|e| AppError::Internal(e.to_string()))?;
        self.requests.lock().await.push(parameters);

        match &self.body {
            Some(body) => Ok(body.clone()),
            None => Err(AppError::Timeout("operation timed out".to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<BillingEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<BillingEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn notify(&self, event: &BillingEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
