//! Redsys card gateway: HMAC_SHA256_V1 signing, payment requests,
//! notifications and their acknowledgements.

pub mod ack;
pub mod callback;
pub mod codes;
pub mod gateway;
pub mod reconcile;
pub mod request;
pub mod signature;

pub use ack::CallbackAck;
pub use callback::{CallbackEncoding, GatewayCallback};
pub use codes::{is_success_code, response_text};
pub use gateway::{CardTransport, DirectPaymentResponse, RedsysGateway, ReqwestTransport};
pub use reconcile::{read_reconciliation, ReconcileLine, ReconcileSummary};
pub use request::{
    build_request, collaboration_id_from_order_id, first_order_id, persisted_order_id, MerchantParameters,
    RedsysRequest, SignedParameters,
};
pub use signature::{derive_order_key, sign, verify};
