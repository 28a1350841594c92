#![allow(dead_code)]

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Europe::Madrid;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use colecta::{
    config::{BillingPolicy, RedsysConfig, SepaConfig},
    domain::*,
    notifications::NotificationManager,
    payments::redsys::{sign, GatewayCallback, RedsysGateway, RedsysRequest},
    repository::UserRepository,
    service::ServiceContext,
    testing::{FakeCardTransport, RecordingNotifier},
};

pub const SECRET: &str = "sq7HjrUOBfKmC576ILgskD5srU870gJ7";
pub const MERCHANT_CODE: &str = "999008881";
pub const IBAN: &str = "ES9121000418450200051332";

pub struct Harness {
    pub context: Arc<ServiceContext>,
    pub transport: Arc<FakeCardTransport>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn redsys_config() -> RedsysConfig {
    RedsysConfig {
        post_url: "https://gateway.test/sis/operaciones".into(),
        form_url: "https://gateway.test/sis/realizarPago".into(),
        merchant_code: MERCHANT_CODE.into(),
        merchant_name: "Colecta".into(),
        terminal: "1".into(),
        currency: "978".into(),
        transaction_type: "0".into(),
        payment_methods: "C".into(),
        identifier: "REQUIRED".into(),
        secret_key: SECRET.into(),
        callback_url: "https://colecta.test/orders/callback/redsys".into(),
        ok_url: "https://colecta.test/ok".into(),
        ko_url: "https://colecta.test/ko".into(),
        request_timeout_secs: 5,
    }
}

pub fn policy() -> BillingPolicy {
    BillingPolicy {
        max_returned_orders: 2,
        payment_day: Some(10),
    }
}

pub async fn harness(transport: FakeCardTransport) -> anyhow::Result<Harness> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await?;

    let notifier = Arc::new(RecordingNotifier::new());
    let notification_manager = Arc::new(NotificationManager::new());
    notification_manager.register(notifier.clone()).await;

    let transport = Arc::new(transport);
    let gateway = Arc::new(RedsysGateway::new(redsys_config(), transport.clone()));

    let context = Arc::new(ServiceContext::new(
        pool,
        notification_manager,
        gateway,
        SepaConfig {
            creditor_identifier: "ES00000X0000000X".into(),
            creditor_name: "Colecta".into(),
            export_dir: "target/sepa".into(),
        },
        policy(),
    ));

    Ok(Harness { context, transport, notifier })
}

/// 3 May 2024, before the bank payment day.
pub fn may_3() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn create_user(harness: &Harness, email: &str, militant: bool) -> anyhow::Result<User> {
    Ok(harness
        .context
        .user_repo
        .create(CreateUserRequest {
            full_name: "Ana Pérez".into(),
            email: email.into(),
            document_vatid: "12345678Z".into(),
            document_type: DocumentType::Dni,
            born_at: Some(date(1980, 2, 1)),
            town_name: "Madrid".into(),
            militant,
        })
        .await?)
}

pub fn card_pledge(user_id: Uuid) -> Pledge {
    Pledge {
        payer: Payer::User(user_id),
        amount: 1000,
        frequency: Frequency::Monthly,
        payment_type: PaymentType::CreditCard,
        ccc: None,
        iban: None,
        bic: None,
        territorial_assignment: TerritorialAssignment::Country,
        terms_of_service: true,
        minimal_year_old: true,
    }
}

pub fn iban_pledge(payer: Payer) -> Pledge {
    Pledge {
        payer,
        amount: 2500,
        frequency: Frequency::Monthly,
        payment_type: PaymentType::IbanBank,
        ccc: None,
        iban: Some(IBAN.into()),
        bic: None,
        territorial_assignment: TerritorialAssignment::Country,
        terms_of_service: true,
        minimal_year_old: true,
    }
}

pub fn guest(email: &str, document: &str) -> Payer {
    Payer::Guest(GuestPayer {
        full_name: "Jon Etxeberria".into(),
        document_vatid: document.into(),
        email: email.into(),
        address: "Kale Nagusia 3".into(),
        town_name: "Bilbao".into(),
        postal_code: "48005".into(),
        country: "ES".into(),
        ine_town: None,
    })
}

/// Form fields the gateway posts after a first card payment made at `at`,
/// signed with `secret`.
pub fn signed_fields(
    merchant_order_id: &str,
    response: &str,
    at: DateTime<Utc>,
    secret: &str,
) -> anyhow::Result<Vec<(String, String)>> {
    let local = at.with_timezone(&Madrid);
    let parameters = serde_json::json!({
        "Ds_Date": local.format("%d/%m/%Y").to_string(),
        "Ds_Hour": local.format("%H:%M").to_string(),
        "Ds_Amount": "1000",
        "Ds_Currency": "978",
        "Ds_Order": merchant_order_id,
        "Ds_MerchantCode": MERCHANT_CODE,
        "Ds_Terminal": "1",
        "Ds_Response": response,
        "Ds_Merchant_Identifier": "tok-4242",
        "Ds_ExpiryDate": "2812",
    });

    let blob = STANDARD.encode(parameters.to_string());
    let signature = sign(secret, merchant_order_id, &blob)?;

    Ok(vec![
        ("Ds_SignatureVersion".to_string(), "HMAC_SHA256_V1".to_string()),
        ("Ds_MerchantParameters".to_string(), blob),
        ("Ds_Signature".to_string(), signature),
    ])
}

pub fn signed_callback(
    merchant_order_id: &str,
    response: &str,
    at: DateTime<Utc>,
    secret: &str,
) -> anyhow::Result<GatewayCallback> {
    Ok(GatewayCallback::from_form(signed_fields(merchant_order_id, response, at, secret)?)?)
}

/// Creates a monthly card collaboration and pays its first order through
/// the payment form and a successful callback.
pub async fn confirmed_card_collaboration(harness: &Harness, email: &str) -> anyhow::Result<Collaboration> {
    let ctx = &harness.context;
    let user = create_user(harness, email, false).await?;
    let collaboration = ctx.collaboration_service.create(card_pledge(user.id), may_3()).await?;

    let form: RedsysRequest = ctx.billing_service.first_payment_form(collaboration.id, may_3()).await?;
    let callback = signed_callback(&form.merchant_order_id, "0000", may_3(), SECRET)?;
    ctx.billing_service.process_callback(&callback, may_3()).await?;

    Ok(ctx.collaboration_service.find(collaboration.id).await?)
}
