mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use chrono::Utc;
use chrono_tz::Europe::Madrid;
use tower::ServiceExt;

use colecta::{
    api::create_app,
    domain::OrderStatus,
    payments::redsys::sign,
    testing::{FakeCardTransport, OK_PAGE},
};
use common::*;

async fn body_text(response: Response) -> anyhow::Result<String> {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn post(uri: &str, content_type: &str, body: String) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))?)
}

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let app = create_app(h.context.clone());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(json["status"], "healthy");

    Ok(())
}

#[tokio::test]
async fn test_card_payment_form_then_callback() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;

    let user = create_user(&h, "ana@example.org", false).await?;
    let collaboration = ctx
        .collaboration_service
        .create(card_pledge(user.id), Utc::now())
        .await?;

    let response = create_app(ctx.clone())
        .oneshot(post(
            &format!("/collaborations/{}/card-payment", collaboration.id),
            "application/json",
            String::new(),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let form: serde_json::Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(form["url"], "https://gateway.test/sis/realizarPago");
    assert_eq!(form["fields"]["Ds_SignatureVersion"], "HMAC_SHA256_V1");
    let merchant_order_id = form["order"].as_str().unwrap_or_default().to_string();
    assert!(merchant_order_id.contains('C'));

    let fields = signed_fields(&merchant_order_id, "0000", Utc::now(), SECRET)?;
    let response = create_app(ctx.clone())
        .oneshot(post(
            "/orders/callback/redsys",
            "application/x-www-form-urlencoded",
            serde_urlencoded::to_string(&fields)?,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await?, "OK");

    let orders = ctx.order_repo.list_for_collaboration(collaboration.id).await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Paid);
    assert_eq!(orders[0].payment_identifier.as_deref(), Some("tok-4242"));

    Ok(())
}

#[tokio::test]
async fn test_unknown_collaboration_is_not_found() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;

    let response = create_app(h.context.clone())
        .oneshot(post("/collaborations/4242/card-payment", "application/json", String::new())?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_soap_callback_gets_signed_answer() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;

    let user = create_user(&h, "ana@example.org", false).await?;
    let now = Utc::now();
    let collaboration = ctx.collaboration_service.create(card_pledge(user.id), now).await?;
    let form = ctx.billing_service.first_payment_form(collaboration.id, now).await?;

    let local = now.with_timezone(&Madrid);
    let request = format!(
        "<Request Ds_Version='0.0'><Fecha>{}</Fecha><Hora>{}</Hora><Ds_Amount>1000</Ds_Amount><Ds_Currency>978</Ds_Currency><Ds_Order>{}</Ds_Order><Ds_MerchantCode>{}</Ds_MerchantCode><Ds_Terminal>1</Ds_Terminal><Ds_Response>0000</Ds_Response><Ds_Merchant_Identifier>tok-soap</Ds_Merchant_Identifier><Ds_ExpiryDate>2812</Ds_ExpiryDate></Request>",
        local.format("%d/%m/%Y"),
        local.format("%H:%M"),
        form.merchant_order_id,
        MERCHANT_CODE
    );
    let signature = sign(SECRET, &form.merchant_order_id, &request)?;
    let message = format!("<Message>{}<Signature>{}</Signature></Message>", request, signature);
    let body = format!(
        "<?xml version='1.0' encoding='UTF-8'?><SOAP-ENV:Envelope><SOAP-ENV:Body><ns1:procesaNotificacionSIS><XML xsi:type=\"xsd:string\">{}</XML></ns1:procesaNotificacionSIS></SOAP-ENV:Body></SOAP-ENV:Envelope>",
        message.replace('<', "&lt;").replace('>', "&gt;")
    );

    let response = create_app(ctx.clone())
        .oneshot(post("/orders/callback/redsys", "text/xml", body)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some("text/xml; charset=utf-8".as_bytes())
    );
    let answer = body_text(response).await?;
    assert!(answer.contains("procesaNotificacionSIS"));
    assert!(answer.contains("Ds_Response_Merchant&gt;OK"));

    let orders = ctx.order_repo.list_for_collaboration(collaboration.id).await?;
    assert_eq!(orders[0].status, OrderStatus::Paid);

    Ok(())
}

#[tokio::test]
async fn test_garbage_callback_is_refused() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;

    let response = create_app(h.context.clone())
        .oneshot(post(
            "/orders/callback/redsys",
            "application/x-www-form-urlencoded",
            "hello=world".to_string(),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await?, "KO");

    Ok(())
}
