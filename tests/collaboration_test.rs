mod common;

use colecta::{
    domain::*,
    error::AppError,
    repository::UserRepository,
    testing::{FakeCardTransport, OK_PAGE},
};
use common::*;

fn rejected_fields(result: Result<Collaboration, AppError>) -> Vec<String> {
    match result {
        Err(AppError::InvalidPledge(errors)) => {
            let mut fields: Vec<String> = errors.field_errors().keys().map(|k| k.to_string()).collect();
            fields.sort();
            fields
        }
        other => panic!("expected an invalid pledge, got {:?}", other.map(|c| c.id)),
    }
}

#[tokio::test]
async fn test_pledge_validation() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;
    let now = may_3();

    let minor = ctx
        .user_repo
        .create(CreateUserRequest {
            full_name: "Young Payer".into(),
            email: "young@example.org".into(),
            document_vatid: "99999999R".into(),
            document_type: DocumentType::Dni,
            born_at: Some(date(2010, 1, 1)),
            town_name: String::new(),
            militant: false,
        })
        .await?;
    let result = ctx.collaboration_service.create(card_pledge(minor.id), now).await;
    assert_eq!(rejected_fields(result), vec!["user"]);

    let tourist = ctx
        .user_repo
        .create(CreateUserRequest {
            full_name: "Visiting Payer".into(),
            email: "visitor@example.org".into(),
            document_vatid: "X1234567".into(),
            document_type: DocumentType::Passport,
            born_at: Some(date(1970, 1, 1)),
            town_name: String::new(),
            militant: false,
        })
        .await?;
    let result = ctx.collaboration_service.create(card_pledge(tourist.id), now).await;
    assert_eq!(rejected_fields(result), vec!["user"]);

    let user = create_user(&h, "ana@example.org", false).await?;
    let mut pledge = card_pledge(user.id);
    pledge.amount = 0;
    pledge.terms_of_service = false;
    let result = ctx.collaboration_service.create(pledge, now).await;
    assert_eq!(rejected_fields(result), vec!["amount", "terms_of_service"]);

    let mut pledge = iban_pledge(Payer::User(user.id));
    pledge.iban = Some("ES9121000418450200051333".into());
    pledge.bic = Some("CAIXESBBXXX".into());
    let result = ctx.collaboration_service.create(pledge.clone(), now).await;
    assert_eq!(rejected_fields(result), vec!["iban"]);
    assert_eq!(
        pledge.bank_account(),
        Some(BankAccount::Iban {
            iban: "ES9121000418450200051333".into(),
            bic: None,
        })
    );

    let mut pledge = iban_pledge(Payer::User(user.id));
    pledge.payment_type = PaymentType::LegacyCcc;
    pledge.iban = None;
    let result = ctx.collaboration_service.create(pledge, now).await;
    assert_eq!(rejected_fields(result), vec!["ccc"]);

    let result = ctx
        .collaboration_service
        .create(iban_pledge(guest("not-an-email", "87654321X")), now)
        .await;
    assert_eq!(rejected_fields(result), vec!["email"]);

    let mut pledge = card_pledge(uuid::Uuid::new_v4());
    pledge.minimal_year_old = false;
    let result = ctx.collaboration_service.create(pledge, now).await;
    assert_eq!(rejected_fields(result), vec!["minimal_year_old", "user"]);

    Ok(())
}

#[tokio::test]
async fn test_one_recurring_collaboration_per_payer() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;
    let now = may_3();

    let user = create_user(&h, "ana@example.org", false).await?;
    ctx.collaboration_service.create(card_pledge(user.id), now).await?;

    let result = ctx.collaboration_service.create(iban_pledge(Payer::User(user.id)), now).await;
    assert_eq!(rejected_fields(result), vec!["frequency"]);

    // One-off donations are not limited
    let mut single = card_pledge(user.id);
    single.frequency = Frequency::Single;
    let donation = ctx.collaboration_service.create(single, now).await?;
    assert_eq!(donation.frequency, Frequency::Single);

    ctx.collaboration_service
        .create(iban_pledge(guest("jon@example.org", "87654321X")), now)
        .await?;
    let result = ctx
        .collaboration_service
        .create(iban_pledge(guest("JON@example.org", "11111111H")), now)
        .await;
    assert_eq!(rejected_fields(result), vec!["frequency"]);
    let result = ctx
        .collaboration_service
        .create(iban_pledge(guest("other@example.org", "87654321x")), now)
        .await;
    assert_eq!(rejected_fields(result), vec!["frequency"]);

    Ok(())
}

#[tokio::test]
async fn test_deleted_collaboration_frees_the_payer() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;
    let now = may_3();

    let user = create_user(&h, "ana@example.org", false).await?;
    let first = ctx.collaboration_service.create(card_pledge(user.id), now).await?;
    ctx.collaboration_service.soft_delete(first.id, now).await?;

    let second = ctx.collaboration_service.create(iban_pledge(Payer::User(user.id)), now).await?;
    assert_ne!(first.id, second.id);
    assert!(ctx.collaboration_service.find(first.id).await?.is_deleted());

    let outcome = ctx
        .billing_service
        .charge(&ctx.collaboration_service.find(first.id).await?, now.date_naive(), now)
        .await?;
    assert_eq!(outcome, colecta::service::ChargeOutcome::Skipped);

    Ok(())
}

#[tokio::test]
async fn test_unknown_spanish_bank_is_flagged() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;

    let mut pledge = iban_pledge(guest("jon@example.org", "87654321X"));
    pledge.iban = Some("ES58 9998 0001 3800 0001 2345".into());
    let collaboration = ctx.collaboration_service.create(pledge, may_3()).await?;

    assert_eq!(collaboration.status, CollaborationStatus::Warning);
    assert!(collaboration.status_reason.is_some());
    assert!(!collaboration.is_payable());
    assert!(collaboration.is_active());

    Ok(())
}

#[tokio::test]
async fn test_scheduling_is_idempotent() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;
    let now = may_3();

    let mut pledge = iban_pledge(guest("jon@example.org", "87654321X"));
    pledge.frequency = Frequency::Quarterly;
    let collaboration = ctx.collaboration_service.create(pledge, now).await?;

    let peek = ctx
        .scheduler
        .get_orders(&collaboration, date(2024, 5, 1), date(2024, 10, 31), false, now)
        .await?;
    assert!(peek.is_empty());

    let orders = ctx
        .scheduler
        .get_orders(&collaboration, date(2024, 5, 1), date(2024, 10, 31), true, now)
        .await?;
    let dates: Vec<_> = orders.iter().map(|o| o.payable_at).collect();
    assert_eq!(dates, vec![date(2024, 5, 10), date(2024, 8, 10)]);
    assert!(orders[0].first);
    assert!(!orders[1].first);
    assert_eq!(orders[1].reference, "Colaboración Trimestral agosto 2024");
    assert_eq!(orders[0].territory, "Estatal");

    let again = ctx
        .scheduler
        .get_orders(&collaboration, date(2024, 5, 1), date(2024, 10, 31), true, now)
        .await?;
    assert_eq!(
        again.iter().map(|o| o.id).collect::<Vec<_>>(),
        orders.iter().map(|o| o.id).collect::<Vec<_>>()
    );
    assert_eq!(ctx.order_repo.list_for_collaboration(collaboration.id).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_single_donation_has_one_order() -> anyhow::Result<()> {
    let h = harness(FakeCardTransport::answering(OK_PAGE)).await?;
    let ctx = &h.context;
    let now = may_3();

    let user = create_user(&h, "ana@example.org", true).await?;
    let mut pledge = card_pledge(user.id);
    pledge.frequency = Frequency::Single;
    pledge.territorial_assignment = TerritorialAssignment::Town;
    let collaboration = ctx.collaboration_service.create(pledge, now).await?;

    let orders = ctx
        .scheduler
        .get_orders(&collaboration, date(2024, 1, 1), date(2024, 12, 31), true, now)
        .await?;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payable_at, date(2024, 5, 3));
    assert_eq!(orders[0].amount, 1000);
    assert_eq!(orders[0].user_id, Some(user.id));
    // Militant copy is only for recurring fees
    assert_eq!(orders[0].reference, "Colaboración Puntual mayo 2024");
    assert_eq!(orders[0].territory, "Municipal Madrid");

    Ok(())
}
