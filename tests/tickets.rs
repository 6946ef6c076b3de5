pub mod common;

use reqwest::StatusCode;
use serde_json::json;
use ticket_sys::api::ticket::{BillingStatus, Status};

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn creates_in_progress_ticket() {
    let ticket = common::Client::new()
        .auth("alice", "password")
        .await
        .add_ticket("Cliente Teste S/A", "Impressora sem rede")
        .await
        .unwrap();

    assert_eq!(ticket.client, "Cliente Teste S/A");
    assert_eq!(ticket.technician, "Alice");
    assert_eq!(ticket.status, Status::InProgress);
    assert_eq!(ticket.total_time, 0);
    assert_eq!(ticket.ticket_number.as_str().len(), 12);
    assert_eq!(ticket.billing_status, BillingStatus::Pending);
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn rejects_empty_reason() {
    let status = common::Client::new()
        .auth("alice", "password")
        .await
        .add_ticket("Cliente Teste S/A", "")
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn numbers_increase_within_a_day() {
    let client = common::Client::new().auth("alice", "password").await;

    let first = client.add_ticket("Cliente A", "Motivo").await.unwrap();
    let second = client.add_ticket("Cliente B", "Motivo").await.unwrap();

    assert!(first.ticket_number < second.ticket_number);
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn pause_and_finalize() {
    let client = common::Client::new().auth("alice", "password").await;
    let ticket = client.add_ticket("Cliente Teste S/A", "Motivo").await.unwrap();

    let ticket = client
        .set_status(ticket.id, Status::AwaitingCustomer, Some("sem retorno"))
        .await
        .unwrap();
    assert_eq!(ticket.pauses.len(), 1);
    assert_eq!(ticket.pauses[0].reason, "sem retorno");
    assert_eq!(ticket.pauses[0].end, None);

    let ticket = client
        .set_status(ticket.id, Status::Finalized, None)
        .await
        .unwrap();
    assert_eq!(ticket.status, Status::Finalized);
    assert!(ticket.end_date_time.is_some());
    assert_eq!(ticket.pauses[0].end, ticket.end_date_time);

    let status = client
        .set_status(ticket.id, Status::InProgress, None)
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn edits_and_annotates() {
    let client = common::Client::new().auth("alice", "password").await;
    let ticket = client.add_ticket("Cliente Teste S/A", "Motivo").await.unwrap();

    let ticket = client
        .edit_ticket(
            ticket.id,
            json!({ "reason": "Novo motivo", "solution": "Reiniciado" }),
        )
        .await
        .unwrap();
    assert_eq!(ticket.reason, "Novo motivo");
    assert_eq!(ticket.solution.as_deref(), Some("Reiniciado"));

    let ticket = client.add_note(ticket.id, "cliente avisado").await.unwrap();
    assert_eq!(ticket.notes.len(), 1);
    assert_eq!(ticket.notes[0].created_by, "Alice");

    let fetched = client.get_ticket(ticket.id).await.unwrap();
    assert_eq!(fetched.version, ticket.version);
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn deletes_ticket() {
    let client = common::Client::new().auth("alice", "password").await;
    let ticket = client.add_ticket("Cliente Teste S/A", "Motivo").await.unwrap();

    client.delete_ticket(ticket.id).await.unwrap();

    assert_eq!(
        client.get_ticket(ticket.id).await.unwrap_err(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        client.delete_ticket(ticket.id).await.unwrap_err(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn only_administrators_change_integration_settings() {
    let technician = common::Client::new().auth("alice", "password").await;
    let admin = common::Client::new().auth("bob", "password").await;

    let status = technician
        .save_integration_config(json!({ "companyId": "" }))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::FORBIDDEN);

    let saved = admin
        .save_integration_config(json!({
            "companyId": "64b7f0c2a1b2c3d4e5f60718",
            "assetId": "",
        }))
        .await
        .unwrap();
    assert_eq!(saved.asset_id, None);
    assert_eq!(saved.updated_by.as_deref(), Some("Bob"));
    assert_eq!(technician.integration_config().await.unwrap(), saved);
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn billing_unknown_ticket_is_not_found() {
    let status = common::Client::new()
        .auth("alice", "password")
        .await
        .generate_billing(ticket_sys::api::ticket::Id::from(u128::MAX))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}
