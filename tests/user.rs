pub mod common;

use reqwest::StatusCode;
use ticket_sys::api;

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn retrieves_current_user() {
    let user = common::Client::new()
        .auth("alice", "password")
        .await
        .user()
        .await
        .unwrap();
    assert_eq!(user.id, api::user::Id::from(1));
    assert_eq!(user.name, "Alice");
    assert_eq!(user.role, api::user::Role::Technician);
}

#[tokio::test]
#[ignore = "requires a running server with seeded databases"]
async fn fails_when_unauthorized() {
    let status = common::Client::new().user().await.unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
