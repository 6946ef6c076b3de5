//! JSON bodies of the HTTP interface.

pub mod billing;
pub mod client;
pub mod integration;
pub mod ticket;
pub mod user;

use serde::{Deserialize, Serialize};

pub use self::{
    integration::IntegrationConfig, ticket::Ticket, user::User,
};

/// Body of every error and of acknowledgements without data.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
