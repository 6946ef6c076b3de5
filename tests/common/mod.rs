use constcat::concat;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use ticket_sys::api;

const BASE_URL: &str = "http://localhost:3000";

pub struct Client {
    inner: reqwest::Client,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
            auth_token: None,
        }
    }

    pub async fn auth(mut self, login: &str, password: &str) -> Self {
        const URL: &str = concat!(BASE_URL, "/auth");

        self.auth_token = Some(
            self.inner
                .post(URL)
                .json(&json!({
                    "login": login,
                    "password": password,
                }))
                .send()
                .await
                .expect("failed to send a request")
                .error_for_status()
                .expect("wrong status code")
                .text()
                .await
                .expect("failed to get a response"),
        );

        self
    }

    pub async fn user(&self) -> Result<api::User, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/user");

        send(self.request(Method::GET, URL)).await
    }

    pub async fn add_ticket(
        &self,
        client: &str,
        reason: &str,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/tickets");

        send(self.request(Method::POST, URL).json(&json!({
            "client": client,
            "reason": reason,
        })))
        .await
    }

    pub async fn get_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/tickets");

        send(self.request(Method::GET, &format!("{URL}/{id}"))).await
    }

    pub async fn edit_ticket(
        &self,
        id: api::ticket::Id,
        edit: Value,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/tickets");

        send(self.request(Method::PUT, &format!("{URL}/{id}")).json(&edit))
            .await
    }

    pub async fn set_status(
        &self,
        id: api::ticket::Id,
        status: api::ticket::Status,
        reason: Option<&str>,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/tickets");

        send(
            self.request(Method::PATCH, &format!("{URL}/{id}/status"))
                .json(&json!({
                    "status": status,
                    "reason": reason,
                })),
        )
        .await
    }

    pub async fn add_note(
        &self,
        id: api::ticket::Id,
        text: &str,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/tickets");

        send(
            self.request(Method::POST, &format!("{URL}/{id}/notes"))
                .json(&json!({ "text": text })),
        )
        .await
    }

    pub async fn delete_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Message, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/tickets");

        send(self.request(Method::DELETE, &format!("{URL}/{id}"))).await
    }

    pub async fn generate_billing(
        &self,
        ticket_id: api::ticket::Id,
    ) -> Result<api::billing::Generated, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/billing/generate");

        send(
            self.request(Method::POST, URL)
                .json(&json!({ "ticketId": ticket_id })),
        )
        .await
    }

    pub async fn integration_config(
        &self,
    ) -> Result<api::IntegrationConfig, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/integration/config");

        send(self.request(Method::GET, URL)).await
    }

    pub async fn save_integration_config(
        &self,
        config: Value,
    ) -> Result<api::IntegrationConfig, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/integration/config");

        send(self.request(Method::PUT, URL).json(&config)).await
    }

    pub async fn integration_options(
        &self,
    ) -> Result<api::integration::Options, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/integration/options");

        send(self.request(Method::GET, URL)).await
    }

    pub async fn search_clients(
        &self,
        query: &str,
    ) -> Result<Vec<api::client::Client>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/clients/search");

        send(self.request(Method::GET, URL).query(&[("q", query)])).await
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self.inner.request(method, url);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }
}

async fn send<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, StatusCode> {
    Ok(req
        .send()
        .await
        .expect("failed to send a request")
        .error_for_status()
        .map_err(|e| e.status().expect("status error"))?
        .json::<T>()
        .await
        .expect("failed to get a response"))
}
