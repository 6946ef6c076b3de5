use std::{net, time};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub db: Db,
    pub legacy: Legacy,
    pub http: Http,
    pub jwt: Jwt,
    #[serde(default)]
    pub billing: Billing,
}

#[derive(Deserialize)]
pub struct Db {
    pub url: String,
}

/// Connection to the legacy ERP database that receives service orders.
#[derive(Deserialize)]
pub struct Legacy {
    pub url: String,
    #[serde(default = "Legacy::default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: time::Duration,
    #[serde(default = "Legacy::default_query_timeout", with = "humantime_serde")]
    pub query_timeout: time::Duration,
}

impl Legacy {
    fn default_connect_timeout() -> time::Duration {
        time::Duration::from_secs(5)
    }

    fn default_query_timeout() -> time::Duration {
        time::Duration::from_secs(10)
    }
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
pub struct Jwt {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub expiration_time: time::Duration,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Billing {
    /// Unit price of one billed hour when the ERP has no company price.
    pub hourly_rate: f64,

    /// Name recorded as the author of generated documents.
    pub user_name: String,
}

impl Default for Billing {
    fn default() -> Self {
        Self {
            hourly_rate: 150.0,
            user_name: "Ticket-Sys".to_owned(),
        }
    }
}
