use std::{env, error::Error, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::TypedHeader;
use derive_more::From;
use headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{fs, net, signal, task};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};

use ticket_sys::{
    api, billing, config, db, legacy,
    lifecycle::{self, CreateError, NewTicket, TransitionError},
    Config,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        env::args().nth(1).unwrap_or_else(|| "config.toml".to_owned());
    let config = fs::read_to_string(&config_path).await?;
    let config = toml::from_str::<Config>(&config)?;

    let (db_client, db_connection) = db::connect(&config.db).await?;
    task::spawn(async move {
        if let Err(e) = db_connection.await {
            error!("database connection failed: {e}");
        }
    });

    let (legacy, legacy_connection) =
        legacy::PgStore::connect(&config.legacy).await?;
    task::spawn(async move {
        if let Err(e) = legacy_connection.await {
            error!("legacy database connection failed: {e}");
        }
    });

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let app = Router::new()
        .route("/auth", post(auth))
        .route("/user", get(get_user))
        .route("/tickets", post(add_ticket))
        .route(
            "/tickets/:id",
            get(get_ticket).put(edit_ticket).delete(delete_ticket),
        )
        .route("/tickets/:id/status", patch(set_ticket_status))
        .route("/tickets/:id/notes", post(add_note))
        .route("/billing/generate", post(generate_billing))
        .route(
            "/integration/config",
            get(get_integration_config).put(save_integration_config),
        )
        .route("/integration/options", get(get_integration_options))
        .route("/clients/search", get(search_clients))
        .layer(cors)
        .with_state(Arc::new(AppState {
            db_client,
            legacy,
            billing: config.billing,
            billing_in_flight: billing::InFlight::default(),
            jwt_expiration_time: config.jwt.expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
            jwt_encoding_key: EncodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    info!(addr = %config.http.server.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }
    info!("shutting down");
}

/// JSON error answer.
fn message(status: StatusCode, text: impl fmt::Display) -> Response {
    (status, Json(api::Message::new(text.to_string()))).into_response()
}

/// Logs an infrastructure failure and answers without its details.
fn internal(context: &str, e: impl fmt::Display) -> Response {
    error!("{context}: {e}");
    message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

#[derive(Deserialize)]
struct AuthInput {
    login: String,
    password: String,
}

async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { login, password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    let password_hash = api::user::PasswordHash::new(&password);

    let user = state
        .db_client
        .get_user_by_login(&login)
        .await?
        .filter(|u| u.password_hash == password_hash)
        .ok_or(E::WrongLoginOrPassword)?;

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            user_id: user.id,
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    DbError(db::Error),
    InvalidToken,
    WrongLoginOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal("authentication failed", e),
            Self::InvalidToken => {
                message(StatusCode::UNAUTHORIZED, "invalid token")
            }
            Self::WrongLoginOrPassword => {
                message(StatusCode::FORBIDDEN, "wrong login or password")
            }
        }
    }
}

async fn get_user(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<api::User>, GetUserError> {
    let my = current_user::<GetUserError>(&state, auth_claims).await?;
    Ok(Json(my.into()))
}

#[derive(Debug, From)]
pub enum GetUserError {
    #[from]
    DbError(db::Error),
    #[from]
    UserNotFound(UserNotFound),
}

impl IntoResponse for GetUserError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => internal("user lookup failed", e),
            Self::UserNotFound(e) => e.into_response(),
        }
    }
}

/// Token of a user that no longer exists.
#[derive(Debug)]
pub struct UserNotFound;

impl IntoResponse for UserNotFound {
    fn into_response(self) -> Response {
        message(StatusCode::UNAUTHORIZED, "user not found")
    }
}

async fn current_user<E>(
    state: &AppState,
    auth_claims: AuthClaims,
) -> Result<db::User, E>
where
    E: From<db::Error> + From<UserNotFound>,
{
    state
        .db_client
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or_else(|| UserNotFound.into())
}

#[derive(Deserialize)]
struct AddTicketInput {
    client: String,
    reason: String,
    status: Option<api::ticket::Status>,
    solution: Option<String>,
}

async fn add_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(AddTicketInput {
        client,
        reason,
        status,
        solution,
    }): Json<AddTicketInput>,
) -> Result<(StatusCode, Json<api::Ticket>), AddTicketError> {
    let my = current_user::<AddTicketError>(&state, auth_claims).await?;
    let now = OffsetDateTime::now_utc();

    let mut ticket = lifecycle::create(
        &state.db_client,
        NewTicket {
            client,
            reason,
            technician: my.name,
            solution,
            created_by: Some(my.id),
        },
        now,
    )
    .await?;
    if let Some(status) = status {
        ticket.set_status(status, None, now)?;
    }

    state.db_client.insert_ticket(&ticket).await?;

    Ok((StatusCode::CREATED, Json(ticket.into())))
}

#[derive(Debug, From)]
pub enum AddTicketError {
    #[from]
    Create(CreateError<db::Error>),
    #[from]
    DbError(db::Error),
    #[from]
    Transition(TransitionError),
    #[from]
    UserNotFound(UserNotFound),
}

impl IntoResponse for AddTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::Create(CreateError::Validation(e)) => {
                message(StatusCode::BAD_REQUEST, e)
            }
            Self::Create(CreateError::Allocation(e)) => {
                internal("ticket number allocation failed", e)
            }
            Self::Transition(e) => message(StatusCode::BAD_REQUEST, e),
            Self::DbError(e) => internal("ticket creation failed", e),
            Self::UserNotFound(e) => e.into_response(),
        }
    }
}

async fn get_ticket(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, TicketError> {
    let ticket = load_ticket(&state, id).await?;
    Ok(Json(ticket.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditTicketInput {
    client: Option<String>,
    reason: Option<String>,
    solution: Option<String>,
    status: Option<api::ticket::Status>,
    pause_reason: Option<String>,
}

async fn edit_ticket(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(input): Json<EditTicketInput>,
) -> Result<Json<api::Ticket>, TicketError> {
    let mut ticket = load_ticket(&state, id).await?;

    if let Some(client) = input.client.filter(|c| !c.trim().is_empty()) {
        ticket.client = client.trim().to_owned();
    }
    if let Some(reason) = input.reason.filter(|r| !r.trim().is_empty()) {
        ticket.reason = reason.trim().to_owned();
    }
    if let Some(solution) = input.solution {
        ticket.solution = Some(solution).filter(|s| !s.trim().is_empty());
    }
    if let Some(status) = input.status {
        ticket.set_status(
            status,
            input.pause_reason,
            OffsetDateTime::now_utc(),
        )?;
    }

    save_ticket(&state, ticket).await
}

#[derive(Deserialize)]
struct SetStatusInput {
    status: api::ticket::Status,
    reason: Option<String>,
}

async fn set_ticket_status(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(SetStatusInput { status, reason }): Json<SetStatusInput>,
) -> Result<Json<api::Ticket>, TicketError> {
    let mut ticket = load_ticket(&state, id).await?;
    ticket.set_status(status, reason, OffsetDateTime::now_utc())?;
    save_ticket(&state, ticket).await
}

#[derive(Deserialize)]
struct AddNoteInput {
    text: String,
}

async fn add_note(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(AddNoteInput { text }): Json<AddNoteInput>,
) -> Result<Json<api::Ticket>, TicketError> {
    let my = current_user::<TicketError>(&state, auth_claims).await?;
    let mut ticket = load_ticket(&state, id).await?;
    ticket.add_note(&text, &my.name, OffsetDateTime::now_utc())?;
    save_ticket(&state, ticket).await
}

async fn delete_ticket(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Message>, TicketError> {
    if !state.db_client.delete_ticket(id).await? {
        return Err(TicketError::TicketNotFound);
    }
    info!(ticket = %id, "ticket deleted");
    Ok(Json(api::Message::new("ticket deleted")))
}

async fn load_ticket(
    state: &AppState,
    id: api::ticket::Id,
) -> Result<db::Ticket, TicketError> {
    state
        .db_client
        .get_ticket_by_id(id)
        .await?
        .ok_or(TicketError::TicketNotFound)
}

/// Writes `ticket` back unless it was modified since it was loaded.
async fn save_ticket(
    state: &AppState,
    mut ticket: db::Ticket,
) -> Result<Json<api::Ticket>, TicketError> {
    if !state.db_client.update_ticket(&ticket).await? {
        warn!(ticket = %ticket.number, "concurrent ticket modification");
        return Err(TicketError::Conflict);
    }
    ticket.version += 1;
    Ok(Json(ticket.into()))
}

#[derive(Debug, From)]
pub enum TicketError {
    #[from]
    DbError(db::Error),
    #[from]
    Transition(TransitionError),
    #[from]
    Validation(lifecycle::ValidationError),
    #[from]
    UserNotFound(UserNotFound),
    Conflict,
    TicketNotFound,
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        match self {
            Self::Transition(e) => message(StatusCode::BAD_REQUEST, e),
            Self::Validation(e) => message(StatusCode::BAD_REQUEST, e),
            Self::Conflict => message(
                StatusCode::CONFLICT,
                "ticket was modified concurrently, reload and retry",
            ),
            Self::TicketNotFound => {
                message(StatusCode::NOT_FOUND, "ticket not found")
            }
            Self::DbError(e) => internal("ticket access failed", e),
            Self::UserNotFound(e) => e.into_response(),
        }
    }
}

async fn generate_billing(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Json(api::billing::GenerateInput { ticket_id }): Json<
        api::billing::GenerateInput,
    >,
) -> Result<Json<api::billing::Generated>, GenerateBillingError> {
    let config = state.db_client.get_integration_config().await?;
    let generated =
        billing::ServiceOrderBuilder::new(&state.legacy, &state.billing)
            .bill(
                &state.db_client,
                &state.billing_in_flight,
                &config,
                ticket_id,
                OffsetDateTime::now_utc(),
            )
            .await?;

    Ok(Json(api::billing::Generated {
        message: "service order generated".to_owned(),
        numero: generated.number,
        id: generated.id,
    }))
}

#[derive(Debug, From)]
pub enum GenerateBillingError {
    #[from]
    Bill(billing::BillError<db::Error>),
    #[from]
    DbError(db::Error),
}

impl IntoResponse for GenerateBillingError {
    fn into_response(self) -> Response {
        use billing::{BillError as B, Error as E};

        match self {
            Self::Bill(e @ B::Billing(E::ConfigIncomplete(_))) => {
                message(StatusCode::BAD_REQUEST, e)
            }
            Self::Bill(
                e @ (B::Billing(E::AlreadyBilled(_))
                | B::Conflict
                | B::InProgress),
            ) => message(StatusCode::CONFLICT, e),
            Self::Bill(
                e @ (B::Billing(E::ClientNotFound(_)) | B::TicketNotFound),
            ) => message(StatusCode::NOT_FOUND, e),
            Self::Bill(e @ B::Billing(E::ReferenceDataMissing(_))) => {
                error!("{e}");
                message(StatusCode::INTERNAL_SERVER_ERROR, e)
            }
            Self::Bill(B::Billing(E::Connection(e))) => {
                internal("legacy database unavailable", e)
            }
            Self::Bill(B::Ledger(e)) | Self::DbError(e) => {
                internal("billing failed", e)
            }
        }
    }
}

async fn get_integration_config(
    State(state): State<SharedAppState>,
    _: AuthClaims,
) -> Result<Json<api::IntegrationConfig>, IntegrationConfigError> {
    Ok(Json(state.db_client.get_integration_config().await?))
}

async fn save_integration_config(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(mut config): Json<api::IntegrationConfig>,
) -> Result<Json<api::IntegrationConfig>, IntegrationConfigError> {
    let my =
        current_user::<IntegrationConfigError>(&state, auth_claims).await?;
    if my.role != db::user::Role::Administrator {
        return Err(IntegrationConfigError::Forbidden);
    }

    config.updated_by = Some(my.name);
    config.updated_at = Some(OffsetDateTime::now_utc());
    state.db_client.save_integration_config(&config).await?;
    info!(updated_by = ?config.updated_by, "integration settings saved");

    Ok(Json(config))
}

async fn get_integration_options(
    State(state): State<SharedAppState>,
    _: AuthClaims,
) -> Result<Json<api::integration::Options>, IntegrationConfigError> {
    let options = legacy::lookup::integration_options(&state.legacy).await?;
    let saved_config = state.db_client.get_integration_config().await?;
    Ok(Json(api::integration::Options::new(options, saved_config)))
}

#[derive(Debug, From)]
pub enum IntegrationConfigError {
    #[from]
    DbError(db::Error),
    #[from]
    Legacy(legacy::Error),
    #[from]
    UserNotFound(UserNotFound),
    Forbidden,
}

impl IntoResponse for IntegrationConfigError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden => message(
                StatusCode::FORBIDDEN,
                "only administrators may change integration settings",
            ),
            Self::DbError(e) => internal("integration settings failed", e),
            Self::Legacy(e) => internal("legacy database unavailable", e),
            Self::UserNotFound(e) => e.into_response(),
        }
    }
}

#[derive(Deserialize)]
struct SearchClientsQuery {
    #[serde(default)]
    q: String,
}

async fn search_clients(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Query(SearchClientsQuery { q }): Query<SearchClientsQuery>,
) -> Result<Json<Vec<api::client::Client>>, SearchClientsError> {
    let clients = legacy::lookup::search_clients(&state.legacy, &q).await?;
    Ok(Json(clients.into_iter().map(Into::into).collect()))
}

#[derive(Debug, From)]
pub enum SearchClientsError {
    #[from]
    Legacy(legacy::Error),
}

impl IntoResponse for SearchClientsError {
    fn into_response(self) -> Response {
        match self {
            Self::Legacy(e) => internal("client search failed", e),
        }
    }
}

type SharedAppState = Arc<AppState>;

struct AppState {
    db_client: db::Client,

    legacy: legacy::PgStore,

    billing: config::Billing,

    billing_in_flight: billing::InFlight,

    jwt_expiration_time: Duration,

    jwt_decoding_key: DecodingKey,

    jwt_encoding_key: EncodingKey,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    user_id: api::user::Id,
    exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
