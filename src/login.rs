#[cfg(feature = "web")]
use crate::app::{AppState, render_page};
use crate::config::{Config, SeedUser};
use crate::history::ALL_USERS;
use crate::mailer::Mailer;
use crate::saving::{self, StoreError};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
#[cfg(feature = "web")]
use axum::{
    Form,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
#[cfg(feature = "web")]
use std::sync::Arc;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Username → stored password (Argon2 PHC string, or legacy plaintext)
pub type Credentials = BTreeMap<String, String>;

/// Username → email address
pub type Contacts = BTreeMap<String, String>;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Username already exists")]
    DuplicateUser,

    #[error("Email not found")]
    EmailNotFound,

    #[error("Username and password cannot be empty")]
    MissingFields,

    #[error("Username {0:?} is reserved")]
    ReservedUsername(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Credential data for login and registration
///
/// Used to receive login and registration form data from the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,

    /// Required for registration, ignored on login
    #[serde(default)]
    pub email: String,

    pub password: String,
}

/// Password reset request data
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Login state of one interactive session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    LoggedOut,
    LoggedIn(String),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::LoggedIn(_))
    }

    pub fn current_user(&self) -> Option<&str> {
        match self {
            SessionState::LoggedIn(user) => Some(user),
            SessionState::LoggedOut => None,
        }
    }

    /// Check the submitted credentials and move to `LoggedIn` on a match.
    ///
    /// On failure the state is left untouched.
    pub fn submit(
        &mut self,
        accounts: &Accounts,
        username: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if accounts.verify(username, password)? {
            info!("User {} logged in", username);
            *self = SessionState::LoggedIn(username.to_string());
            Ok(())
        } else {
            warn!("Failed login attempt for {:?}", username);
            Err(AuthError::InvalidCredentials)
        }
    }

    pub fn sign_out(&mut self) {
        if let SessionState::LoggedIn(user) = self {
            info!("User {} signed out", user);
        }
        *self = SessionState::LoggedOut;
    }
}

/// Registered users and their contact addresses, backed by two JSON files.
///
/// Both files are re-read on every operation; registration writes both in the
/// same call. Callers serialize concurrent registrations.
#[derive(Debug, Clone)]
pub struct Accounts {
    credentials_path: PathBuf,
    contacts_path: PathBuf,
    seed: SeedUser,
}

impl Accounts {
    pub fn new(config: &Config) -> Self {
        Self {
            credentials_path: config.credentials_path(),
            contacts_path: config.contacts_path(),
            seed: config.seed_user.clone(),
        }
    }

    /// Create both store files if needed and fail early on malformed content.
    pub fn open(config: &Config) -> Result<Self, AuthError> {
        let accounts = Self::new(config);
        accounts.credentials()?;
        accounts.contacts()?;
        Ok(accounts)
    }

    /// Current credentials; a missing file is created holding the seed user.
    pub fn credentials(&self) -> Result<Credentials, AuthError> {
        saving::load_with(&self.credentials_path, || {
            let hash = hash_password(&self.seed.password)?;
            Ok(Credentials::from([(self.seed.username.clone(), hash)]))
        })
    }

    /// Current contacts; a missing file is created holding the seed user's email.
    pub fn contacts(&self) -> Result<Contacts, AuthError> {
        let seed = Contacts::from([(self.seed.username.clone(), self.seed.email.clone())]);
        Ok(saving::load(&self.contacts_path, seed)?)
    }

    /// Verify user credentials
    ///
    /// # Returns
    /// * `Ok(true)` if `username` exists and `password` matches its stored value
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let credentials = self.credentials()?;
        Ok(credentials
            .get(username)
            .is_some_and(|stored| verify_password(password, stored)))
    }

    /// Register a new user
    ///
    /// Writes the credential and the contact record together. Does not log the
    /// user in.
    ///
    /// # Errors
    /// * `AuthError::MissingFields` if the username or password is empty
    /// * `AuthError::ReservedUsername` for the history filter's "all users" value
    /// * `AuthError::DuplicateUser` if the username is taken; nothing is written
    pub fn register(&self, username: &str, password: &str, email: &str) -> Result<(), AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }
        if username.trim().eq_ignore_ascii_case(ALL_USERS) {
            return Err(AuthError::ReservedUsername(username.to_string()));
        }

        let mut credentials = self.credentials()?;
        if credentials.contains_key(username) {
            return Err(AuthError::DuplicateUser);
        }
        let mut contacts = self.contacts()?;

        credentials.insert(username.to_string(), hash_password(password)?);
        contacts.insert(username.to_string(), email.to_string());

        saving::save(&self.credentials_path, &credentials)?;
        saving::save(&self.contacts_path, &contacts)?;

        info!("Registered user {}", username);
        Ok(())
    }

    /// Acknowledge a password reset request for a registered email address.
    pub fn forgot_password(&self, email: &str, mailer: &dyn Mailer) -> Result<String, AuthError> {
        let contacts = self.contacts()?;
        if email.is_empty() || !contacts.values().any(|known| known == email) {
            return Err(AuthError::EmailNotFound);
        }
        Ok(mailer.send_password_reset(email))
    }
}

/// Hash a password using Argon2
///
/// Creates a salted hash of a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a password against a stored value
///
/// Stored values that are not PHC hash strings are legacy plaintext entries
/// and are compared literally.
fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed_hash) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok(),
        Err(_) => password == stored,
    }
}

/// Per-browser session states keyed by session id
#[derive(Debug, Default)]
pub struct Sessions {
    inner: RwLock<HashMap<String, SessionState>>,
}

impl Sessions {
    /// State of session `id`; unknown ids are logged out.
    pub fn get(&self, id: &str) -> SessionState {
        let sessions = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned().unwrap_or_default()
    }

    /// Store `state` under a fresh session id and return the id.
    pub fn start(&self, state: SessionState) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.update(&session_id, state);
        session_id
    }

    pub fn update(&self, id: &str, state: SessionState) {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id.to_string(), state);
    }

    /// Sign the session out and forget it.
    pub fn end(&self, id: &str) {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut state) = sessions.remove(id) {
            state.sign_out();
        }
    }
}

// Web handler functions below (only compiled with "web" feature)

/// Inline status message carried in the query string
#[cfg(feature = "web")]
#[derive(Debug, Default, Deserialize)]
pub struct PageMessage {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Username of the logged-in user, inserted by [`require_auth`]
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[cfg(feature = "web")]
fn redirect_with(path: &str, key: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?{}={}", path, key, urlencoding::encode(message)))
}

#[cfg(feature = "web")]
fn auth_failure(path: &str, error: AuthError) -> Response {
    match error {
        AuthError::Store(_) | AuthError::Hash(_) => {
            error!("Account store failure: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
        other => redirect_with(path, "error", &other.to_string()).into_response(),
    }
}

#[cfg(feature = "web")]
pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    Query(message): Query<PageMessage>,
) -> Response {
    render_page(&state, "login", &message_context(&message))
}

#[cfg(feature = "web")]
pub async fn serve_signup_page(
    State(state): State<Arc<AppState>>,
    Query(message): Query<PageMessage>,
) -> Response {
    render_page(&state, "signup", &message_context(&message))
}

#[cfg(feature = "web")]
pub async fn serve_forgot_password_page(
    State(state): State<Arc<AppState>>,
    Query(message): Query<PageMessage>,
) -> Response {
    render_page(&state, "forgot_password", &message_context(&message))
}

#[cfg(feature = "web")]
fn message_context(message: &PageMessage) -> serde_json::Value {
    serde_json::json!({
        "error": message.error,
        "success": message.success,
    })
}

/// Handle user login requests
///
/// Validates credentials and, on success, issues a fresh session id. Any
/// session id the browser already carried is ended rather than promoted.
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut session = SessionState::default();
        session
            .submit(&worker.accounts, &credentials.username, &credentials.password)
            .map(|()| session)
    })
    .await;

    match result {
        Ok(Ok(session)) => {
            if let Some(previous) = jar.get(SESSION_COOKIE) {
                state.sessions.end(previous.value());
            }
            let mut cookie = Cookie::new(SESSION_COOKIE, state.sessions.start(session));
            cookie.set_path("/");
            cookie.set_http_only(true);
            (jar.add(cookie), Redirect::to("/proposal")).into_response()
        }
        Ok(Err(e)) => auth_failure("/login", e),
        Err(e) => blocking_failure(e),
    }
}

/// Handle user registration
///
/// Registration never logs the user in; success returns to the login page.
#[cfg(feature = "web")]
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let username = credentials.username.trim().to_string();
    let worker = state.clone();
    let new_user = username.clone();
    let result = tokio::task::spawn_blocking(move || {
        let _writer = worker.lock_writes();
        worker.accounts.register(
            &new_user,
            &credentials.password,
            credentials.email.trim(),
        )
    })
    .await;

    match result {
        Ok(Ok(())) => redirect_with(
            "/login",
            "success",
            &format!("{} registered successfully!", username),
        )
        .into_response(),
        Ok(Err(e)) => auth_failure("/signup", e),
        Err(e) => blocking_failure(e),
    }
}

/// Handle password reset requests
///
/// The acknowledgment is simulated; nothing is delivered.
#[cfg(feature = "web")]
pub async fn handle_forgot_password(
    State(state): State<Arc<AppState>>,
    Form(reset_req): Form<PasswordResetRequest>,
) -> Response {
    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        worker
            .accounts
            .forgot_password(reset_req.email.trim(), worker.mailer.as_ref())
    })
    .await;

    match result {
        Ok(Ok(ack)) => redirect_with("/forgot-password", "success", &ack).into_response(),
        Ok(Err(e)) => auth_failure("/forgot-password", e),
        Err(e) => blocking_failure(e),
    }
}

#[cfg(feature = "web")]
fn blocking_failure(error: tokio::task::JoinError) -> Response {
    error!("Account task failed: {}", error);
    (StatusCode::INTERNAL_SERVER_ERROR, "Account request failed").into_response()
}

/// Handle user logout
///
/// Signs the session out and clears the session cookie.
#[cfg(feature = "web")]
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.end(cookie.value());
    }
    let mut removal = Cookie::from(SESSION_COOKIE);
    removal.set_path("/");
    (jar.remove(removal), Redirect::to("/login")).into_response()
}

/// Authentication middleware
///
/// Lets requests from logged-in sessions through with a [`CurrentUser`]
/// extension and redirects everything else to the login page.
#[cfg(feature = "web")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        if let SessionState::LoggedIn(username) = state.sessions.get(session_cookie.value()) {
            request.extensions_mut().insert(CurrentUser(username));
            return next.run(request).await;
        }
    }

    Redirect::to("/login").into_response()
}
