use axum::{
    Extension, Form, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use handlebars::Handlebars;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::converter::{CommandConverter, Converter};
use crate::downloader::{self, ExportError, ExportFormat};
use crate::history::{HistoryFilter, HistoryView, Ledger, UserFilter, ALL_USERS};
use crate::login::{self, Accounts, AuthError, CurrentUser, PageMessage, Sessions};
use crate::mailer::{Mailer, SimulatedMailer};
use crate::proposal::{GeneratedProposal, ProposalError, ProposalForm, ProposalGenerator, ProposalType};
use crate::saving::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to register page template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),
}

/// Everything a request handler needs, shared across requests.
///
/// Store files are re-read on every access; `writes` serializes every
/// read-modify-write of those files inside this process.
pub struct AppState {
    pub config: Config,
    pub accounts: Accounts,
    pub ledger: Ledger,
    pub sessions: Sessions,
    pub converter: Arc<dyn Converter>,
    pub mailer: Arc<dyn Mailer>,
    pages: Handlebars<'static>,
    writes: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config, converter: Arc<dyn Converter>) -> Result<Self, AppError> {
        let accounts = Accounts::open(&config)?;
        let ledger = Ledger::open(config.history_path())?;

        Ok(AppState {
            config,
            accounts,
            ledger,
            sessions: Sessions::default(),
            converter,
            mailer: Arc::new(SimulatedMailer),
            pages: page_registry()?,
            writes: Mutex::new(()),
        })
    }

    pub fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate a proposal for `username`, holding the write lock throughout.
    pub fn generate(
        &self,
        form: &ProposalForm,
        username: &str,
    ) -> Result<GeneratedProposal, ProposalError> {
        let _writer = self.lock_writes();
        ProposalGenerator::new(&self.config, self.converter.as_ref()).generate(
            form,
            username,
            &self.ledger,
        )
    }

    /// Export the filtered history; PDF reports are written to the output directory.
    pub fn export(
        &self,
        filter: &HistoryFilter,
        format: ExportFormat,
    ) -> Result<Vec<u8>, ExportError> {
        let _writer = self.lock_writes();
        let view = self.ledger.render(filter)?;
        downloader::export(
            &view,
            format,
            self.converter.as_ref(),
            self.config.output_dir(),
        )
    }
}

fn page_registry() -> Result<Handlebars<'static>, Box<handlebars::TemplateError>> {
    let mut pages = Handlebars::new();
    let sources = [
        ("layout_head", include_str!("./static/layout_head.hbs")),
        ("nav", include_str!("./static/nav.hbs")),
        ("login", include_str!("./static/login.hbs")),
        ("signup", include_str!("./static/signup.hbs")),
        ("forgot_password", include_str!("./static/forgot_password.hbs")),
        ("proposal", include_str!("./static/proposal.hbs")),
        ("generated", include_str!("./static/generated.hbs")),
        ("history", include_str!("./static/history.hbs")),
    ];
    for (name, source) in sources {
        pages.register_template_string(name, source).map_err(Box::new)?;
    }
    Ok(pages)
}

/// Render a registered page, answering 500 if rendering fails.
pub(crate) fn render_page(state: &AppState, name: &str, data: &serde_json::Value) -> Response {
    render_page_with_status(state, StatusCode::OK, name, data)
}

fn render_page_with_status(
    state: &AppState,
    status: StatusCode,
    name: &str,
    data: &serde_json::Value,
) -> Response {
    match state.pages.render(name, data) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to render page {}: {}", name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Page rendering failed").into_response()
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(serve_home))
        .route("/proposal", get(serve_proposal_form).post(handle_generate))
        .route("/history", get(serve_history))
        .route("/export/:format", get(export_history))
        .route("/download/:index", get(download_record))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    Router::new()
        .route(
            "/login",
            get(login::serve_login_page).post(login::handle_login),
        )
        .route(
            "/signup",
            get(login::serve_signup_page).post(login::handle_signup),
        )
        .route(
            "/forgot-password",
            get(login::serve_forgot_password_page).post(login::handle_forgot_password),
        )
        .route("/logout", post(login::handle_logout))
        .merge(protected)
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let converter: Arc<dyn Converter> = Arc::new(CommandConverter::from(&config.converter));
    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config, converter)?);

    let app = router(state);

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_home() -> Redirect {
    Redirect::to("/proposal")
}

fn proposal_context(user: &str, error: Option<String>, form: Option<&ProposalForm>) -> serde_json::Value {
    let selected = form.map(|f| f.kind).unwrap_or(ProposalType::Commercial);
    let kinds: Vec<_> = ProposalType::ALL
        .iter()
        .map(|kind| {
            serde_json::json!({
                "value": kind.as_str(),
                "label": kind.label(),
                "selected": *kind == selected,
            })
        })
        .collect();

    serde_json::json!({
        "user": user,
        "error": error,
        "kinds": kinds,
        "form": form,
    })
}

async fn serve_proposal_form(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(message): Query<PageMessage>,
) -> Response {
    render_page(&state, "proposal", &proposal_context(&user, message.error, None))
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<ProposalForm>,
) -> Response {
    let worker = state.clone();
    let job_form = form.clone();
    let job_user = user.clone();
    let result =
        tokio::task::spawn_blocking(move || worker.generate(&job_form, &job_user)).await;

    match result {
        Ok(Ok(generated)) => {
            let file_name = generated
                .record
                .pdf
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            render_page(
                &state,
                "generated",
                &serde_json::json!({
                    "user": user,
                    "index": generated.index,
                    "file_name": file_name,
                    "record": generated.record,
                    "kind_label": generated.record.kind.label(),
                }),
            )
        }
        Ok(Err(e)) => {
            error!("Proposal generation failed for {}: {}", user, e);
            render_page_with_status(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                "proposal",
                &proposal_context(&user, Some(e.to_string()), Some(&form)),
            )
        }
        Err(e) => {
            error!("Proposal generation task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Proposal generation failed").into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    q: String,
    #[serde(default)]
    user: String,
}

impl HistoryQuery {
    fn filter(&self) -> HistoryFilter {
        HistoryFilter::new(self.q.trim(), UserFilter::parse(&self.user))
    }

    fn query_string(&self) -> String {
        format!(
            "q={}&user={}",
            urlencoding::encode(self.q.trim()),
            urlencoding::encode(self.filter().user.as_str())
        )
    }
}

fn history_context(
    user: &str,
    query: &HistoryQuery,
    view: &HistoryView,
    users: Vec<String>,
) -> serde_json::Value {
    let filter = query.filter();
    let rows: Vec<_> = view
        .rows
        .iter()
        .map(|row| {
            let columns = row.record.columns();
            serde_json::json!({
                "index": row.index,
                "columns": columns,
                "download_label": format!("{} - {}", row.record.code, row.record.client),
                "downloadable": row.record.pdf.is_file(),
            })
        })
        .collect();
    let users: Vec<_> = users
        .into_iter()
        .map(|name| {
            let selected = filter.user.as_str() == name;
            serde_json::json!({ "name": name, "selected": selected })
        })
        .collect();

    serde_json::json!({
        "user": user,
        "empty_ledger": users.is_empty(),
        "q": query.q.trim(),
        "all_users": ALL_USERS,
        "all_selected": filter.user == UserFilter::All,
        "users": users,
        "columns": crate::history::COLUMNS,
        "rows": rows,
        "query": query.query_string(),
    })
}

async fn serve_history(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let loaded = state
        .ledger
        .render(&query.filter())
        .and_then(|view| Ok((view, state.ledger.users()?)));

    match loaded {
        Ok((view, users)) => render_page(
            &state,
            "history",
            &history_context(&user, &query, &view, users),
        ),
        Err(e) => {
            error!("Failed to load history: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn export_history(
    State(state): State<Arc<AppState>>,
    Path(format): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let format: ExportFormat = match format.parse() {
        Ok(format) => format,
        Err(e) => return (StatusCode::NOT_FOUND, e).into_response(),
    };

    let worker = state.clone();
    let filter = query.filter();
    let result = tokio::task::spawn_blocking(move || worker.export(&filter, format)).await;

    match result {
        Ok(Ok(bytes)) => file_response(bytes, format.content_type(), &format.file_name()),
        Ok(Err(e)) => {
            error!("History export as {} failed: {}", format, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!("History export task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Export failed").into_response()
        }
    }
}

/// Re-download the PDF of ledger entry `index`, if it is still on disk.
async fn download_record(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Response {
    let path: PathBuf = match state.ledger.download_path(index) {
        Ok(Some(path)) => path,
        Ok(None) => return (StatusCode::NOT_FOUND, "File not found").into_response(),
        Err(e) => {
            error!("Failed to load history: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "proposta.pdf".to_string());
            file_response(bytes, "application/pdf", &file_name)
        }
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
    }
}

/// Attachment response with an ASCII fallback name and the UTF-8 name.
fn file_response(bytes: Vec<u8>, content_type: &'static str, file_name: &str) -> Response {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response()
}
