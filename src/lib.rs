/*!
# Proposal Desk

A small web tool for a sales team that turns `.docx` proposal templates into
filled-in PDF proposals and keeps a browsable history of everything issued.

## Overview

A salesperson signs in, picks the proposal type (commercial or technical),
types the proposal code, the client name, the contracted service and the area,
and gets back a PDF. The template matching the type is copied, every literal
placeholder in it is replaced, the copy is handed to an external converter,
and the result is appended to the proposal ledger.

## Architecture

### Web Layer (`web` feature)
- **Technologies**: axum, handlebars, tokio
- **Key Components**:
  - Login, registration and password-reset pages
  - Proposal form and result page
  - History page with text and salesperson filters, exports and re-downloads

### Domain Layer
- **template**: placeholder substitution over `.docx` archives
- **converter**: external document-to-PDF conversion
- **proposal**: the generate workflow (fill, convert, record)
- **history**: the proposal ledger, filtering and row indices
- **downloader**: CSV, JSON, PDF and XLSX exports of a filtered history
- **login**: accounts, password hashing and session state
- **mailer**: password-reset acknowledgment (simulated)

### Data Persistence Layer
- Flat JSON files under the data directory (`usuarios.json`, `emails.json`,
  `propostas_emitidas.json`), re-read on every access
- Missing files are created with their defaults on first use

## Configuration

Settings are read from `proposals.json` in the working directory, which is
written with defaults on first start. Log verbosity follows `RUST_LOG`.

## Endpoints

- `/login`, `/signup`, `/forgot-password` - Public account pages
- `/logout` - Ends the browser session (POST)
- `/proposal` - Proposal form (GET) and generation (POST)
- `/history` - Filtered history (`?q=...&user=...`)
- `/export/{csv|json|pdf|xlsx}` - Download the filtered history
- `/download/{index}` - Download the PDF of one history entry
*/

#[macro_use]
extern crate log;

pub mod config;
pub mod converter;
pub mod downloader;
pub mod history;
pub mod login;
pub mod mailer;
pub mod proposal;
pub mod saving;
pub mod template;

#[cfg(feature = "web")]
pub mod app;

pub use config::{CONFIG_FILE, Config};
pub use converter::{CommandConverter, ConvertError, Converter};
pub use downloader::{ExportError, ExportFormat};
pub use history::{HistoryFilter, HistoryView, Ledger, ProposalRecord, UserFilter};
pub use login::{Accounts, AuthError, SessionState};
pub use mailer::{Mailer, SimulatedMailer};
pub use proposal::{GeneratedProposal, ProposalError, ProposalForm, ProposalGenerator, ProposalType};
pub use saving::StoreError;
pub use template::{Fields, TemplateError};
