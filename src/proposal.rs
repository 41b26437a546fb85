use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{Config, Placeholders};
use crate::converter::{ConvertError, Converter};
use crate::history::{Ledger, ProposalRecord};
use crate::saving::StoreError;
use crate::template::{self, Fields, TemplateError};

/// Kind of proposal; each kind has its own template.
///
/// Persisted with the names used on the printed documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalType {
    #[serde(rename = "Comercial", alias = "Commercial")]
    Commercial,
    #[serde(rename = "Técnica", alias = "Technical", alias = "Tecnica")]
    Technical,
}

impl ProposalType {
    pub const ALL: [ProposalType; 2] = [ProposalType::Commercial, ProposalType::Technical];

    /// Name written into documents and the history file
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalType::Commercial => "Comercial",
            ProposalType::Technical => "Técnica",
        }
    }

    /// Name shown in the interface
    pub fn label(&self) -> &'static str {
        match self {
            ProposalType::Commercial => "Commercial",
            ProposalType::Technical => "Technical",
        }
    }
}

impl fmt::Display for ProposalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Comercial" | "Commercial" => Ok(ProposalType::Commercial),
            "Técnica" | "Tecnica" | "Technical" => Ok(ProposalType::Technical),
            other => Err(format!("unknown proposal type: {}", other)),
        }
    }
}

/// Values submitted through the proposal form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalForm {
    pub kind: ProposalType,
    pub code: String,
    pub client: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub area: String,
}

impl ProposalForm {
    /// Placeholder mapping for this form, in template field order
    pub fn fields(&self, placeholders: &Placeholders) -> Fields {
        let mut fields = Fields::new();
        fields.insert(placeholders.kind.clone(), self.kind.as_str());
        fields.insert(placeholders.code.clone(), self.code.clone());
        fields.insert(placeholders.client.clone(), self.client.clone());
        fields.insert(placeholders.service.clone(), self.service.clone());
        fields.insert(placeholders.area.clone(), self.area.clone());
        fields
    }

    /// Output file stem; characters are used as typed.
    pub fn base_name(&self) -> String {
        format!("Proposta_{}_{}", self.code, self.client)
    }
}

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("template for {kind} proposals not found at {path:?}")]
    MissingTemplate { kind: ProposalType, path: PathBuf },

    #[error("failed to create output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProposal {
    /// Position of the new record in the ledger
    pub index: usize,
    pub record: ProposalRecord,
    /// Filled intermediate document
    pub document: PathBuf,
}

pub struct ProposalGenerator<'a> {
    config: &'a Config,
    converter: &'a dyn Converter,
}

impl<'a> ProposalGenerator<'a> {
    pub fn new(config: &'a Config, converter: &'a dyn Converter) -> Self {
        Self { config, converter }
    }

    /// Fill the template for `form.kind`, convert it to PDF and record it in `ledger`.
    ///
    /// The ledger is only written once the PDF exists. A failed conversion can
    /// leave the intermediate document (or a partial PDF) in the output directory.
    pub fn generate(
        &self,
        form: &ProposalForm,
        username: &str,
        ledger: &Ledger,
    ) -> Result<GeneratedProposal, ProposalError> {
        let template_path = self.config.template_for(form.kind);
        if !template_path.is_file() {
            return Err(ProposalError::MissingTemplate {
                kind: form.kind,
                path: template_path,
            });
        }

        let output_dir = self.config.output_dir();
        create_dir_all(output_dir).map_err(|source| ProposalError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let base_name = form.base_name();
        let document = output_dir.join(format!("{}.docx", base_name));
        let pdf = output_dir.join(format!("{}.pdf", base_name));

        info!(
            "Generating {} proposal {} for {} as {}",
            form.kind, form.code, form.client, username
        );

        template::fill_template(
            &template_path,
            &document,
            &form.fields(&self.config.placeholders),
        )?;
        self.converter.convert(&document, &pdf)?;

        let record = ProposalRecord {
            code: form.code.clone(),
            client: form.client.clone(),
            kind: form.kind,
            user: username.to_string(),
            created_at: Local::now(),
            pdf,
        };
        let index = ledger.record(record.clone())?;

        Ok(GeneratedProposal {
            index,
            record,
            document,
        })
    }
}
