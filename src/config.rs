use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::proposal::ProposalType;

/// Errors raised while opening or writing the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// External converter invocation.
///
/// `{input}` and `{output}` inside `args` are replaced with the actual paths.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ConverterConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "pandoc".to_string(),
            args: vec![
                "{input}".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
            ],
        }
    }
}

/// Literal marker strings used in the proposal templates
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Placeholders {
    pub kind: String,
    pub code: String,
    pub client: String,
    pub service: String,
    pub area: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            kind: "TIPO".to_string(),
            code: "xxx.x.xxxx".to_string(),
            client: "Cliente".to_string(),
            service: "Serviço".to_string(),
            area: "Área".to_string(),
        }
    }
}

/// Account written into a fresh credentials file
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Default for SeedUser {
    fn default() -> Self {
        Self {
            username: "vendedor1".to_string(),
            password: "senha123".to_string(),
            email: "vendedor1@email.com".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
    #[serde(default = "default_contacts_file")]
    pub contacts_file: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_current_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_commercial_template")]
    pub commercial_template: String,
    #[serde(default = "default_technical_template")]
    pub technical_template: String,
    #[serde(default = "default_current_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub placeholders: Placeholders,
    #[serde(default)]
    pub seed_user: SeedUser,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from(CONFIG_FILE),
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            credentials_file: default_credentials_file(),
            contacts_file: default_contacts_file(),
            history_file: default_history_file(),
            template_dir: default_current_dir(),
            commercial_template: default_commercial_template(),
            technical_template: default_technical_template(),
            output_dir: default_current_dir(),
            converter: ConverterConfig::default(),
            placeholders: Placeholders::default(),
            seed_user: SeedUser::default(),
        }
    }
}

/// Config file looked up in the working directory by the web binary
pub const CONFIG_FILE: &str = "proposals.json";

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("database")
}

fn default_credentials_file() -> String {
    "usuarios.json".to_string()
}

fn default_contacts_file() -> String {
    "emails.json".to_string()
}

fn default_history_file() -> String {
    "propostas_emitidas.json".to_string()
}

fn default_current_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_commercial_template() -> String {
    "Proposta Comercial xxx.x.xxxx.docx".to_string()
}

fn default_technical_template() -> String {
    "Proposta Técnica xxx.x.xxxx.docx".to_string()
}

impl Config {
    /// Open the config file at `path`, writing the defaults there if it is absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let config_path = path.as_ref().to_path_buf();

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => {
                info!("Open config from {:?}", config_path);
                let mut cfg: Self =
                    serde_json::from_str(&contents).map_err(|source| ConfigError::Malformed {
                        path: config_path.clone(),
                        source,
                    })?;
                cfg.path = config_path;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Config {
                    path: config_path,
                    ..Default::default()
                };
                cfg.save()?;
                info!("Write default config at {:?}", cfg.path);
                Ok(cfg)
            }
            Err(source) => Err(ConfigError::Io {
                path: config_path,
                source,
            }),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// A config rooted at `dir`: data, templates and outputs all live under it.
    pub fn rooted_at<P: AsRef<Path>>(dir: P) -> Config {
        let dir = dir.as_ref();
        Config {
            path: dir.join(CONFIG_FILE),
            data_dir: dir.join("database"),
            template_dir: dir.join("templates"),
            output_dir: dir.join("output"),
            ..Default::default()
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(&self.credentials_file)
    }

    pub fn contacts_path(&self) -> PathBuf {
        self.data_dir.join(&self.contacts_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }

    pub fn template_for(&self, kind: ProposalType) -> PathBuf {
        match kind {
            ProposalType::Commercial => self.template_dir.join(&self.commercial_template),
            ProposalType::Technical => self.template_dir.join(&self.technical_template),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
