use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::config::ConverterConfig;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to run converter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter `{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("converter `{program}` reported success but produced no {output:?}")]
    MissingOutput { program: String, output: PathBuf },
}

/// Turns a document (or an HTML report) into a PDF file.
pub trait Converter: Send + Sync {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Runs an external program once per conversion.
///
/// Blocking, no timeout and no retry.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl From<&ConverterConfig> for CommandConverter {
    fn from(config: &ConverterConfig) -> Self {
        CommandConverter::new(config.program.clone(), config.args.clone())
    }
}

impl Converter for CommandConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let args = self.expand_args(input, output);
        debug!("Running {} {:?}", self.program, args);

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(ConvertError::Failed {
                program: self.program.clone(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.exists() {
            return Err(ConvertError::MissingOutput {
                program: self.program.clone(),
                output: output.to_path_buf(),
            });
        }

        info!("Converted {:?} to {:?}", input, output);
        Ok(())
    }
}
