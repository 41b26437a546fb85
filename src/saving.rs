use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors raised by the flat-file store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Load a JSON value from `path`, creating the file with `default` if it is absent.
///
/// # Errors
/// * `StoreError::Malformed` if the file exists but does not parse
/// * `StoreError::Io` if the file cannot be read or created
pub fn load<T>(path: impl AsRef<Path>, default: T) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
{
    load_with(path, || Ok::<T, StoreError>(default))
}

/// Like [`load`], but only builds the default value when the file has to be created.
///
/// The builder may fail with the caller's own error type.
pub fn load_with<T, E, F>(path: impl AsRef<Path>, make_default: F) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    E: From<StoreError>,
    F: FnOnce() -> Result<T, E>,
{
    let path = path.as_ref();

    if path.exists() {
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        let reader = BufReader::new(file);
        let data: T = serde_json::from_reader(reader).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(data);
    }

    let data = make_default()?;
    save(path, &data)?;
    info!("Created store file {:?}", path);
    Ok(data)
}

/// Overwrite `path` with the pretty-printed JSON form of `data`.
///
/// The data is written to a temporary file in the same directory and renamed
/// over `path`, so readers see either the old or the new content. No backup is
/// kept.
pub fn save<T: Serialize + ?Sized>(path: impl AsRef<Path>, data: &T) -> Result<(), StoreError> {
    let path = path.as_ref();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    }

    let tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    let mut writer = BufWriter::new(tmp);

    serde_json::to_writer_pretty(&mut writer, data).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = writer
        .into_inner()
        .map_err(|e| StoreError::io(path, e.into_error()))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;

    Ok(())
}
