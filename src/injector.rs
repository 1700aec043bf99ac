//! Makes the support runtime resolvable from every class loader.
//!
//! The rewritten dispatch classes live in the bootstrap loader, so the
//! classes they call into must be there too. The support archive is located
//! through `PLAYOUT_SUPPORT_JAR` (or the value of that variable at build
//! time), checked for the runtime's marker class, and appended to the
//! bootstrap class loader search path.

use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::config::SUPPORT_JAR_ENV;
use crate::error::InjectError;
use crate::host::InstrumentationHost;

/// Entry every support archive must contain.
pub const SUPPORT_MARKER: &str = "playout/rt/ReflectionLog.class";

#[derive(Debug, Clone)]
pub struct SupportInjector {
    archive: Option<PathBuf>,
}

impl SupportInjector {
    /// Runtime environment first, then the location baked in at build time.
    pub fn from_env() -> Self {
        let archive = env::var_os(SUPPORT_JAR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| option_env!("PLAYOUT_SUPPORT_JAR").map(PathBuf::from));
        SupportInjector { archive }
    }

    pub fn with_archive(path: impl Into<PathBuf>) -> Self {
        SupportInjector { archive: Some(path.into()) }
    }

    pub fn archive(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    /// Resolves and validates the support archive without touching the host.
    pub fn locate(&self) -> Result<PathBuf, InjectError> {
        let path = self.archive.as_deref().ok_or(InjectError::NotConfigured)?;
        let file = match File::open(path) {
            Ok(f) if path.is_file() => f,
            Ok(_) => return Err(InjectError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(InjectError::NotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(InjectError::Unreadable { path: path.to_path_buf(), source: e.into() })
            }
        };

        let mut zip = ZipArchive::new(file)
            .map_err(|source| InjectError::Unreadable { path: path.to_path_buf(), source })?;
        match zip.by_name(SUPPORT_MARKER) {
            Ok(_) => {}
            Err(ZipError::FileNotFound) => {
                return Err(InjectError::MissingResource {
                    path: path.to_path_buf(),
                    entry: SUPPORT_MARKER,
                })
            }
            Err(source) => return Err(InjectError::Unreadable { path: path.to_path_buf(), source }),
        }

        Ok(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
    }

    /// Validates the archive and appends it to the host's bootstrap search
    /// path. Returns the path that was appended.
    pub fn inject<H>(&self, host: &H) -> Result<PathBuf, InjectError>
    where
        H: InstrumentationHost + ?Sized,
    {
        let archive = self.locate()?;
        host.append_to_bootstrap_search(&archive)?;
        info!("support runtime {} added to bootstrap search path", archive.display());
        Ok(archive)
    }
}
