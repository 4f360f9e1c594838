//! Store type / version stamping
//!
//! `version.dat` holds `<type>||<version>`, written once when a store is
//! created and read at open time to pick the implementation.

use std::fs;
use std::path::Path;

use crate::error::{Result, StoreError};

/// Name of the version file
pub const VERSION_FILE_NAME: &str = "version.dat";

const FIELD_SEPARATOR: &str = "||";

/// Store formats this crate can open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    /// Fixed-size blocks of zlib-compressed UTF-8
    FixedBlock,
}

impl StoreFormat {
    /// Type name written to the version file
    pub const fn type_name(self) -> &'static str {
        match self {
            StoreFormat::FixedBlock => "fixedblock",
        }
    }

    /// Current format version written to the version file
    pub const fn version(self) -> &'static str {
        match self {
            StoreFormat::FixedBlock => "1",
        }
    }

    /// Resolve a type name / version pair. Unknown and legacy types are
    /// rejected rather than guessed at.
    pub fn resolve(type_name: &str, version: &str) -> Result<Self> {
        match type_name {
            "fixedblock" => {
                if version == StoreFormat::FixedBlock.version() {
                    Ok(StoreFormat::FixedBlock)
                } else {
                    Err(StoreError::Format(format!(
                        "Unsupported fixedblock content store version '{}'",
                        version
                    )))
                }
            }
            "utf8" | "utf8zip" => Err(StoreError::Format(format!(
                "Content store type '{}' is a legacy format that cannot be opened; re-create the store",
                type_name
            ))),
            "utf16" => Err(StoreError::Format(
                "UTF-16 content store is deprecated. Please re-index your data.".to_string(),
            )),
            other => Err(StoreError::Format(format!(
                "Unknown content store type '{}'",
                other
            ))),
        }
    }

    /// Read the version file in `dir` and resolve the store format
    pub fn detect(dir: &Path) -> Result<Self> {
        let version_file = VersionFile::read(dir)?;
        Self::resolve(&version_file.type_name, &version_file.version)
    }
}

/// Parsed contents of `version.dat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFile {
    pub type_name: String,
    pub version: String,
}

impl VersionFile {
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(VERSION_FILE_NAME);
        if !path.exists() {
            return Err(StoreError::Format(format!(
                "Version file not found: {}",
                path.display()
            )));
        }
        Self::parse(&fs::read_to_string(&path)?)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut fields = contents.trim().split(FIELD_SEPARATOR).map(str::trim);
        match (fields.next(), fields.next()) {
            (Some(type_name), Some(version)) if !type_name.is_empty() && !version.is_empty() => {
                Ok(Self {
                    type_name: type_name.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(StoreError::Format(format!(
                "Malformed version file contents: {:?}",
                contents
            ))),
        }
    }

    /// Stamp `dir` with the given format
    pub fn write(dir: &Path, format: StoreFormat) -> Result<()> {
        let contents = format!(
            "{}{}{}",
            format.type_name(),
            FIELD_SEPARATOR,
            format.version()
        );
        fs::write(dir.join(VERSION_FILE_NAME), contents)?;
        Ok(())
    }
}
