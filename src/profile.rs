//! Named voice profile persistence
//!
//! The pipeline treats profile storage as an external collaborator: it only
//! needs save/load/list over opaque coefficient vectors. [`JsonProfileStore`]
//! is the local implementation the CLI uses: one JSON file per profile
//! under a data directory, written atomically (temp file + rename) so a
//! profile is either fully saved or not saved at all.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A stored voice profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Profile identifier
    pub id: String,
    /// Voiceprint coefficients
    pub coefficients: Vec<f32>,
    /// RFC 3339 creation time
    pub created_at: String,
}

/// Listing entry: identity plus a short summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    /// Profile identifier
    pub id: String,
    /// Number of stored coefficients
    pub coefficients: usize,
    /// RFC 3339 creation time
    pub created_at: String,
}

/// Persists named voiceprints as opaque coefficient records
pub trait ProfileStore: Send + Sync {
    /// Save (or atomically replace) a profile
    ///
    /// # Errors
    ///
    /// Returns an error when the profile cannot be fully written; a failed
    /// save must never leave a partial profile behind.
    fn save(&self, id: &str, coefficients: &[f32]) -> Result<()>;

    /// Load a profile's coefficients
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] when the id is unknown.
    fn load(&self, id: &str) -> Result<Vec<f32>>;

    /// List stored profiles
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be read.
    fn list(&self) -> Result<Vec<ProfileSummary>>;
}

/// File-backed store: one JSON document per profile
pub struct JsonProfileStore {
    dir: PathBuf,
}

impl JsonProfileStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidInput(format!(
                "profile id must be alphanumeric/dash/underscore, got {id:?}"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl ProfileStore for JsonProfileStore {
    fn save(&self, id: &str, coefficients: &[f32]) -> Result<()> {
        if coefficients.is_empty() {
            return Err(Error::EmptyInput("profile has no coefficients"));
        }

        let path = self.path_for(id)?;
        let record = ProfileRecord {
            id: id.to_string(),
            coefficients: coefficients.to_vec(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        // Write-then-rename keeps the replace atomic on the same filesystem
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&record)?)?;
        std::fs::rename(&tmp, &path)?;

        tracing::info!(id, coefficients = coefficients.len(), "profile saved");
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Vec<f32>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(Error::Profile(format!("profile not found: {id}")));
        }

        let record: ProfileRecord = serde_json::from_slice(&std::fs::read(&path)?)?;
        Ok(record.coefficients)
    }

    fn list(&self) -> Result<Vec<ProfileSummary>> {
        let mut out = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            match std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<ProfileRecord>(&bytes)?))
            {
                Ok(record) => out.push(ProfileSummary {
                    id: record.id,
                    coefficients: record.coefficients.len(),
                    created_at: record.created_at,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable profile");
                }
            }
        }

        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}
