use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::filter::SearchFilter;

/// A persisted, named, re-executable filter bundle. The only durable
/// state the engine produces; executing one re-composes the stored
/// filter through the live pipeline instead of replaying cached results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: u64,
    pub name: String,
    pub filter: SearchFilter,
}

/// sled-backed key-value store of saved searches: big-endian id keys,
/// bincode values. Independently locked by sled, so its operations never
/// block index rebuilds or searches.
pub struct SavedSearchStore {
    db: sled::Db,
}

impl SavedSearchStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    pub fn save(&self, name: &str, filter: SearchFilter) -> Result<u64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("saved search name must not be empty"));
        }
        filter.validate()?;

        let id = self.db.generate_id()?;
        let record = SavedSearch {
            id,
            name: name.to_string(),
            filter,
        };
        self.db.insert(id.to_be_bytes(), bincode::serialize(&record)?)?;
        self.db.flush()?;
        tracing::debug!(id, name, "saved search stored");
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Result<SavedSearch> {
        match self.db.get(id.to_be_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(EngineError::NotFound {
                kind: "saved search",
                id,
            }),
        }
    }

    /// All saved searches in id order (big-endian keys iterate sorted).
    pub fn list(&self) -> Result<Vec<SavedSearch>> {
        let mut out = Vec::new();
        for entry in self.db.iter() {
            let (_, bytes) = entry?;
            out.push(bincode::deserialize(&bytes)?);
        }
        Ok(out)
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        match self.db.remove(id.to_be_bytes())? {
            Some(_) => {
                self.db.flush()?;
                Ok(())
            }
            None => Err(EngineError::NotFound {
                kind: "saved search",
                id,
            }),
        }
    }
}
