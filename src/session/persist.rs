use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use log::info;

use crate::config::InvariantConfig;
use crate::curve::MeasuredCurve;
use crate::error::{InvariantError, Result};
use crate::session::state::{Bookmark, HistoryEntry, InvariantSession};

const FORMAT_VERSION: u32 = 1;

/// Everything needed to restore a session. Fitted functions are not stored;
/// they are refitted on the next compute.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionDocument {
    pub version: u32,
    pub curve: Option<MeasuredCurve>,
    pub history: Vec<HistoryEntry>,
    pub current: usize,
    pub bookmarks: Vec<Bookmark>,
    pub next_bookmark_id: u32,
}

impl SessionDocument {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(json)?;
        document.validate()?;
        Ok(document)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(serialized.as_bytes())?;
        info!("Saved session to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let document: Self = serde_json::from_reader(reader)?;
        document.validate()?;
        info!("Loaded session from {}", path.display());
        Ok(document)
    }

    /// Rejects documents that break the history invariants.
    pub fn validate(&self) -> Result<()> {
        let corrupt =
            |msg: String| Err(InvariantError::invalid(format!("session document: {msg}")));

        if self.version != FORMAT_VERSION {
            return corrupt(format!("unsupported version {}", self.version));
        }
        match (&self.curve, self.history.is_empty()) {
            (None, false) => return corrupt("history without a curve".to_owned()),
            (Some(_), true) => return corrupt("curve without a history".to_owned()),
            (Some(_), false) if self.current >= self.history.len() => {
                return corrupt(format!(
                    "current state {} is past the last state {}",
                    self.current,
                    self.history.len() - 1
                ));
            }
            _ => {}
        }
        for (k, entry) in self.history.iter().enumerate() {
            if entry.compute_num > k {
                return corrupt(format!(
                    "state {k} refers to the later compute state {}",
                    entry.compute_num
                ));
            }
            if entry.computed.is_some() && entry.compute_num != k {
                return corrupt(format!("computed state {k} does not refer to itself"));
            }
        }
        let mut last_id = 0;
        for bookmark in &self.bookmarks {
            if bookmark.id <= last_id || bookmark.id >= self.next_bookmark_id {
                return corrupt(format!("bookmark id {} is out of order", bookmark.id));
            }
            last_id = bookmark.id;
        }
        Ok(())
    }
}

impl InvariantSession {
    pub fn to_document(&self) -> SessionDocument {
        SessionDocument {
            version: FORMAT_VERSION,
            curve: self.curve.clone(),
            history: self.history.clone(),
            current: self.current,
            bookmarks: self.bookmarks.clone(),
            next_bookmark_id: self.next_bookmark_id,
        }
    }

    pub fn from_document(document: SessionDocument, config: InvariantConfig) -> Result<Self> {
        document.validate()?;
        Ok(Self {
            config,
            curve: document.curve,
            history: document.history,
            current: document.current,
            bookmarks: document.bookmarks,
            next_bookmark_id: document.next_bookmark_id,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_document().save(path)
    }

    pub fn load(path: &Path, config: InvariantConfig) -> Result<Self> {
        Self::from_document(SessionDocument::load(path)?, config)
    }
}
