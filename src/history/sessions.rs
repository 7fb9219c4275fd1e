use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Result, TraderError},
    utils::{read_optional, remove_if_exists, write_json_pretty},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSession {
    /// ISO date, also the map key
    pub date: String,
    pub timestamp: DateTime<Local>,
    pub action: f64,
    pub reward: f64,
    pub portfolio_value: f64,
}

pub fn session_id(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// One recorded decision per calendar day, persisted as a JSON map keyed by ISO date.
///
/// `has_traded` followed by `record` is not atomic. Callers rely on a single scheduled
/// invocation per day.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    sessions: BTreeMap<String, TradingSession>,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let sessions = match read_optional(path)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|err| TraderError::corrupt(path, err))?
            }
            None => BTreeMap::new(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            sessions,
        })
    }

    pub fn has_traded(&self, date: NaiveDate) -> bool {
        self.sessions.contains_key(&session_id(date))
    }

    /// Stores the session for `date`, replacing any earlier record for that day, and saves.
    pub fn record(&mut self, date: NaiveDate, action: f64, reward: f64, portfolio_value: f64) -> Result<&TradingSession> {
        let id = session_id(date);
        let session = TradingSession {
            date: id.clone(),
            timestamp: Local::now(),
            action,
            reward,
            portfolio_value,
        };

        if self.sessions.insert(id.clone(), session).is_some() {
            debug!(date = %id, "replacing existing session");
        }
        self.save()?;

        self.sessions
            .get(&id)
            .ok_or_else(|| TraderError::corrupt(&self.path, "session vanished after insert"))
    }

    pub fn get(&self, date: NaiveDate) -> Option<&TradingSession> {
        self.sessions.get(&session_id(date))
    }

    pub fn latest(&self) -> Option<&TradingSession> {
        self.sessions.values().next_back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &TradingSession> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        write_json_pretty(&self.path, &self.sessions)
    }

    /// Forgets every session and removes the file. Returns whether a file existed.
    pub fn clear(&mut self) -> Result<bool> {
        self.sessions.clear();
        let removed = remove_if_exists(&self.path)?;
        info!(path = %self.path.display(), removed, "trading history cleared");
        Ok(removed)
    }
}
