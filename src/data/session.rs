//! Session sources
//!
//! The telemetry provider sits behind [`SessionSource`]. Load failures are an
//! expected condition: [`fetch_session`] logs them at debug level and returns
//! `None` so a sweep can continue.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PredictorError, Result};
use crate::models::{Session, SessionKind};

/// Provider of raw sessions by (year, Grand Prix, session type)
pub trait SessionSource {
    fn load(&self, year: i32, grand_prix: &str, kind: SessionKind) -> Result<Session>;
}

/// Load a session, converting any failure into `None`
pub fn fetch_session<S: SessionSource + ?Sized>(
    source: &S,
    year: i32,
    grand_prix: &str,
    kind: SessionKind,
) -> Option<Session> {
    match source.load(year, grand_prix, kind) {
        Ok(session) => Some(session),
        Err(e) => {
            debug!("Could not load {} session for {} {}: {}", kind, year, grand_prix, e);
            None
        }
    }
}

/// Directory-friendly form of a Grand Prix name ("São Paulo Grand Prix" -> "são_paulo_grand_prix")
pub fn grand_prix_slug(grand_prix: &str) -> String {
    let mut slug = String::with_capacity(grand_prix.len());
    let mut last_sep = true;
    for c in grand_prix.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
            last_sep = false;
        } else if !last_sep {
            slug.push('_');
            last_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Sessions stored as JSON documents: `<root>/<year>/<slug>/<R|Q>.json`
pub struct JsonSessionSource {
    root: PathBuf,
}

impl JsonSessionSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn session_path(&self, year: i32, grand_prix: &str, kind: SessionKind) -> PathBuf {
        self.root
            .join(year.to_string())
            .join(grand_prix_slug(grand_prix))
            .join(format!("{}.json", kind.code()))
    }
}

impl SessionSource for JsonSessionSource {
    fn load(&self, year: i32, grand_prix: &str, kind: SessionKind) -> Result<Session> {
        let path = self.session_path(year, grand_prix, kind);
        if !path.exists() {
            return Err(PredictorError::SessionUnavailable {
                year,
                grand_prix: grand_prix.to_string(),
                kind,
                reason: format!("{} not found", path.display()),
            });
        }

        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// In-memory sessions keyed by (year, slug, kind); counts every load call
#[derive(Default)]
pub struct MemorySessionSource {
    sessions: HashMap<(i32, String, SessionKind), Session>,
    calls: Cell<usize>,
}

impl MemorySessionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, year: i32, grand_prix: &str, kind: SessionKind, session: Session) {
        self.sessions
            .insert((year, grand_prix_slug(grand_prix), kind), session);
    }

    /// Number of load calls served so far
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl SessionSource for MemorySessionSource {
    fn load(&self, year: i32, grand_prix: &str, kind: SessionKind) -> Result<Session> {
        self.calls.set(self.calls.get() + 1);
        self.sessions
            .get(&(year, grand_prix_slug(grand_prix), kind))
            .cloned()
            .ok_or_else(|| PredictorError::SessionUnavailable {
                year,
                grand_prix: grand_prix.to_string(),
                kind,
                reason: "not loaded".to_string(),
            })
    }
}
