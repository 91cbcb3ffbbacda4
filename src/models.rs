use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Movie ─────────────────────────────────────────────────────────────────────

/// One display-ready search result. Every field is optional: the API omits
/// whatever it does not know.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Movie {
    pub title: Option<String>,
    pub director: Option<String>,
    /// Free-text cast list, as the API returns it.
    pub cast: Option<String>,
    pub rating: Option<String>,
    pub language: Option<String>,
    pub year: Option<String>,
    pub media_type: Option<String>,
    pub genre: Option<String>,
    pub poster_url: Option<String>,
}

// ── Media type filter ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
    Episode,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "series",
            MediaType::Episode => "episode",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "series" => Ok(MediaType::Series),
            "episode" => Ok(MediaType::Episode),
            other => Err(anyhow::anyhow!("unknown media type: {other}")),
        }
    }
}

// ── Search session ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Searching,
    FetchingDetails,
    Done,
    Error,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Error | SessionState::Cancelled
        )
    }

    /// True while a worker owns the session.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SessionState::Searching | SessionState::FetchingDetails)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Searching => "searching",
            SessionState::FetchingDetails => "fetching_details",
            SessionState::Done => "done",
            SessionState::Error => "error",
            SessionState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A detail lookup that did not produce a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedLookup {
    pub id: String,
    pub reason: String,
}

/// Read-only copy of the active (or last) search session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub query: Option<String>,
    pub media_type: Option<MediaType>,
    pub state: SessionState,
    pub in_flight: bool,
    /// Number of hits the search phase returned (after any cap).
    pub hits: usize,
    /// Populated once the session reaches `done`.
    pub results: Vec<Movie>,
    pub failed: Vec<FailedLookup>,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            query: None,
            media_type: None,
            state: SessionState::Idle,
            in_flight: false,
            hits: 0,
            results: Vec::new(),
            failed: Vec::new(),
            message: None,
            started_at: None,
            finished_at: None,
        }
    }
}

// ── Live events ───────────────────────────────────────────────────────────────

/// Search progress broadcast via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    SearchStarted { session_id: Uuid, query: String },
    ResultsReady { session_id: Uuid, results: Vec<Movie> },
    NotFound { session_id: Uuid },
    Error { session_id: Uuid, message: String },
    SearchEnded { session_id: Uuid },
}
