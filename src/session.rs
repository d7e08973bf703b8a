//! Bounded per-session conversation history.
//!
//! Sessions are created on first use and hold a bounded deque of turns; when
//! the bound is reached the oldest turn is evicted. A session's bound can be
//! resized after the fact: shrinking evicts from the front so the newest
//! turns survive, and the new bound sticks for later records. The store is an
//! explicit collaborator with its own lifecycle, never ambient global state,
//! so tests and multi-tenant embeddings can each hold their own.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::models::Turn;

struct SessionEntry {
    max_turns: usize,
    turns: VecDeque<Turn>,
}

pub struct SessionStore {
    default_max_turns: usize,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            default_max_turns: max_turns.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// History for a session, oldest first. Unknown sessions are empty, not
    /// an error.
    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .map(|entry| entry.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records a completed exchange, evicting the oldest turn past the
    /// session's bound. Creates the session if it does not exist yet.
    pub fn record(&self, session_id: &str, turn: Turn) {
        let mut sessions = self.sessions.lock().unwrap();
        let default_max_turns = self.default_max_turns;
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                max_turns: default_max_turns,
                turns: VecDeque::new(),
            });
        while entry.turns.len() >= entry.max_turns {
            entry.turns.pop_front();
        }
        entry.turns.push_back(turn);
    }

    /// Rebinds one session to a new bound. Shrinking evicts the oldest turns
    /// immediately so the newest survive; growing leaves existing turns
    /// alone. Creates the session if it does not exist yet.
    pub fn resize(&self, session_id: &str, max_turns: usize) {
        let max_turns = max_turns.max(1);
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                max_turns,
                turns: VecDeque::new(),
            });
        entry.max_turns = max_turns;
        while entry.turns.len() > max_turns {
            entry.turns.pop_front();
        }
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}
