//! Per-session state: voice preferences and conversion turn-taking.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::media::Voice;

type TurnMap = parking_lot::Mutex<HashMap<SessionId, Arc<Mutex<()>>>>;

/// Conversation identifier assigned by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Voice chosen per session, shared between the voice picker (the only
/// writer) and pipeline runs (which read once, at synthesis time).
///
/// Entries live for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct VoicePreferences {
    voices: Arc<RwLock<HashMap<SessionId, Voice>>>,
    default_voice: Voice,
}

impl VoicePreferences {
    pub fn new(default_voice: Voice) -> Self {
        Self {
            voices: Arc::new(RwLock::new(HashMap::new())),
            default_voice,
        }
    }

    /// Record a selection, returning the previous one if any.
    pub async fn set(&self, session: SessionId, voice: Voice) -> Option<Voice> {
        self.voices.write().await.insert(session, voice)
    }

    /// The voice explicitly selected for `session`, if any.
    pub async fn selected(&self, session: SessionId) -> Option<Voice> {
        self.voices.read().await.get(&session).copied()
    }

    /// The voice to use for `session`, falling back to the default.
    pub async fn get(&self, session: SessionId) -> Voice {
        self.selected(session).await.unwrap_or(self.default_voice)
    }
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self::new(Voice::default())
    }
}

/// One async mutex per session so conversions for the same session run one
/// after another, in arrival order. Different sessions never contend.
///
/// A session's entry is dropped once its last turn ends with nobody waiting.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    locks: Arc<TurnMap>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for this session's turn. The turn ends when the guard drops.
    pub async fn acquire(&self, session: SessionId) -> SessionTurn {
        let lock = Arc::clone(self.locks.lock().entry(session).or_default());
        let guard = Arc::clone(&lock).lock_owned().await;
        SessionTurn {
            guard: Some(guard),
            lock,
            locks: Arc::clone(&self.locks),
            session,
        }
    }
}

/// A session's exclusive turn, held for the length of one conversion.
#[derive(Debug)]
pub struct SessionTurn {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<Mutex<()>>,
    locks: Arc<TurnMap>,
    session: SessionId,
}

impl Drop for SessionTurn {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock();
        // Waiters clone the mutex under the map lock, so the map entry and
        // this turn are the only holders when nobody is queued.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.session);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_preferences_default_when_unset() {
        let prefs = VoicePreferences::new(Voice::ZhCn);
        assert_eq!(prefs.get(SessionId(1)).await, Voice::ZhCn);
        assert!(prefs.selected(SessionId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_preferences_overwrite() {
        let prefs = VoicePreferences::default();
        assert_eq!(prefs.set(SessionId(1), Voice::EnUs).await, None);
        assert_eq!(prefs.set(SessionId(1), Voice::JaJp).await, Some(Voice::EnUs));
        assert_eq!(prefs.get(SessionId(1)).await, Voice::JaJp);
        assert_eq!(prefs.get(SessionId(2)).await, Voice::ZhCn);
        assert!(prefs.selected(SessionId(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_preferences_clones_share_state() {
        let prefs = VoicePreferences::default();
        let other = prefs.clone();
        other.set(SessionId(5), Voice::KoKr).await;
        assert_eq!(prefs.get(SessionId(5)).await, Voice::KoKr);
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId(-100123).to_string(), "-100123");
        assert_eq!(SessionId::from(7), SessionId(7));
    }

    #[tokio::test]
    async fn test_same_session_waits_for_turn() {
        let locks = SessionLocks::new();
        let guard = locks.acquire(SessionId(1)).await;

        let waiting = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _turn = locks.acquire(SessionId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_finished_sessions_are_forgotten() {
        let locks = SessionLocks::new();
        let first = locks.acquire(SessionId(1)).await;
        let queued = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _turn = locks.acquire(SessionId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(first);
        assert!(locks.locks.lock().contains_key(&SessionId(1)));

        tokio::time::timeout(Duration::from_secs(1), queued)
            .await
            .unwrap()
            .unwrap();
        assert!(locks.locks.lock().is_empty());

        drop(locks.acquire(SessionId(2)).await);
        assert!(locks.locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_other_sessions_do_not_wait() {
        let locks = SessionLocks::new();
        let _guard = locks.acquire(SessionId(1)).await;
        tokio::time::timeout(Duration::from_secs(1), locks.acquire(SessionId(2)))
            .await
            .unwrap();
    }
}
