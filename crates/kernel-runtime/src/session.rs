//! Session lookup and lifecycle: thin ownership layer over `types::Session`
//! so the dispatch gateway doesn't juggle a bare map.

use crate::types::Session;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    cognitive_cap: usize,
}

impl SessionManager {
    pub fn new(cognitive_cap: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cognitive_cap,
        }
    }

    /// Fetch a clone of the named session, creating it with an empty
    /// active-skill set if it doesn't exist yet.
    pub fn get_or_create(&self, session_id: &str) -> Session {
        {
            let sessions = self.sessions.read().expect("session map lock poisoned");
            if let Some(session) = sessions.get(session_id) {
                return session.clone();
            }
        }
        let mut sessions = self.sessions.write().expect("session map lock poisoned");
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, self.cognitive_cap))
            .clone()
    }

    /// Record `skill_id` as active for `session_id`.
    pub fn touch_skill(&self, session_id: &str, skill_id: &str) {
        let mut sessions = self.sessions.write().expect("session map lock poisoned");
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, self.cognitive_cap))
            .touch_skill(skill_id);
    }

    pub fn reset(&self, session_id: &str) {
        let mut sessions = self.sessions.write().expect("session map lock poisoned");
        if let Some(session) = sessions.get_mut(session_id) {
            session.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_fresh_session_once() {
        let manager = SessionManager::new(5);
        let session = manager.get_or_create("s1");
        assert!(session.active_skills.is_empty());
    }

    #[test]
    fn touch_skill_persists_across_lookups() {
        let manager = SessionManager::new(5);
        manager.touch_skill("s1", "git");
        let session = manager.get_or_create("s1");
        assert_eq!(session.active_skills, vec!["git".to_string()]);
    }

    #[test]
    fn reset_clears_active_skills() {
        let manager = SessionManager::new(5);
        manager.touch_skill("s1", "git");
        manager.reset("s1");
        let session = manager.get_or_create("s1");
        assert!(session.active_skills.is_empty());
    }
}
