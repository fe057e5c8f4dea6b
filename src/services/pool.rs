// src/services/pool.rs

//! Round-robin session pool.
//!
//! Owns every configured credential and hands out the next usable session
//! before each outbound call. All counter mutation happens here so each call
//! is attributed to exactly one session.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Credential, Session, SessionKey};
use crate::services::accounting::{CallKind, CallTally};

/// The session selected for the next outbound call.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    index: usize,
    pub key: SessionKey,
    pub credential: Credential,
}

/// Rotates credentials round-robin and records per-session usage.
#[derive(Debug)]
pub struct SessionPool {
    sessions: Vec<Session>,
    cursor: usize,
    tally: Arc<CallTally>,
}

impl SessionPool {
    /// Build a pool from an ordered credential list.
    ///
    /// Fails if the list is empty or any credential is missing a token.
    pub fn new(
        credentials: &[Credential],
        proxy: Option<String>,
        tally: Arc<CallTally>,
    ) -> Result<Self> {
        if credentials.is_empty() {
            return Err(AppError::config("Session pool needs at least one credential"));
        }

        let mut sessions = Vec::with_capacity(credentials.len());
        for (i, credential) in credentials.iter().enumerate() {
            if !credential.is_complete() {
                return Err(AppError::config(format!(
                    "Missing tokens for credential {}",
                    i + 1
                )));
            }
            let session = Session::new(i, credential.clone(), proxy.clone());
            tally.register(&session.key);
            sessions.push(session);
        }

        Ok(Self {
            sessions,
            cursor: 0,
            tally,
        })
    }

    /// Select the next usable session in round-robin order.
    ///
    /// Rejected sessions are skipped; when none is left the pool fails with
    /// an authentication error.
    pub fn next(&mut self) -> Result<ActiveSession> {
        let count = self.sessions.len();
        for _ in 0..count {
            let index = self.cursor;
            self.cursor = (self.cursor + 1) % count;

            let session = &self.sessions[index];
            if session.rejected {
                continue;
            }
            return Ok(ActiveSession {
                index,
                key: session.key.clone(),
                credential: session.credential.clone(),
            });
        }

        Err(AppError::authentication(
            "pool",
            "every session has been rejected",
        ))
    }

    /// Attribute one outbound call to `session`.
    pub fn record(&mut self, session: &ActiveSession, kind: CallKind) {
        if let Some(entry) = self.sessions.get_mut(session.index) {
            entry.calls += 1;
            log::debug!(
                "{:?} call #{} on session {}{}",
                kind,
                entry.calls,
                entry.key,
                entry
                    .proxy
                    .as_deref()
                    .map(|p| format!(" via {p}"))
                    .unwrap_or_default()
            );
        }
        self.tally.bump(kind);
        self.tally.bump_account(&session.key);
    }

    /// Take a session out of rotation after the platform refused it.
    pub fn reject(&mut self, session: &ActiveSession, reason: &str) {
        if let Some(entry) = self.sessions.get_mut(session.index) {
            if !entry.rejected {
                log::warn!("Session {} rejected, rotating past it: {}", entry.key, reason);
            }
            entry.rejected = true;
        }
        self.tally.flag_account(&session.key);
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions still in rotation.
    pub fn usable(&self) -> usize {
        self.sessions.iter().filter(|s| !s.rejected).count()
    }

    pub fn tally(&self) -> &Arc<CallTally> {
        &self.tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(n: usize) -> Vec<Credential> {
        (0..n)
            .map(|i| Credential::new(format!("auth-{i}"), format!("csrf-{i}")))
            .collect()
    }

    fn pool(n: usize) -> SessionPool {
        SessionPool::new(&credentials(n), None, Arc::new(CallTally::new())).unwrap()
    }

    #[test]
    fn test_rejects_empty_list() {
        let err = SessionPool::new(&[], None, Arc::new(CallTally::new())).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_rejects_missing_token() {
        let mut creds = credentials(2);
        creds[1].csrf_token.clear();
        let err = SessionPool::new(&creds, None, Arc::new(CallTally::new())).unwrap_err();
        assert!(err.to_string().contains("credential 2"));
    }

    #[test]
    fn test_round_robin_order() {
        let mut pool = pool(3);
        let order: Vec<_> = (0..6)
            .map(|_| pool.next().unwrap().credential.auth_token)
            .collect();
        assert_eq!(
            order,
            vec!["auth-0", "auth-1", "auth-2", "auth-0", "auth-1", "auth-2"]
        );
    }

    #[test]
    fn test_rotation_fairness() {
        for sessions in 1..=4 {
            for calls in sessions..=17 {
                let mut pool = pool(sessions);
                for i in 0..calls {
                    let active = pool.next().unwrap();
                    let kind = if i % 3 == 0 {
                        CallKind::ThreadDetail
                    } else {
                        CallKind::Timeline
                    };
                    pool.record(&active, kind);
                }

                let counts: Vec<u64> = pool.sessions().iter().map(|s| s.calls).collect();
                let max = counts.iter().max().unwrap();
                let min = counts.iter().min().unwrap();
                assert!(max - min <= 1, "unfair rotation: {counts:?}");

                let tally = pool.tally();
                let per_session: u64 = tally.account_calls().iter().map(|(_, c)| c).sum();
                assert_eq!(per_session, tally.total_calls());
                assert_eq!(tally.total_calls(), calls as u64);
            }
        }
    }

    #[test]
    fn test_rejected_sessions_are_skipped() {
        let mut pool = pool(3);
        let first = pool.next().unwrap();
        pool.reject(&first, "401");

        let order: Vec<_> = (0..4)
            .map(|_| pool.next().unwrap().credential.auth_token)
            .collect();
        assert_eq!(order, vec!["auth-1", "auth-2", "auth-1", "auth-2"]);
        assert_eq!(pool.usable(), 2);
        assert_eq!(pool.tally().rejected_accounts(), vec![first.key]);
    }

    #[test]
    fn test_all_rejected_fails() {
        let mut pool = pool(2);
        for _ in 0..2 {
            let active = pool.next().unwrap();
            pool.reject(&active, "403");
        }
        assert!(pool.next().unwrap_err().is_authentication());
    }
}
