//! Client-side access to the session authority.
//!
//! The sync client talks to the authority only through [`SessionTransport`].
//! [`HttpSessionTransport`](super::HttpSessionTransport) reaches a remote
//! server; [`InProcessTransport`] calls a registry in the same process.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TandemResult;
use crate::services::SessionRegistry;
use crate::session::{CommandRequest, SessionSnapshot};

/// Operations a member performs against the session authority.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Returns the number of active sessions.
    async fn discover(&self) -> TandemResult<usize>;

    /// Creates a session hosted by `member_id`.
    async fn create(&self, member_id: &str) -> TandemResult<SessionSnapshot>;

    /// Joins an existing session.
    async fn join(&self, group_id: &str, member_id: &str) -> TandemResult<SessionSnapshot>;

    /// Leaves a session.
    async fn leave(&self, group_id: &str, member_id: &str) -> TandemResult<()>;

    /// Pulls the current snapshot; also refreshes the member's liveness.
    async fn fetch_snapshot(&self, group_id: &str, member_id: &str) -> TandemResult<SessionSnapshot>;

    /// Submits a command and returns the confirmed snapshot.
    async fn submit(&self, group_id: &str, request: &CommandRequest)
        -> TandemResult<SessionSnapshot>;
}

/// Transport backed by a registry in the same process.
#[derive(Clone)]
pub struct InProcessTransport {
    registry: Arc<SessionRegistry>,
}

impl InProcessTransport {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl SessionTransport for InProcessTransport {
    async fn discover(&self) -> TandemResult<usize> {
        Ok(self.registry.count())
    }

    async fn create(&self, member_id: &str) -> TandemResult<SessionSnapshot> {
        self.registry.create(member_id)
    }

    async fn join(&self, group_id: &str, member_id: &str) -> TandemResult<SessionSnapshot> {
        self.registry.join(group_id, member_id)
    }

    async fn leave(&self, group_id: &str, member_id: &str) -> TandemResult<()> {
        self.registry.leave(group_id, member_id)
    }

    async fn fetch_snapshot(&self, group_id: &str, member_id: &str) -> TandemResult<SessionSnapshot> {
        self.registry.snapshot(group_id, Some(member_id))
    }

    async fn submit(
        &self,
        group_id: &str,
        request: &CommandRequest,
    ) -> TandemResult<SessionSnapshot> {
        self.registry.apply_command(group_id, request)
    }
}
