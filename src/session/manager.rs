//! Session Coordinator
//!
//! Stateless coordination of sessions and their members over an injected
//! entity store. Consistency guarantees:
//! - Session and owner are created in one all-or-nothing transaction
//! - Owner-only operations go through the `is_owner` gate before any write
//! - Join is check-then-act and the delete cascade is best-effort; neither
//!   is atomic, see [`StaleJoinPolicy`] for the join race

use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::events::{SessionEvent, SessionEventEmitter, TimedEvent};
use super::state::{
    DeleteReport, Member, Outcome, Session, SessionPhase, SkippedItem, StoredEntity,
    MEMBER_SESSION_INDEX, STARTED_FIELD,
};
use crate::config::{LobbyConfig, StaleJoinPolicy};
use crate::error::{CoordinatorError, CoordinatorResult, StoreContext};
use crate::store::{EntityStore, FieldUpdate, PutItem, Record, StoreError};

/// Session Coordinator - every session/member operation goes through here
pub struct SessionCoordinator {
    /// Shared store client
    store: Arc<dyn EntityStore>,
    /// Session collection name
    sessions: String,
    /// Member collection name
    members: String,
    stale_join: StaleJoinPolicy,
    events: SessionEventEmitter,
}

impl SessionCoordinator {
    /// Create a coordinator over an already constructed store
    pub fn new(store: Arc<dyn EntityStore>, config: LobbyConfig) -> Self {
        info!(
            "Session coordinator using {} store (sessions={}, members={}, stale join={:?})",
            store.backend_name(),
            config.sessions_table,
            config.members_table,
            config.stale_join
        );
        Self {
            store,
            sessions: config.sessions_table,
            members: config.members_table,
            stale_join: config.stale_join,
            events: SessionEventEmitter::default(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.events.subscribe()
    }

    /// Create a session together with its owning member
    pub async fn create_session_and_owner(
        &self,
        session_id: &str,
        name: &str,
        owner_id: &str,
        owner_name: &str,
    ) -> CoordinatorResult<Session> {
        let session = Session::new(session_id, name, owner_id);
        let owner = Member::new(owner_id, owner_name, session_id);

        let puts = vec![
            PutItem::new(&self.sessions, session.key(), encode(&session, "encode session")?),
            PutItem::new(&self.members, owner.key(), encode(&owner, "encode owner")?),
        ];

        self.store
            .transact_write(puts)
            .await
            .context(format!("create session {}", session_id))?;

        info!("Created session {} owned by {}", session_id, owner_id);
        self.events.emit(SessionEvent::Created {
            session_id: session_id.to_string(),
            owner_id: owner_id.to_string(),
        });
        Ok(session)
    }

    /// First half of a join: the session must exist
    pub async fn join_session(&self, session_id: &str, member_id: &str) -> CoordinatorResult<Session> {
        let session = self.load_session(session_id).await?;
        debug!("Member {} may join session {}", member_id, session_id);
        Ok(session)
    }

    /// Second half of a join: write the member if the id is free
    pub async fn add_member(
        &self,
        session_id: &str,
        member_id: &str,
        display_name: &str,
    ) -> CoordinatorResult<Member> {
        let member = Member::new(member_id, display_name, session_id);
        let record = encode(&member, "encode member")?;

        self.store
            .put_if_absent(&self.members, member_id, record)
            .await
            .context(format!("add member {}", member_id))?;

        debug!("Wrote member {} for session {}", member_id, session_id);
        Ok(member)
    }

    /// Join a session: existence check, then conditional member write
    ///
    /// The two steps are not atomic. A session deleted in between leaves an
    /// orphaned member under [`StaleJoinPolicy::Tolerate`]; under
    /// [`StaleJoinPolicy::Reject`] the member is deleted again and the join
    /// fails with `NotFound`.
    pub async fn join(
        &self,
        session_id: &str,
        member_id: &str,
        display_name: &str,
    ) -> CoordinatorResult<Member> {
        self.join_session(session_id, member_id).await?;
        let member = self.add_member(session_id, member_id, display_name).await?;

        if self.stale_join == StaleJoinPolicy::Reject && !self.session_exists(session_id).await? {
            warn!(
                "Session {} vanished while {} was joining, undoing join",
                session_id, member_id
            );
            self.store
                .delete(&self.members, member_id)
                .await
                .context(format!("undo stale join of {}", member_id))?;
            return Err(CoordinatorError::NotFound(session_id.to_string()));
        }

        info!("Member {} joined session {}", member_id, session_id);
        self.events.emit(SessionEvent::MemberJoined {
            session_id: session_id.to_string(),
            member_id: member_id.to_string(),
        });
        Ok(member)
    }

    /// Whether `member_id` owns the session
    pub async fn is_owner(&self, session_id: &str, member_id: &str) -> CoordinatorResult<bool> {
        let session = self.load_session(session_id).await?;
        Ok(session.is_owned_by(member_id))
    }

    /// Delete a session and cascade to its members
    ///
    /// The session delete is not rolled back if member deletes fail; those
    /// members are reported in the outcome's `skipped` list.
    pub async fn delete_session(
        &self,
        session_id: &str,
        requester_id: &str,
    ) -> CoordinatorResult<DeleteReport> {
        self.authorize(session_id, requester_id, "delete this session")
            .await?;

        self.store
            .delete(&self.sessions, session_id)
            .await
            .context(format!("delete session {}", session_id))?;
        info!("Deleted session {}", session_id);

        let records = self
            .store
            .query_by_index(&self.members, MEMBER_SESSION_INDEX, session_id)
            .await
            .context(format!("query members of session {}", session_id))?;

        let mut report = Outcome::new(Vec::with_capacity(records.len()));
        for record in records {
            let member = match Member::from_record(record.clone()) {
                Ok(member) => member,
                Err(e) => {
                    warn!("Failed to decode member of session {}: {}", session_id, e);
                    report.skip(SkippedItem::malformed(&record, &e));
                    continue;
                }
            };

            match self.store.delete(&self.members, &member.member_id).await {
                Ok(()) => {
                    info!("Deleted member {}", member.member_id);
                    report.value.push(member.member_id);
                }
                Err(e) => {
                    warn!("Failed to delete member {}: {}", member.member_id, e);
                    report.skip(SkippedItem::delete_failed(member.member_id, e));
                }
            }
        }

        self.events.emit(SessionEvent::Deleted {
            session_id: session_id.to_string(),
            members_deleted: report.value.len(),
            skipped: report.skipped.len(),
        });
        Ok(report)
    }

    /// Owner removes a member. Removing an absent member succeeds.
    pub async fn remove_member(
        &self,
        session_id: &str,
        requester_id: &str,
        target_member_id: &str,
    ) -> CoordinatorResult<()> {
        self.authorize(session_id, requester_id, "remove a member")
            .await?;

        self.store
            .delete(&self.members, target_member_id)
            .await
            .context(format!("remove member {}", target_member_id))?;

        info!("Removed member {} from session {}", target_member_id, session_id);
        self.events.emit(SessionEvent::MemberRemoved {
            session_id: session_id.to_string(),
            member_id: target_member_id.to_string(),
        });
        Ok(())
    }

    pub async fn start_session(&self, session_id: &str, requester_id: &str) -> CoordinatorResult<()> {
        self.authorize(session_id, requester_id, "start this session")
            .await?;
        self.set_started(session_id, true).await?;

        self.events.emit(SessionEvent::Started {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    pub async fn end_session(&self, session_id: &str, requester_id: &str) -> CoordinatorResult<()> {
        self.authorize(session_id, requester_id, "end this session")
            .await?;
        self.set_started(session_id, false).await?;

        self.events.emit(SessionEvent::Ended {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    /// Members of a session, owner only. Undecodable records are skipped.
    pub async fn list_members(
        &self,
        session_id: &str,
        requester_id: &str,
    ) -> CoordinatorResult<Outcome<Vec<Member>>> {
        self.authorize(session_id, requester_id, "list members")
            .await?;

        let records = self
            .store
            .query_by_index(&self.members, MEMBER_SESSION_INDEX, session_id)
            .await
            .context(format!("query members of session {}", session_id))?;

        let mut outcome = Outcome::new(Vec::with_capacity(records.len()));
        for record in records {
            match Member::from_record(record.clone()) {
                Ok(member) => outcome.value.push(member),
                Err(e) => {
                    warn!("Failed to decode member of session {}: {}", session_id, e);
                    outcome.skip(SkippedItem::malformed(&record, &e));
                }
            }
        }
        Ok(outcome)
    }

    /// A member removes themselves. No ownership or existence check.
    pub async fn leave_session(&self, session_id: &str, member_id: &str) -> CoordinatorResult<()> {
        self.store
            .delete(&self.members, member_id)
            .await
            .context(format!("remove member {}", member_id))?;

        info!("Member {} left session {}", member_id, session_id);
        self.events.emit(SessionEvent::MemberLeft {
            session_id: session_id.to_string(),
            member_id: member_id.to_string(),
        });
        Ok(())
    }

    /// Whether the session has been started
    pub async fn session_started(&self, session_id: &str) -> CoordinatorResult<bool> {
        Ok(self.load_session(session_id).await?.started)
    }

    /// Read a session, `NotFound` if absent
    pub async fn load_session(&self, session_id: &str) -> CoordinatorResult<Session> {
        let record = self
            .store
            .get(&self.sessions, session_id)
            .await
            .context(format!("get session {}", session_id))?
            .ok_or_else(|| CoordinatorError::NotFound(session_id.to_string()))?;

        Session::from_record(record)
            .map_err(|e| CoordinatorError::from_store(format!("decode session {}", session_id), e.into()))
    }

    async fn session_exists(&self, session_id: &str) -> CoordinatorResult<bool> {
        Ok(self
            .store
            .get(&self.sessions, session_id)
            .await
            .context(format!("get session {}", session_id))?
            .is_some())
    }

    /// Ownership gate shared by every owner-only operation
    async fn authorize(
        &self,
        session_id: &str,
        requester_id: &str,
        action: &'static str,
    ) -> CoordinatorResult<()> {
        if self.is_owner(session_id, requester_id).await? {
            return Ok(());
        }

        warn!(
            "Member {} tried to {} in session {} without owning it",
            requester_id, action, session_id
        );
        Err(CoordinatorError::Unauthorized {
            session_id: session_id.to_string(),
            requester_id: requester_id.to_string(),
            action,
        })
    }

    async fn set_started(&self, session_id: &str, started: bool) -> CoordinatorResult<()> {
        self.store
            .update(
                &self.sessions,
                session_id,
                &[FieldUpdate::set(STARTED_FIELD, Value::Bool(started))],
            )
            .await
            .context(format!("update state of session {}", session_id))?;

        info!("Session {} is now {}", session_id, SessionPhase::from(started));
        Ok(())
    }
}

fn encode<T: StoredEntity>(entity: &T, context: &str) -> CoordinatorResult<Record> {
    entity
        .to_record()
        .map_err(|e| CoordinatorError::from_store(context, StoreError::from(e)))
}
