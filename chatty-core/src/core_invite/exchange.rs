//! Invite exchange
//!
//! Drives the asymmetric join handshake over the bulletin board:
//!
//! 1. A member issues a code: `invites/{code} -> { groupId }` (`Issued`).
//! 2. A joiner validates the code, takes the invite record (first take wins),
//!    stores an ephemeral keypair as a pending invite, publishes the public
//!    key as a join request and starts observing `encryptedKeys/{code}`
//!    (`Pending`).
//! 3. A member answers with the group key wrapped for that public key, or
//!    with a rejection marker.
//! 4. The joiner resolves the response, stores the group and drops the
//!    pending invite and its observation (`Consumed` or `Rejected`).
//!
//! Vault mutations happen only through a `&mut VaultSession` supplied by the
//! caller, one at a time.

use super::code::InviteCode;
use super::errors::{InviteError, InviteResult};
use super::resolution::{resolve, Resolution};
use super::state::InviteState;
use crate::config::InviteConfig;
use crate::core_board::records::{
    encrypted_keys_path, from_value, invite_path, join_requests_path, to_value,
    ChannelRecord, InviteRecord, JoinRequest, KeyResponse,
};
use crate::core_board::{BoardEvent, BoardError, BulletinBoard, Subscription};
use crate::core_crypto::{wrap_group_key, InviteKeyPair, RandomSource, WrapPublicKey};
use crate::core_session::Session;
use crate::core_vault::{GroupId, PendingInvite, PendingStore, VaultSession};
use crate::metrics::{self, OutcomeLabel};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A join request read from a group's request channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    /// Board key of the request record
    pub request_id: String,
    pub group_id: GroupId,
    pub code: InviteCode,
    pub public_key: WrapPublicKey,
}

impl IncomingRequest {
    pub fn from_entry(group_id: &GroupId, request_id: &str, value: Value) -> InviteResult<Self> {
        let path = format!("{}/{}", join_requests_path(group_id), request_id);
        let record: ChannelRecord = from_value(&path, value)?;
        Self::from_record(group_id, request_id, &record)
    }

    /// Decode a channel record carrying the request sentinel
    pub fn from_record(group_id: &GroupId, request_id: &str, record: &ChannelRecord) -> InviteResult<Self> {
        let request = JoinRequest::from_record(record).map_err(InviteError::MalformedRequest)?;
        let code = InviteCode::parse(&request.invite_code)
            .map_err(|e| InviteError::MalformedRequest(e.to_string()))?;
        Ok(Self {
            request_id: request_id.to_string(),
            group_id: group_id.clone(),
            code,
            public_key: request.public_key,
        })
    }

    /// Decode a board event from a request channel subscription
    ///
    /// Removals and events outside `joinRequests/{group}/{id}` yield `None`.
    pub fn from_event(event: &BoardEvent) -> Option<InviteResult<Self>> {
        let value = event.value.clone()?;
        let mut parts = event.path.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("joinRequests"), Some(group), Some(id), None) => {
                Some(Self::from_entry(&GroupId::new(group), id, value))
            }
            _ => None,
        }
    }
}

/// A member's answer to a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Final, user-facing result of a join request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined { group_id: GroupId, group_name: String },
    Denied { group_id: GroupId, group_name: String },
}

/// Codes in a terminal state kept for `state` lookups before being forgotten
const RETIRED_CODE_LIMIT: usize = 256;

pub struct InviteExchange {
    board: Arc<dyn BulletinBoard>,
    pending: PendingStore,
    random: RandomSource,
    config: InviteConfig,
    states: RwLock<HashMap<InviteCode, InviteState>>,
    issued: RwLock<HashMap<InviteCode, GroupId>>,
    responded: Mutex<HashSet<InviteCode>>,
    watches: Mutex<HashMap<InviteCode, Subscription>>,
    retired: Mutex<VecDeque<InviteCode>>,
}

impl InviteExchange {
    pub fn new(
        board: Arc<dyn BulletinBoard>,
        pending: PendingStore,
        random: RandomSource,
        config: InviteConfig,
    ) -> Self {
        Self {
            board,
            pending,
            random,
            config,
            states: RwLock::new(HashMap::new()),
            issued: RwLock::new(HashMap::new()),
            responded: Mutex::new(HashSet::new()),
            watches: Mutex::new(HashMap::new()),
            retired: Mutex::new(VecDeque::new()),
        }
    }

    /// Local view of a code's state, if this device has touched it
    pub async fn state(&self, code: &InviteCode) -> Option<InviteState> {
        self.states.read().await.get(code).copied()
    }

    async fn transition(&self, code: &InviteCode, next: InviteState) -> bool {
        let mut states = self.states.write().await;
        match states.get(code).copied() {
            Some(current) if !current.can_transition_to(next) => {
                debug!(code = %code, ?current, ?next, "Skipping invite transition");
                false
            }
            _ => {
                states.insert(code.clone(), next);
                true
            }
        }
    }

    /// Forget a finished code, keeping only the most recent terminal states
    async fn retire(&self, code: &InviteCode) {
        self.issued.write().await.remove(code);
        let mut retired = self.retired.lock().await;
        if retired.contains(code) {
            return;
        }
        retired.push_back(code.clone());
        while retired.len() > RETIRED_CODE_LIMIT {
            if let Some(oldest) = retired.pop_front() {
                self.states.write().await.remove(&oldest);
                self.responded.lock().await.remove(&oldest);
            }
        }
    }

    /// Publish a fresh code for the selected group
    pub async fn issue_code(&self, session: &Session, vault: &VaultSession) -> InviteResult<InviteCode> {
        let group_id = session.selected_group().ok_or(InviteError::NoGroupSelected)?;
        if vault.group(group_id)?.is_none() {
            return Err(InviteError::UnknownGroup(group_id.clone()));
        }

        let record = InviteRecord { group_id: group_id.clone() };
        for attempt in 1..=self.config.max_issue_attempts {
            let code = InviteCode::generate(&self.random)?;
            let path = invite_path(code.as_str());
            if self.board.insert_new(&path, to_value(&path, &record)?).await? {
                self.issued.write().await.insert(code.clone(), group_id.clone());
                self.states.write().await.insert(code.clone(), InviteState::Issued);
                metrics::record_invite_issued();
                info!(group_id = %group_id, code = %code, "Invite code issued");
                return Ok(code);
            }
            debug!(attempt, "Invite code already live, drawing another");
        }
        Err(InviteError::CodeSpaceExhausted { attempts: self.config.max_issue_attempts })
    }

    /// Ask to join the group behind `input`
    ///
    /// The code format is checked before any board access. The invite record
    /// is consumed here; a joiner who loses the race gets `InviteNotFound`.
    pub async fn request_join(&self, vault: &VaultSession, input: &str) -> InviteResult<InviteCode> {
        let code = InviteCode::parse(input)?;
        let path = invite_path(code.as_str());

        let value = self
            .board
            .get(&path)
            .await?
            .ok_or_else(|| InviteError::InviteNotFound(code.to_string()))?;
        let invite: InviteRecord = from_value(&path, value)?;
        if vault.vault()?.contains(&invite.group_id) {
            return Err(InviteError::AlreadyMember(invite.group_id));
        }

        let keypair = InviteKeyPair::generate(&self.random)?;
        let taken = match self.board.take(&path).await? {
            Some(taken) => taken,
            None => {
                debug!(code = %code, "Invite taken by another joiner");
                return Err(InviteError::InviteNotFound(code.to_string()));
            }
        };

        let invite: InviteRecord = match from_value(&path, taken.clone()) {
            Ok(invite) => invite,
            Err(e) => {
                self.restore_invite(&code, taken).await;
                return Err(e.into());
            }
        };
        if let Err(e) = self.enlist(&code, &invite.group_id, &keypair).await {
            self.withdraw(&code).await;
            self.restore_invite(&code, taken).await;
            return Err(e);
        }

        metrics::record_join_request();
        info!(code = %code, group_id = %invite.group_id, "Join requested");
        Ok(code)
    }

    /// Persist the keypair, observe the response path and publish the request
    async fn enlist(
        &self,
        code: &InviteCode,
        group_id: &GroupId,
        keypair: &InviteKeyPair,
    ) -> InviteResult<()> {
        self.pending
            .insert(PendingInvite::new(code.as_str(), group_id.clone(), keypair))?;
        self.states.write().await.insert(code.clone(), InviteState::Pending);

        let subscription = self.board.subscribe(&encrypted_keys_path(code.as_str())).await?;
        self.watches.lock().await.insert(code.clone(), subscription);

        let request = JoinRequest {
            public_key: keypair.public_key(),
            invite_code: code.to_string(),
        };
        let channel = join_requests_path(group_id);
        self.board.push(&channel, to_value(&channel, &request.to_record())?).await?;
        Ok(())
    }

    /// Undo a partial `enlist`
    async fn withdraw(&self, code: &InviteCode) {
        if let Err(e) = self.pending.remove(code.as_str()) {
            warn!(code = %code, error = %e, "Could not drop pending invite");
        }
        let watch = self.watches.lock().await.remove(code);
        if let Some(subscription) = watch {
            self.release(subscription).await;
        }
        self.states.write().await.remove(code);
    }

    /// Put a taken invite record back after a failed join
    async fn restore_invite(&self, code: &InviteCode, record: Value) {
        match self.board.insert_new(&invite_path(code.as_str()), record).await {
            Ok(true) => debug!(code = %code, "Invite record restored"),
            Ok(false) => warn!(code = %code, "Invite path reused before restore"),
            Err(e) => warn!(code = %code, error = %e, "Could not restore invite record"),
        }
    }

    /// Record that a request for `code` reached the publisher
    async fn note_request_seen(&self, code: &InviteCode) {
        if !self.issued.read().await.contains_key(code) {
            return;
        }
        if self.state(code).await == Some(InviteState::Issued)
            && self.transition(code, InviteState::Consumed).await
        {
            if let Err(e) = self.board.remove(&invite_path(code.as_str())).await {
                warn!(code = %code, error = %e, "Could not remove consumed invite");
            }
            info!(code = %code, "Invite code consumed");
            self.retire(code).await;
        }
    }

    /// Join requests currently waiting in `group_id`'s channel
    ///
    /// Malformed records are skipped with a warning.
    pub async fn incoming_requests(&self, group_id: &GroupId) -> InviteResult<Vec<IncomingRequest>> {
        let entries = self.board.list(&join_requests_path(group_id)).await?;
        let mut requests = Vec::with_capacity(entries.len());
        for (id, value) in entries {
            match IncomingRequest::from_entry(group_id, &id, value) {
                Ok(request) => {
                    self.note_request_seen(&request.code).await;
                    requests.push(request);
                }
                Err(e) => warn!(group_id = %group_id, request_id = %id, error = %e, "Skipping join request"),
            }
        }
        Ok(requests)
    }

    /// Live observation of `group_id`'s request channel
    pub async fn observe_requests(&self, group_id: &GroupId) -> InviteResult<Subscription> {
        Ok(self.board.subscribe(&join_requests_path(group_id)).await?)
    }

    /// Decode a request channel event, marking its code as consumed
    pub async fn incoming_from_event(&self, event: &BoardEvent) -> Option<InviteResult<IncomingRequest>> {
        let parsed = IncomingRequest::from_event(event)?;
        if let Ok(request) = &parsed {
            self.note_request_seen(&request.code).await;
        }
        Some(parsed)
    }

    /// Answer a join request. Either decision is final for that request.
    pub async fn respond(
        &self,
        vault: &VaultSession,
        incoming: &IncomingRequest,
        decision: Decision,
    ) -> InviteResult<()> {
        let code = &incoming.code;
        if self.responded.lock().await.contains(code) {
            return Err(InviteError::AlreadyResponded(code.to_string()));
        }
        let group = vault
            .group(&incoming.group_id)?
            .ok_or_else(|| InviteError::UnknownGroup(incoming.group_id.clone()))?;

        let response = match decision {
            Decision::Accept => KeyResponse::Accepted {
                wrapped: wrap_group_key(
                    &incoming.public_key,
                    &group.symmetric_key,
                    &group.iv,
                    code.as_str().as_bytes(),
                    &self.random,
                )?,
                group_name: group.display_name.clone(),
                group_id: group.group_id.clone(),
            },
            Decision::Reject => KeyResponse::Rejected {
                group_name: group.display_name.clone(),
                group_id: group.group_id.clone(),
            },
        };

        let path = encrypted_keys_path(code.as_str());
        if !self.board.insert_new(&path, to_value(&path, &response.to_record())?).await? {
            return Err(InviteError::AlreadyResponded(code.to_string()));
        }
        self.responded.lock().await.insert(code.clone());
        self.note_request_seen(code).await;
        self.retire(code).await;

        let request_path = format!("{}/{}", join_requests_path(&incoming.group_id), incoming.request_id);
        if let Err(e) = self.board.remove(&request_path).await {
            warn!(code = %code, error = %e, "Could not remove answered join request");
        }

        info!(code = %code, group_id = %incoming.group_id, ?decision, "Join request answered");
        Ok(())
    }

    async fn handle_event(
        &self,
        vault: &mut VaultSession,
        code: &InviteCode,
        event: &BoardEvent,
    ) -> InviteResult<Option<JoinOutcome>> {
        let pending = self.pending.get(code.as_str())?;
        let resolution = resolve(pending.as_ref(), &event.path, event.value.as_ref())?;
        self.apply(vault, code, resolution).await
    }

    async fn apply(
        &self,
        vault: &mut VaultSession,
        code: &InviteCode,
        resolution: Resolution,
    ) -> InviteResult<Option<JoinOutcome>> {
        match resolution {
            Resolution::Ignore => Ok(None),
            Resolution::Accept(record) => {
                let outcome = JoinOutcome::Joined {
                    group_id: record.group_id.clone(),
                    group_name: record.display_name.clone(),
                };
                vault.upsert(record)?;
                self.transition(code, InviteState::Accepted).await;
                self.finish(code).await?;
                self.transition(code, InviteState::Consumed).await;
                self.retire(code).await;
                metrics::record_join_resolved(OutcomeLabel::Accepted);
                info!(code = %code, "Join accepted, group stored");
                Ok(Some(outcome))
            }
            Resolution::Reject { group_id, group_name } => {
                self.transition(code, InviteState::Rejected).await;
                self.finish(code).await?;
                self.retire(code).await;
                metrics::record_join_resolved(OutcomeLabel::Rejected);
                info!(code = %code, group_id = %group_id, "Join rejected");
                Ok(Some(JoinOutcome::Denied { group_id, group_name }))
            }
        }
    }

    /// Drop the pending entry, its observation and the consumed response
    async fn finish(&self, code: &InviteCode) -> InviteResult<()> {
        self.pending.remove(code.as_str())?;
        let watch = self.watches.lock().await.remove(code);
        if let Some(subscription) = watch {
            self.release(subscription).await;
        }
        if let Err(e) = self.board.remove(&encrypted_keys_path(code.as_str())).await {
            warn!(code = %code, error = %e, "Could not remove resolved response");
        }
        Ok(())
    }

    /// Replace `code`'s observation so the stored response is delivered again
    ///
    /// Used after a response failed to resolve: the consumed event is gone
    /// from the old subscription, while a fresh one starts with a snapshot.
    async fn rewatch(&self, code: &InviteCode) {
        match self.pending.get(code.as_str()) {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => warn!(code = %code, error = %e, "Could not read pending invite"),
        }
        let old = self.watches.lock().await.remove(code);
        if let Some(subscription) = old {
            self.release(subscription).await;
        }
        match self.board.subscribe(&encrypted_keys_path(code.as_str())).await {
            Ok(subscription) => {
                self.watches.lock().await.insert(code.clone(), subscription);
            }
            // resume() picks the code up again once the board is back
            Err(e) => warn!(code = %code, error = %e, "Could not re-observe join response"),
        }
    }

    async fn release(&self, subscription: Subscription) {
        if let Err(e) = self.board.unsubscribe(subscription.id).await {
            warn!(path = %subscription.path, error = %e, "Unsubscribe failed");
        }
    }

    /// Resolve every response already delivered, without waiting
    ///
    /// Each code's result is reported separately so one failure does not
    /// hide the others. Codes with nothing new are omitted.
    pub async fn poll_responses(
        &self,
        vault: &mut VaultSession,
    ) -> Vec<(InviteCode, InviteResult<JoinOutcome>)> {
        let drained: Vec<(InviteCode, BoardEvent)> = {
            let mut watches = self.watches.lock().await;
            let mut drained = Vec::new();
            for (code, subscription) in watches.iter_mut() {
                while let Some(event) = subscription.try_recv() {
                    drained.push((code.clone(), event));
                }
            }
            drained
        };

        let mut results = Vec::new();
        for (code, event) in drained {
            match self.handle_event(vault, &code, &event).await {
                Ok(Some(outcome)) => results.push((code, Ok(outcome))),
                Ok(None) => {}
                Err(e) => {
                    warn!(code = %code, error = %e, "Join response could not be resolved");
                    self.rewatch(&code).await;
                    results.push((code, Err(e)));
                }
            }
        }
        results
    }

    /// Wait until the response for `code` arrives and resolve it
    pub async fn wait_for_response(
        &self,
        vault: &mut VaultSession,
        code: &InviteCode,
    ) -> InviteResult<JoinOutcome> {
        let mut subscription = self
            .watches
            .lock()
            .await
            .remove(code)
            .ok_or_else(|| InviteError::NotPending(code.to_string()))?;

        loop {
            let event = match subscription.recv().await {
                Some(event) => event,
                None => {
                    return Err(InviteError::Board(BoardError::Unavailable(format!(
                        "observation of {} closed",
                        subscription.path
                    ))))
                }
            };
            match self.handle_event(vault, code, &event).await {
                Ok(Some(outcome)) => {
                    self.release(subscription).await;
                    return Ok(outcome);
                }
                Ok(None) => {
                    if self.pending.get(code.as_str())?.is_none() {
                        self.release(subscription).await;
                        return Err(InviteError::NotPending(code.to_string()));
                    }
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "Join response could not be resolved");
                    self.release(subscription).await;
                    self.rewatch(code).await;
                    return Err(e);
                }
            }
        }
    }

    /// Give up on a pending invite
    pub async fn abandon(&self, input: &str) -> InviteResult<()> {
        let code = InviteCode::parse(input)?;
        if !self.pending.remove(code.as_str())? {
            return Err(InviteError::NotPending(code.to_string()));
        }
        let watch = self.watches.lock().await.remove(&code);
        if let Some(subscription) = watch {
            self.release(subscription).await;
        }
        self.states.write().await.remove(&code);
        info!(code = %code, "Pending invite abandoned");
        Ok(())
    }

    /// Re-observe every persisted pending invite, e.g. after a restart
    ///
    /// Returns how many observations were started.
    pub async fn resume(&self) -> InviteResult<usize> {
        let mut resumed = 0;
        for (stored_code, _) in self.pending.load_all()? {
            let code = match InviteCode::parse(&stored_code) {
                Ok(code) => code,
                Err(e) => {
                    warn!(code = %stored_code, error = %e, "Skipping unreadable pending invite");
                    continue;
                }
            };
            if self.watches.lock().await.contains_key(&code) {
                continue;
            }
            let subscription = self.board.subscribe(&encrypted_keys_path(code.as_str())).await?;
            self.watches.lock().await.insert(code.clone(), subscription);
            self.states.write().await.insert(code.clone(), InviteState::Pending);
            debug!(code = %code, "Resumed pending invite");
            resumed += 1;
        }
        if resumed > 0 {
            info!(resumed, "Pending invites resumed");
        }
        Ok(resumed)
    }

    /// Codes with a join request still awaiting a response
    pub async fn pending_codes(&self) -> InviteResult<Vec<InviteCode>> {
        Ok(self
            .pending
            .load_all()?
            .keys()
            .filter_map(|code| InviteCode::parse(code).ok())
            .collect())
    }

    /// Number of live response observations
    pub async fn watch_count(&self) -> usize {
        self.watches.lock().await.len()
    }
}
