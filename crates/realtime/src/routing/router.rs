//! Agent selection and chat-load accounting
//!
//! Agent profiles live at `agent:{id}` with a roster set per business; the
//! live chat count is a separate counter mutated only through atomic
//! increments, so two concurrent assignments can never double-claim a slot.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_shared::{
    AgentId, BusinessId, ConversationId, EphemeralStore, PresenceStatus, UserId,
};

use crate::collaborators::ConversationStore;
use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::presence::PresenceTracker;

/// Static agent configuration written at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub max_concurrent_chats: u32,
    pub skills: Vec<String>,
    pub average_response_time_ema_ms: u64,
    pub available: bool,
}

/// Profile plus the live chat count
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    #[serde(flatten)]
    pub profile: AgentProfile,
    pub active_chats: i64,
}

/// Conversation priority as reported by the intake surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// Whether this priority bypasses rotation and takes the least busy agent
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Urgent)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Routing hints accompanying an assignment request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub preferred_agent: Option<AgentId>,
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// How an assignment was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    Preferred,
    SkillMatch,
    LeastBusy,
    RoundRobin,
}

impl std::fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preferred => write!(f, "preferred"),
            Self::SkillMatch => write!(f, "skill_match"),
            Self::LeastBusy => write!(f, "least_busy"),
            Self::RoundRobin => write!(f, "round_robin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub agent_id: AgentId,
    pub method: AssignmentMethod,
}

/// Result of re-routing one conversation away from a departing agent
#[derive(Debug, Clone, Serialize)]
pub struct ReassignmentOutcome {
    pub conversation_id: ConversationId,
    pub assignment: Option<Assignment>,
}

pub struct AgentRouter {
    store: Arc<dyn EphemeralStore>,
    presence: Arc<PresenceTracker>,
    conversations: Arc<dyn ConversationStore>,
    counter_ttl: Duration,
}

fn agent_key(agent_id: AgentId) -> String {
    format!("agent:{agent_id}")
}

fn active_chats_key(agent_id: AgentId) -> String {
    format!("agent:{agent_id}:active_chats")
}

fn roster_key(business_id: BusinessId) -> String {
    format!("business:{business_id}:agents")
}

fn cursor_key(business_id: BusinessId) -> String {
    format!("business:{business_id}:round_robin_index")
}

impl AgentRouter {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        presence: Arc<PresenceTracker>,
        conversations: Arc<dyn ConversationStore>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            store,
            presence,
            conversations,
            counter_ttl: config.routing_counter_ttl,
        }
    }

    /// Write the agent's profile and add them to the business roster
    pub async fn register_agent(&self, business_id: BusinessId, profile: AgentProfile) {
        let agent_id = profile.agent_id;
        self.write_profile(&profile).await;
        if let Err(error) = self
            .store
            .set_add(&roster_key(business_id), &agent_id.to_string())
            .await
        {
            warn!(business_id = %business_id, agent_id = %agent_id, %error,
                "agent roster update failed");
        }
        info!(business_id = %business_id, agent_id = %agent_id, "agent registered");
    }

    /// Flip the explicit availability flag; unknown agents are ignored
    pub async fn set_agent_availability(&self, agent_id: AgentId, available: bool) {
        let Some(mut profile) = self.profile(agent_id).await else {
            warn!(agent_id = %agent_id, "availability change for unregistered agent ignored");
            return;
        };
        profile.available = available;
        self.write_profile(&profile).await;
        debug!(agent_id = %agent_id, available, "agent availability updated");
    }

    /// Fold one observed first-response time into the agent's moving average
    pub async fn record_response_time(&self, agent_id: AgentId, response_ms: u64) {
        let Some(mut profile) = self.profile(agent_id).await else {
            return;
        };
        profile.average_response_time_ema_ms = if profile.average_response_time_ema_ms == 0 {
            response_ms
        } else {
            (profile.average_response_time_ema_ms * 4 + response_ms) / 5
        };
        self.write_profile(&profile).await;
    }

    /// Remove the agent's profile, counter, and roster membership
    pub async fn deregister_agent(&self, business_id: BusinessId, agent_id: AgentId) {
        for key in [agent_key(agent_id), active_chats_key(agent_id)] {
            if let Err(error) = self.store.delete(&key).await {
                warn!(agent_id = %agent_id, key, %error, "agent cleanup failed");
            }
        }
        if let Err(error) = self
            .store
            .set_remove(&roster_key(business_id), &agent_id.to_string())
            .await
        {
            warn!(business_id = %business_id, agent_id = %agent_id, %error,
                "agent roster removal failed");
        }
        info!(business_id = %business_id, agent_id = %agent_id, "agent deregistered");
    }

    /// One agent's profile plus live chat count
    pub async fn agent_snapshot(&self, agent_id: AgentId) -> Option<AgentSnapshot> {
        let profile = self.profile(agent_id).await?;
        let active_chats = self.active_chats(agent_id).await;
        Some(AgentSnapshot {
            profile,
            active_chats,
        })
    }

    /// Every registered agent of the business, any state, ordered by id
    pub async fn agent_snapshots(&self, business_id: BusinessId) -> Vec<AgentSnapshot> {
        let members = match self.store.set_members(&roster_key(business_id)).await {
            Ok(members) => members,
            Err(error) => {
                warn!(business_id = %business_id, %error, "agent roster read failed");
                return Vec::new();
            }
        };
        let mut snapshots = Vec::with_capacity(members.len());
        for member in members {
            let Ok(id) = Uuid::parse_str(&member) else {
                warn!(business_id = %business_id, member, "unparseable roster entry skipped");
                continue;
            };
            if let Some(snapshot) = self.agent_snapshot(AgentId(id)).await {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|snapshot| snapshot.profile.agent_id);
        snapshots
    }

    /// Agents eligible for new conversations: flagged available, online, and
    /// under their concurrency cap; least busy first, ties by agent id
    pub async fn available_agents(&self, business_id: BusinessId) -> Vec<AgentSnapshot> {
        let snapshots = self.agent_snapshots(business_id).await;
        let users: Vec<UserId> = snapshots
            .iter()
            .map(|snapshot| snapshot.profile.agent_id.as_user())
            .collect();
        let presence = self.presence.get_bulk(&users).await;

        let mut available: Vec<AgentSnapshot> = snapshots
            .into_iter()
            .filter(|snapshot| {
                snapshot.profile.available
                    && snapshot.active_chats < i64::from(snapshot.profile.max_concurrent_chats)
                    && presence
                        .get(&snapshot.profile.agent_id.as_user())
                        .is_some_and(|record| record.status == PresenceStatus::Online)
            })
            .collect();
        available.sort_by_key(|snapshot| (snapshot.active_chats, snapshot.profile.agent_id));
        available
    }

    /// Pick an agent for the conversation and claim a chat slot on them.
    ///
    /// Precedence: preferred agent if currently available, then a skill match
    /// on the category (least busy first), then the least busy agent for
    /// elevated priority, then round-robin rotation. `None` means nobody is
    /// available and the conversation stays unassigned; that is not an error.
    pub async fn assign(
        &self,
        conversation_id: ConversationId,
        business_id: BusinessId,
        request: &AssignmentRequest,
    ) -> Option<Assignment> {
        let available = self.available_agents(business_id).await;
        if available.is_empty() {
            info!(conversation_id = %conversation_id, business_id = %business_id,
                "no agent available, conversation left unassigned");
            return None;
        }

        if let Some(preferred) = request.preferred_agent {
            if available
                .iter()
                .any(|snapshot| snapshot.profile.agent_id == preferred)
            {
                return Some(
                    self.claim(conversation_id, preferred, AssignmentMethod::Preferred)
                        .await,
                );
            }
        }

        if let Some(category) = request.category.as_deref() {
            if let Some(snapshot) = available
                .iter()
                .find(|snapshot| snapshot.profile.skills.iter().any(|skill| skill == category))
            {
                return Some(
                    self.claim(
                        conversation_id,
                        snapshot.profile.agent_id,
                        AssignmentMethod::SkillMatch,
                    )
                    .await,
                );
            }
        }

        if request.priority.is_elevated() {
            if let Some(snapshot) = available.first() {
                return Some(
                    self.claim(
                        conversation_id,
                        snapshot.profile.agent_id,
                        AssignmentMethod::LeastBusy,
                    )
                    .await,
                );
            }
        }

        // Rotation runs over the id-ordered list so the cursor maps to a
        // stable position even as chat loads shift between calls
        let mut rotation: Vec<AgentId> = available
            .iter()
            .map(|snapshot| snapshot.profile.agent_id)
            .collect();
        rotation.sort();
        let counter = match self
            .store
            .counter_incr(&cursor_key(business_id), 1, Some(self.counter_ttl))
            .await
        {
            Ok(counter) => counter,
            Err(error) => {
                warn!(business_id = %business_id, %error,
                    "rotation cursor unavailable, assigning first in rotation");
                1
            }
        };
        let index = (counter - 1).rem_euclid(rotation.len() as i64) as usize;
        let chosen = rotation.get(index).copied()?;
        Some(
            self.claim(conversation_id, chosen, AssignmentMethod::RoundRobin)
                .await,
        )
    }

    /// Give back one chat slot, floored at zero
    pub async fn release(&self, agent_id: AgentId) {
        let key = active_chats_key(agent_id);
        let remaining = match self.store.counter_incr(&key, -1, None).await {
            Ok(remaining) => remaining,
            Err(error) => {
                warn!(agent_id = %agent_id, %error, "active chat counter not decremented");
                return;
            }
        };
        if remaining < 0 {
            // Unbalanced release; pin the counter back at zero
            if let Err(error) = self.store.counter_incr(&key, 1, None).await {
                warn!(agent_id = %agent_id, %error, "active chat counter correction failed");
            }
        }
        debug!(agent_id = %agent_id, remaining = remaining.max(0), "agent chat released");
    }

    /// Take a departing agent out of rotation and re-route their open
    /// conversations at elevated priority
    pub async fn handle_agent_offline(
        &self,
        business_id: BusinessId,
        agent_id: AgentId,
    ) -> Result<Vec<ReassignmentOutcome>, RealtimeError> {
        self.set_agent_availability(agent_id, false).await;
        let open = self.conversations.assigned_open_conversations(agent_id).await?;
        info!(agent_id = %agent_id, conversations = open.len(), "re-routing from offline agent");

        let request = AssignmentRequest {
            priority: Priority::High,
            ..AssignmentRequest::default()
        };
        let mut outcomes = Vec::with_capacity(open.len());
        for conversation_id in open {
            self.release(agent_id).await;
            let assignment = self.assign(conversation_id, business_id, &request).await;
            if assignment.is_none() {
                warn!(conversation_id = %conversation_id,
                    "no agent available for reassignment, conversation unassigned");
            }
            outcomes.push(ReassignmentOutcome {
                conversation_id,
                assignment,
            });
        }
        Ok(outcomes)
    }

    async fn claim(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
        method: AssignmentMethod,
    ) -> Assignment {
        match self
            .store
            .counter_incr(&active_chats_key(agent_id), 1, Some(self.counter_ttl))
            .await
        {
            Ok(active) => {
                info!(conversation_id = %conversation_id, agent_id = %agent_id,
                    %method, active, "conversation assigned");
            }
            Err(error) => {
                warn!(agent_id = %agent_id, %error, "active chat counter not incremented");
            }
        }
        Assignment { agent_id, method }
    }

    async fn profile(&self, agent_id: AgentId) -> Option<AgentProfile> {
        match self.store.get(&agent_key(agent_id)).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(profile) => Some(profile),
                Err(error) => {
                    warn!(agent_id = %agent_id, %error, "malformed agent profile");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(agent_id = %agent_id, %error, "agent profile fetch failed");
                None
            }
        }
    }

    async fn write_profile(&self, profile: &AgentProfile) {
        let payload = match serde_json::to_string(profile) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(agent_id = %profile.agent_id, %error, "agent profile serialization failed");
                return;
            }
        };
        if let Err(error) = self
            .store
            .put(&agent_key(profile.agent_id), &payload, None)
            .await
        {
            warn!(agent_id = %profile.agent_id, %error, "agent profile write failed");
        }
    }

    async fn active_chats(&self, agent_id: AgentId) -> i64 {
        match self.store.get(&active_chats_key(agent_id)).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(count) => count.max(0),
                Err(error) => {
                    warn!(agent_id = %agent_id, %error, "malformed active chat counter");
                    0
                }
            },
            Ok(None) => 0,
            Err(error) => {
                warn!(agent_id = %agent_id, %error, "active chat counter read failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{DownStore, FakeHistory};
    use parley_shared::MemoryStore;

    struct Fixture {
        router: AgentRouter,
        presence: Arc<PresenceTracker>,
        history: Arc<FakeHistory>,
        store: Arc<MemoryStore>,
        business: BusinessId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = RealtimeConfig::default();
        let presence = Arc::new(PresenceTracker::new(store.clone(), &config));
        let history = Arc::new(FakeHistory::default());
        let router = AgentRouter::new(store.clone(), presence.clone(), history.clone(), &config);
        Fixture {
            router,
            presence,
            history,
            store,
            business: BusinessId::new(),
        }
    }

    fn profile(max_concurrent_chats: u32, skills: &[&str]) -> AgentProfile {
        AgentProfile {
            agent_id: AgentId::new(),
            max_concurrent_chats,
            skills: skills.iter().map(|s| s.to_string()).collect(),
            average_response_time_ema_ms: 0,
            available: true,
        }
    }

    async fn register_online(fx: &Fixture, profile: AgentProfile) -> AgentId {
        let agent_id = profile.agent_id;
        fx.router.register_agent(fx.business, profile).await;
        fx.presence.set_online(agent_id.as_user()).await;
        agent_id
    }

    async fn bump_chats(fx: &Fixture, agent_id: AgentId, by: i64) {
        fx.store
            .counter_incr(&active_chats_key(agent_id), by, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_available_agents_filters_and_sorts() {
        let fx = fixture();
        let idle = register_online(&fx, profile(3, &[])).await;
        let busy = register_online(&fx, profile(3, &[])).await;
        bump_chats(&fx, busy, 1).await;
        let full = register_online(&fx, profile(2, &[])).await;
        bump_chats(&fx, full, 2).await;
        let offline = profile(3, &[]);
        let offline_id = offline.agent_id;
        fx.router.register_agent(fx.business, offline).await;
        let mut flagged_off = profile(3, &[]);
        flagged_off.available = false;
        let flagged_off_id = register_online(&fx, flagged_off).await;

        let available = fx.router.available_agents(fx.business).await;
        let ids: Vec<AgentId> = available.iter().map(|s| s.profile.agent_id).collect();
        assert_eq!(ids, vec![idle, busy]);
        assert!(!ids.contains(&full));
        assert!(!ids.contains(&offline_id));
        assert!(!ids.contains(&flagged_off_id));
    }

    #[tokio::test]
    async fn test_round_robin_distributes_evenly() {
        let fx = fixture();
        let mut agents = Vec::new();
        for _ in 0..3 {
            agents.push(register_online(&fx, profile(10, &[])).await);
        }
        agents.sort();

        let mut picks = Vec::new();
        for _ in 0..6 {
            let assignment = fx
                .router
                .assign(ConversationId::new(), fx.business, &AssignmentRequest::default())
                .await
                .unwrap();
            assert_eq!(assignment.method, AssignmentMethod::RoundRobin);
            picks.push(assignment.agent_id);
        }

        // Two full rotations in id order
        for (i, agent_id) in picks.iter().enumerate() {
            assert_eq!(*agent_id, agents[i % 3]);
        }
        for agent_id in &agents {
            let snapshot = fx.router.agent_snapshot(*agent_id).await.unwrap();
            assert_eq!(snapshot.active_chats, 2);
        }
    }

    #[tokio::test]
    async fn test_preferred_agent_takes_precedence() {
        let fx = fixture();
        let preferred = register_online(&fx, profile(5, &[])).await;
        register_online(&fx, profile(5, &[])).await;

        let request = AssignmentRequest {
            preferred_agent: Some(preferred),
            ..AssignmentRequest::default()
        };
        let assignment = fx
            .router
            .assign(ConversationId::new(), fx.business, &request)
            .await
            .unwrap();
        assert_eq!(assignment.agent_id, preferred);
        assert_eq!(assignment.method, AssignmentMethod::Preferred);
    }

    #[tokio::test]
    async fn test_unavailable_preferred_agent_falls_through() {
        let fx = fixture();
        let fallback = register_online(&fx, profile(5, &[])).await;
        let preferred = register_online(&fx, profile(1, &[])).await;
        bump_chats(&fx, preferred, 1).await;

        let request = AssignmentRequest {
            preferred_agent: Some(preferred),
            ..AssignmentRequest::default()
        };
        let assignment = fx
            .router
            .assign(ConversationId::new(), fx.business, &request)
            .await
            .unwrap();
        assert_eq!(assignment.agent_id, fallback);
    }

    #[tokio::test]
    async fn test_skill_match_prefers_least_busy_specialist() {
        let fx = fixture();
        let busy_specialist = register_online(&fx, profile(5, &["billing"])).await;
        bump_chats(&fx, busy_specialist, 2).await;
        let idle_specialist = register_online(&fx, profile(5, &["billing", "onboarding"])).await;
        register_online(&fx, profile(5, &[])).await;

        let request = AssignmentRequest {
            category: Some("billing".to_string()),
            ..AssignmentRequest::default()
        };
        let assignment = fx
            .router
            .assign(ConversationId::new(), fx.business, &request)
            .await
            .unwrap();
        assert_eq!(assignment.agent_id, idle_specialist);
        assert_eq!(assignment.method, AssignmentMethod::SkillMatch);
    }

    #[tokio::test]
    async fn test_elevated_priority_takes_least_busy() {
        let fx = fixture();
        let busy = register_online(&fx, profile(5, &[])).await;
        bump_chats(&fx, busy, 3).await;
        let idle = register_online(&fx, profile(5, &[])).await;

        let request = AssignmentRequest {
            priority: Priority::Urgent,
            ..AssignmentRequest::default()
        };
        let assignment = fx
            .router
            .assign(ConversationId::new(), fx.business, &request)
            .await
            .unwrap();
        assert_eq!(assignment.agent_id, idle);
        assert_eq!(assignment.method, AssignmentMethod::LeastBusy);
    }

    #[tokio::test]
    async fn test_assign_with_nobody_available_returns_none() {
        let fx = fixture();
        assert!(fx
            .router
            .assign(ConversationId::new(), fx.business, &AssignmentRequest::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_release_floors_at_zero() {
        let fx = fixture();
        let agent = register_online(&fx, profile(5, &[])).await;
        fx.router
            .assign(ConversationId::new(), fx.business, &AssignmentRequest::default())
            .await
            .unwrap();

        fx.router.release(agent).await;
        assert_eq!(fx.router.agent_snapshot(agent).await.unwrap().active_chats, 0);
        // A second release must not drive the counter negative
        fx.router.release(agent).await;
        assert_eq!(fx.router.agent_snapshot(agent).await.unwrap().active_chats, 0);
    }

    #[tokio::test]
    async fn test_handle_agent_offline_reroutes_open_conversations() {
        let fx = fixture();
        let departing = register_online(&fx, profile(5, &[])).await;
        bump_chats(&fx, departing, 2).await;
        let remaining = register_online(&fx, profile(5, &[])).await;
        let chat_a = ConversationId::new();
        let chat_b = ConversationId::new();
        fx.history.assign(departing, chat_a);
        fx.history.assign(departing, chat_b);

        let outcomes = fx
            .router
            .handle_agent_offline(fx.business, departing)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert_eq!(outcome.assignment.unwrap().agent_id, remaining);
        }
        let departed = fx.router.agent_snapshot(departing).await.unwrap();
        assert!(!departed.profile.available);
        assert_eq!(departed.active_chats, 0);
        assert_eq!(
            fx.router.agent_snapshot(remaining).await.unwrap().active_chats,
            2
        );
    }

    #[tokio::test]
    async fn test_register_snapshot_deregister_lifecycle() {
        let fx = fixture();
        let agent = register_online(&fx, profile(4, &["billing"])).await;
        bump_chats(&fx, agent, 1).await;

        let snapshots = fx.router.agent_snapshots(fx.business).await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].profile.agent_id, agent);
        assert_eq!(snapshots[0].active_chats, 1);

        fx.router.deregister_agent(fx.business, agent).await;
        assert!(fx.router.agent_snapshots(fx.business).await.is_empty());
        assert!(fx.router.agent_snapshot(agent).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_chat_counter_reads_as_zero() {
        let fx = fixture();
        let agent = register_online(&fx, profile(3, &[])).await;
        fx.store
            .put(&active_chats_key(agent), "not-a-number", None)
            .await
            .unwrap();

        let snapshot = fx.router.agent_snapshot(agent).await.unwrap();
        assert_eq!(snapshot.active_chats, 0);
        assert_eq!(fx.router.available_agents(fx.business).await.len(), 1);
    }

    #[tokio::test]
    async fn test_record_response_time_ema() {
        let fx = fixture();
        let agent = register_online(&fx, profile(4, &[])).await;

        fx.router.record_response_time(agent, 1000).await;
        let snapshot = fx.router.agent_snapshot(agent).await.unwrap();
        assert_eq!(snapshot.profile.average_response_time_ema_ms, 1000);

        fx.router.record_response_time(agent, 500).await;
        let snapshot = fx.router.agent_snapshot(agent).await.unwrap();
        assert_eq!(snapshot.profile.average_response_time_ema_ms, 900);
    }

    #[test]
    fn test_priority_parse_and_display() {
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("sev1".parse::<Priority>().is_err());
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(Priority::Urgent.is_elevated());
        assert!(!Priority::Low.is_elevated());
        assert_eq!(format!("{}", AssignmentMethod::SkillMatch), "skill_match");
    }

    #[tokio::test]
    async fn test_store_outage_degrades_quietly() {
        let store = Arc::new(DownStore);
        let config = RealtimeConfig::default();
        let presence = Arc::new(PresenceTracker::new(store.clone(), &config));
        let history = Arc::new(FakeHistory::default());
        let router = AgentRouter::new(store, presence, history, &config);
        let business = BusinessId::new();

        router.register_agent(business, profile(5, &[])).await;
        assert!(router.available_agents(business).await.is_empty());
        assert!(router
            .assign(ConversationId::new(), business, &AssignmentRequest::default())
            .await
            .is_none());
        router.release(AgentId::new()).await;
    }
}
