//! Agent assignment for business conversations
//!
//! Routes an incoming conversation to a human agent by precedence:
//! - Explicitly preferred agent, when currently available
//! - Skill match against the conversation category, least busy first
//! - Least busy agent for high and urgent priority
//! - Round-robin rotation otherwise
//!
//! `BusinessHoursGate` decides whether a business is accepting conversations
//! at all at a given instant.

mod hours;
mod router;

pub use hours::{BreakInterval, BusinessHoursConfig, BusinessHoursGate, DaySchedule};
pub use router::{
    AgentProfile, AgentRouter, AgentSnapshot, Assignment, AssignmentMethod, AssignmentRequest,
    Priority, ReassignmentOutcome,
};
