//! # Request context passed to manager operations.
//!
//! Every manager call (bus-dispatched, periodic or reconciliation) receives a
//! [`RequestContext`]. Calls originating inside the node itself run with an
//! administrative context; bus callers ship their own inside the
//! [`Envelope`](crate::rpc::Envelope).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and correlation data for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique id used to correlate logs across processes.
    pub request_id: Uuid,
    /// True for operations the node performs on its own behalf.
    pub is_admin: bool,
    /// Calling user, if any.
    pub user_id: Option<String>,
    /// Calling project, if any.
    pub project_id: Option<String>,
    /// Wall-clock creation time.
    pub timestamp: SystemTime,
}

impl RequestContext {
    /// Administrative context for work the node initiates itself.
    pub fn admin() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            is_admin: true,
            user_id: None,
            project_id: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Context on behalf of a user within a project.
    pub fn for_user(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            is_admin: false,
            user_id: Some(user_id.into()),
            project_id: Some(project_id.into()),
            timestamp: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_contexts_are_distinct() {
        let a = RequestContext::admin();
        let b = RequestContext::admin();
        assert!(a.is_admin);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn user_context_survives_json() {
        let ctx = RequestContext::for_user("alice", "ops");
        let json = serde_json::to_string(&ctx).unwrap();
        let back: RequestContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
        assert!(!back.is_admin);
    }
}
