//! Host collaborator traits.

use crate::PipelineError;
use tracing::debug;

/// Identity and runtime answers supplied by the host application.
///
/// Consulted at capture time (identified vs guest, analytics kill switch)
/// and again at delivery time to resolve the user id stamped onto each
/// outgoing event.
pub trait IdentityProvider: Send + Sync {
    /// Whether a signed-in user is present right now.
    fn is_user_logged_in(&self) -> bool;

    /// Id of the signed-in user.
    fn current_user_id(&self) -> i64;

    /// Id used for events captured while signed out.
    fn guest_user_id(&self) -> i64;

    /// Global analytics kill switch. False makes every entry point a no-op.
    fn is_analytics_enabled(&self) -> bool;

    /// Host application version, for hosts that stamp it into headers or
    /// attributes.
    fn app_version(&self) -> String;
}

/// Fixed identity answers, for hosts without dynamic sign-in and for tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    /// Signed-in user id, `None` when signed out.
    pub user_id: Option<i64>,
    /// Guest user id.
    pub guest_id: i64,
    /// Analytics kill switch.
    pub analytics_enabled: bool,
    /// Host application version.
    pub app_version: String,
}

impl Default for StaticIdentity {
    fn default() -> Self {
        Self {
            user_id: None,
            guest_id: 0,
            analytics_enabled: true,
            app_version: String::new(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn is_user_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    fn current_user_id(&self) -> i64 {
        self.user_id.unwrap_or(self.guest_id)
    }

    fn guest_user_id(&self) -> i64 {
        self.guest_id
    }

    fn is_analytics_enabled(&self) -> bool {
        self.analytics_enabled
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }
}

/// Sink for errors swallowed by fire-and-forget paths.
///
/// Capture and delivery never propagate errors to the caller; they are
/// logged and handed to this reporter so the host can forward them to its
/// crash-reporting backend.
pub trait NonFatalReporter: Send + Sync {
    fn record(&self, error: &PipelineError);
}

/// Reporter that logs at debug level and drops the error.
pub struct NoopReporter;

impl NonFatalReporter for NoopReporter {
    fn record(&self, error: &PipelineError) {
        debug!(error = %error, "Non-fatal error dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_identity_signed_out_uses_guest() {
        let identity = StaticIdentity::default();
        assert!(!identity.is_user_logged_in());
        assert_eq!(identity.current_user_id(), identity.guest_user_id());
    }

    #[test]
    fn static_identity_signed_in() {
        let identity = StaticIdentity {
            user_id: Some(42),
            ..StaticIdentity::default()
        };
        assert!(identity.is_user_logged_in());
        assert_eq!(identity.current_user_id(), 42);
    }
}
