use std::sync::Arc;

use crate::auth::SessionVerifier;
use crate::billing::BillingProvider;
use crate::gateway::Gateway;
use crate::plans::PlanStore;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub plans: Arc<dyn PlanStore>,
    /// `None` when no session secret is configured; every caller is anonymous.
    pub sessions: Option<Arc<SessionVerifier>>,
    /// `None` when checkout is not configured.
    pub billing: Option<Arc<dyn BillingProvider>>,
    pub webhook_secret: Option<Arc<str>>,
    pub trust_proxy_headers: bool,
    pub redact_diagnostics: bool,
}
