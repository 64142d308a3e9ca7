pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod notifications;
pub mod relay;
pub mod roster;
pub mod session;
pub mod startup;
pub mod store;
pub mod workflow;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::notifications::OtpDispatcher;
use crate::relay::BroadcastRelay;
use crate::roster::RosterValidator;
use crate::session::SessionIssuer;
use crate::store::Stores;
use crate::workflow::{
    ConnectionWorkflow, DirectoryWorkflow, FeedWorkflow, MessagingWorkflow, QnaWorkflow,
    RegistrationSettings, RegistrationWorkflow,
};

pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub registration: RegistrationWorkflow,
    pub connections: ConnectionWorkflow,
    pub messaging: MessagingWorkflow,
    pub directory: DirectoryWorkflow,
    pub feed: FeedWorkflow,
    pub qna: QnaWorkflow,
    pub sessions: Arc<SessionIssuer>,
    pub relay: Arc<BroadcastRelay>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, dispatcher: Arc<dyn OtpDispatcher>) -> Self {
        let sessions = Arc::new(SessionIssuer::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl_days,
        ));
        let relay = Arc::new(BroadcastRelay::new());
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        let registration = RegistrationWorkflow::new(
            stores.identities.clone(),
            stores.pending.clone(),
            RosterValidator::new(stores.roster.clone()),
            dispatcher,
            sessions.clone(),
            RegistrationSettings::from(&config.registration),
        );
        let connections =
            ConnectionWorkflow::new(stores.connections.clone(), stores.identities.clone());
        let messaging = MessagingWorkflow::new(
            stores.messages.clone(),
            stores.identities.clone(),
            relay.clone(),
        );
        let directory = DirectoryWorkflow::new(stores.identities.clone(), stores.profiles.clone());
        let feed = FeedWorkflow::new(
            stores.posts.clone(),
            stores.identities.clone(),
            stores.profiles.clone(),
        );
        let qna = QnaWorkflow::new(
            stores.qna.clone(),
            stores.identities.clone(),
            stores.profiles.clone(),
        );

        Self {
            config,
            stores,
            registration,
            connections,
            messaging,
            directory,
            feed,
            qna,
            sessions,
            relay,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
