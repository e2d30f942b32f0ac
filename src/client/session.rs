use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::client::permissions::{Capability, DevicePermissions, PermissionOutcome, PlatformProfile};
use crate::client::transport::JoinApi;
use crate::client::{ClientError, SessionState};
use crate::models::JoinDescriptor;
use crate::registry::normalize_room_id;

/// Result of a join trigger
#[derive(Debug, Clone)]
pub enum JoinStatus {
    /// Credential held for the requested room
    Ready(Arc<JoinDescriptor>),
    /// Same room already being joined; nothing started
    InFlight,
    /// Session left or unmounted before the result arrived
    Discarded,
}

impl JoinStatus {
    pub fn descriptor(&self) -> Option<&Arc<JoinDescriptor>> {
        match self {
            JoinStatus::Ready(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// Inputs the hosting screen re-renders with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProps {
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
}

struct Inner {
    state: SessionState,
    room_key: Option<String>,
    user_id: Option<String>,
    /// Bumped on every start, leave and unmount; async results carry the epoch they began in
    epoch: u64,
    descriptor: Option<Arc<JoinDescriptor>>,
    last_error: Option<ClientError>,
    retries: u32,
    mounted: bool,
}

impl Inner {
    fn is_current(&self, epoch: u64) -> bool {
        self.mounted && self.epoch == epoch
    }

    fn begin(&mut self, room_key: String, state: SessionState) -> u64 {
        self.epoch += 1;
        self.state = state;
        self.room_key = Some(room_key);
        self.descriptor = None;
        self.last_error = None;
        self.epoch
    }

    fn clear(&mut self, state: SessionState) -> Option<String> {
        self.epoch += 1;
        self.state = state;
        self.descriptor = None;
        self.last_error = None;
        self.retries = 0;
        self.room_key.take()
    }

    fn fail(&mut self, state: SessionState, err: ClientError) -> ClientError {
        self.state = state;
        self.last_error = Some(err.clone());
        err
    }

    fn invalid(&self, action: &'static str) -> ClientError {
        ClientError::InvalidState {
            action,
            state: self.state,
        }
    }
}

/// Drives one screen's join lifecycle.
///
/// At most one fetch per room key runs at a time. Results that arrive after
/// a leave, a room change or an unmount are dropped.
pub struct SessionController {
    api: Arc<dyn JoinApi>,
    permissions: Arc<dyn DevicePermissions>,
    capabilities: Vec<Capability>,
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(
        api: Arc<dyn JoinApi>,
        permissions: Arc<dyn DevicePermissions>,
        platform: PlatformProfile,
    ) -> Self {
        Self {
            api,
            permissions,
            capabilities: platform.required_capabilities(),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                room_key: None,
                user_id: None,
                epoch: 0,
                descriptor: None,
                last_error: None,
                retries: 0,
                mounted: true,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn room_key(&self) -> Option<String> {
        self.inner.lock().room_key.clone()
    }

    pub fn descriptor(&self) -> Option<Arc<JoinDescriptor>> {
        self.inner.lock().descriptor.clone()
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.inner.lock().last_error.clone()
    }

    /// Manual retries since the current room was requested
    pub fn retry_count(&self) -> u32 {
        self.inner.lock().retries
    }

    /// Start joining `room_id`.
    ///
    /// A second call for the same room while one is running returns
    /// [`JoinStatus::InFlight`]; a call for the room already held returns the
    /// held credential. A call for a room that failed returns the stored error
    /// until [`retry`](Self::retry) or [`dismiss`](Self::dismiss). A different
    /// room replaces the current one and reports the leave of the old one.
    pub async fn join(&self, room_id: &str) -> Result<JoinStatus, ClientError> {
        let key = normalize_room_id(room_id);
        if key.is_empty() {
            return Err(ClientError::MissingRoomId);
        }

        let (epoch, previous) = {
            let mut inner = self.inner.lock();
            if !inner.mounted || inner.state == SessionState::Left {
                return Err(inner.invalid("join"));
            }

            let mut previous = None;
            if inner.room_key.as_deref() == Some(key.as_str()) {
                if inner.state.is_in_flight() {
                    debug!(room_id = %key, state = %inner.state, "Join already in flight");
                    return Ok(JoinStatus::InFlight);
                }
                if inner.state.holds_credential() {
                    if let Some(descriptor) = &inner.descriptor {
                        return Ok(JoinStatus::Ready(descriptor.clone()));
                    }
                }
                if matches!(
                    inner.state,
                    SessionState::CredentialError | SessionState::PermissionDenied
                ) {
                    debug!(room_id = %key, state = %inner.state, "Join blocked until retry or dismiss");
                    return Err(inner
                        .last_error
                        .clone()
                        .unwrap_or_else(|| inner.invalid("join")));
                }
            } else if let Some(current) = &inner.room_key {
                info!(from = %current, to = %key, "Switching room");
                if inner.state.holds_credential() {
                    previous = Some(current.clone());
                }
            }

            inner.retries = 0;
            (
                inner.begin(key.clone(), SessionState::PermissionPending),
                previous,
            )
        };

        if let Some(previous) = previous {
            self.report_leave(&previous).await;
        }

        if !self.request_permissions(&key, epoch).await? {
            return Ok(JoinStatus::Discarded);
        }
        self.fetch(&key, epoch).await
    }

    /// Re-render entry point. Keyed by room id and user id only; a new props
    /// value for the same room and user never re-fetches or detaches.
    pub async fn sync(&self, props: &SessionProps) -> Result<JoinStatus, ClientError> {
        {
            let mut inner = self.inner.lock();
            match inner.user_id.as_deref() {
                Some(current) if current == props.user_id => {}
                Some(current) => {
                    info!(from = %current, to = %props.user_id, "Account changed, resetting session");
                    inner.clear(SessionState::Idle);
                    inner.user_id = Some(props.user_id.clone());
                }
                None => inner.user_id = Some(props.user_id.clone()),
            }
        }
        self.join(&props.room_id).await
    }

    /// Re-run the failed step for the current room
    pub async fn retry(&self) -> Result<JoinStatus, ClientError> {
        let (key, epoch, ask_permissions) = {
            let mut inner = self.inner.lock();
            if !inner.mounted {
                return Err(inner.invalid("retry"));
            }
            let ask_permissions = match (inner.state, &inner.last_error) {
                (SessionState::CredentialError, Some(ClientError::Unauthenticated)) => {
                    return Err(ClientError::Unauthenticated)
                }
                (SessionState::CredentialError, _) => false,
                (SessionState::PermissionDenied, _) => true,
                _ => return Err(inner.invalid("retry")),
            };
            let Some(key) = inner.room_key.clone() else {
                return Err(inner.invalid("retry"));
            };

            inner.retries += 1;
            let next = if ask_permissions {
                SessionState::PermissionPending
            } else {
                SessionState::CredentialFetching
            };
            let epoch = inner.begin(key.clone(), next);
            debug!(room_id = %key, attempt = inner.retries, "Retrying join");
            (key, epoch, ask_permissions)
        };

        if ask_permissions && !self.request_permissions(&key, epoch).await? {
            return Ok(JoinStatus::Discarded);
        }
        self.fetch(&key, epoch).await
    }

    /// Hand the held credential to the engine. Repeated calls return the same credential.
    pub fn attach(&self) -> Result<Arc<JoinDescriptor>, ClientError> {
        let mut inner = self.inner.lock();
        match (inner.state, inner.descriptor.clone()) {
            (SessionState::CredentialReady, Some(descriptor)) => {
                inner.state = SessionState::Attached;
                info!(room_id = ?inner.room_key, "Attached to room");
                Ok(descriptor)
            }
            (SessionState::Attached, Some(descriptor)) => Ok(descriptor),
            _ => Err(inner.invalid("attach")),
        }
    }

    /// Leave the current room and tell the server
    pub async fn leave(&self) {
        let (key, notify) = {
            let mut inner = self.inner.lock();
            let notify = inner.state.holds_credential();
            (inner.clear(SessionState::Left), notify)
        };

        if let (Some(key), true) = (key, notify) {
            self.report_leave(&key).await;
        }
    }

    async fn report_leave(&self, key: &str) {
        if let Err(e) = self.api.leave_room(key).await {
            warn!(room_id = %key, error = %e, "Failed to report leave");
        }
    }

    /// The server ended the room
    pub fn room_ended(&self) {
        let mut inner = self.inner.lock();
        if let Some(key) = inner.clear(SessionState::Left) {
            info!(room_id = %key, "Room ended");
        }
    }

    /// Return to Idle from Left or a failed state
    pub fn dismiss(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Idle
            | SessionState::Left
            | SessionState::PermissionDenied
            | SessionState::CredentialError => {
                inner.clear(SessionState::Idle);
                Ok(())
            }
            _ => Err(inner.invalid("dismiss")),
        }
    }

    /// The hosting screen is gone; outstanding results are dropped
    pub fn unmount(&self) {
        let mut inner = self.inner.lock();
        inner.mounted = false;
        inner.clear(SessionState::Idle);
    }

    /// Returns `false` if the session moved on while the prompt was open
    async fn request_permissions(&self, key: &str, epoch: u64) -> Result<bool, ClientError> {
        let outcome = self.permissions.request(&self.capabilities).await;

        let mut inner = self.inner.lock();
        if !inner.is_current(epoch) {
            debug!(room_id = %key, "Permission result discarded");
            return Ok(false);
        }

        match outcome {
            PermissionOutcome::Granted => {
                inner.state = SessionState::PermissionGranted;
                Ok(true)
            }
            PermissionOutcome::Denied(missing) => {
                warn!(room_id = %key, missing = ?missing, "Device permissions denied");
                Err(inner.fail(
                    SessionState::PermissionDenied,
                    ClientError::PermissionDenied(missing),
                ))
            }
        }
    }

    async fn fetch(&self, key: &str, epoch: u64) -> Result<JoinStatus, ClientError> {
        {
            let mut inner = self.inner.lock();
            if !inner.is_current(epoch) {
                return Ok(JoinStatus::Discarded);
            }
            inner.state = SessionState::CredentialFetching;
        }

        let result = self.api.fetch_credential(key).await;

        let mut inner = self.inner.lock();
        if !inner.is_current(epoch) {
            debug!(room_id = %key, "Credential result discarded");
            return Ok(JoinStatus::Discarded);
        }

        match result {
            Ok(descriptor) => {
                let descriptor = Arc::new(descriptor);
                inner.state = SessionState::CredentialReady;
                inner.descriptor = Some(descriptor.clone());
                debug!(room_id = %key, "Credential ready");
                Ok(JoinStatus::Ready(descriptor))
            }
            Err(err) => {
                warn!(room_id = %key, error = %err, "Credential fetch failed");
                Err(inner.fail(SessionState::CredentialError, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::permissions::GrantAll;
    use crate::models::JoinCredential;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Scripted API: pops one result per call, optionally waiting on a gate first
    struct ScriptedApi {
        calls: AtomicUsize,
        leaves: AtomicUsize,
        started: Notify,
        gate: Option<Notify>,
        results: parking_lot::Mutex<VecDeque<Result<(), ClientError>>>,
    }

    impl ScriptedApi {
        fn new(gated: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                leaves: AtomicUsize::new(0),
                started: Notify::new(),
                gate: gated.then(Notify::new),
                results: parking_lot::Mutex::new(VecDeque::new()),
            })
        }

        fn push(&self, result: Result<(), ClientError>) {
            self.results.lock().push_back(result);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }
    }

    #[async_trait]
    impl JoinApi for ScriptedApi {
        async fn fetch_credential(&self, room_key: &str) -> Result<JoinDescriptor, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            self.results.lock().pop_front().unwrap_or(Ok(()))?;
            Ok(JoinDescriptor {
                app_id: 1,
                credential: JoinCredential::TokenBased {
                    token: format!("token-{}", n),
                },
                room_id: Some(room_key.to_string()),
                user_id: "u1".to_string(),
                user_name: "Alice".to_string(),
                expires_at: None,
            })
        }

        async fn leave_room(&self, _room_key: &str) -> Result<(), ClientError> {
            self.leaves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct DenyAll {
        prompts: AtomicUsize,
    }

    #[async_trait]
    impl DevicePermissions for DenyAll {
        async fn request(&self, capabilities: &[Capability]) -> PermissionOutcome {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            PermissionOutcome::Denied(capabilities.to_vec())
        }
    }

    fn controller(api: Arc<ScriptedApi>) -> Arc<SessionController> {
        Arc::new(SessionController::new(
            api,
            Arc::new(GrantAll),
            PlatformProfile::default(),
        ))
    }

    fn props(room_id: &str, display_name: &str) -> SessionProps {
        SessionProps {
            room_id: room_id.to_string(),
            user_id: "u1".to_string(),
            display_name: display_name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_join_normalizes_and_attaches() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        let status = session.join("  1234 5678 ").await.unwrap();
        let descriptor = status.descriptor().unwrap();
        assert_eq!(descriptor.room_id.as_deref(), Some("12345678"));
        assert_eq!(session.state(), SessionState::CredentialReady);

        let attached = session.attach().unwrap();
        assert!(Arc::ptr_eq(&attached, descriptor));
        assert_eq!(session.state(), SessionState::Attached);
    }

    #[tokio::test]
    async fn test_empty_room_id_makes_no_call() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        assert_eq!(session.join("   ").await.unwrap_err(), ClientError::MissingRoomId);
        assert_eq!(api.calls(), 0);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_rapid_double_join_fetches_once() {
        let api = ScriptedApi::new(true);
        let session = controller(api.clone());

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.join("12345678").await })
        };
        api.started.notified().await;

        let second = session.join("12345678").await.unwrap();
        assert!(matches!(second, JoinStatus::InFlight));

        api.release();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, JoinStatus::Ready(_)));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_identity_change_while_attached_keeps_credential() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        session.sync(&props("12345678", "Alice")).await.unwrap();
        let attached = session.attach().unwrap();

        // Re-render with a new props value for the same user and room
        let status = session.sync(&props("12345678", "Alice B.")).await.unwrap();

        assert_eq!(api.calls(), 1);
        assert_eq!(session.state(), SessionState::Attached);
        assert!(Arc::ptr_eq(status.descriptor().unwrap(), &attached));
        assert_eq!(api.leaves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_room_change_refetches() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        session.join("11111111").await.unwrap();
        session.attach().unwrap();
        let status = session.join("22222222").await.unwrap();

        assert_eq!(api.calls(), 2);
        assert_eq!(
            status.descriptor().unwrap().room_id.as_deref(),
            Some("22222222")
        );
        assert_eq!(session.state(), SessionState::CredentialReady);
    }

    #[tokio::test]
    async fn test_permission_denied_stops_before_fetch() {
        let api = ScriptedApi::new(false);
        let session = SessionController::new(
            api.clone(),
            Arc::new(DenyAll::default()),
            PlatformProfile {
                android_api_level: Some(33),
            },
        );

        let err = session.join("12345678").await.unwrap_err();
        assert!(matches!(err, ClientError::PermissionDenied(ref caps) if caps.len() == 3));
        assert_eq!(session.state(), SessionState::PermissionDenied);
        assert_eq!(api.calls(), 0);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_unauthenticated_is_terminal() {
        let api = ScriptedApi::new(false);
        api.push(Err(ClientError::Unauthenticated));
        let session = controller(api.clone());

        let err = session.join("12345678").await.unwrap_err();
        assert_eq!(err, ClientError::Unauthenticated);
        assert_eq!(session.state(), SessionState::CredentialError);

        assert_eq!(session.retry().await.unwrap_err(), ClientError::Unauthenticated);
        assert_eq!(api.calls(), 1);
        assert_eq!(session.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_retry_after_network_error() {
        let api = ScriptedApi::new(false);
        api.push(Err(ClientError::Timeout));
        let session = controller(api.clone());

        assert_eq!(session.join("12345678").await.unwrap_err(), ClientError::Timeout);
        assert_eq!(session.last_error(), Some(ClientError::Timeout));

        let status = session.retry().await.unwrap();
        assert!(matches!(status, JoinStatus::Ready(_)));
        assert_eq!(session.retry_count(), 1);
        assert_eq!(api.calls(), 2);
        assert_eq!(session.last_error(), None);
    }

    #[tokio::test]
    async fn test_result_after_unmount_is_discarded() {
        let api = ScriptedApi::new(true);
        let session = controller(api.clone());

        let join = {
            let session = session.clone();
            tokio::spawn(async move { session.join("12345678").await })
        };
        api.started.notified().await;
        session.unmount();
        api.release();

        assert!(matches!(join.await.unwrap().unwrap(), JoinStatus::Discarded));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.descriptor().is_none());
        assert!(matches!(
            session.join("12345678").await,
            Err(ClientError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_leave_reports_and_returns_to_idle() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        session.join("12345678").await.unwrap();
        session.attach().unwrap();
        session.leave().await;

        assert_eq!(session.state(), SessionState::Left);
        assert_eq!(api.leaves.load(Ordering::SeqCst), 1);
        assert!(session.room_key().is_none());

        session.dismiss().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_room_ended_detaches_without_report() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        session.join("12345678").await.unwrap();
        session.attach().unwrap();
        session.room_ended();

        assert_eq!(session.state(), SessionState::Left);
        assert_eq!(api.leaves.load(Ordering::SeqCst), 0);
        assert!(session.attach().is_err());
    }

    #[tokio::test]
    async fn test_rerender_after_timeout_waits_for_retry() {
        let api = ScriptedApi::new(false);
        api.push(Err(ClientError::Timeout));
        let session = controller(api.clone());
        let props = props("12345678", "Alice");

        for _ in 0..3 {
            assert_eq!(session.sync(&props).await.unwrap_err(), ClientError::Timeout);
        }
        assert_eq!(api.calls(), 1);
        assert_eq!(session.state(), SessionState::CredentialError);

        assert!(matches!(session.retry().await.unwrap(), JoinStatus::Ready(_)));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_rerender_after_unauthenticated_stays_terminal() {
        let api = ScriptedApi::new(false);
        api.push(Err(ClientError::Unauthenticated));
        let session = controller(api.clone());
        let props = props("12345678", "Alice");

        for _ in 0..2 {
            assert_eq!(
                session.sync(&props).await.unwrap_err(),
                ClientError::Unauthenticated
            );
        }
        assert_eq!(api.calls(), 1);

        // Only an explicit dismiss re-enters
        session.dismiss().unwrap();
        assert!(matches!(session.sync(&props).await.unwrap(), JoinStatus::Ready(_)));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_rerender_after_permission_denied_does_not_prompt() {
        let api = ScriptedApi::new(false);
        let permissions = Arc::new(DenyAll::default());
        let session =
            SessionController::new(api.clone(), permissions.clone(), PlatformProfile::default());
        let props = props("12345678", "Alice");

        for _ in 0..3 {
            let err = session.sync(&props).await.unwrap_err();
            assert!(matches!(err, ClientError::PermissionDenied(_)));
        }
        assert_eq!(permissions.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(api.calls(), 0);

        assert!(session.retry().await.is_err());
        assert_eq!(permissions.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_join_after_leave_requires_dismiss() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        session.join("12345678").await.unwrap();
        session.attach().unwrap();
        session.leave().await;

        assert!(matches!(
            session.join("12345678").await,
            Err(ClientError::InvalidState {
                state: SessionState::Left,
                ..
            })
        ));
        assert_eq!(api.calls(), 1);

        session.dismiss().unwrap();
        session.join("12345678").await.unwrap();
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_room_switch_reports_leave_of_previous_room() {
        let api = ScriptedApi::new(false);
        let session = controller(api.clone());

        session.join("11111111").await.unwrap();
        session.attach().unwrap();
        session.join("22222222").await.unwrap();

        assert_eq!(api.leaves.load(Ordering::SeqCst), 1);
        assert_eq!(session.room_key().as_deref(), Some("22222222"));
    }
}
