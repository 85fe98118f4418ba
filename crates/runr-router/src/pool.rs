//! Connection pool holding at most one live router connection.
//!
//! The current connection is shared by every caller dialing the same
//! target. When the target changes, or one of its TLS files is modified
//! after the connection was built, the old connection is retired: it closes
//! as soon as its last lease is dropped.
use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tonic::{service::interceptor::InterceptedService, transport::Channel};
use tracing::{debug, info};

use runr_core::{MetricsHandle, noop_metrics};

use crate::{
    config::RouterClientConfig,
    error::RouterError,
    proto::job_router_client::JobRouterClient,
    target::{DialTarget, RouterUrl, Scheme},
    transport::{self, TokenAuth},
};

/// Generated router client carrying the per-call credentials.
pub type RouterGrpcClient = JobRouterClient<InterceptedService<Channel, TokenAuth>>;

/// Point-in-time view of one pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderSnapshot {
    /// Monotonic id, unique within the pool.
    pub id: u64,
    pub users: u32,
    /// Retired; closes once the last lease is dropped.
    pub should_close: bool,
    pub closed: bool,
}

/// Point-in-time view of the whole pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Connection handed to new leases.
    pub current: Option<HolderSnapshot>,
    /// Retired connections still in use.
    pub closing: Vec<HolderSnapshot>,
    pub shut_down: bool,
}

struct HolderState {
    /// `None` once closed.
    channel: Option<Channel>,
    users: u32,
    should_close: bool,
}

impl HolderState {
    /// Drop the channel and wake every call still running on it.
    fn close(&mut self, closed: &CancellationToken) -> bool {
        let was_open = self.channel.take().is_some();
        closed.cancel();
        was_open
    }
}

struct ConnHolder {
    id: u64,
    scheme: Scheme,
    auth: TokenAuth,
    /// Cancelled when the connection closes; in-flight calls select on it.
    closed: CancellationToken,
    state: Mutex<HolderState>,
}

impl ConnHolder {
    fn new(id: u64, scheme: Scheme, auth: TokenAuth, channel: Channel) -> Self {
        Self {
            id,
            scheme,
            auth,
            closed: CancellationToken::new(),
            state: Mutex::new(HolderState {
                channel: Some(channel),
                users: 0,
                should_close: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HolderState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn add_user(&self) -> Option<Channel> {
        let mut s = self.lock();
        let channel = s.channel.clone()?;
        s.users += 1;
        Some(channel)
    }

    fn done(&self) {
        let mut s = self.lock();
        debug_assert!(s.users > 0, "lease released twice");
        s.users = s.users.saturating_sub(1);
        if s.should_close && s.users == 0 && s.close(&self.closed) {
            debug!(conn = self.id, "closed retired router connection");
        }
    }

    /// Mark for closing; closes now if idle. Returns whether it is closed.
    fn schedule_close(&self) -> bool {
        let mut s = self.lock();
        s.should_close = true;
        if s.users == 0 {
            s.close(&self.closed);
        }
        s.channel.is_none()
    }

    /// Close regardless of users; their calls are cancelled.
    fn force_close(&self) {
        let users = {
            let mut s = self.lock();
            s.close(&self.closed);
            s.users
        };
        if users > 0 {
            debug!(conn = self.id, users, "force-closed router connection with calls in flight");
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().channel.is_none()
    }

    fn snapshot(&self) -> HolderSnapshot {
        let s = self.lock();
        HolderSnapshot {
            id: self.id,
            users: s.users,
            should_close: s.should_close,
            closed: s.channel.is_none(),
        }
    }
}

/// A checked-out router connection. Dropping it releases the reference.
pub struct Lease {
    holder: Arc<ConnHolder>,
    channel: Channel,
}

impl Lease {
    fn acquire(holder: &Arc<ConnHolder>) -> Option<Self> {
        let channel = holder.add_user()?;
        Some(Self {
            holder: Arc::clone(holder),
            channel,
        })
    }

    /// Identifier of the underlying connection, stable for its lifetime.
    #[inline]
    pub fn conn_id(&self) -> u64 {
        self.holder.id
    }

    /// URL scheme the connection was dialed with.
    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.holder.scheme
    }

    /// Generated client over this connection with the token interceptor.
    pub fn client(&self) -> RouterGrpcClient {
        JobRouterClient::with_interceptor(self.channel.clone(), self.holder.auth.clone())
    }
}

impl Lease {
    /// Resolves once the connection is closed, e.g. by [`ConnPool::shutdown`].
    /// Calls made through [`Lease::client`] should race against it.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.holder.closed.cancelled()
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.holder.closed.is_cancelled()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.holder.done();
    }
}

struct Current {
    holder: Arc<ConnHolder>,
    target: DialTarget,
    constructed_at: SystemTime,
}

#[derive(Default)]
struct PoolState {
    current: Option<Current>,
    /// Retired connections that still had users when retired.
    closing: Vec<Arc<ConnHolder>>,
    shut_down: bool,
}

impl PoolState {
    fn gc(&mut self) {
        self.closing.retain(|h| !h.is_closed());
    }

    fn reuse(&self, target: &DialTarget, newest_tls: Option<SystemTime>) -> Option<Lease> {
        let cur = self.current.as_ref()?;
        if cur.target != *target {
            return None;
        }
        if newest_tls.is_some_and(|m| m > cur.constructed_at) {
            return None;
        }
        Lease::acquire(&cur.holder)
    }

    fn retire_current(&mut self) {
        if let Some(cur) = self.current.take() {
            debug!(conn = cur.holder.id, "retiring router connection");
            if !cur.holder.schedule_close() {
                self.closing.push(cur.holder);
            }
        }
    }
}

/// Pool of size one for router connections.
pub struct ConnPool {
    config: RouterClientConfig,
    metrics: MetricsHandle,
    next_id: AtomicU64,
    state: Mutex<PoolState>,
}

impl ConnPool {
    /// Empty pool. Nothing is dialed until the first lease.
    pub fn new(config: RouterClientConfig) -> Self {
        // Both tonic and the tunnel build rustls configs; pin the provider once.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            config,
            metrics: noop_metrics(),
            next_id: AtomicU64::new(1),
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Report dials and closes through `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Configuration used for every dial.
    #[inline]
    pub fn config(&self) -> &RouterClientConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Return a lease on the connection for `target`, building one if the
    /// current connection is missing or stale.
    ///
    /// File system checks and channel construction happen outside the pool
    /// lock.
    pub fn dial(&self, target: DialTarget) -> Result<Lease, RouterError> {
        let target = match &self.config.cert_dir {
            Some(dir) => target.with_cert_dir(dir)?,
            None => target,
        };
        let newest_tls = target.newest_tls_mtime();

        {
            let mut state = self.lock();
            if state.shut_down {
                return Err(RouterError::PoolClosed);
            }
            state.gc();
            if let Some(lease) = state.reuse(&target, newest_tls) {
                return Ok(lease);
            }
        }

        let scheme = RouterUrl::parse(&target.url)?.scheme;
        let auth = TokenAuth::new(&target.token)?;
        let constructed_at = SystemTime::now();
        let channel = match transport::connect(&target, &self.config) {
            Ok(channel) => {
                self.metrics.record_router_dial(scheme.as_str(), true);
                channel
            }
            Err(e) => {
                self.metrics.record_router_dial(scheme.as_str(), false);
                return Err(e);
            }
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let holder = Arc::new(ConnHolder::new(id, scheme, auth, channel));

        let mut state = self.lock();
        if state.shut_down {
            return Err(RouterError::PoolClosed);
        }
        // Another caller may have installed a fresh connection meanwhile.
        if let Some(lease) = state.reuse(&target, newest_tls) {
            return Ok(lease);
        }
        state.retire_current();

        let lease = Lease::acquire(&holder).ok_or(RouterError::PoolClosed)?;
        info!(conn = id, target = %target.url, scheme = %scheme, "new router connection");
        state.current = Some(Current {
            holder,
            target,
            constructed_at,
        });
        Ok(lease)
    }

    /// Close every connection now, leases or not. Later dials fail.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        if let Some(cur) = state.current.take() {
            cur.holder.force_close();
        }
        for holder in state.closing.drain(..) {
            holder.force_close();
        }
    }

    /// Current pool state, for tests and diagnostics.
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            current: state.current.as_ref().map(|c| c.holder.snapshot()),
            closing: state.closing.iter().map(|h| h.snapshot()).collect(),
            shut_down: state.shut_down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{fs, time::Duration};

    const URL: &str = "grpc://127.0.0.1:1";

    fn pool() -> ConnPool {
        ConnPool::new(RouterClientConfig::default())
    }

    /// At most one connection is neither closed nor scheduled to close.
    fn assert_single_live(p: &ConnPool) {
        let snap = p.snapshot();
        let live = snap
            .current
            .iter()
            .chain(snap.closing.iter())
            .filter(|h| !h.closed && !h.should_close)
            .count();
        assert!(live <= 1, "{snap:?}");
    }

    #[tokio::test]
    async fn same_target_reuses_connection() {
        let p = pool();
        let a = p.dial(DialTarget::new(URL, "tok")).unwrap();
        let b = p.dial(DialTarget::new(URL, "tok")).unwrap();
        assert_eq!(a.conn_id(), b.conn_id());
        assert_eq!(p.snapshot().current.unwrap().users, 2);

        drop(a);
        drop(b);
        let snap = p.snapshot();
        assert_eq!(snap.current.unwrap().users, 0);
        assert!(!snap.current.unwrap().closed);
        assert!(snap.closing.is_empty());
    }

    #[tokio::test]
    async fn idle_stale_connection_closes_immediately() {
        let p = pool();
        let first = p.dial(DialTarget::new(URL, "old")).unwrap().conn_id();
        let second = p.dial(DialTarget::new(URL, "new")).unwrap().conn_id();
        assert_ne!(first, second);
        assert!(p.snapshot().closing.is_empty());
        assert_single_live(&p);
    }

    #[tokio::test]
    async fn busy_stale_connection_closes_on_last_release() {
        let p = pool();
        let held = p.dial(DialTarget::new(URL, "old")).unwrap();
        let fresh = p.dial(DialTarget::new(URL, "new")).unwrap();
        assert_ne!(held.conn_id(), fresh.conn_id());

        let snap = p.snapshot();
        assert_eq!(snap.closing.len(), 1);
        let retired = snap.closing[0];
        assert!(retired.should_close && !retired.closed);
        assert_eq!(retired.users, 1);
        assert_single_live(&p);

        drop(held);
        assert!(p.snapshot().closing[0].closed);

        drop(fresh);
        let _again = p.dial(DialTarget::new(URL, "new")).unwrap();
        assert!(p.snapshot().closing.is_empty(), "closed holders are collected");
        assert_single_live(&p);
    }

    #[tokio::test]
    async fn newer_tls_file_makes_connection_stale() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.crt");
        fs::write(&ca, "unused for plaintext").unwrap();

        let mut target = DialTarget::new(URL, "tok");
        target.tls_ca_file = Some(ca.clone());

        let p = pool();
        let first = p.dial(target.clone()).unwrap().conn_id();
        assert_eq!(p.dial(target.clone()).unwrap().conn_id(), first);

        let later = SystemTime::now() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&ca)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let second = p.dial(target).unwrap().conn_id();
        assert_ne!(first, second);
        assert_single_live(&p);
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let p = pool();
        let held = p.dial(DialTarget::new(URL, "old")).unwrap();
        let _fresh = p.dial(DialTarget::new(URL, "new")).unwrap();

        p.shutdown();
        let snap = p.snapshot();
        assert!(snap.shut_down);
        assert!(snap.current.is_none());
        assert!(snap.closing.is_empty());
        assert!(held.holder.is_closed());
        assert!(held.is_closed(), "leases see the close");
        tokio::time::timeout(Duration::from_secs(1), held.closed())
            .await
            .expect("close wakes waiting calls");

        assert!(matches!(
            p.dial(DialTarget::new(URL, "new")),
            Err(RouterError::PoolClosed)
        ));
        p.shutdown();
    }

    #[tokio::test]
    async fn bad_scheme_leaves_current_untouched() {
        let p = pool();
        let id = p.dial(DialTarget::new(URL, "tok")).unwrap().conn_id();
        assert!(p.dial(DialTarget::new("ftp://r", "tok")).is_err());
        assert_eq!(p.snapshot().current.unwrap().id, id);
    }
}
