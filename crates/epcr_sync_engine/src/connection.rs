//! Store connection with bounded retry.

use crate::cancel::CancelToken;
use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use epcr_audit::AuditLog;
use epcr_storage::{RowSet, SharedStore, SqliteStore, Statement, StorageResult, Store};
use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;

const SOURCE: &str = "connection";
const BRING_UP_SOURCE: &str = "connection.bring_up";

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    /// Store location: a file path or a `scheme://host/...` URL.
    pub location: String,
    /// User name, if the store requires one.
    pub user: Option<String>,
    /// Password, if the store requires one.
    pub password: Option<String>,
}

impl StoreCredentials {
    /// Credentials for a store that needs no login.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            user: None,
            password: None,
        }
    }

    /// Sets the login.
    pub fn with_login(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Returns true if the store is hosted on this machine.
    ///
    /// Plain paths are local. URLs are local when their host is a loopback
    /// name or address.
    pub fn is_local(&self) -> bool {
        let Some((_, rest)) = self.location.split_once("://") else {
            return true;
        };
        let authority = rest.split('/').next().unwrap_or_default();
        let host_port = authority.rsplit('@').next().unwrap_or_default();
        let host = if let Some(bracketed) = host_port.strip_prefix('[') {
            bracketed.split(']').next().unwrap_or_default()
        } else {
            host_port.split(':').next().unwrap_or_default()
        };
        matches!(host, "localhost" | "127.0.0.1" | "::1" | "")
    }
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("location", &self.location)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Opens physical store connections.
pub trait StoreConnector: Send + Sync {
    /// Makes one connection attempt.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the caller decides whether to retry.
    fn connect(&self, credentials: &StoreCredentials) -> StorageResult<Box<dyn Store>>;
}

/// Connects to SQLite database files.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    install_schema: bool,
}

impl SqliteConnector {
    /// Creates a connector that opens the database as is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the record schema on every new connection.
    pub fn with_schema(mut self) -> Self {
        self.install_schema = true;
        self
    }
}

impl StoreConnector for SqliteConnector {
    fn connect(&self, credentials: &StoreCredentials) -> StorageResult<Box<dyn Store>> {
        let mut store = SqliteStore::open(&credentials.location)?;
        if self.install_schema {
            epcr_core::schema::install(&mut store)?;
        }
        Ok(Box::new(store))
    }
}

/// An external process that starts a local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpCommand {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl BringUpCommand {
    /// Creates a command.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Splits a command line on whitespace. Returns `None` if it is blank.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// Runs the command and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub async fn run(&self) -> std::io::Result<ExitStatus> {
        tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .status()
            .await
    }
}

impl fmt::Display for BringUpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Lifecycle of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; `connect` may be called.
    Disconnected,
    /// A connect sequence is running.
    Connecting,
    /// The connection is open.
    Connected,
    /// The last connect sequence gave up; `connect` may be called again.
    Failed,
}

impl ConnectionState {
    /// Returns true if a connect sequence may start from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Owns one store connection.
///
/// `connect` makes up to [`RetryConfig::max_attempts`] attempts with a
/// fixed delay between them. Each failed attempt is written to the audit
/// log with its cause chain; only exhaustion is returned to the caller.
/// When the target is local and a [`BringUpCommand`] is configured, the
/// command runs once after the first failure of a sequence.
///
/// There is no automatic reconnect after [`ConnectionState::Failed`].
pub struct ConnectionManager {
    connector: Arc<dyn StoreConnector>,
    retry: RetryConfig,
    bring_up: Option<BringUpCommand>,
    audit: Option<AuditLog>,
    cancel: CancelToken,
    state: ConnectionState,
    store: Option<SharedStore>,
    last_attempts: u32,
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    pub fn new(connector: Arc<dyn StoreConnector>, retry: RetryConfig) -> Self {
        Self {
            connector,
            retry,
            bring_up: None,
            audit: None,
            cancel: CancelToken::new(),
            state: ConnectionState::Disconnected,
            store: None,
            last_attempts: 0,
        }
    }

    /// Sets the command that starts a local store.
    pub fn with_bring_up(mut self, command: BringUpCommand) -> Self {
        self.bring_up = Some(command);
        self
    }

    /// Sets the audit log that receives attempt failures.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Sets the token that interrupts a connect sequence.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true if the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Returns the number of attempts made by the last connect sequence.
    pub fn last_attempts(&self) -> u32 {
        self.last_attempts
    }

    /// Opens the connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connectivity`] once every attempt has failed,
    /// [`SyncError::Cancelled`] if the token fires, and
    /// [`SyncError::InvalidStateTransition`] if already connected.
    pub async fn connect(&mut self, credentials: &StoreCredentials) -> SyncResult<()> {
        if !self.state.can_connect() {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.to_string(),
                to: ConnectionState::Connecting.to_string(),
            });
        }
        self.state = ConnectionState::Connecting;
        self.last_attempts = 0;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut brought_up = false;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                self.state = ConnectionState::Disconnected;
                return Err(SyncError::Cancelled);
            }
            self.last_attempts = attempt;

            match self.connector.connect(credentials) {
                Ok(store) => {
                    self.store = Some(SharedStore::new(store));
                    self.state = ConnectionState::Connected;
                    tracing::info!(location = %credentials.location, attempt, "store connected");
                    return Ok(());
                }
                Err(e) => {
                    let message = format!(
                        "connect attempt {attempt}/{max_attempts} to {} failed",
                        credentials.location
                    );
                    tracing::warn!(error = %e, "{message}");
                    if let Some(audit) = &self.audit {
                        audit.record_error(SOURCE, message, &e);
                    }
                }
            }

            if attempt == max_attempts {
                break;
            }

            if !brought_up && credentials.is_local() {
                if let Some(command) = self.bring_up.clone() {
                    brought_up = true;
                    self.run_bring_up(&command).await;
                }
            }

            let delay = self.retry.delay_for_attempt(attempt + 1);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.state = ConnectionState::Disconnected;
                    return Err(SyncError::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state = ConnectionState::Failed;
        let message = format!(
            "could not connect to {} after {max_attempts} attempts",
            credentials.location
        );
        tracing::error!("{message}");
        Err(SyncError::connectivity(message, false))
    }

    async fn run_bring_up(&self, command: &BringUpCommand) {
        tracing::info!(%command, "starting local store");
        match command.run().await {
            Ok(status) if status.success() => {
                if let Some(audit) = &self.audit {
                    audit.record(BRING_UP_SOURCE, format!("`{command}` exited successfully"));
                }
            }
            Ok(status) => {
                tracing::warn!(%command, %status, "bring-up command failed");
                if let Some(audit) = &self.audit {
                    audit.record(BRING_UP_SOURCE, format!("`{command}` exited with {status}"));
                }
            }
            Err(e) => {
                tracing::warn!(%command, error = %e, "bring-up command could not start");
                if let Some(audit) = &self.audit {
                    audit.record_error(BRING_UP_SOURCE, format!("`{command}` could not start"), &e);
                }
            }
        }
    }

    /// Returns a handle to the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] unless connected.
    pub fn store(&self) -> SyncResult<SharedStore> {
        match (&self.store, self.state) {
            (Some(store), ConnectionState::Connected) => Ok(store.clone()),
            _ => Err(SyncError::NotConnected),
        }
    }

    /// Runs a read request on the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] unless connected, or the store's
    /// error as [`SyncError::Data`].
    pub fn query(&self, stmt: &Statement) -> SyncResult<RowSet> {
        Ok(self.store()?.query(stmt)?)
    }

    /// Runs a write request on the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] unless connected, or the store's
    /// error as [`SyncError::Data`].
    pub fn update(&self, stmt: &Statement) -> SyncResult<usize> {
        Ok(self.store()?.update(stmt)?)
    }

    /// Drops this manager's handle to the connection.
    pub fn disconnect(&mut self) {
        self.store = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("retry", &self.retry)
            .field("bring_up", &self.bring_up)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcr_audit::{LogConfig, LogService, MemorySink};
    use epcr_storage::StorageError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyConnector {
        failures: u32,
        attempts: AtomicU32,
    }

    impl FlakyConnector {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                attempts: AtomicU32::new(0),
            })
        }
    }

    impl StoreConnector for FlakyConnector {
        fn connect(&self, _credentials: &StoreCredentials) -> StorageResult<Box<dyn Store>> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(StorageError::Rejected(format!("refused #{n}")));
            }
            Ok(Box::new(SqliteStore::open_in_memory()?))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::default().with_delay(Duration::from_millis(1))
    }

    fn audit() -> (LogService, MemorySink) {
        let sink = MemorySink::new();
        let mut service = LogService::new(Box::new(sink.clone()), LogConfig::default());
        service.start().unwrap();
        (service, sink)
    }

    fn connection_failures(sink: &MemorySink) -> usize {
        sink.entries()
            .iter()
            .filter(|e| e.source == SOURCE && e.is_error())
            .count()
    }

    #[test]
    fn credentials_locality() {
        assert!(StoreCredentials::new("/var/lib/epcr/unit.db").is_local());
        assert!(StoreCredentials::new("mysql://localhost:3306/epcr").is_local());
        assert!(StoreCredentials::new("mysql://user@127.0.0.1/epcr").is_local());
        assert!(StoreCredentials::new("pg://[::1]:5432/epcr").is_local());
        assert!(!StoreCredentials::new("mysql://center.example.org/epcr").is_local());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = StoreCredentials::new("x").with_login("medic", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn bring_up_parse() {
        let cmd = BringUpCommand::parse("  pg_ctl start -D /data ").unwrap();
        assert_eq!(cmd.program, "pg_ctl");
        assert_eq!(cmd.args, vec!["start", "-D", "/data"]);
        assert_eq!(cmd.to_string(), "pg_ctl start -D /data");
        assert!(BringUpCommand::parse("   ").is_none());
    }

    #[tokio::test]
    async fn succeeds_after_k_failures_with_k_log_entries() {
        let (mut service, sink) = audit();
        let connector = FlakyConnector::new(7);
        let mut manager =
            ConnectionManager::new(connector.clone(), fast_retry()).with_audit(service.handle());

        manager.connect(&StoreCredentials::new(":memory:")).await.unwrap();
        service.stop().unwrap();

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.last_attempts(), 8);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 8);
        assert_eq!(connection_failures(&sink), 7);
        let entries = sink.entries();
        assert!(entries[0].error.as_deref().unwrap().contains("refused #1"));
    }

    #[tokio::test]
    async fn gives_up_after_twenty_attempts() {
        let (mut service, sink) = audit();
        let connector = FlakyConnector::new(u32::MAX);
        let mut manager =
            ConnectionManager::new(connector.clone(), fast_retry()).with_audit(service.handle());

        let err = manager
            .connect(&StoreCredentials::new(":memory:"))
            .await
            .unwrap_err();
        service.stop().unwrap();

        assert!(matches!(err, SyncError::Connectivity { retryable: false, .. }));
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 20);
        assert_eq!(connection_failures(&sink), 20);
        assert!(matches!(manager.store(), Err(SyncError::NotConnected)));
    }

    #[tokio::test]
    async fn failed_manager_can_connect_again() {
        let connector = FlakyConnector::new(3);
        let mut manager = ConnectionManager::new(connector, RetryConfig::new(2).with_delay(Duration::ZERO));
        let creds = StoreCredentials::new(":memory:");

        assert!(manager.connect(&creds).await.is_err());
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert!(manager.connect(&creds).await.is_ok());
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let mut manager = ConnectionManager::new(FlakyConnector::new(0), fast_retry());
        let creds = StoreCredentials::new(":memory:");
        manager.connect(&creds).await.unwrap();
        assert!(matches!(
            manager.connect(&creds).await,
            Err(SyncError::InvalidStateTransition { .. })
        ));
        manager.disconnect();
        assert!(matches!(
            manager.query(&Statement::new("SELECT 1")),
            Err(SyncError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn cancel_interrupts_retry_delay() {
        let cancel = CancelToken::new();
        let connector = FlakyConnector::new(u32::MAX);
        let mut manager = ConnectionManager::new(
            connector.clone(),
            RetryConfig::default().with_delay(Duration::from_secs(60)),
        )
        .with_cancel(cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            manager.connect(&StoreCredentials::new(":memory:")),
        )
        .await
        .unwrap();
        trigger.await.unwrap();

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_and_update_go_through_the_connection() {
        let mut manager = ConnectionManager::new(FlakyConnector::new(0), fast_retry());
        manager.connect(&StoreCredentials::new(":memory:")).await.unwrap();
        manager
            .update(&Statement::new("CREATE TABLE t (v INTEGER)"))
            .unwrap();
        let n = manager
            .update(&Statement::new("INSERT INTO t VALUES (?1)").bind(5i64))
            .unwrap();
        assert_eq!(n, 1);
        let rows = manager.query(&Statement::new("SELECT v FROM t")).unwrap();
        assert_eq!(rows.first().unwrap().get_i64(0).unwrap(), 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bring_up_runs_once_per_sequence() {
        let (mut service, sink) = audit();
        let mut manager = ConnectionManager::new(FlakyConnector::new(5), fast_retry())
            .with_bring_up(BringUpCommand::new("true"))
            .with_audit(service.handle());

        manager.connect(&StoreCredentials::new("/tmp/unit.db")).await.unwrap();
        service.stop().unwrap();

        let bring_ups = sink
            .entries()
            .iter()
            .filter(|e| e.source == BRING_UP_SOURCE)
            .count();
        assert_eq!(bring_ups, 1);
        assert_eq!(connection_failures(&sink), 5);
    }

    #[tokio::test]
    async fn bring_up_skipped_for_remote_store() {
        let (mut service, sink) = audit();
        let mut manager = ConnectionManager::new(FlakyConnector::new(2), fast_retry())
            .with_bring_up(BringUpCommand::new("does-not-exist-epcr"))
            .with_audit(service.handle());

        manager
            .connect(&StoreCredentials::new("mysql://center.example.org/epcr"))
            .await
            .unwrap();
        service.stop().unwrap();

        assert!(sink.entries().iter().all(|e| e.source != BRING_UP_SOURCE));
    }
}
