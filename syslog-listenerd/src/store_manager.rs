use std::thread;
use tokio::sync::{mpsc, oneshot};
use chrono::{DateTime, Utc};
use shared::types::{CanonicalLogRecord, Device, LogEntry, StoreSummary};
use crate::store::{LogDb, PersistOutcome, StoreError};

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// Commands sent to the store thread
pub enum StoreCommand {
    Persist(CanonicalLogRecord, Reply<PersistOutcome>),
    ResolveDevice(String, Reply<(Device, bool)>),
    GetDevice(String, Reply<Option<Device>>),
    ListDevices(Reply<Vec<Device>>),
    RecentEntries {
        device_ip: String,
        limit: u32,
        reply: Reply<Vec<LogEntry>>,
    },
    CountEntries(Reply<u64>),
    Summary(DateTime<Utc>, Reply<StoreSummary>),
    Shutdown,
}

/// Handle to the store thread. The SQLite connection lives on that thread;
/// every caller goes through this channel.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn a new store thread owning the given database
    pub fn spawn(mut db: LogDb) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Persist(record, reply) => {
                        let _ = reply.send(db.persist(&record));
                    }
                    StoreCommand::ResolveDevice(ip_address, reply) => {
                        let _ = reply.send(db.resolve_device(&ip_address));
                    }
                    StoreCommand::GetDevice(ip_address, reply) => {
                        let _ = reply.send(db.get_device(&ip_address));
                    }
                    StoreCommand::ListDevices(reply) => {
                        let _ = reply.send(db.list_devices());
                    }
                    StoreCommand::RecentEntries { device_ip, limit, reply } => {
                        let _ = reply.send(db.recent_entries(&device_ip, limit));
                    }
                    StoreCommand::CountEntries(reply) => {
                        let _ = reply.send(db.count_entries());
                    }
                    StoreCommand::Summary(since, reply) => {
                        let _ = reply.send(db.summary(since));
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Persist one record in a single transaction
    pub async fn persist(&self, record: CanonicalLogRecord) -> Result<PersistOutcome, StoreError> {
        self.request(|reply| StoreCommand::Persist(record, reply)).await
    }

    /// Get-or-create the device for a source identifier
    pub async fn resolve_device(&self, ip_address: String) -> Result<(Device, bool), StoreError> {
        self.request(|reply| StoreCommand::ResolveDevice(ip_address, reply)).await
    }

    pub async fn get_device(&self, ip_address: String) -> Result<Option<Device>, StoreError> {
        self.request(|reply| StoreCommand::GetDevice(ip_address, reply)).await
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        self.request(StoreCommand::ListDevices).await
    }

    pub async fn recent_entries(&self, device_ip: String, limit: u32) -> Result<Vec<LogEntry>, StoreError> {
        self.request(|reply| StoreCommand::RecentEntries { device_ip, limit, reply }).await
    }

    pub async fn count_entries(&self) -> Result<u64, StoreError> {
        self.request(StoreCommand::CountEntries).await
    }

    pub async fn summary(&self, since: DateTime<Utc>) -> Result<StoreSummary, StoreError> {
        self.request(|reply| StoreCommand::Summary(since, reply)).await
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.tx.send(StoreCommand::Shutdown).await.map_err(|_| StoreError::Closed)
    }
}
