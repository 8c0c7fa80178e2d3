use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::engine::BookingError;
use crate::model::*;
use crate::wal::Wal;

use super::memory::InMemoryStore;
use super::{BookingStore, ReservationStore, ServiceStore, SlotStore, StoreResult, UserStore};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued, then
/// fsync once and answer every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::warn!("WAL flush of {} records failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so partial bytes don't leak into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// `InMemoryStore` made durable by a write-ahead log. Each write is fsynced to
/// the log before it becomes visible to readers.
pub struct DurableStore {
    memory: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writes hold it shared; compaction holds it exclusively so no write can
    /// land in the old log after the snapshot was taken.
    gate: RwLock<()>,
}

impl DurableStore {
    /// Replay the log at `path`, drop any torn tail, and start its writer
    /// task. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::recover(path)?;
        let memory = InMemoryStore::new();
        for event in &events {
            memory.apply_event(event);
        }
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));
        info!("opened WAL {} ({} records replayed)", path.display(), events.len());

        Ok(Self {
            memory,
            wal_tx,
            gate: RwLock::new(()),
        })
    }

    async fn wal_append(&self, event: &Event) -> StoreResult<()> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::Storage(e.to_string()))
    }

    /// WAL-append then apply to memory.
    async fn persist(&self, event: Event) -> StoreResult<()> {
        let _shared = self.gate.read().await;
        self.wal_append(&event).await?;
        self.memory.apply_event(&event);
        Ok(())
    }

    /// Rewrite the log with one record per live entity.
    pub async fn compact(&self) -> StoreResult<()> {
        let _exclusive = self.gate.write().await;
        let events = self.memory.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::Storage(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl UserStore for DurableStore {
    async fn find_user_by_id(&self, id: Ulid) -> StoreResult<Option<User>> {
        self.memory.find_user_by_id(id).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.memory.find_user_by_username(username).await
    }

    async fn save_user(&self, user: User) -> StoreResult<()> {
        self.persist(Event::UserSaved(user)).await
    }
}

#[async_trait]
impl ServiceStore for DurableStore {
    async fn find_service_by_id(&self, id: Ulid) -> StoreResult<Option<OfferedService>> {
        self.memory.find_service_by_id(id).await
    }

    async fn find_service_by_public_id(&self, public_id: Ulid) -> StoreResult<Option<OfferedService>> {
        self.memory.find_service_by_public_id(public_id).await
    }

    async fn find_service_by_owner_and_name(
        &self,
        owner_id: Ulid,
        name: &str,
    ) -> StoreResult<Option<OfferedService>> {
        self.memory.find_service_by_owner_and_name(owner_id, name).await
    }

    async fn list_services_for_owner(&self, owner_id: Ulid) -> StoreResult<Vec<OfferedService>> {
        self.memory.list_services_for_owner(owner_id).await
    }

    async fn save_service(&self, service: OfferedService) -> StoreResult<()> {
        self.persist(Event::ServiceSaved(service)).await
    }

    async fn delete_service(&self, id: Ulid) -> StoreResult<()> {
        self.persist(Event::ServiceDeleted { id }).await
    }
}

#[async_trait]
impl SlotStore for DurableStore {
    async fn find_time_slot_by_id(&self, id: Ulid) -> StoreResult<Option<TimeSlot>> {
        self.memory.find_time_slot_by_id(id).await
    }

    async fn find_time_slot_by_public_id(&self, public_id: Ulid) -> StoreResult<Option<TimeSlot>> {
        self.memory.find_time_slot_by_public_id(public_id).await
    }

    async fn save_time_slot(&self, slot: TimeSlot) -> StoreResult<()> {
        self.persist(Event::SlotSaved(slot)).await
    }

    async fn find_overlapping_slots_for_provider(
        &self,
        provider_id: Ulid,
        span: Span,
        exclude_slot_id: Option<Ulid>,
    ) -> StoreResult<Vec<TimeSlot>> {
        self.memory
            .find_overlapping_slots_for_provider(provider_id, span, exclude_slot_id)
            .await
    }

    async fn has_future_time_slots(&self, service_id: Ulid, now: Ms) -> StoreResult<bool> {
        self.memory.has_future_time_slots(service_id, now).await
    }

    async fn list_slots_for_service(&self, service_id: Ulid) -> StoreResult<Vec<TimeSlot>> {
        self.memory.list_slots_for_service(service_id).await
    }
}

#[async_trait]
impl BookingStore for DurableStore {
    async fn find_booking_by_id(&self, id: Ulid) -> StoreResult<Option<Booking>> {
        self.memory.find_booking_by_id(id).await
    }

    async fn save_booking(&self, booking: Booking) -> StoreResult<()> {
        self.persist(Event::BookingSaved(booking)).await
    }

    async fn count_bookings_for_slot(&self, slot_id: Ulid) -> StoreResult<u32> {
        self.memory.count_bookings_for_slot(slot_id).await
    }

    async fn exists_booking_for_client_and_slot(
        &self,
        client_id: Ulid,
        slot_id: Ulid,
    ) -> StoreResult<bool> {
        self.memory.exists_booking_for_client_and_slot(client_id, slot_id).await
    }

    async fn list_bookings_for_slot(&self, slot_id: Ulid) -> StoreResult<Vec<Booking>> {
        self.memory.list_bookings_for_slot(slot_id).await
    }

    async fn list_bookings_for_client(&self, client_id: Ulid) -> StoreResult<Vec<Booking>> {
        self.memory.list_bookings_for_client(client_id).await
    }
}

#[async_trait]
impl ReservationStore for DurableStore {
    async fn find_reservation_by_id(&self, id: Ulid) -> StoreResult<Option<Reservation>> {
        self.memory.find_reservation_by_id(id).await
    }

    async fn save_reservation(&self, reservation: Reservation) -> StoreResult<()> {
        self.persist(Event::ReservationSaved(reservation)).await
    }

    async fn delete_reservation(&self, id: Ulid) -> StoreResult<()> {
        self.persist(Event::ReservationDeleted { id }).await
    }

    async fn find_overlapping_reservations(
        &self,
        service_id: Ulid,
        span: Span,
        exclude_reservation_id: Option<Ulid>,
    ) -> StoreResult<Vec<Reservation>> {
        self.memory
            .find_overlapping_reservations(service_id, span, exclude_reservation_id)
            .await
    }

    async fn count_active_reservations_in_window(
        &self,
        service_id: Ulid,
        span: Span,
    ) -> StoreResult<usize> {
        self.memory.count_active_reservations_in_window(service_id, span).await
    }

    async fn list_reservations_for_user(&self, user_id: Ulid) -> StoreResult<Vec<Reservation>> {
        self.memory.list_reservations_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_durable");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn user(name: &str) -> User {
        User {
            id: Ulid::new(),
            username: name.into(),
            password_hash: "hash".into(),
            role: Role::Provider,
            active: true,
        }
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let path = test_wal_path("reopen.wal");
        let ana = user("ana");
        {
            let store = DurableStore::open(&path).unwrap();
            store.save_user(ana.clone()).await.unwrap();
        }
        let reopened = DurableStore::open(&path).unwrap();
        assert_eq!(reopened.find_user_by_id(ana.id).await.unwrap(), Some(ana));
    }

    #[tokio::test]
    async fn appends_after_torn_tail_survive_reopen() {
        use std::io::Write;

        let path = test_wal_path("torn_tail.wal");
        let ana = user("ana");
        {
            let store = DurableStore::open(&path).unwrap();
            store.save_user(ana.clone()).await.unwrap();
        }
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }

        let bea = user("bea");
        {
            let store = DurableStore::open(&path).unwrap();
            assert_eq!(store.find_user_by_id(ana.id).await.unwrap(), Some(ana.clone()));
            store.save_user(bea.clone()).await.unwrap();
        }

        let reopened = DurableStore::open(&path).unwrap();
        assert_eq!(reopened.find_user_by_id(ana.id).await.unwrap(), Some(ana));
        assert_eq!(reopened.find_user_by_id(bea.id).await.unwrap(), Some(bea));
    }

    #[tokio::test]
    async fn compaction_keeps_live_state_only() {
        let path = test_wal_path("compact.wal");
        let store = DurableStore::open(&path).unwrap();
        let mut ana = user("ana");
        for i in 0..10 {
            ana.username = format!("ana{i}");
            store.save_user(ana.clone()).await.unwrap();
        }
        assert_eq!(store.appends_since_compact().await, 10);

        store.compact().await.unwrap();
        assert_eq!(store.appends_since_compact().await, 0);
        assert_eq!(Wal::replay(&path).unwrap(), vec![Event::UserSaved(ana.clone())]);

        let reopened = DurableStore::open(&path).unwrap();
        assert_eq!(reopened.find_user_by_username("ana9").await.unwrap(), Some(ana));
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_durable() {
        let path = test_wal_path("group_commit.wal");
        let store = std::sync::Arc::new(DurableStore::open(&path).unwrap());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save_user(user(&format!("u{i}"))).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap().len(), 32);
    }
}
