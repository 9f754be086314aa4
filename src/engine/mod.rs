mod booking;
mod conflict;
mod error;
mod offices;
mod pricing;
mod queries;
#[cfg(test)]
mod tests;

pub use error::BookingError;
pub use pricing::{nights, quote};
pub use queries::ReservationFilter;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedOfficeState = Arc<RwLock<OfficeState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: all offices with their reservations, the WAL writer,
/// and the notice hub. Each office lives behind its own RwLock — that lock is
/// the per-office mutual exclusion of the booking critical section.
pub struct Engine {
    pub state: DashMap<Ulid, SharedOfficeState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → office id. Entries survive
    /// cancellation (reservations are never physically deleted).
    pub(super) reservation_to_office: DashMap<Ulid, Ulid>,
    /// Owner → offices index for host-side queries.
    pub(super) offices_by_owner: DashMap<Ulid, Vec<Ulid>>,
}

/// Apply an event directly to an OfficeState (no locking — caller holds the lock).
fn apply_to_office(os: &mut OfficeState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationBooked { reservation } => {
            os.insert_reservation(reservation.clone());
            index.insert(reservation.id, reservation.office_id);
        }
        Event::ReservationCancelled { id, .. } => {
            if let Some(r) = os.reservation_mut(id) {
                r.status = ReservationStatus::Cancelled;
            }
        }
        Event::OfficeUpdated {
            name,
            price_per_day,
            monthly_discount,
            approval,
            hidden,
            ..
        } => {
            os.office.name = name.clone();
            os.office.price_per_day = *price_per_day;
            os.office.monthly_discount = *monthly_discount;
            os.office.approval = *approval;
            os.office.hidden = *hidden;
        }
        // Registered/Delisted are handled at the DashMap level, not here
        Event::OfficeRegistered { .. } | Event::OfficeDelisted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            reservation_to_office: DashMap::new(),
            offices_by_owner: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::OfficeRegistered { office } => {
                    engine
                        .offices_by_owner
                        .entry(office.owner_id)
                        .or_default()
                        .push(office.id);
                    engine
                        .state
                        .insert(office.id, Arc::new(RwLock::new(OfficeState::new(office.clone()))));
                }
                Event::OfficeDelisted { id } => {
                    if let Some(entry) = engine.state.get(id) {
                        let os = entry.value().clone();
                        drop(entry);
                        let guard = os.try_read().expect("replay: uncontended read");
                        for r in &guard.reservations {
                            engine.reservation_to_office.remove(&r.id);
                        }
                        if let Some(mut ids) =
                            engine.offices_by_owner.get_mut(&guard.office.owner_id)
                        {
                            ids.retain(|o| o != id);
                        }
                    }
                    engine.state.remove(id);
                }
                other => {
                    if let Some(office_id) = event_office_id(other)
                        && let Some(entry) = engine.state.get(&office_id)
                    {
                        let os = entry.value().clone();
                        drop(entry);
                        let mut guard = os.try_write().expect("replay: uncontended write");
                        apply_to_office(&mut guard, other, &engine.reservation_to_office);
                    }
                }
            }
        }
        metrics::gauge!(crate::observability::OFFICES_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    pub fn get_office(&self, id: &Ulid) -> Option<SharedOfficeState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn office_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_office
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// WAL-append + apply in one call. The WAL append either commits or fails
    /// before any in-memory state changes, so a persistence failure surfaces
    /// as WalError with nothing applied.
    pub(super) async fn persist_and_apply(
        &self,
        os: &mut OfficeState,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        apply_to_office(os, event, &self.reservation_to_office);
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state. Reservations re-emit with their current status, so
    /// cancelled stays survive compaction (soft lifecycle).
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let mut events = Vec::new();
        let office_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in office_ids {
            let Some(os) = self.get_office(&id) else {
                continue;
            };
            // Waits out any in-flight booking on this office.
            let guard = os.read().await;
            events.push(Event::OfficeRegistered {
                office: guard.office.clone(),
            });
            for reservation in &guard.reservations {
                events.push(Event::ReservationBooked {
                    reservation: reservation.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
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

/// Extract the office id an event applies to (for non-Register/Delist events).
fn event_office_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ReservationBooked { reservation } => Some(reservation.office_id),
        Event::ReservationCancelled { office_id, .. } => Some(*office_id),
        Event::OfficeUpdated { id, .. } => Some(*id),
        Event::OfficeRegistered { .. } | Event::OfficeDelisted { .. } => None,
    }
}
