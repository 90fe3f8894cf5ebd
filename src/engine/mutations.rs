use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::dates::start_of_day;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_span};
use super::pricing::validate_rate;
use super::{Engine, EngineError, WalCommand};

fn validate_settings(settings: &HallSettings) -> Result<(), EngineError> {
    if settings.capacity == 0 {
        return Err(EngineError::InvalidCapacity);
    }
    validate_rate(settings.rate_per_day)?;
    if let Some(ref n) = settings.name
        && n.len() > MAX_NAME_LEN
    {
        return Err(EngineError::LimitExceeded("hall name too long"));
    }
    if let (Some(from), Some(to)) = (settings.available_from, settings.available_to)
        && from >= to
    {
        return Err(EngineError::InvalidSpan { start: from, end: to });
    }
    Ok(())
}

fn validate_requester(requester: &Requester) -> Result<(), EngineError> {
    if requester.name.len() > MAX_REQUESTER_FIELD_LEN {
        return Err(EngineError::LimitExceeded("requester name too long"));
    }
    if requester.company.len() > MAX_REQUESTER_FIELD_LEN {
        return Err(EngineError::LimitExceeded("requester company too long"));
    }
    Ok(())
}

impl Engine {
    // ── Halls ────────────────────────────────────────────────

    pub async fn create_hall(&self, settings: HallSettings) -> Result<(), EngineError> {
        validate_settings(&settings)?;
        let _admin = self.admin.lock().await;
        if self.store.hall_count() >= MAX_HALLS {
            return Err(EngineError::LimitExceeded("too many halls"));
        }
        if self.store.contains_hall(&settings.id) {
            return Err(EngineError::AlreadyExists(settings.id));
        }

        let id = settings.id;
        self.wal_append(&Event::HallCreated(settings.clone())).await?;
        self.store.insert_hall(settings);
        metrics::gauge!(observability::HALLS_ACTIVE).set(self.store.hall_count() as f64);
        info!("hall {id} created");
        Ok(())
    }

    /// Replace a hall's administrative settings. Existing reservations keep their price.
    pub async fn update_hall(&self, settings: HallSettings) -> Result<(), EngineError> {
        validate_settings(&settings)?;
        self.reconfigure_hall(settings.id, |_| settings).await?;
        Ok(())
    }

    /// Apply only the columns set in `changes`, merged with the hall's settings
    /// as they stand under the write lock.
    pub async fn update_hall_with(&self, id: Ulid, changes: HallChanges) -> Result<HallSettings, EngineError> {
        self.reconfigure_hall(id, |current| changes.apply_to(current))
            .await
    }

    async fn reconfigure_hall(
        &self,
        id: Ulid,
        change: impl FnOnce(HallSettings) -> HallSettings,
    ) -> Result<HallSettings, EngineError> {
        let mut guard = self.hall_write(&id).await?;
        let settings = change(guard.settings());
        validate_settings(&settings)?;
        self.persist_and_apply(&mut guard, &Event::HallUpdated(settings.clone()))
            .await?;
        debug!("hall {id} updated");
        Ok(settings)
    }

    /// Remove a hall that has no reservations left.
    pub async fn delete_hall(&self, id: Ulid) -> Result<(), EngineError> {
        let _admin = self.admin.lock().await;
        let mut guard = self.hall_write(&id).await?;
        if !guard.reservations.is_empty() {
            return Err(EngineError::HasReservations(id));
        }

        self.wal_append(&Event::HallDeleted { id }).await?;
        guard.deleted = true;
        self.store.remove_hall(&id);
        drop(guard);
        metrics::gauge!(observability::HALLS_ACTIVE).set(self.store.hall_count() as f64);
        info!("hall {id} deleted");
        Ok(())
    }

    // ── Reservations ─────────────────────────────────────────

    /// Book `[start, end)` on a hall.
    ///
    /// On overlap the error carries alternative windows of the same length
    /// found around the requested range.
    pub async fn submit_booking(
        &self,
        id: Ulid,
        hall_id: Ulid,
        start: Ms,
        end: Ms,
        requester: Requester,
    ) -> Result<Reservation, EngineError> {
        let span = validate_span(start, end)?;
        validate_requester(&requester)?;
        let now = self.now_ms();
        if span.start < start_of_day(now) {
            return Err(EngineError::StartInPast { start, now });
        }

        let mut guard = self.hall_write(&hall_id).await?;
        if self.store.hall_for_reservation(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_HALL {
            return Err(EngineError::LimitExceeded("too many reservations on hall"));
        }
        if !guard.availability_bounds().contains_span(&span) {
            return Err(EngineError::OutsideAvailability { hall_id });
        }
        self.ensure_free(&guard, &span, None)?;

        let total_cost = self.config.pricing.price(&span, guard.rate_per_day)?;
        // Ids are global but the lock is per hall: take the id in the index
        // before logging so a racing booking on another hall cannot reuse it.
        let claim = self
            .store
            .claim_reservation_id(id, hall_id)
            .ok_or(EngineError::AlreadyExists(id))?;
        let reservation = Reservation {
            id,
            hall_id,
            span,
            total_cost,
            requester: requester.clone(),
        };
        let event = Event::ReservationConfirmed {
            id,
            hall_id,
            span,
            total_cost,
            requester,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        claim.commit();
        metrics::counter!(observability::BOOKINGS_CONFIRMED_TOTAL).increment(1);
        info!("reservation {id} confirmed on hall {hall_id}, cost {total_cost:.2}");
        Ok(reservation)
    }

    /// Move a reservation to `[start, end)` and re-price it.
    /// The reservation never conflicts with itself.
    pub async fn modify_booking(&self, id: Ulid, start: Ms, end: Ms) -> Result<Reservation, EngineError> {
        validate_span(start, end)?;
        self.reschedule_booking(id, Some(start), Some(end)).await
    }

    /// Like `modify_booking`, but a `None` bound keeps the reservation's
    /// current value as read under the hall's write lock.
    pub async fn reschedule_booking(
        &self,
        id: Ulid,
        start: Option<Ms>,
        end: Option<Ms>,
    ) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard
            .get_reservation(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        let start = start.unwrap_or(current.span.start);
        let span = validate_span(start, end.unwrap_or(current.span.end))?;

        let now = self.now_ms();
        if span.start != current.span.start && span.start < start_of_day(now) {
            return Err(EngineError::StartInPast { start, now });
        }
        if !guard.availability_bounds().contains_span(&span) {
            return Err(EngineError::OutsideAvailability {
                hall_id: current.hall_id,
            });
        }
        self.ensure_free(&guard, &span, Some(id))?;

        let total_cost = self.config.pricing.price(&span, guard.rate_per_day)?;
        let event = Event::ReservationModified {
            id,
            hall_id: current.hall_id,
            span,
            total_cost,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("reservation {id} moved to [{}, {})", span.start, span.end);
        Ok(Reservation {
            span,
            total_cost,
            ..current
        })
    }

    /// Release a reservation, returning what was cancelled.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard
            .get_reservation(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        let event = Event::ReservationCancelled {
            id,
            hall_id: current.hall_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("reservation {id} cancelled");
        Ok(current)
    }

    /// Conflict check for the mutation paths. On overlap the error carries
    /// suggestions. Caller holds the hall write lock.
    fn ensure_free(&self, hall: &HallState, span: &Span, exclude: Option<Ulid>) -> Result<(), EngineError> {
        match check_no_conflict(hall, span, exclude) {
            Err(EngineError::Conflict { with, .. }) => {
                let suggestions = self.suggestions_for(hall, span);
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                debug!("hall {} conflicts with {with}, {} suggestions", hall.id, suggestions.len());
                Err(EngineError::Conflict { with, suggestions })
            }
            other => other,
        }
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with just the events needed to rebuild current state.
    /// No-op when running in memory.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };

        // Hold the admin lock and every hall's read lock until the swap is done,
        // so no append can land between the snapshot and the new file.
        let _admin = self.admin.lock().await;
        let mut guards = Vec::new();
        for id in self.store.hall_ids() {
            if let Some(hs) = self.store.get_hall(&id) {
                guards.push(hs.read_owned().await);
            }
        }

        let mut events = Vec::with_capacity(guards.len() + self.store.reservation_count());
        for hall in &guards {
            events.push(Event::HallCreated(hall.settings()));
            for r in &hall.reservations {
                events.push(Event::ReservationConfirmed {
                    id: r.id,
                    hall_id: r.hall_id,
                    span: r.span,
                    total_cost: r.total_cost,
                    requester: r.requester.clone(),
                });
            }
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
