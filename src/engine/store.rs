use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedHallState;

/// In-memory hall state: one lock per hall plus a reservation -> hall index.
pub struct HallStore {
    halls: DashMap<Ulid, SharedHallState>,
    reservation_to_hall: DashMap<Ulid, Ulid>,
}

impl Default for HallStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HallStore {
    pub fn new() -> Self {
        Self {
            halls: DashMap::new(),
            reservation_to_hall: DashMap::new(),
        }
    }

    /// Rebuild state from a replayed event log. Events for unknown halls are skipped.
    pub fn from_events(events: &[Event]) -> Self {
        let store = Self::new();
        let mut halls: HashMap<Ulid, HallState> = HashMap::new();
        for event in events {
            match event {
                Event::HallCreated(settings) => {
                    halls.insert(settings.id, HallState::new(settings.clone()));
                }
                Event::HallDeleted { id } => {
                    if let Some(hs) = halls.remove(id) {
                        for r in &hs.reservations {
                            store.reservation_to_hall.remove(&r.id);
                        }
                    }
                }
                other => {
                    if let Some(hall_id) = event_hall_id(other)
                        && let Some(hs) = halls.get_mut(&hall_id)
                    {
                        store.apply_event(hs, other);
                    }
                }
            }
        }
        for (id, hs) in halls {
            store.halls.insert(id, Arc::new(RwLock::new(hs)));
        }
        store
    }

    // ── Halls ────────────────────────────────────────────────

    pub fn hall_count(&self) -> usize {
        self.halls.len()
    }

    pub fn contains_hall(&self, id: &Ulid) -> bool {
        self.halls.contains_key(id)
    }

    pub fn get_hall(&self, id: &Ulid) -> Option<SharedHallState> {
        self.halls.get(id).map(|e| e.value().clone())
    }

    pub fn insert_hall(&self, settings: HallSettings) {
        let id = settings.id;
        self.halls
            .insert(id, Arc::new(RwLock::new(HallState::new(settings))));
    }

    pub fn remove_hall(&self, id: &Ulid) -> Option<SharedHallState> {
        self.halls.remove(id).map(|(_, hs)| hs)
    }

    /// Hall ids in ascending order.
    pub fn hall_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.halls.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Reservation index ────────────────────────────────────

    pub fn hall_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_hall
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// Reserve `reservation_id` for `hall_id` in the index. `None` when the id
    /// is already taken, on any hall. The claim is released on drop unless
    /// committed.
    pub fn claim_reservation_id(&self, reservation_id: Ulid, hall_id: Ulid) -> Option<ReservationClaim<'_>> {
        match self.reservation_to_hall.entry(reservation_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(hall_id);
                Some(ReservationClaim {
                    store: self,
                    id: reservation_id,
                    committed: false,
                })
            }
        }
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_hall.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a hall-scoped event. The caller holds the hall's write lock.
    /// `HallCreated` and `HallDeleted` change the map itself and are ignored here.
    pub fn apply_event(&self, hs: &mut HallState, event: &Event) {
        match event {
            Event::HallUpdated(settings) => hs.apply_settings(settings.clone()),
            Event::ReservationConfirmed {
                id,
                hall_id,
                span,
                total_cost,
                requester,
            } => {
                hs.insert_reservation(Reservation {
                    id: *id,
                    hall_id: *hall_id,
                    span: *span,
                    total_cost: *total_cost,
                    requester: requester.clone(),
                });
                self.reservation_to_hall.insert(*id, *hall_id);
            }
            Event::ReservationModified {
                id,
                span,
                total_cost,
                ..
            } => {
                if let Some(mut r) = hs.remove_reservation(*id) {
                    r.span = *span;
                    r.total_cost = *total_cost;
                    hs.insert_reservation(r);
                }
            }
            Event::ReservationCancelled { id, .. } => {
                hs.remove_reservation(*id);
                self.reservation_to_hall.remove(id);
            }
            Event::HallCreated(_) | Event::HallDeleted { .. } => {}
        }
    }
}

/// A reservation id held in the index before its event is logged.
pub struct ReservationClaim<'a> {
    store: &'a HallStore,
    id: Ulid,
    committed: bool,
}

impl ReservationClaim<'_> {
    /// Keep the index entry; the reservation is now applied.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ReservationClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.reservation_to_hall.remove(&self.id);
        }
    }
}

/// The hall an event belongs to.
pub(crate) fn event_hall_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::HallCreated(settings) | Event::HallUpdated(settings) => Some(settings.id),
        Event::HallDeleted { id } => Some(*id),
        Event::ReservationConfirmed { hall_id, .. }
        | Event::ReservationModified { hall_id, .. }
        | Event::ReservationCancelled { hall_id, .. } => Some(*hall_id),
    }
}
