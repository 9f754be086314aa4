use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, SharedOfficeState};

/// Filters for reservation listings.
#[derive(Debug, Default, Clone)]
pub struct ReservationFilter {
    pub office_id: Option<Ulid>,
    /// Host listings only: narrow to one guest.
    pub user_id: Option<Ulid>,
    pub status: Option<ReservationStatus>,
    /// Stays overlapping this window (inclusive, same semantics as booking).
    pub window: Option<DateRange>,
    pub limit: Option<usize>,
}

impl ReservationFilter {
    fn matches(&self, r: &Reservation) -> bool {
        if let Some(office_id) = self.office_id
            && r.office_id != office_id
        {
            return false;
        }
        if let Some(user_id) = self.user_id
            && r.user_id != user_id
        {
            return false;
        }
        if let Some(status) = self.status
            && r.status != status
        {
            return false;
        }
        if let Some(window) = &self.window
            && !r.range.overlaps(window)
        {
            return false;
        }
        true
    }

    fn page(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }
}

impl Engine {
    /// Reservations made by a user, oldest first.
    pub async fn user_reservations(
        &self,
        user_id: Ulid,
        filter: &ReservationFilter,
    ) -> Vec<Reservation> {
        let offices: Vec<SharedOfficeState> = match filter.office_id {
            Some(office_id) => self.get_office(&office_id).into_iter().collect(),
            None => self.state.iter().map(|e| e.value().clone()).collect(),
        };
        let mut out = Vec::new();
        for os in offices {
            let guard = os.read().await;
            for r in &guard.reservations {
                if r.user_id == user_id && filter.matches(r) {
                    out.push(r.clone());
                }
            }
        }
        out.sort_by_key(|r| r.id);
        out.truncate(filter.page());
        out
    }

    /// Reservations on the offices a host owns, oldest first.
    pub async fn host_reservations(
        &self,
        host_id: Ulid,
        filter: &ReservationFilter,
    ) -> Vec<Reservation> {
        let office_ids: Vec<Ulid> = self
            .offices_by_owner
            .get(&host_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out = Vec::new();
        for office_id in office_ids {
            if let Some(wanted) = filter.office_id
                && wanted != office_id
            {
                continue;
            }
            let Some(os) = self.get_office(&office_id) else {
                continue;
            };
            let guard = os.read().await;
            for r in &guard.reservations {
                if filter.matches(r) {
                    out.push(r.clone());
                }
            }
        }
        out.sort_by_key(|r| r.id);
        out.truncate(filter.page());
        out
    }

    /// Public listing: approved, visible offices, ordered by id. Passing
    /// `owner` instead returns all of that owner's offices, pending and
    /// hidden included.
    pub async fn list_offices(&self, owner: Option<Ulid>) -> Vec<OfficeSummary> {
        let offices: Vec<SharedOfficeState> = match owner {
            Some(owner_id) => {
                let ids: Vec<Ulid> = self
                    .offices_by_owner
                    .get(&owner_id)
                    .map(|e| e.value().clone())
                    .unwrap_or_default();
                ids.iter().filter_map(|id| self.get_office(id)).collect()
            }
            None => self.state.iter().map(|e| e.value().clone()).collect(),
        };

        let mut out = Vec::new();
        for os in offices {
            let guard = os.read().await;
            if owner.is_none() && !guard.office.is_bookable() {
                continue;
            }
            out.push(OfficeSummary {
                office: guard.office.clone(),
                active_reservations: guard.reservations.iter().filter(|r| r.is_active()).count(),
            });
        }
        out.sort_by_key(|s| s.office.id);
        out
    }

    pub async fn office_summary(&self, id: &Ulid) -> Option<OfficeSummary> {
        let os = self.get_office(id)?;
        let guard = os.read().await;
        Some(OfficeSummary {
            office: guard.office.clone(),
            active_reservations: guard.reservations.iter().filter(|r| r.is_active()).count(),
        })
    }
}
