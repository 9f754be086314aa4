use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{BookingError, Engine};

impl Engine {
    /// Add an office to the registry. The record is stored as handed in —
    /// newly listed offices normally arrive as Pending and hidden=false.
    pub async fn register_office(&self, office: Office) -> Result<(), BookingError> {
        if self.state.len() >= MAX_OFFICES {
            return Err(BookingError::LimitExceeded("too many offices"));
        }
        if office.name.is_empty() || office.name.len() > MAX_NAME_LEN {
            return Err(BookingError::LimitExceeded("office name length"));
        }
        if office.price_per_day <= 0 {
            return Err(BookingError::LimitExceeded("price per day must be positive"));
        }
        if let Some(pct) = office.monthly_discount
            && pct > 100
        {
            return Err(BookingError::LimitExceeded("monthly discount over 100"));
        }
        if self.state.contains_key(&office.id) {
            return Err(BookingError::AlreadyExists(office.id));
        }

        let event = Event::OfficeRegistered {
            office: office.clone(),
        };
        self.wal_append(&event).await?;
        self.offices_by_owner
            .entry(office.owner_id)
            .or_default()
            .push(office.id);
        self.state
            .insert(office.id, Arc::new(RwLock::new(OfficeState::new(office))));
        metrics::gauge!(crate::observability::OFFICES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Update the listing fields of an office. Owner and id are immutable;
    /// approval transitions travel through here as plain record updates.
    pub async fn update_office(
        &self,
        id: Ulid,
        name: String,
        price_per_day: i64,
        monthly_discount: Option<u8>,
        approval: ApprovalStatus,
        hidden: bool,
    ) -> Result<Office, BookingError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(BookingError::LimitExceeded("office name length"));
        }
        if price_per_day <= 0 {
            return Err(BookingError::LimitExceeded("price per day must be positive"));
        }
        if let Some(pct) = monthly_discount
            && pct > 100
        {
            return Err(BookingError::LimitExceeded("monthly discount over 100"));
        }
        let os = self
            .get_office(&id)
            .ok_or(BookingError::OfficeNotFound(id))?;
        let mut guard = os.write().await;

        let event = Event::OfficeUpdated {
            id,
            name,
            price_per_day,
            monthly_discount,
            approval,
            hidden,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.office.clone())
    }

    /// Remove an office from the registry. Refused while the office still has
    /// Active reservations, matching the listing lifecycle: cancel or sit out
    /// the stays first.
    pub async fn delist_office(&self, id: Ulid) -> Result<(), BookingError> {
        let os = self
            .get_office(&id)
            .ok_or(BookingError::OfficeNotFound(id))?;
        let guard = os.write().await;
        if guard.has_active_reservations() {
            return Err(BookingError::HasActiveReservations(id));
        }
        let owner_id = guard.office.owner_id;
        let reservation_ids: Vec<Ulid> = guard.reservations.iter().map(|r| r.id).collect();

        let event = Event::OfficeDelisted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        for rid in reservation_ids {
            self.reservation_to_office.remove(&rid);
        }
        if let Some(mut ids) = self.offices_by_owner.get_mut(&owner_id) {
            ids.retain(|o| o != &id);
        }
        drop(guard);
        metrics::gauge!(crate::observability::OFFICES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }
}
