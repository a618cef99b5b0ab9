//! In-process backend. Rows live in `RwLock`-guarded vectors and are lost on restart.
//!
//! Enforces the same `(table_id, date, time)` uniqueness as the Postgres schema so
//! store behaviour matches across backends. A failure can be armed with
//! `fail_next` to exercise the remote-error paths.
use super::{MemberBackend, ReservationBackend};
use async_trait::async_trait;
use shared::{Member, MemberUpdate, NewReservation, Reservation, StoreError, StoreResult, MSG_SLOT_TAKEN};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    reservations: RwLock<Vec<Reservation>>,
    members: RwLock<Vec<Member>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryBackend {
    pub fn with_reservations(reservations: Vec<Reservation>) -> Self {
        Self {
            reservations: RwLock::new(reservations),
            ..Self::default()
        }
    }

    pub fn with_members(members: Vec<Member>) -> Self {
        Self {
            members: RwLock::new(members),
            ..Self::default()
        }
    }

    /// Makes the next backend call fail with `StoreError::Remote(message)`.
    pub async fn fail_next(&self, message: impl Into<String>) {
        *self.failure.lock().await = Some(message.into());
    }

    /// Inserts a row directly, bypassing every store. Simulates another session booking.
    pub async fn insert_raw_reservation(&self, reservation: Reservation) {
        self.reservations.write().await.push(reservation);
    }

    pub async fn reservation_count(&self) -> usize {
        self.reservations.read().await.len()
    }

    async fn check_failure(&self) -> StoreResult<()> {
        match self.failure.lock().await.take() {
            Some(message) => Err(StoreError::Remote(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReservationBackend for InMemoryBackend {
    async fn fetch_reservations(&self) -> StoreResult<Vec<Reservation>> {
        self.check_failure().await?;
        Ok(self.reservations.read().await.clone())
    }

    async fn insert_reservation(&self, new: NewReservation) -> StoreResult<Reservation> {
        self.check_failure().await?;
        let mut reservations = self.reservations.write().await;
        if reservations
            .iter()
            .any(|r| r.occupies(new.table_id, new.date, &new.time))
        {
            return Err(StoreError::Conflict(MSG_SLOT_TAKEN.to_string()));
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            table_id: new.table_id,
            date: new.date,
            time: new.time,
            customer_name: new.customer_name,
            member_id: new.member_id,
            mobile: new.mobile,
        };
        reservations.push(reservation.clone());
        Ok(reservation)
    }

    async fn delete_reservation(&self, id: Uuid) -> StoreResult<()> {
        self.check_failure().await?;
        self.reservations.write().await.retain(|r| r.id != id);
        Ok(())
    }
}

#[async_trait]
impl MemberBackend for InMemoryBackend {
    async fn fetch_members(&self) -> StoreResult<Vec<Member>> {
        self.check_failure().await?;
        let mut members = self.members.read().await.clone();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn insert_member(&self, name: &str, access_code: &str) -> StoreResult<Member> {
        self.check_failure().await?;
        let member = Member {
            id: Uuid::new_v4(),
            name: name.to_string(),
            access_code: access_code.to_string(),
            is_admin: false,
            photo_url: None,
        };
        self.members.write().await.push(member.clone());
        Ok(member)
    }

    async fn delete_member(&self, id: Uuid) -> StoreResult<()> {
        self.check_failure().await?;
        self.members.write().await.retain(|m| m.id != id);
        Ok(())
    }

    async fn update_member(&self, id: Uuid, update: MemberUpdate) -> StoreResult<Member> {
        self.check_failure().await?;
        let mut members = self.members.write().await;
        let member = members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("member {id} not found")))?;
        member.apply(&update);
        Ok(member.clone())
    }

    async fn find_member_by_code(&self, code: &str) -> StoreResult<Option<Member>> {
        self.check_failure().await?;
        Ok(self
            .members
            .read()
            .await
            .iter()
            .filter(|m| m.access_code == code)
            .min_by(|a, b| a.name.cmp(&b.name))
            .cloned())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
