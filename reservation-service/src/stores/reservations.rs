use crate::backend::ReservationBackend;
use chrono::NaiveDate;
use shared::*;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Local mirror of the `reservations` table.
///
/// The list is loaded from the backend on first use. Every mutation goes to the
/// backend first and is mirrored locally only when the backend accepts it. The
/// occupancy scan is a pre-flight hint: the backend has the final word on
/// conflicts.
pub struct ReservationStore {
    backend: Arc<dyn ReservationBackend>,
    reservations: RwLock<Option<Vec<Reservation>>>,
}

impl ReservationStore {
    pub fn new(backend: Arc<dyn ReservationBackend>) -> Self {
        Self {
            backend,
            reservations: RwLock::new(None),
        }
    }

    pub async fn list(&self) -> StoreResult<Vec<Reservation>> {
        self.ensure_loaded().await?;
        Ok(self.reservations.read().await.clone().unwrap_or_default())
    }

    /// Re-fetches the whole table, replacing the local list.
    pub async fn refresh(&self) -> StoreResult<usize> {
        let fetched = self.backend.fetch_reservations().await.map_err(|e| {
            error!("Error fetching reservations: {}", e);
            e
        })?;
        let count = fetched.len();
        *self.reservations.write().await = Some(fetched);
        info!("Loaded {} reservations", count);
        Ok(count)
    }

    pub async fn add(&self, request: &ReservationRequest) -> StoreResult<Reservation> {
        let new = validate_request(request)?;

        let mut guard = self.reservations.write().await;
        if guard.is_none() {
            *guard = Some(self.backend.fetch_reservations().await?);
        }
        let reservations = guard.get_or_insert_with(Vec::new);

        if reservations
            .iter()
            .any(|r| r.occupies(new.table_id, new.date, &new.time))
        {
            info!(
                "Rejected booking for occupied slot table={} date={} time={}",
                new.table_id, new.date, new.time
            );
            return Err(StoreError::Conflict(MSG_SLOT_TAKEN.to_string()));
        }

        let created = match self.backend.insert_reservation(new).await {
            Ok(created) => created,
            Err(StoreError::Conflict(message)) => {
                // Another session took the slot; pick up its booking.
                match self.backend.fetch_reservations().await {
                    Ok(fetched) => *reservations = fetched,
                    Err(e) => warn!("Reload after slot conflict failed: {}", e),
                }
                return Err(StoreError::Conflict(message));
            }
            Err(e) => {
                error!("Error adding reservation: {}", e);
                return Err(e);
            }
        };
        reservations.push(created.clone());
        info!(
            "Reservation {} created for table {} on {} at {}",
            created.id, created.table_id, created.date, created.time
        );
        Ok(created)
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.backend.delete_reservation(id).await.map_err(|e| {
            error!("Error deleting reservation {}: {}", id, e);
            e
        })?;

        let mut guard = self.reservations.write().await;
        if let Some(reservations) = guard.as_mut() {
            let before = reservations.len();
            reservations.retain(|r| r.id != id);
            if reservations.len() == before {
                warn!("Deleted reservation {} was not in the local list", id);
            }
        }
        info!("Reservation {} deleted", id);
        Ok(())
    }

    /// Scans the loaded list only; never calls the backend.
    pub async fn is_occupied(&self, table_id: i32, date: NaiveDate, time: &str) -> bool {
        self.reservations
            .read()
            .await
            .as_ref()
            .is_some_and(|list| list.iter().any(|r| r.occupies(table_id, date, time)))
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Reservation> {
        self.list()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound("Reserva no encontrada".to_string()))
    }

    /// Reservations of a single day, ordered by slot.
    pub async fn by_date(&self, date: NaiveDate) -> StoreResult<Vec<Reservation>> {
        let mut day: Vec<Reservation> = self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.date == date)
            .collect();
        day.sort_by(|a, b| a.time.cmp(&b.time));
        Ok(day)
    }

    async fn ensure_loaded(&self) -> StoreResult<()> {
        if self.reservations.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.reservations.write().await;
        if guard.is_none() {
            let fetched = self.backend.fetch_reservations().await.map_err(|e| {
                error!("Error fetching reservations: {}", e);
                e
            })?;
            info!("Loaded {} reservations", fetched.len());
            *guard = Some(fetched);
        }
        Ok(())
    }
}

pub fn parse_date(raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| StoreError::Validation(format!("Fecha no válida: {raw}")))
}

fn validate_request(request: &ReservationRequest) -> StoreResult<NewReservation> {
    let name = request.name.trim();
    if request.table_id == 0
        || request.date.trim().is_empty()
        || request.time.trim().is_empty()
        || name.is_empty()
    {
        return Err(StoreError::Validation(MSG_MISSING_FIELDS.to_string()));
    }
    if find_table(request.table_id).is_none() {
        return Err(StoreError::Validation(format!("Mesa desconocida: {}", request.table_id)));
    }
    let date = parse_date(&request.date)?;
    let time = request.time.trim();
    if !SLOT_LABELS.contains(&time) {
        return Err(StoreError::Validation(format!("Hora no válida: {time}")));
    }
    let mobile = request.mobile.trim();

    Ok(NewReservation {
        table_id: request.table_id,
        date,
        time: time.to_string(),
        customer_name: name.to_string(),
        member_id: request.member_id.trim().to_string(),
        mobile: (!mobile.is_empty()).then(|| mobile.to_string()),
    })
}
