use super::{MemberBackend, ReservationBackend};
use crate::models::*;
use crate::schema::*;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::{Member, MemberUpdate, NewReservation, Reservation, StoreError, StoreResult, MSG_SLOT_TAKEN};
use tracing::warn;
use uuid::Uuid;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgBackend {
    pool: DbPool,
}

impl PgBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<PooledConnection<'_, AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Remote(format!("Database unavailable: {}", e)))
    }
}

fn remote(e: DieselError) -> StoreError {
    match e {
        DieselError::NotFound => StoreError::NotFound("Registro no encontrado".to_string()),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StoreError::Conflict(MSG_SLOT_TAKEN.to_string())
        }
        other => StoreError::Remote(other.to_string()),
    }
}

#[async_trait]
impl ReservationBackend for PgBackend {
    async fn fetch_reservations(&self) -> StoreResult<Vec<Reservation>> {
        let mut conn = self.conn().await?;
        let rows = reservations::table
            .order((reservations::date.asc(), reservations::time.asc()))
            .load::<DbReservation>(&mut conn)
            .await
            .map_err(remote)?;
        Ok(rows.into_iter().map(Reservation::from).collect())
    }

    async fn insert_reservation(&self, new: NewReservation) -> StoreResult<Reservation> {
        let mut conn = self.conn().await?;
        let row = NewDbReservation::from(new);
        let inserted = diesel::insert_into(reservations::table)
            .values(&row)
            .get_result::<DbReservation>(&mut conn)
            .await
            .map_err(|e| {
                if matches!(e, DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) {
                    warn!(
                        "Slot table={} date={} time={} rejected by unique constraint",
                        row.table_id, row.date, row.time
                    );
                }
                remote(e)
            })?;
        Ok(inserted.into())
    }

    async fn delete_reservation(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::delete(reservations::table.filter(reservations::id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(remote)?;
        Ok(())
    }
}

#[async_trait]
impl MemberBackend for PgBackend {
    async fn fetch_members(&self) -> StoreResult<Vec<Member>> {
        let mut conn = self.conn().await?;
        let rows = members::table
            .order(members::name.asc())
            .load::<DbMember>(&mut conn)
            .await
            .map_err(remote)?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    async fn insert_member(&self, name: &str, access_code: &str) -> StoreResult<Member> {
        let mut conn = self.conn().await?;
        let row = NewDbMember {
            id: Uuid::new_v4(),
            name: name.to_string(),
            access_code: access_code.to_string(),
            is_admin: false,
        };
        let inserted = diesel::insert_into(members::table)
            .values(&row)
            .get_result::<DbMember>(&mut conn)
            .await
            .map_err(remote)?;
        Ok(inserted.into())
    }

    async fn delete_member(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::delete(members::table.filter(members::id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(remote)?;
        Ok(())
    }

    async fn update_member(&self, id: Uuid, update: MemberUpdate) -> StoreResult<Member> {
        let mut conn = self.conn().await?;
        let changes = MemberChangeset::from(update);
        let updated = diesel::update(members::table.filter(members::id.eq(id)))
            .set(&changes)
            .get_result::<DbMember>(&mut conn)
            .await
            .map_err(remote)?;
        Ok(updated.into())
    }

    async fn find_member_by_code(&self, code: &str) -> StoreResult<Option<Member>> {
        let mut conn = self.conn().await?;
        let row = members::table
            .filter(members::access_code.eq(code))
            .order(members::name.asc())
            .first::<DbMember>(&mut conn)
            .await
            .optional()
            .map_err(remote)?;
        Ok(row.map(Member::from))
    }

    async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(remote)?;
        Ok(())
    }
}
