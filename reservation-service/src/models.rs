use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use shared::{Member, MemberUpdate, NewReservation, Reservation};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct DbReservation {
    pub id: Uuid,
    pub table_id: i32,
    pub date: NaiveDate,
    pub time: String,
    pub customer_name: String,
    pub member_id: String,
    pub mobile: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewDbReservation {
    pub id: Uuid,
    pub table_id: i32,
    pub date: NaiveDate,
    pub time: String,
    pub customer_name: String,
    pub member_id: String,
    pub mobile: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::members)]
pub struct DbMember {
    pub id: Uuid,
    pub name: String,
    pub access_code: String,
    pub is_admin: bool,
    pub photo_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::members)]
pub struct NewDbMember {
    pub id: Uuid,
    pub name: String,
    pub access_code: String,
    pub is_admin: bool,
}

/// `None` fields are left untouched by the update.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::members)]
pub struct MemberChangeset {
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub is_admin: Option<bool>,
}

impl From<DbReservation> for Reservation {
    fn from(row: DbReservation) -> Self {
        Self {
            id: row.id,
            table_id: row.table_id,
            date: row.date,
            time: row.time,
            customer_name: row.customer_name,
            member_id: row.member_id,
            mobile: row.mobile,
        }
    }
}

impl From<NewReservation> for NewDbReservation {
    fn from(new: NewReservation) -> Self {
        Self {
            id: Uuid::new_v4(),
            table_id: new.table_id,
            date: new.date,
            time: new.time,
            customer_name: new.customer_name,
            member_id: new.member_id,
            mobile: new.mobile,
        }
    }
}

impl From<DbMember> for Member {
    fn from(row: DbMember) -> Self {
        Self {
            id: row.id,
            name: row.name,
            access_code: row.access_code,
            is_admin: row.is_admin,
            photo_url: row.photo_url,
        }
    }
}

impl From<MemberUpdate> for MemberChangeset {
    fn from(update: MemberUpdate) -> Self {
        Self {
            name: update.name,
            photo_url: update.photo_url,
            is_admin: update.is_admin,
        }
    }
}
