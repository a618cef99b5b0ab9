diesel::table! {
    members (id) {
        id -> Uuid,
        name -> Varchar,
        access_code -> Varchar,
        is_admin -> Bool,
        photo_url -> Nullable<Varchar>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        table_id -> Int4,
        date -> Date,
        time -> Varchar,
        customer_name -> Varchar,
        member_id -> Varchar,
        mobile -> Nullable<Varchar>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    members,
    reservations,
);
