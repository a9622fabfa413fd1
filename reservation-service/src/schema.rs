diesel::table! {
    sacrifice_animals (sacrifice_id) {
        sacrifice_id -> Uuid,
        sacrifice_no -> Int4,
        sacrifice_time -> Timestamptz,
        share_price -> Numeric,
        empty_share -> Int4,
        total_share -> Int4,
        notes -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    reservations (transaction_id) {
        transaction_id -> Varchar,
        sacrifice_id -> Uuid,
        share_count -> Int4,
        status -> Varchar,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    shareholders (shareholder_id) {
        shareholder_id -> Uuid,
        shareholder_name -> Varchar,
        phone_number -> Varchar,
        sacrifice_id -> Uuid,
        transaction_id -> Varchar,
        total_amount -> Numeric,
        paid_amount -> Numeric,
        remaining_payment -> Numeric,
        delivery_location -> Varchar,
        sacrifice_consent -> Bool,
        security_code -> Varchar,
        purchase_time -> Timestamptz,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Uuid,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(reservations -> sacrifice_animals (sacrifice_id));
diesel::joinable!(shareholders -> sacrifice_animals (sacrifice_id));

diesel::allow_tables_to_appear_in_same_query!(
    sacrifice_animals,
    reservations,
    shareholders,
    outbox_events,
);
