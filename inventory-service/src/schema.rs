diesel::table! {
    stocks (id) {
        id -> Uuid,
        product_id -> Varchar,
        variant_id -> Nullable<Varchar>,
        warehouse_id -> Nullable<Varchar>,
        total -> Int4,
        reserved -> Int4,
        available -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        order_id -> Varchar,
        product_id -> Varchar,
        variant_id -> Nullable<Varchar>,
        quantity -> Int4,
        status -> Varchar,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    stock_movements (id) {
        id -> Uuid,
        product_id -> Varchar,
        variant_id -> Nullable<Varchar>,
        warehouse_id -> Nullable<Varchar>,
        quantity -> Int4,
        operation -> Varchar,
        reason -> Text,
        previous_qty -> Int4,
        new_qty -> Int4,
        created_by -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    stocks,
    reservations,
    stock_movements,
);
