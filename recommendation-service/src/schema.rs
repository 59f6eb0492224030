diesel::table! {
    user_interactions (id) {
        id -> Uuid,
        user_id -> Varchar,
        product_id -> Varchar,
        interaction_type -> Varchar,
        weight -> Float8,
        metadata -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    product_similarities (id) {
        id -> Uuid,
        product_id_1 -> Varchar,
        product_id_2 -> Varchar,
        similarity_score -> Float8,
        similarity_method -> Varchar,
        common_users -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    trending_products (id) {
        id -> Uuid,
        product_id -> Varchar,
        trending_score -> Float8,
        view_count -> Int4,
        cart_count -> Int4,
        purchase_count -> Int4,
        wishlist_count -> Int4,
        calculated_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    user_recommendations (id) {
        id -> Uuid,
        user_id -> Varchar,
        product_id -> Varchar,
        algorithm -> Varchar,
        rank -> Int4,
        score -> Float8,
        generated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    user_interactions,
    product_similarities,
    trending_products,
    user_recommendations,
);
