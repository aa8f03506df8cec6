diesel::table! {
    cart_items (id) {
        id -> Int8,
        customer_identity -> Text,
        product_id -> Int8,
        quantity -> Int4,
    }
}

diesel::table! {
    order_items (id) {
        id -> Int8,
        order_id -> Int8,
        product_id -> Int8,
        quantity -> Int4,
        unit_price -> Numeric,
    }
}

diesel::table! {
    orders (id) {
        id -> Int8,
        reference -> Text,
        customer_identity -> Text,
        total_amount -> Numeric,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        id -> Int8,
        name -> Text,
        price -> Numeric,
        stock_quantity -> Int4,
    }
}

diesel::table! {
    transactions (id) {
        id -> Int8,
        reference -> Text,
        payment_method -> Text,
        amount -> Numeric,
        status -> Text,
        customer_identity -> Text,
        provider_ref -> Nullable<Text>,
        provider_transaction_id -> Nullable<Text>,
        failure_reason -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(order_items -> orders (order_id));
diesel::joinable!(order_items -> products (product_id));
diesel::joinable!(cart_items -> products (product_id));

diesel::allow_tables_to_appear_in_same_query!(
    cart_items,
    order_items,
    orders,
    products,
    transactions,
);
