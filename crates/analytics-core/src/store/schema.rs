//! `diesel::table!` definitions for the persisted state layout.

diesel::table! {
    events (id) {
        id -> Uuid,
        org_id -> Text,
        project_id -> Text,
        user_id -> Text,
        event_name -> Text,
        timestamp -> Timestamptz,
        properties -> Jsonb,
        session_id -> Nullable<Text>,
        page_url -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        ip_address -> Nullable<Text>,
        fingerprint -> Bytea,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    funnels (id) {
        id -> Uuid,
        org_id -> Text,
        project_id -> Text,
        name -> Text,
        steps -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    api_keys (id) {
        id -> Uuid,
        org_id -> Text,
        project_id -> Nullable<Text>,
        name -> Text,
        key_hash -> Text,
        permissions -> Jsonb,
        created_at -> Timestamptz,
        revoked_at -> Nullable<Timestamptz>,
        last_used_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    queue_jobs (id) {
        id -> Uuid,
        payload -> Jsonb,
        status -> Text,
        attempts -> Integer,
        max_retries -> Integer,
        next_attempt_at -> Timestamptz,
        last_error -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(events, funnels, api_keys, queue_jobs,);
