// @generated manually, mirroring the shape `diesel print-schema` would emit.

diesel::table! {
    events (id) {
        id -> Text,
        event_type -> Text,
        repo_name -> Text,
        actor_login -> Text,
        created_at -> Timestamp,
        payload -> Text,
        collected_at -> Timestamp,
    }
}

diesel::table! {
    etag_cache (key) {
        key -> Text,
        etag -> Nullable<Text>,
        last_poll_at -> Timestamp,
    }
}

#[cfg(feature = "commit-extraction")]
diesel::table! {
    commits (sha) {
        sha -> Text,
        event_id -> Text,
        repo_name -> Text,
        message -> Text,
        author_name -> Text,
        authored_at -> Timestamp,
    }
}

#[cfg(feature = "commit-extraction")]
diesel::table! {
    commit_files (id) {
        id -> Integer,
        commit_sha -> Text,
        filename -> Text,
        status -> Text,
        additions -> Integer,
        deletions -> Integer,
    }
}

#[cfg(feature = "commit-extraction")]
diesel::joinable!(commit_files -> commits (commit_sha));
