use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::{etag_cache, events};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DbEvent {
    pub id: String,
    pub event_type: String,
    pub repo_name: String,
    pub actor_login: String,
    pub created_at: NaiveDateTime,
    pub payload: String,
    pub collected_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent<'a> {
    pub id: &'a str,
    pub event_type: &'a str,
    pub repo_name: &'a str,
    pub actor_login: &'a str,
    pub created_at: NaiveDateTime,
    pub payload: String,
    pub collected_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = etag_cache)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DbEtagCache {
    pub key: String,
    pub etag: Option<String>,
    pub last_poll_at: NaiveDateTime,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = etag_cache)]
pub struct NewEtagCache<'a> {
    pub key: &'a str,
    pub etag: Option<&'a str>,
    pub last_poll_at: NaiveDateTime,
}
