//! Diesel ORM models for database tables.
//!
//! These models provide compile-time type checking for database operations.
//! For SQLite, operations are wrapped in spawn_blocking since diesel-async
//! only supports Postgres/MySQL.

use diesel::prelude::*;

use crate::schema;

/// Source record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceRecord {
    pub id: String,
    pub name: String,
    pub homepage_url: String,
    pub discovery_enabled: i32,
    pub section_discovery_enabled: i32,
    pub sections: String,
    pub discovery_interval_minutes: i32,
    pub consecutive_failures: i32,
    pub last_discovery: Option<String>,
    pub created_at: String,
}

/// New source for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::sources)]
pub struct NewSource<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub homepage_url: &'a str,
    pub discovery_enabled: i32,
    pub section_discovery_enabled: i32,
    pub sections: &'a str,
    pub discovery_interval_minutes: i32,
    pub consecutive_failures: i32,
    pub last_discovery: Option<&'a str>,
    pub created_at: &'a str,
}

/// Candidate link record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::candidate_links)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CandidateLinkRecord {
    pub id: i32,
    pub dataset_id: String,
    pub source_id: String,
    pub url: String,
    pub status: String,
    pub discovered_at: String,
    pub status_changed_at: String,
}

/// New candidate link for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::candidate_links)]
pub struct NewCandidateLink<'a> {
    pub dataset_id: &'a str,
    pub source_id: &'a str,
    pub url: &'a str,
    pub status: &'a str,
    pub discovered_at: &'a str,
    pub status_changed_at: &'a str,
}

/// Article record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::articles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ArticleRecord {
    pub id: String,
    pub dataset_id: String,
    pub source_id: String,
    pub url: String,
    pub status: String,
    pub body: Option<String>,
    pub paused_reason: Option<String>,
    pub stage_entered_at: String,
    pub extraction_attempts: i32,
    pub cleaning_attempts: i32,
    pub verification_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// New article for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::articles)]
pub struct NewArticle<'a> {
    pub id: &'a str,
    pub dataset_id: &'a str,
    pub source_id: &'a str,
    pub url: &'a str,
    pub status: &'a str,
    pub body: Option<&'a str>,
    pub paused_reason: Option<&'a str>,
    pub stage_entered_at: &'a str,
    pub extraction_attempts: i32,
    pub cleaning_attempts: i32,
    pub verification_attempts: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Dataset record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::datasets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// New dataset for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::datasets)]
pub struct NewDataset<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub created_at: &'a str,
}
