pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod realtime;

use crate::infra::db::Db;
use crate::realtime::RealtimeHub;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub realtime: RealtimeHub,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
}
