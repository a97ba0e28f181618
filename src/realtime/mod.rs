use uuid::Uuid;

pub mod events;
pub mod hub;
pub mod session;

pub use hub::{ConnId, RealtimeHub};

pub const SUPPORT_ADMINS_ROOM: &str = "support:admins";

pub fn inbox_room(user_id: Uuid) -> String {
    format!("inbox:{}", user_id)
}

pub fn thread_room(thread_id: &str) -> String {
    format!("thread:{}", thread_id)
}

pub fn support_user_room(user_id: &str) -> String {
    format!("support:user:{}", user_id)
}

pub fn support_admin_room(admin_id: &str) -> String {
    format!("support:admin:{}", admin_id)
}
