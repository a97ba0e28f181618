use anyhow::Result;
use uuid::Uuid;

use crate::domain::user::MEMBER_ROLE;
use crate::infra::db::Db;

/// Read-only user directory. Account management itself lives elsewhere;
/// this subsystem only needs target validation and the broadcast audience.
#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn exists(&self, user_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(exists)
    }

    /// Point-in-time snapshot of every member-role user id. Broadcast
    /// audiences are resolved from this, not from a subscription.
    pub async fn member_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE role = $1")
            .bind(MEMBER_ROLE)
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }
}
