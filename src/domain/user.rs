/// Role tags as stored in the user directory. Broadcast audiences are the
/// member set; the admin role unlocks cross-user reads.
pub const MEMBER_ROLE: &str = "member";
pub const ADMIN_ROLE: &str = "admin";
