//! User records.
//!
//! Authentication happens in front of this service; these records carry the
//! profile fields a social login hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub google_id: Option<String>,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            email: email.into(),
            google_id: None,
            picture: None,
            created_at: Utc::now(),
        }
    }
}
