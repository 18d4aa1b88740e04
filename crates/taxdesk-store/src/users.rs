use std::collections::HashMap;

use chrono::Utc;
use tracing::instrument;

use taxdesk_core::{Role, UserId, UserProfile};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// User directory: display names and roles.
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a user or update its name and role.
    #[instrument(skip(self, profile), fields(user_id = %profile.id, role = %profile.role))]
    pub fn upsert(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO users (id, display_name, role, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, role = excluded.role",
                rusqlite::params![
                    profile.id.as_str(),
                    profile.display_name,
                    profile.role.to_string(),
                    row_helpers::format_timestamp(&Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    /// Get a user by id.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<UserProfile, StoreError> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    /// Get a user by id, `None` if absent.
    pub fn find(&self, id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, display_name, role FROM users WHERE id = ?1")?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_profile(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Profiles for every id in `ids` that exists. Missing ids are simply
    /// absent from the map.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn profiles(&self, ids: &[&UserId]) -> Result<HashMap<UserId, UserProfile>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT id, display_name, role FROM users WHERE id = ?1")?;
            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                let mut rows = stmt.query([id.as_str()])?;
                if let Some(row) = rows.next()? {
                    let profile = row_to_profile(row)?;
                    let _ = found.insert(profile.id.clone(), profile);
                }
            }
            Ok(found)
        })
    }

    /// All users, ordered by display name.
    pub fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, display_name, role FROM users ORDER BY display_name, id")?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_profile(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> Result<UserProfile, StoreError> {
    let role: String = row_helpers::get(row, 2, "users", "role")?;
    Ok(UserProfile {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        display_name: row_helpers::get(row, 1, "users", "display_name")?,
        role: row_helpers::parse_enum::<Role>(&role, "users", "role")?,
    })
}
