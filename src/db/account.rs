//! API credential store (account collaborator)

use rusqlite::{params, Connection, Result as SqlResult};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub user_id: i64,
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    /// Look up the credentials for a bot owner
    pub fn find_by_user(conn: Arc<Mutex<Connection>>, user_id: i64) -> SqlResult<Option<Self>> {
        let conn = conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT user_id, api_key, api_secret FROM api_keys WHERE user_id = ?1")?;

        let mut rows = stmt.query(params![user_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(ApiCredentials {
                user_id: row.get(0)?,
                api_key: row.get(1)?,
                api_secret: row.get(2)?,
            })),
            None => Ok(None),
        }
    }

    /// Insert or replace the credentials for a user
    pub fn upsert(
        conn: Arc<Mutex<Connection>>,
        user_id: i64,
        api_key: &str,
        api_secret: &str,
    ) -> SqlResult<()> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_keys (user_id, api_key, api_secret) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET api_key = excluded.api_key,
                                                api_secret = excluded.api_secret",
            params![user_id, api_key, api_secret],
        )?;
        Ok(())
    }
}
