use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use rand::RngExt;
use rusqlite::Connection;

use super::{UserStatus, to_base36};

const STATUS_KEY: &str = "user_status";
const DEVICE_KEY: &str = "device_id";

/// Persists the license status and the device id in SQLite.
///
/// Shares a database with [`Config`](crate::config::Config); pass the same
/// path to both.
pub struct LicenseStore {
    conn: Mutex<Connection>,
}

impl LicenseStore {
    /// Open or create the license table in the given database path.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS license (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM license WHERE name = ?1")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn put(&self, name: &str, data: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO license (name, data) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET data = excluded.data",
            [name, data],
        )?;
        Ok(())
    }

    /// The stored status, if any was ever saved.
    pub fn load(&self) -> Result<Option<UserStatus>> {
        match self.get(STATUS_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, status: &UserStatus) -> Result<()> {
        let json = serde_json::to_string(status)?;
        self.put(STATUS_KEY, &json)
    }

    /// Forget the stored status (the next start begins a new trial).
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM license WHERE name = ?1", [STATUS_KEY])?;
        Ok(())
    }

    /// Stable identifier of this installation, created on first use.
    pub fn device_id(&self) -> Result<String> {
        if let Some(id) = self.get(DEVICE_KEY)? {
            return Ok(id);
        }
        let id = new_device_id();
        self.put(DEVICE_KEY, &id)?;
        Ok(id)
    }
}

/// `device_<millis>_<9 base36 chars>`.
fn new_device_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| to_base36(rng.random_range(0..36u64)))
        .collect();
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    format!("device_{millis}_{suffix}")
}
