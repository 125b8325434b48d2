use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};

use taskdock_core::{TriggerEntry, TriggerId};

use crate::error::Result;

/// Persisted collection of trigger registrations.
pub struct TriggerStore {
    db: Mutex<Connection>,
}

impl TriggerStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn get(&self, id: &TriggerId) -> Result<Option<TriggerEntry>> {
        let db = self.db.lock().unwrap();
        let entry = db
            .query_row(
                "SELECT id, cron, callback FROM triggers WHERE id = ?1",
                [id.to_string()],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn list(&self) -> Result<Vec<TriggerEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT id, cron, callback FROM triggers ORDER BY id")?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn upsert(&self, entry: &TriggerEntry) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO triggers (id, cron, callback) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET cron = excluded.cron, callback = excluded.callback",
            rusqlite::params![entry.id.to_string(), entry.cron, entry.callback],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &TriggerId) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM triggers WHERE id = ?1", [id.to_string()])?;
        Ok(())
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TriggerEntry> {
    let raw_id: String = row.get(0)?;
    Ok(TriggerEntry {
        id: TriggerId::parse(&raw_id),
        cron: row.get(1)?,
        callback: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> TriggerStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        TriggerStore::new(conn)
    }

    fn entry(id: TriggerId, cron: &str) -> TriggerEntry {
        TriggerEntry {
            id,
            cron: cron.into(),
            callback: String::new(),
        }
    }

    #[test]
    fn upsert_and_get_managed_trigger() {
        let s = store();
        s.upsert(&entry(TriggerId::Job(3), "*/5 * * * *")).unwrap();
        let got = s.get(&TriggerId::Job(3)).unwrap().unwrap();
        assert_eq!(got.id, TriggerId::Job(3));
        assert_eq!(got.cron, "*/5 * * * *");
    }

    #[test]
    fn upsert_replaces_cron() {
        let s = store();
        s.upsert(&entry(TriggerId::Job(3), "*/5 * * * *")).unwrap();
        s.upsert(&entry(TriggerId::Job(3), "0 * * * *")).unwrap();
        let got = s.get(&TriggerId::Job(3)).unwrap().unwrap();
        assert_eq!(got.cron, "0 * * * *");
        assert_eq!(s.list().unwrap().len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let s = store();
        s.upsert(&entry(TriggerId::Job(3), "* * * * *")).unwrap();
        s.delete(&TriggerId::Job(3)).unwrap();
        s.delete(&TriggerId::Job(3)).unwrap();
        assert!(s.get(&TriggerId::Job(3)).unwrap().is_none());
    }

    #[test]
    fn named_triggers_coexist_with_managed() {
        let s = store();
        s.upsert(&entry(TriggerId::Job(1), "* * * * *")).unwrap();
        s.upsert(&TriggerEntry {
            id: TriggerId::Named("heartbeat".into()),
            cron: "* * * * *".into(),
            callback: "pulse".into(),
        })
        .unwrap();

        let entries = s.list().unwrap();
        assert_eq!(entries.len(), 2);
        let named = s
            .get(&TriggerId::Named("heartbeat".into()))
            .unwrap()
            .unwrap();
        assert_eq!(named.callback, "pulse");
    }
}
