use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use taskdock_core::JobDefinition;

use crate::error::{Result, StoreError};

/// One row of the bind-tag aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroup {
    pub bind: String,
    pub count: i64,
}

/// Persisted collection of job definitions.
///
/// Thread-safe: wraps its SQLite connection in a Mutex. The scheduler only
/// reads jobs and writes back run timings; everything else on this store is
/// the administrative surface (insert, reorder).
pub struct JobStore {
    db: Mutex<Connection>,
}

impl JobStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn get(&self, id: i64) -> Result<Option<JobDefinition>> {
        let db = self.db.lock().unwrap();
        let job = db
            .query_row(
                "SELECT id, name, shell, cron, active, config, kind, sort, bind,
                        last_runtime, last_run_use
                 FROM jobs WHERE id = ?1",
                [id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// All jobs, ordered by partition then rank.
    pub fn list(&self) -> Result<Vec<JobDefinition>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, shell, cron, active, config, kind, sort, bind,
                    last_runtime, last_run_use
             FROM jobs ORDER BY kind, sort",
        )?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    pub fn insert(&self, job: &JobDefinition) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO jobs
             (id, name, shell, cron, active, config, kind, sort, bind,
              last_runtime, last_run_use)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                job.id,
                job.name,
                job.shell,
                job.cron,
                job.active,
                job.config,
                job.kind,
                job.sort,
                job.bind,
                job.last_runtime.map(|t| t.to_rfc3339()),
                job.last_run_use,
            ],
        )?;
        Ok(())
    }

    /// Persist the timings of a completed run. `last_runtime` records the
    /// run's start instant — the concurrent-completion guard compares
    /// against it.
    pub fn update_last_run(
        &self,
        id: i64,
        started_at: DateTime<Utc>,
        elapsed_secs: f64,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs SET last_runtime = ?1, last_run_use = ?2 WHERE id = ?3",
            rusqlite::params![started_at.to_rfc3339(), elapsed_secs, id],
        )?;
        if n == 0 {
            return Err(StoreError::JobNotFound { id });
        }
        Ok(())
    }

    // --- order management --------------------------------------------------

    /// Repair drift: rewrite every rank as its row position within its
    /// `kind` partition ordered by the current rank. Dense 1..N afterwards.
    pub fn fix_order(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE jobs SET sort = t.row_num
             FROM (SELECT id, row_number() OVER (PARTITION BY kind ORDER BY sort) AS row_num
                   FROM jobs) AS t
             WHERE t.id = jobs.id",
            [],
        )?;
        info!("job order repaired");
        Ok(())
    }

    /// Move one job to `new_order` within its `kind` partition.
    ///
    /// Every job strictly between the old and new rank (destination
    /// inclusive, source exclusive) shifts by one; the whole move is a single
    /// transaction — partial application is never observable.
    pub fn update_sort(&self, id: i64, new_order: i64) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let row: Option<(i64, i64)> = tx
            .query_row("SELECT sort, kind FROM jobs WHERE id = ?1", [id], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .optional()?;
        let (old_order, kind) = row.ok_or(StoreError::JobNotFound { id })?;

        if new_order == old_order {
            return Ok(());
        }
        if new_order > old_order {
            tx.execute(
                "UPDATE jobs SET sort = sort - 1
                 WHERE sort > ?1 AND sort <= ?2 AND kind = ?3",
                rusqlite::params![old_order, new_order, kind],
            )?;
        } else {
            tx.execute(
                "UPDATE jobs SET sort = sort + 1
                 WHERE sort >= ?1 AND sort < ?2 AND kind = ?3",
                rusqlite::params![new_order, old_order, kind],
            )?;
        }
        tx.execute(
            "UPDATE jobs SET sort = ?1 WHERE id = ?2",
            rusqlite::params![new_order, id],
        )?;
        tx.commit()?;
        info!(job_id = id, from = old_order, to = new_order, "job rank moved");
        Ok(())
    }

    /// Distinct bind tags with counts. The tag is the substring between the
    /// first and second `#` of the `bind` column.
    pub fn bind_groups(&self) -> Result<Vec<BindGroup>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT bind, COUNT(*) AS count
             FROM (SELECT SUBSTR(
                       bind,
                       INSTR(bind, '#') + 1,
                       INSTR(SUBSTR(bind, INSTR(bind, '#') + 1), '#') - 1
                   ) AS bind
                   FROM jobs)
             GROUP BY bind",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok(BindGroup {
                    bind: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobDefinition> {
    let last_runtime: Option<String> = row.get(9)?;
    Ok(JobDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        shell: row.get(2)?,
        cron: row.get(3)?,
        active: row.get(4)?,
        config: row.get(5)?,
        kind: row.get(6)?,
        sort: row.get(7)?,
        bind: row.get(8)?,
        last_runtime: last_runtime
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)),
        last_run_use: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> JobStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        JobStore::new(conn)
    }

    fn job(id: i64, kind: i64, sort: i64) -> JobDefinition {
        JobDefinition {
            id,
            name: format!("job-{id}"),
            shell: "echo hi".into(),
            cron: "*/5 * * * *".into(),
            active: 1,
            config: None,
            kind,
            sort,
            bind: String::new(),
            last_runtime: None,
            last_run_use: None,
        }
    }

    fn ranks(store: &JobStore, kind: i64) -> Vec<(i64, i64)> {
        store
            .list()
            .unwrap()
            .into_iter()
            .filter(|j| j.kind == kind)
            .map(|j| (j.id, j.sort))
            .collect()
    }

    #[test]
    fn insert_and_get_round_trip() {
        let s = store();
        s.insert(&job(1, 0, 1)).unwrap();
        let got = s.get(1).unwrap().unwrap();
        assert_eq!(got.shell, "echo hi");
        assert_eq!(got.last_runtime, None);
        assert!(s.get(99).unwrap().is_none());
    }

    #[test]
    fn last_run_update_visible_on_reread() {
        let s = store();
        s.insert(&job(1, 0, 1)).unwrap();
        let started = Utc::now();
        s.update_last_run(1, started, 2.5).unwrap();
        let got = s.get(1).unwrap().unwrap();
        assert_eq!(got.last_run_use, Some(2.5));
        let persisted = got.last_runtime.unwrap();
        assert!((persisted - started).num_milliseconds().abs() < 1000);
    }

    #[test]
    fn last_run_update_missing_job_errors() {
        let s = store();
        let err = s.update_last_run(5, Utc::now(), 1.0).unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound { id: 5 }));
    }

    #[test]
    fn fix_order_densifies_each_partition() {
        let s = store();
        // kind 1 with gaps and a duplicate, kind 2 untouched ordering
        s.insert(&job(1, 1, 10)).unwrap();
        s.insert(&job(2, 1, 3)).unwrap();
        s.insert(&job(3, 1, 10)).unwrap();
        s.insert(&job(4, 2, 7)).unwrap();
        s.fix_order().unwrap();

        let kind1: Vec<i64> = ranks(&s, 1).into_iter().map(|(_, sort)| sort).collect();
        assert_eq!(kind1, vec![1, 2, 3]);
        assert_eq!(ranks(&s, 2), vec![(4, 1)]);
    }

    #[test]
    fn move_down_then_back_restores_ranks() {
        let s = store();
        for (id, sort) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
            s.insert(&job(id, 1, sort)).unwrap();
        }
        let before = ranks(&s, 1);

        s.update_sort(1, 3).unwrap();
        assert_eq!(ranks(&s, 1), vec![(2, 1), (3, 2), (1, 3), (4, 4)]);

        s.update_sort(1, 1).unwrap();
        assert_eq!(ranks(&s, 1), before);
    }

    #[test]
    fn move_up_shifts_interval() {
        let s = store();
        for (id, sort) in [(1, 1), (2, 2), (3, 3)] {
            s.insert(&job(id, 1, sort)).unwrap();
        }
        s.update_sort(3, 1).unwrap();
        assert_eq!(ranks(&s, 1), vec![(3, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn move_leaves_other_partitions_alone() {
        let s = store();
        s.insert(&job(1, 1, 1)).unwrap();
        s.insert(&job(2, 1, 2)).unwrap();
        s.insert(&job(10, 2, 1)).unwrap();
        s.insert(&job(11, 2, 2)).unwrap();

        s.update_sort(1, 2).unwrap();
        assert_eq!(ranks(&s, 2), vec![(10, 1), (11, 2)]);
    }

    #[test]
    fn move_to_same_rank_is_noop() {
        let s = store();
        s.insert(&job(1, 1, 1)).unwrap();
        s.insert(&job(2, 1, 2)).unwrap();
        s.update_sort(2, 2).unwrap();
        assert_eq!(ranks(&s, 1), vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn move_missing_job_errors() {
        let s = store();
        assert!(matches!(
            s.update_sort(42, 1).unwrap_err(),
            StoreError::JobNotFound { id: 42 }
        ));
    }

    #[test]
    fn bind_groups_aggregate_first_marker_pair() {
        let s = store();
        let mut a = job(1, 0, 1);
        a.bind = "#web#srv1".into();
        let mut b = job(2, 0, 2);
        b.bind = "#web#srv2".into();
        let mut c = job(3, 0, 3);
        c.bind = "#db#main".into();
        for j in [&a, &b, &c] {
            s.insert(j).unwrap();
        }

        let mut groups = s.bind_groups().unwrap();
        groups.sort_by(|x, y| x.bind.cmp(&y.bind));
        assert_eq!(
            groups,
            vec![
                BindGroup {
                    bind: "db".into(),
                    count: 1
                },
                BindGroup {
                    bind: "web".into(),
                    count: 2
                },
            ]
        );
    }
}
