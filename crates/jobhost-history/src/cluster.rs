use std::sync::Mutex;

use rusqlite::Connection;

use crate::{error::Result, types::SchedulerInstance};

/// Read-only view of the scheduler instances' check-in rows.
pub struct ClusterStateReader {
    db: Mutex<Connection>,
}

impl ClusterStateReader {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn list_instances(&self) -> Result<Vec<SchedulerInstance>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT sched_name, instance_name, checkin_interval, last_checkin_time
             FROM scheduler_state
             ORDER BY sched_name, instance_name",
        )?;
        let instances = stmt
            .query_map([], |row| {
                Ok(SchedulerInstance {
                    sched_name: row.get(0)?,
                    instance_id: row.get(1)?,
                    checkin_interval_ms: row.get(2)?,
                    checkin_timestamp: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_checked_in_instance() {
        let conn = Connection::open_in_memory().unwrap();
        jobhost_scheduler::db::init_db(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO scheduler_state VALUES ('jobhost', 'node-b', '2026-03-02T09:00:15.000Z', 15000);
             INSERT INTO scheduler_state VALUES ('jobhost', 'node-a', '2026-03-02T09:00:10.000Z', 15000);",
        )
        .unwrap();

        let instances = ClusterStateReader::new(conn).list_instances().unwrap();
        let ids: Vec<_> = instances.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["node-a", "node-b"]);
        assert_eq!(instances[0].checkin_interval_ms, 15_000);
        assert_eq!(instances[0].checkin_timestamp, "2026-03-02T09:00:10.000Z");
    }

    #[test]
    fn empty_cluster() {
        let conn = Connection::open_in_memory().unwrap();
        jobhost_scheduler::db::init_db(&conn).unwrap();
        assert!(ClusterStateReader::new(conn).list_instances().unwrap().is_empty());
    }
}
