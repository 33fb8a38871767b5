//! SQLite-backed plan store.
//!
//! Each collection lives in its own table keyed by id (or date for plans,
//! hour for energy patterns) with the record serialized as a JSON payload.

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::path::Path;

use super::{data_dir, PlanStore};
use crate::energy::EnergyPattern;
use crate::error::{DatabaseError, Result};
use crate::schedule::{DailyPlan, SchedulingConstraint, SchedulingFeedback};
use crate::task::{Goal, Task};

/// SQLite store for tasks, goals, constraints, feedback, plans and energy patterns.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at `<data_dir>/timeblock.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("timeblock.db");
        Self::open_at(&path)
    }

    /// Open the store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS tasks (
                    id      TEXT PRIMARY KEY,
                    payload TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS goals (
                    id      TEXT PRIMARY KEY,
                    payload TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS constraints (
                    id      TEXT PRIMARY KEY,
                    payload TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS feedback (
                    id      INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id TEXT NOT NULL,
                    payload TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS plans (
                    date    TEXT PRIMARY KEY,
                    payload TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS energy_patterns (
                    hour    INTEGER PRIMARY KEY,
                    payload TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_feedback_task_id ON feedback(task_id);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    fn load_all<T: DeserializeOwned>(&self, sql: &str, table: &str) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql).map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(DatabaseError::from)?;

        let mut items = Vec::new();
        for row in rows {
            let payload = row.map_err(DatabaseError::from)?;
            items.push(decode(&payload, table)?);
        }
        Ok(items)
    }

    fn upsert(&self, sql: &str, key: &str, payload: &str) -> Result<()> {
        self.conn
            .execute(sql, params![key, payload])
            .map_err(DatabaseError::from)?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(payload: &str, table: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| {
        DatabaseError::CorruptPayload {
            table: table.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

impl PlanStore for SqliteStore {
    fn load_tasks(&self) -> Result<Vec<Task>> {
        self.load_all("SELECT payload FROM tasks ORDER BY id", "tasks")
    }

    fn save_task(&self, task: &Task) -> Result<()> {
        let payload = serde_json::to_string(task)?;
        self.upsert(
            "INSERT OR REPLACE INTO tasks (id, payload) VALUES (?1, ?2)",
            &task.id,
            &payload,
        )
    }

    fn load_goals(&self) -> Result<Vec<Goal>> {
        self.load_all("SELECT payload FROM goals ORDER BY id", "goals")
    }

    fn save_goal(&self, goal: &Goal) -> Result<()> {
        let payload = serde_json::to_string(goal)?;
        self.upsert(
            "INSERT OR REPLACE INTO goals (id, payload) VALUES (?1, ?2)",
            &goal.id,
            &payload,
        )
    }

    fn load_constraints(&self) -> Result<Vec<SchedulingConstraint>> {
        self.load_all("SELECT payload FROM constraints ORDER BY rowid", "constraints")
    }

    fn save_constraint(&self, constraint: &SchedulingConstraint) -> Result<()> {
        let payload = serde_json::to_string(constraint)?;
        self.upsert(
            "INSERT OR REPLACE INTO constraints (id, payload) VALUES (?1, ?2)",
            &constraint.id,
            &payload,
        )
    }

    fn load_feedback(&self) -> Result<Vec<SchedulingFeedback>> {
        self.load_all("SELECT payload FROM feedback ORDER BY id", "feedback")
    }

    fn append_feedback(&self, record: &SchedulingFeedback, retention: usize) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.conn
            .execute(
                "INSERT INTO feedback (task_id, payload) VALUES (?1, ?2)",
                params![record.task_id, payload],
            )
            .map_err(DatabaseError::from)?;
        self.conn
            .execute(
                "DELETE FROM feedback WHERE id NOT IN (
                    SELECT id FROM feedback ORDER BY id DESC LIMIT ?1
                )",
                params![retention.max(1) as i64],
            )
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    fn load_plan(&self, date: NaiveDate) -> Result<Option<DailyPlan>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM plans WHERE date = ?1")
            .map_err(DatabaseError::from)?;
        let result = stmt.query_row(params![date.to_string()], |row| row.get::<_, String>(0));
        match result {
            Ok(payload) => Ok(Some(decode(&payload, "plans")?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::from(e).into()),
        }
    }

    fn save_plan(&self, plan: &DailyPlan) -> Result<()> {
        let payload = serde_json::to_string(plan)?;
        self.upsert(
            "INSERT OR REPLACE INTO plans (date, payload) VALUES (?1, ?2)",
            &plan.date.to_string(),
            &payload,
        )
    }

    fn load_energy_patterns(&self) -> Result<Vec<EnergyPattern>> {
        self.load_all(
            "SELECT payload FROM energy_patterns ORDER BY hour",
            "energy_patterns",
        )
    }

    fn save_energy_patterns(&self, patterns: &[EnergyPattern]) -> Result<()> {
        for pattern in patterns {
            let payload = serde_json::to_string(pattern)?;
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO energy_patterns (hour, payload) VALUES (?1, ?2)",
                    params![pattern.hour as i64, payload],
                )
                .map_err(DatabaseError::from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use chrono::{TimeZone, Utc};

    #[test]
    fn tasks_round_trip_and_upsert() {
        let store = SqliteStore::open_memory().unwrap();
        let task = Task::new("Draft outline", 45).with_id("t1");
        store.save_task(&task).unwrap();
        store
            .save_task(&task.clone().with_priority(Priority::Critical))
            .unwrap();

        let tasks = store.load_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].priority, Priority::Critical);
    }

    #[test]
    fn feedback_retention_keeps_newest() {
        let store = SqliteStore::open_memory().unwrap();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        for id in ["a", "b", "c", "d"] {
            let record = SchedulingFeedback::new(id, start, start + chrono::Duration::hours(1));
            store.append_feedback(&record, 2).unwrap();
        }
        let ids: Vec<_> = store
            .load_feedback()
            .unwrap()
            .into_iter()
            .map(|r| r.task_id)
            .collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn plan_save_replaces_previous_for_date() {
        let store = SqliteStore::open_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(store.load_plan(date).unwrap().is_none());

        let mut plan = DailyPlan::empty(date);
        store.save_plan(&plan).unwrap();
        plan.productivity_score = 0.42;
        store.save_plan(&plan).unwrap();

        let loaded = store.load_plan(date).unwrap().unwrap();
        assert_eq!(loaded.productivity_score, 0.42);
    }

    #[test]
    fn energy_patterns_round_trip() {
        let store = SqliteStore::open_memory().unwrap();
        let patterns = crate::energy::EnergyModel::new().patterns().to_vec();
        store.save_energy_patterns(&patterns).unwrap();
        let loaded = store.load_energy_patterns().unwrap();
        assert_eq!(loaded.len(), 24);
        for (saved, original) in loaded.iter().zip(&patterns) {
            assert_eq!(saved.hour, original.hour);
            assert_eq!(saved.level, original.level);
        }
    }

    #[test]
    fn open_at_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::open_at(&path).unwrap();
            store.save_goal(&Goal::new("g1", "Ship v1")).unwrap();
        }
        let reopened = SqliteStore::open_at(&path).unwrap();
        assert_eq!(reopened.load_goals().unwrap()[0].title, "Ship v1");
    }
}
