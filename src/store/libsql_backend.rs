//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::onboarding::model::{FitnessProfile, StoredProfile};
use crate::plans::model::{DietPlan, StoredPlan, WorkoutPlan};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert a plan row and return its id. `sql` must end in `RETURNING id`.
    async fn insert_plan(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}"))),
            Ok(None) => Err(DatabaseError::Query(format!("{op}: insert returned no id"))),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    /// Newest plan for an identity from `table`, decoded from its JSON column.
    async fn latest_plan<P: DeserializeOwned>(
        &self,
        op: &str,
        table: &str,
        identity: &str,
    ) -> Result<Option<StoredPlan<P>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT id, identity, plan, created_at FROM {table}
                     WHERE identity = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1"
                ),
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
        };

        let plan_json: String = row
            .get(2)
            .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))?;
        let created_str: String = row
            .get(3)
            .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))?;

        Ok(Some(StoredPlan {
            id: row
                .get(0)
                .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))?,
            identity: row
                .get(1)
                .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))?,
            plan: serde_json::from_str(&plan_json)
                .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))?,
            created_at: parse_datetime(&created_str),
        }))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_integer(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

const PROFILE_COLUMNS: &str = "identity, age, weight, height, gender, fitness_goal, \
     activity_level, experience_level, injuries, available_days, equipment, \
     created_at, updated_at";

fn row_to_profile(row: &libsql::Row) -> Result<StoredProfile, libsql::Error> {
    let created_str: String = row.get(11)?;
    let updated_str: String = row.get(12)?;

    Ok(StoredProfile {
        identity: row.get(0)?,
        profile: FitnessProfile {
            age: row.get(1).ok(),
            weight: row.get(2).ok(),
            height: row.get(3).ok(),
            gender: row.get(4).ok(),
            fitness_goal: row.get(5).ok(),
            activity_level: row.get(6).ok(),
            experience_level: row.get(7).ok(),
            injuries: row.get(8).ok(),
            available_days: row.get(9).ok(),
            equipment: row.get(10).ok(),
        },
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn get_profile(&self, identity: &str) -> Result<Option<StoredProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE identity = ?1"),
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_profile(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Serialization(format!("get_profile: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn upsert_profile(
        &self,
        identity: &str,
        profile: &FitnessProfile,
    ) -> Result<StoredProfile, DatabaseError> {
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO user_profiles ({PROFILE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                     ON CONFLICT (identity) DO UPDATE SET
                        age = excluded.age,
                        weight = excluded.weight,
                        height = excluded.height,
                        gender = excluded.gender,
                        fitness_goal = excluded.fitness_goal,
                        activity_level = excluded.activity_level,
                        experience_level = excluded.experience_level,
                        injuries = excluded.injuries,
                        available_days = excluded.available_days,
                        equipment = excluded.equipment,
                        updated_at = excluded.updated_at"
                ),
                params![
                    identity,
                    opt_integer(profile.age),
                    opt_text(profile.weight.as_deref()),
                    opt_text(profile.height.as_deref()),
                    opt_text(profile.gender.as_deref()),
                    opt_text(profile.fitness_goal.as_deref()),
                    opt_text(profile.activity_level.as_deref()),
                    opt_text(profile.experience_level.as_deref()),
                    opt_text(profile.injuries.as_deref()),
                    opt_text(profile.available_days.as_deref()),
                    opt_text(profile.equipment.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;

        debug!(identity, "Profile upserted");

        self.get_profile(identity).await?.ok_or_else(|| {
            DatabaseError::Query(format!("upsert_profile: no row for {identity} after write"))
        })
    }

    async fn save_workout_plan(
        &self,
        identity: &str,
        plan: &WorkoutPlan,
    ) -> Result<StoredPlan<WorkoutPlan>, DatabaseError> {
        let now = Utc::now();
        let plan_json = serde_json::to_string(plan)
            .map_err(|e| DatabaseError::Serialization(format!("save_workout_plan: {e}")))?;

        let id = self
            .insert_plan(
                "save_workout_plan",
                "INSERT INTO workout_plans
                    (identity, plan_name, duration_weeks, frequency, split, plan, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 RETURNING id",
                params![
                    identity,
                    plan.plan_name.as_str(),
                    i64::from(plan.duration_weeks),
                    plan.frequency.as_str(),
                    plan.split.as_str(),
                    plan_json,
                    now.to_rfc3339(),
                ],
            )
            .await?;

        debug!(identity, id, "Workout plan saved");
        Ok(StoredPlan {
            id,
            identity: identity.to_string(),
            plan: plan.clone(),
            created_at: now,
        })
    }

    async fn latest_workout_plan(
        &self,
        identity: &str,
    ) -> Result<Option<StoredPlan<WorkoutPlan>>, DatabaseError> {
        self.latest_plan("latest_workout_plan", "workout_plans", identity)
            .await
    }

    async fn save_diet_plan(
        &self,
        identity: &str,
        plan: &DietPlan,
    ) -> Result<StoredPlan<DietPlan>, DatabaseError> {
        let now = Utc::now();
        let plan = plan.clone().rounded();
        let plan_json = serde_json::to_string(&plan)
            .map_err(|e| DatabaseError::Serialization(format!("save_diet_plan: {e}")))?;

        let id = self
            .insert_plan(
                "save_diet_plan",
                "INSERT INTO diet_plans
                    (identity, calories, protein, carbs, fats, plan, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 RETURNING id",
                params![
                    identity,
                    plan.daily_calories as i64,
                    plan.daily_protein as i64,
                    plan.daily_carbs as i64,
                    plan.daily_fats as i64,
                    plan_json,
                    now.to_rfc3339(),
                ],
            )
            .await?;

        debug!(identity, id, "Diet plan saved");
        Ok(StoredPlan {
            id,
            identity: identity.to_string(),
            plan,
            created_at: now,
        })
    }

    async fn latest_diet_plan(
        &self,
        identity: &str,
    ) -> Result<Option<StoredPlan<DietPlan>>, DatabaseError> {
        self.latest_plan("latest_diet_plan", "diet_plans", identity)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_profile() -> FitnessProfile {
        FitnessProfile {
            age: Some(25),
            weight: Some("80kg".to_string()),
            height: Some("180cm".to_string()),
            gender: Some("male".to_string()),
            fitness_goal: Some("build muscle".to_string()),
            activity_level: Some("moderate".to_string()),
            experience_level: Some("beginner".to_string()),
            injuries: Some("none".to_string()),
            available_days: Some("4".to_string()),
            equipment: Some("dumbbells".to_string()),
        }
    }

    #[tokio::test]
    async fn get_missing_profile_is_none() {
        let db = test_db().await;
        assert!(db.get_profile("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let db = test_db().await;

        let stored = db
            .upsert_profile("sam@example.com", &make_profile())
            .await
            .unwrap();
        assert_eq!(stored.identity, "sam@example.com");
        assert_eq!(stored.profile, make_profile());
        let created_at = stored.created_at;

        let mut changed = make_profile();
        changed.weight = Some("78kg".to_string());
        changed.age = None;
        let updated = db.upsert_profile("sam@example.com", &changed).await.unwrap();
        assert_eq!(updated.profile.weight.as_deref(), Some("78kg"));
        assert_eq!(updated.profile.age, None);
        // created_at survives the update
        assert_eq!(updated.created_at, created_at);
        assert!(updated.updated_at >= created_at);

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM user_profiles", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn concurrent_upserts_keep_one_row() {
        let db = Arc::new(test_db().await);
        let a = {
            let db = Arc::clone(&db);
            tokio::spawn(async move { db.upsert_profile("race@example.com", &make_profile()).await })
        };
        let b = {
            let db = Arc::clone(&db);
            tokio::spawn(async move { db.upsert_profile("race@example.com", &make_profile()).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM user_profiles WHERE identity = 'race@example.com'", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn empty_profile_round_trips_as_nulls() {
        let db = test_db().await;
        let stored = db
            .upsert_profile("empty@example.com", &FitnessProfile::default())
            .await
            .unwrap();
        assert_eq!(stored.profile, FitnessProfile::default());
    }

    fn make_workout(name: &str) -> WorkoutPlan {
        WorkoutPlan {
            plan_name: name.to_string(),
            duration_weeks: 8,
            frequency: "3 days/week".to_string(),
            split: "Full Body".to_string(),
            description: "One set to failure.".to_string(),
            schedule: vec![],
        }
    }

    #[tokio::test]
    async fn latest_workout_plan_is_newest() {
        let db = test_db().await;
        assert!(db.latest_workout_plan("sam@example.com").await.unwrap().is_none());

        let first = db
            .save_workout_plan("sam@example.com", &make_workout("First"))
            .await
            .unwrap();
        let second = db
            .save_workout_plan("sam@example.com", &make_workout("Second"))
            .await
            .unwrap();
        db.save_workout_plan("other@example.com", &make_workout("Other"))
            .await
            .unwrap();
        assert!(second.id > first.id);

        let latest = db
            .latest_workout_plan("sam@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.identity, "sam@example.com");
        assert_eq!(latest.plan, make_workout("Second"));
    }

    #[tokio::test]
    async fn diet_plan_is_stored_rounded() {
        let db = test_db().await;
        let plan = DietPlan {
            daily_calories: 2849.6,
            daily_protein: 177.2,
            daily_carbs: 427.5,
            daily_fats: 47.4,
            meals: vec![],
            notes: "Carbs fuel intensity.".to_string(),
        };

        let saved = db.save_diet_plan("sam@example.com", &plan).await.unwrap();
        assert_eq!(saved.plan.daily_calories, 2850.0);

        let latest = db.latest_diet_plan("sam@example.com").await.unwrap().unwrap();
        assert_eq!(latest.plan, saved.plan);

        let mut rows = db
            .conn()
            .query("SELECT calories, protein, carbs, fats FROM diet_plans", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let macros: Vec<i64> = (0..4).map(|i| row.get(i).unwrap()).collect();
        assert_eq!(macros, vec![2850, 177, 428, 47]);
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fit-coach.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_profile("disk@example.com", &make_profile())
                .await
                .unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let stored = db.get_profile("disk@example.com").await.unwrap().unwrap();
        assert_eq!(stored.profile.equipment.as_deref(), Some("dumbbells"));
    }

    #[test]
    fn parse_datetime_formats() {
        let rfc = parse_datetime("2026-01-02T03:04:05+00:00");
        assert_eq!(rfc.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        let sqlite = parse_datetime("2026-01-02 03:04:05");
        assert_eq!(sqlite, rfc);
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}
