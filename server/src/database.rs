// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, Sqlite, SqlitePool, migrate::MigrateDatabase};
use common::{CreateTaskPayload, Task, TaskPriority, TaskStatus, UpdateTaskPayload};
use tracing::{debug, info};
use uuid::Uuid;

const TASKS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        description TEXT NULL,
        status TEXT NOT NULL DEFAULT 'todo',
        due_date DATE NULL,
        priority TEXT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        user_id TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    );
"#;

const TASKS_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_user_due ON tasks (user_id, due_date);";

/// Raw `tasks` row. Enumerations and tags are stored as text and
/// parsed when converting into a [`Task`].
#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: Option<String>,
    status: String,
    due_date: Option<NaiveDate>,
    priority: Option<String>,
    tags: String,
    user_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: Uuid::parse_str(&row.id).with_context(|| format!("Corrupt task id {:?}", row.id))?,
            title: row.title,
            description: row.description,
            status: row.status.parse::<TaskStatus>()?,
            due_date: row.due_date,
            priority: row
                .priority
                .as_deref()
                .map(str::parse::<TaskPriority>)
                .transpose()?,
            tags: serde_json::from_str(&row.tags)
                .with_context(|| format!("Corrupt tags for task {}", row.id))?,
            user_id: row.user_id,
            created_at: row.created_at,
        })
    }
}

fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("Failed to encode tags")
}

/// Establishes the database connection pool.
/// If the database does not exist, it creates it.
/// It also ensures the `tasks` table has the correct schema.
///
/// An in-memory URL gets a single long-lived connection, since every
/// SQLite connection would otherwise open its own empty database.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await
            .context("Failed to open in-memory database")?
    } else {
        if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
            info!("Creating database {}", database_url);
            Sqlite::create_database(database_url)
                .await
                .context("Failed to create database")?;
        } else {
            info!("Database already exists.");
        }

        SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?
    };

    ensure_schema(&pool).await?;
    Ok(pool)
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(TASKS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create 'tasks' table")?;
    sqlx::query(TASKS_USER_INDEX)
        .execute(pool)
        .await
        .context("Failed to create 'tasks' index")?;

    info!("'tasks' table is ready.");
    Ok(())
}

/// Retrieves every task of `user_id`, earliest deadline first.
/// Tasks without a deadline come last, oldest first.
pub async fn list_tasks_from_db(pool: &SqlitePool, user_id: &str) -> Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(
        "SELECT * FROM tasks WHERE user_id = ? ORDER BY due_date IS NULL, due_date ASC, created_at ASC;",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve tasks from DB")?;

    rows.into_iter().map(Task::try_from).collect()
}

/// Fetches one task, or `None` when it does not exist or belongs to someone else.
pub async fn get_task_from_db(pool: &SqlitePool, user_id: &str, task_id: Uuid) -> Result<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ? AND user_id = ?")
        .bind(task_id.to_string())
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to retrieve task with ID: {task_id}"))?;

    row.map(Task::try_from).transpose()
}

/// Inserts a new task into the database. The payload is expected to be validated.
pub async fn create_task_in_db(pool: &SqlitePool, user_id: &str, payload: CreateTaskPayload) -> Result<Task> {
    let task = Task {
        id: Uuid::new_v4(),
        title: payload.title,
        description: payload.description,
        status: TaskStatus::Todo,
        due_date: payload.due_date,
        priority: payload.priority,
        tags: payload.tags,
        user_id: user_id.to_string(),
        created_at: Utc::now(),
    };

    debug!(
        "Insert values: id={}, title={}, due_date={:?}, priority={:?}, user_id={}",
        task.id, task.title, task.due_date, task.priority, task.user_id
    );

    sqlx::query(
        "INSERT INTO tasks (id, title, description, status, due_date, priority, tags, user_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task.id.to_string())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(task.due_date)
    .bind(task.priority.map(TaskPriority::as_str))
    .bind(encode_tags(&task.tags)?)
    .bind(&task.user_id)
    .bind(task.created_at)
    .execute(pool)
    .await
    .context("Failed to insert task into DB")?;

    Ok(task)
}

/// Applies a partial update inside a transaction.
/// Returns `None` if no task with the given ID is owned by `user_id`.
pub async fn update_task_in_db(
    pool: &SqlitePool,
    user_id: &str,
    task_id: Uuid,
    payload: UpdateTaskPayload,
) -> Result<Option<Task>> {
    let mut tx = pool.begin().await.context("Failed to open transaction")?;

    let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ? AND user_id = ?")
        .bind(task_id.to_string())
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("Failed to load task with ID: {task_id}"))?;

    let Some(row) = row else {
        debug!("No task with ID {} for user {}", task_id, user_id);
        return Ok(None);
    };

    let mut task = Task::try_from(row)?;
    payload.apply_to(&mut task);

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, status = ?, due_date = ?, priority = ?, tags = ? WHERE id = ? AND user_id = ?",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(task.due_date)
    .bind(task.priority.map(TaskPriority::as_str))
    .bind(encode_tags(&task.tags)?)
    .bind(task_id.to_string())
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("Failed to update task with ID: {task_id}"))?;

    tx.commit().await.context("Failed to commit task update")?;

    info!("Updated task with ID: {}", task_id);
    Ok(Some(task))
}

/// Deletes a task for good.
/// Returns true if a row was removed, false if no task with the given ID was found.
pub async fn delete_task_from_db(pool: &SqlitePool, user_id: &str, task_id: Uuid) -> Result<bool> {
    debug!("Attempting to delete task with ID: {}", task_id);
    let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
        .bind(task_id.to_string())
        .bind(user_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete task with ID: {task_id}"))?;

    let rows_affected = result.rows_affected();
    info!("Deleted {} rows for task ID: {}", rows_affected, task_id);

    Ok(rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "user-1";

    /// A fresh in-memory database for each test, so they stay isolated.
    async fn setup_test_db() -> SqlitePool {
        establish_connection_pool("sqlite::memory:").await.unwrap()
    }

    fn payload(title: &str, due: Option<&str>, priority: Option<TaskPriority>) -> CreateTaskPayload {
        CreateTaskPayload {
            title: title.to_string(),
            due_date: due.map(|d| d.parse().unwrap()),
            priority,
            ..CreateTaskPayload::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let pool = setup_test_db().await;
        let created = create_task_in_db(
            &pool,
            USER,
            CreateTaskPayload {
                title: "Test the database".to_string(),
                description: Some("details".to_string()),
                due_date: Some("2024-05-01".parse().unwrap()),
                priority: Some(TaskPriority::High),
                tags: vec!["db".to_string(), "tests".to_string()],
            },
        )
        .await
        .unwrap();

        assert_eq!(created.status, TaskStatus::Todo);
        assert_eq!(created.user_id, USER);

        let fetched = get_task_from_db(&pool, USER, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.title, "Test the database");
        assert_eq!(fetched.description.as_deref(), Some("details"));
        assert_eq!(fetched.priority, Some(TaskPriority::High));
        assert_eq!(fetched.tags, vec!["db", "tests"]);
        assert_eq!(fetched.due_date, created.due_date);
    }

    #[tokio::test]
    async fn test_tasks_are_scoped_to_their_owner() {
        let pool = setup_test_db().await;
        let mine = create_task_in_db(&pool, USER, payload("Mine", None, None)).await.unwrap();
        create_task_in_db(&pool, "someone-else", payload("Theirs", None, None))
            .await
            .unwrap();

        let tasks = list_tasks_from_db(&pool, USER).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, mine.id);

        assert!(get_task_from_db(&pool, "someone-else", mine.id).await.unwrap().is_none());
        assert!(!delete_task_from_db(&pool, "someone-else", mine.id).await.unwrap());
        let update = UpdateTaskPayload::status(TaskStatus::Completed);
        assert!(update_task_in_db(&pool, "someone-else", mine.id, update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_due_date_with_undated_last() {
        let pool = setup_test_db().await;
        create_task_in_db(&pool, USER, payload("No date", None, None)).await.unwrap();
        create_task_in_db(&pool, USER, payload("Later", Some("2024-06-01"), None)).await.unwrap();
        create_task_in_db(&pool, USER, payload("Sooner", Some("2024-01-01"), None)).await.unwrap();

        let tasks = list_tasks_from_db(&pool, USER).await.unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Sooner", "Later", "No date"]);
    }

    #[tokio::test]
    async fn test_update_applies_only_provided_fields() {
        let pool = setup_test_db().await;
        let created = create_task_in_db(&pool, USER, payload("Original", Some("2024-02-02"), Some(TaskPriority::Low)))
            .await
            .unwrap();

        let update = UpdateTaskPayload {
            title: Some("Renamed".to_string()),
            due_date: Some(None),
            ..UpdateTaskPayload::default()
        };
        let updated = update_task_in_db(&pool, USER, created.id, update).await.unwrap().unwrap();

        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.due_date, None);
        assert_eq!(updated.priority, Some(TaskPriority::Low));
        assert_eq!(updated.created_at, created.created_at);

        let stored = get_task_from_db(&pool, USER, created.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_update_unknown_task() {
        let pool = setup_test_db().await;
        let result = update_task_in_db(&pool, USER, Uuid::new_v4(), UpdateTaskPayload::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_task() {
        let pool = setup_test_db().await;
        let task = create_task_in_db(&pool, USER, payload("Doomed", None, None)).await.unwrap();

        assert!(delete_task_from_db(&pool, USER, task.id).await.unwrap());
        assert!(list_tasks_from_db(&pool, USER).await.unwrap().is_empty());

        // Deletion is final: a second attempt finds nothing.
        assert!(!delete_task_from_db(&pool, USER, task.id).await.unwrap());
    }
}
