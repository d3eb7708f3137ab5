//! Task and project aggregate persistence.
//!
//! Workflow scalars live in real columns so transitions can issue a single
//! conditional `UPDATE` guarded on the state they read (compare-and-swap);
//! ordered sub-records (`rejections`, `date_changes`) and counters are JSON
//! columns serialized with serde.

use crate::model::{
    ApprovalStatus, Priority, Project, ProjectMetrics, ProjectStatus, Rejection, Status, Task,
    TaskMetrics,
};
use crate::store::{Store, opt_ts, opt_us, req_ts};
use rusqlite::{Row, params, types::Type};
use std::str::FromStr;

fn json_column_error(index: usize, error: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
}

fn to_json<T: serde::Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|error| json_column_error(0, error))
}

fn parse_enum<T: FromStr>(index: usize, raw: &str) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(raw).map_err(|error| json_column_error(index, error))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let approval: String = row.get("approval_status")?;
    let priority: String = row.get("priority")?;
    let rejections_json: String = row.get("rejections_json")?;
    let metrics_json: String = row.get("metrics_json")?;

    let rejections: Vec<Rejection> =
        serde_json::from_str(&rejections_json).map_err(|error| json_column_error(17, error))?;
    let metrics: TaskMetrics =
        serde_json::from_str(&metrics_json).map_err(|error| json_column_error(18, error))?;

    Ok(Task {
        id: row.get("task_id")?,
        workspace_id: row.get("workspace_id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        status: parse_enum::<Status>(4, &status)?,
        approval_status: parse_enum::<ApprovalStatus>(5, &approval)?,
        priority: parse_enum::<Priority>(6, &priority)?,
        assignee: row.get("assignee")?,
        creator: row.get("creator")?,
        start_date: opt_ts(row.get("start_date_us")?),
        due_date: opt_ts(row.get("due_date_us")?),
        started_at: opt_ts(row.get("started_at_us")?),
        completed_at: opt_ts(row.get("completed_at_us")?),
        submitted_for_approval_at: opt_ts(row.get("submitted_at_us")?),
        approved_at: opt_ts(row.get("approved_at_us")?),
        approved_by: row.get("approved_by")?,
        is_active: row.get("is_active")?,
        rejections,
        metrics,
        created_at: req_ts(row.get("created_at_us")?),
        updated_at: req_ts(row.get("updated_at_us")?),
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let status: String = row.get("status")?;
    let members_json: String = row.get("members_json")?;
    let date_changes_json: String = row.get("date_changes_json")?;
    let metrics_json: String = row.get("metrics_json")?;

    Ok(Project {
        id: row.get("project_id")?,
        workspace_id: row.get("workspace_id")?,
        name: row.get("name")?,
        status: parse_enum::<ProjectStatus>(3, &status)?,
        start_date: opt_ts(row.get("start_date_us")?),
        end_date: opt_ts(row.get("end_date_us")?),
        project_head: row.get("project_head")?,
        members: serde_json::from_str(&members_json)
            .map_err(|error| json_column_error(7, error))?,
        is_active: row.get("is_active")?,
        date_changes: serde_json::from_str(&date_changes_json)
            .map_err(|error| json_column_error(9, error))?,
        metrics: serde_json::from_str::<ProjectMetrics>(&metrics_json)
            .map_err(|error| json_column_error(10, error))?,
        created_at: req_ts(row.get("created_at_us")?),
        updated_at: req_ts(row.get("updated_at_us")?),
    })
}

const TASK_COLUMNS: &str = "task_id, workspace_id, project_id, title, status, approval_status, \
     priority, assignee, creator, start_date_us, due_date_us, started_at_us, completed_at_us, \
     submitted_at_us, approved_at_us, approved_by, is_active, rejections_json, metrics_json, \
     created_at_us, updated_at_us";

const PROJECT_COLUMNS: &str = "project_id, workspace_id, name, status, start_date_us, \
     end_date_us, project_head, members_json, is_active, date_changes_json, metrics_json, \
     created_at_us, updated_at_us";

impl Store {
    /// Fetch one task by id. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn get_task(&self, task_id: &str) -> rusqlite::Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map(params![task_id], |row| task_from_row(row))?;
        rows.next().transpose()
    }

    /// Insert or fully replace a task aggregate.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or a JSON column fails to encode.
    pub fn put_task(&self, task: &Task) -> rusqlite::Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO tasks ({TASK_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
              ?18, ?19, ?20, ?21)"
        );
        self.conn.execute(
            &sql,
            params![
                task.id,
                task.workspace_id,
                task.project_id,
                task.title,
                task.status.to_string(),
                task.approval_status.to_string(),
                task.priority.to_string(),
                task.assignee,
                task.creator,
                opt_us(task.start_date),
                opt_us(task.due_date),
                opt_us(task.started_at),
                opt_us(task.completed_at),
                opt_us(task.submitted_for_approval_at),
                opt_us(task.approved_at),
                task.approved_by,
                task.is_active,
                to_json(&task.rejections)?,
                to_json(&task.metrics)?,
                task.created_at.timestamp_micros(),
                task.updated_at.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    /// Conditionally replace a task aggregate, guarded on the workflow state
    /// the caller read. Returns `false` (and writes nothing) when the row's
    /// current state no longer matches — the caller lost a race and must
    /// re-read.
    ///
    /// The guard plus full-row write happen in one statement, so two
    /// concurrent transitions can never both observe the same pre-state and
    /// both commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or a JSON column fails to encode.
    pub fn cas_task(
        &self,
        task: &Task,
        expect_status: Status,
        expect_approval: ApprovalStatus,
    ) -> rusqlite::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET
                 status = ?1, approval_status = ?2, priority = ?3, assignee = ?4,
                 start_date_us = ?5, due_date_us = ?6, started_at_us = ?7,
                 completed_at_us = ?8, submitted_at_us = ?9, approved_at_us = ?10,
                 approved_by = ?11, is_active = ?12, rejections_json = ?13,
                 metrics_json = ?14, updated_at_us = ?15
             WHERE task_id = ?16 AND status = ?17 AND approval_status = ?18",
            params![
                task.status.to_string(),
                task.approval_status.to_string(),
                task.priority.to_string(),
                task.assignee,
                opt_us(task.start_date),
                opt_us(task.due_date),
                opt_us(task.started_at),
                opt_us(task.completed_at),
                opt_us(task.submitted_for_approval_at),
                opt_us(task.approved_at),
                task.approved_by,
                task.is_active,
                to_json(&task.rejections)?,
                to_json(&task.metrics)?,
                task.updated_at.timestamp_micros(),
                task.id,
                expect_status.to_string(),
                expect_approval.to_string(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Fetch one project by id. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn get_project(&self, project_id: &str) -> rusqlite::Result<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map(params![project_id], |row| project_from_row(row))?;
        rows.next().transpose()
    }

    /// Insert or fully replace a project aggregate.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or a JSON column fails to encode.
    pub fn put_project(&self, project: &Project) -> rusqlite::Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO projects ({PROJECT_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        );
        self.conn.execute(
            &sql,
            params![
                project.id,
                project.workspace_id,
                project.name,
                project.status.to_string(),
                opt_us(project.start_date),
                opt_us(project.end_date),
                project.project_head,
                to_json(&project.members)?,
                project.is_active,
                to_json(&project.date_changes)?,
                to_json(&project.metrics)?,
                project.created_at.timestamp_micros(),
                project.updated_at.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    /// All tasks in a workspace, ordered by id for determinism.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn tasks_in_workspace(&self, workspace_id: &str) -> rusqlite::Result<Vec<Task>> {
        let sql =
            format!("SELECT {TASK_COLUMNS} FROM tasks WHERE workspace_id = ?1 ORDER BY task_id");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![workspace_id], |row| task_from_row(row))?;
        rows.collect()
    }

    /// Distinct assignees with at least one task in the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn assignees_in_workspace(&self, workspace_id: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT assignee FROM tasks
             WHERE workspace_id = ?1 AND assignee IS NOT NULL
             ORDER BY assignee",
        )?;
        let rows = stmt.query_map(params![workspace_id], |row| row.get(0))?;
        rows.collect()
    }
}
