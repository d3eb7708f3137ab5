use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Project lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::OnHold => "on-hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One recorded change to a project date field.
///
/// Appended whenever `start_date` or `end_date` moves; the list is ordered
/// by `changed_at` and never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateChange {
    pub field: DateField,
    pub old_value: Option<DateTime<Utc>>,
    pub new_value: Option<DateTime<Utc>>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Which project date field a [`DateChange`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    StartDate,
    EndDate,
}

impl DateField {
    const fn as_str(self) -> &'static str {
        match self {
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
        }
    }
}

/// Deadline-movement counters, incremented only when `end_date` moves later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectMetrics {
    pub times_deadline_extended: u32,
    pub total_delay_days: u32,
}

impl ProjectMetrics {
    /// Record a deadline extension of `delay_days` (> 0) calendar days.
    pub fn record_extension(&mut self, delay_days: u32) {
        if delay_days > 0 {
            self.times_deadline_extended = self.times_deadline_extended.saturating_add(1);
            self.total_delay_days = self.total_delay_days.saturating_add(delay_days);
        }
    }
}

/// All persisted fields for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub project_head: String,
    pub members: Vec<String>,
    pub is_active: bool,
    pub date_changes: Vec<DateChange>,
    pub metrics: ProjectMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            id: String::new(),
            workspace_id: String::new(),
            name: String::new(),
            status: ProjectStatus::Planning,
            start_date: None,
            end_date: None,
            project_head: String::new(),
            members: Vec::new(),
            is_active: true,
            date_changes: Vec::new(),
            metrics: ProjectMetrics::default(),
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProjectEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseProjectEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseProjectEnumError {}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ParseProjectEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "active" => Ok(Self::Active),
            "on-hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseProjectEnumError {
                expected: "project status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for DateField {
    type Err = ParseProjectEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start_date" => Ok(Self::StartDate),
            "end_date" => Ok(Self::EndDate),
            _ => Err(ParseProjectEnumError {
                expected: "date field",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DateField, Project, ProjectMetrics, ProjectStatus};
    use std::str::FromStr;

    #[test]
    fn status_display_parse_roundtrips() {
        for value in [
            ProjectStatus::Planning,
            ProjectStatus::Active,
            ProjectStatus::OnHold,
            ProjectStatus::Completed,
            ProjectStatus::Cancelled,
        ] {
            assert_eq!(ProjectStatus::from_str(&value.to_string()).unwrap(), value);
        }
        assert!(ProjectStatus::from_str("archived").is_err());
    }

    #[test]
    fn date_field_parse() {
        assert_eq!(DateField::from_str("end_date").unwrap(), DateField::EndDate);
        assert!(DateField::from_str("due_date").is_err());
    }

    #[test]
    fn extension_counters_only_move_for_positive_delay() {
        let mut metrics = ProjectMetrics::default();
        metrics.record_extension(0);
        assert_eq!(metrics.times_deadline_extended, 0);
        assert_eq!(metrics.total_delay_days, 0);

        metrics.record_extension(5);
        metrics.record_extension(3);
        assert_eq!(metrics.times_deadline_extended, 2);
        assert_eq!(metrics.total_delay_days, 8);
    }

    #[test]
    fn project_default_is_stable() {
        let project = Project::default();
        assert_eq!(project.status, ProjectStatus::Planning);
        assert!(project.is_active);
        assert!(project.members.is_empty());
        assert!(project.date_changes.is_empty());
    }
}
