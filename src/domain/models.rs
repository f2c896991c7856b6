// Domain models independent of the LMS wire format

use chrono::{DateTime, Utc};

pub type AssignmentId = i64;
pub type CourseId = i64;
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::NotStarted => "not_started",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(AssignmentStatus::NotStarted),
            "in_progress" => Some(AssignmentStatus::InProgress),
            "completed" => Some(AssignmentStatus::Completed),
            _ => None,
        }
    }

    /// Status hint derived from a percent. The server response stays authoritative.
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            100.. => AssignmentStatus::Completed,
            1..=99 => AssignmentStatus::InProgress,
            0 => AssignmentStatus::NotStarted,
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One learner's assignment to one course, as last acknowledged by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: AssignmentId,
    pub course_id: CourseId,
    pub user_id: UserId,
    pub status: AssignmentStatus,
    /// 0 - 100
    pub progress_percent: u8,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub course_title: Option<String>,
    pub video_url: Option<String>,
    pub user_name: Option<String>,
    pub assigned_by: Option<UserId>,
    pub assigned_by_name: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Body of a progress patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress_percent: u8,
    pub status: Option<AssignmentStatus>,
}

impl ProgressUpdate {
    pub fn for_percent(percent: u8) -> Self {
        ProgressUpdate {
            progress_percent: percent.min(100),
            status: Some(AssignmentStatus::from_percent(percent)),
        }
    }
}
