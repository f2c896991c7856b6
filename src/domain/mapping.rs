// Mapping from LMS DTOs to domain models

use super::models::{Assignment, AssignmentStatus, ProgressUpdate};
use crate::lms_client::{AssignmentResponse, CourseField, UpdateProgressRequest};

pub fn map_assignment(dto: AssignmentResponse) -> Assignment {
    let status = AssignmentStatus::parse(&dto.status).unwrap_or_else(|| {
        tracing::warn!(status = %dto.status, assignment_id = dto.id, "unknown assignment status");
        AssignmentStatus::from_percent(dto.progress_pct)
    });

    let (course_title, video_url) = match dto.course {
        CourseField::Id(_) => (dto.course_title, None),
        CourseField::Nested(ref c) => (
            dto.course_title.or_else(|| c.title.clone()),
            c.video_url.clone().filter(|u| !u.is_empty()),
        ),
    };

    Assignment {
        id: dto.id,
        course_id: dto.course.id(),
        user_id: dto.user,
        status,
        progress_percent: dto.progress_pct.min(100),
        last_activity_at: dto.last_activity_at,
        course_title,
        video_url,
        user_name: dto.user_name,
        assigned_by: dto.assigned_by,
        assigned_by_name: dto.assigned_by_name,
        assigned_at: dto.assigned_at,
        completed_at: dto.completed_at,
    }
}

pub fn map_progress_update(update: &ProgressUpdate) -> UpdateProgressRequest {
    UpdateProgressRequest {
        progress_pct: update.progress_percent,
        status: update.status.map(|s| s.as_str().to_string()),
    }
}
