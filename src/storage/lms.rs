use anyhow::Context;

use super::AssignmentStore;
use crate::{
    domain::{
        Assignment, AssignmentId, CourseId, ProgressUpdate, UserId,
        mapping::{map_assignment, map_progress_update},
    },
    lms_client::{CreateAssignmentRequest, LmsClient},
};

#[async_trait::async_trait]
impl AssignmentStore for LmsClient {
    async fn my_assignments(&self) -> anyhow::Result<Vec<Assignment>> {
        let list = self
            .get_my_assignments()
            .await
            .context("failed to list assignments")?;
        Ok(list.into_iter().map(map_assignment).collect())
    }

    async fn create_assignment(
        &self,
        course_id: CourseId,
        user_id: Option<UserId>,
    ) -> anyhow::Result<Assignment> {
        let body = CreateAssignmentRequest { course_id, user_id };
        let created = self
            .post_assignment(&body)
            .await
            .with_context(|| format!("failed to create assignment for course {}", course_id))?;
        Ok(map_assignment(created))
    }

    async fn update_progress(
        &self,
        assignment_id: AssignmentId,
        update: ProgressUpdate,
    ) -> anyhow::Result<Assignment> {
        let body = map_progress_update(&update);
        let updated = self
            .patch_progress(assignment_id, &body)
            .await
            .with_context(|| format!("failed to update progress of assignment {}", assignment_id))?;
        Ok(map_assignment(updated))
    }
}
