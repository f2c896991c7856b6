// Port for the server-owned assignment records; the LMS REST client implements it

mod lms;

use crate::domain::{Assignment, AssignmentId, CourseId, ProgressUpdate, UserId};

#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Assignments of the authenticated learner.
    async fn my_assignments(&self) -> anyhow::Result<Vec<Assignment>>;

    /// `user_id = None` assigns the course to the authenticated learner.
    async fn create_assignment(
        &self,
        course_id: CourseId,
        user_id: Option<UserId>,
    ) -> anyhow::Result<Assignment>;

    async fn update_progress(
        &self,
        assignment_id: AssignmentId,
        update: ProgressUpdate,
    ) -> anyhow::Result<Assignment>;

    /// `Ok(None)` means the learner has not started the course yet.
    async fn assignment_for_course(&self, course_id: CourseId) -> anyhow::Result<Option<Assignment>> {
        Ok(self
            .my_assignments()
            .await?
            .into_iter()
            .find(|a| a.course_id == course_id))
    }
}
