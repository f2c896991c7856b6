use std::sync::Arc;

use poem_openapi::{
    OpenApi,
    param::Path,
    payload::{Json, PlainText},
};
use uuid::Uuid;

use super::models::{
    MountRequestDto, MountResponseDto, PlayerEventDto, PlayerEventResponseDto, SessionResponseDto,
    StartCourseResponseDto, UnmountResponseDto,
};
use super::registry::CourseViewRegistry;
use super::services::{course_view::CourseViewService, health::HealthService};

pub struct CourseViewApi {
    pub registry: Arc<CourseViewRegistry>,
}

#[OpenApi]
impl CourseViewApi {
    /// LMS reachability and number of mounted views
    #[oai(path = "/status", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn status(&self) -> PlainText<String> {
        tracing::debug!("handling /status");
        HealthService::new(&self.registry).status_text().await
    }

    /// Mount the course detail view and attach a progress tracker when possible
    #[oai(path = "/v1/course-views", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn mount_course_view(&self, body: Json<MountRequestDto>) -> MountResponseDto {
        CourseViewService::new(&self.registry).mount(body.0).await
    }

    /// Current tracking state of a mounted view
    #[oai(path = "/v1/course-views/:view_id", method = "get")]
    #[tracing::instrument(level = "debug", skip(self, view_id))]
    async fn get_course_view(&self, view_id: Path<Uuid>) -> SessionResponseDto {
        CourseViewService::new(&self.registry)
            .session(view_id.0)
            .await
    }

    /// Unmount a view; stops polling and releases the player
    #[oai(path = "/v1/course-views/:view_id", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self, view_id))]
    async fn unmount_course_view(&self, view_id: Path<Uuid>) -> UnmountResponseDto {
        CourseViewService::new(&self.registry)
            .unmount(view_id.0)
            .await
    }

    /// Relay a lifecycle or telemetry event from the embedded player
    #[oai(path = "/v1/course-views/:view_id/events", method = "post")]
    #[tracing::instrument(level = "trace", skip(self, view_id, body))]
    async fn player_event(
        &self,
        view_id: Path<Uuid>,
        body: Json<PlayerEventDto>,
    ) -> PlayerEventResponseDto {
        CourseViewService::new(&self.registry)
            .player_event(view_id.0, body.0)
            .await
    }

    /// Self-assign a course ("Start Course")
    #[oai(path = "/v1/courses/:course_id/start", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, course_id))]
    async fn start_course(&self, course_id: Path<i64>) -> StartCourseResponseDto {
        CourseViewService::new(&self.registry)
            .start_course(course_id.0)
            .await
    }
}
