use poem_openapi::payload::Json;
use uuid::Uuid;

use crate::{
    course_api::{
        models::{
            AssignmentDto, CourseViewDto, ErrorDto, MountRequestDto, MountResponseDto,
            PlayerEventDto, PlayerEventKindDto, PlayerEventResponseDto, SessionDto,
            SessionResponseDto, StartCourseResponseDto, UnmountResponseDto,
        },
        registry::{CourseViewRegistry, MountOutcome},
    },
    player::{BridgeMessage, PlaybackSample, PlayerError},
};

pub struct CourseViewService<'a> {
    pub registry: &'a CourseViewRegistry,
}

fn not_found(view_id: Uuid) -> Json<ErrorDto> {
    Json(ErrorDto {
        message: format!("Course view {} not found", view_id),
    })
}

impl<'a> CourseViewService<'a> {
    pub fn new(registry: &'a CourseViewRegistry) -> Self {
        Self { registry }
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(course_id = body.course_id))]
    pub async fn mount(&self, body: MountRequestDto) -> MountResponseDto {
        let outcome = match self
            .registry
            .mount(body.course_id, body.video_url.as_deref())
            .await
        {
            Ok(o) => o,
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(%error, "mount failed");
                return MountResponseDto::BadGateway(Json(ErrorDto {
                    message: format!("Failed to load course assignment: {}", e),
                }));
            }
        };

        match outcome {
            MountOutcome::Tracking { tracker, video } => {
                let snap = tracker.snapshot();
                MountResponseDto::Tracking(Json(CourseViewDto {
                    tracking: true,
                    view_id: Some(snap.player_id),
                    embed_url: Some(video.embed_url()),
                    video_id: Some(video.id),
                    player_vars: Some(self.registry.settings().player_vars.into()),
                    can_start_course: false,
                    assignment: Some((&snap.assignment).into()),
                }))
            }
            MountOutcome::StartCourse => MountResponseDto::Untracked(Json(CourseViewDto {
                tracking: false,
                view_id: None,
                video_id: None,
                embed_url: None,
                player_vars: None,
                can_start_course: true,
                assignment: None,
            })),
            MountOutcome::PassiveEmbed {
                embed_url,
                assignment,
            } => MountResponseDto::Untracked(Json(CourseViewDto {
                tracking: false,
                view_id: None,
                video_id: None,
                embed_url,
                player_vars: None,
                can_start_course: false,
                assignment: Some((&assignment).into()),
            })),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn session(&self, view_id: Uuid) -> SessionResponseDto {
        match self.registry.get(view_id).await {
            Some(tracker) => SessionResponseDto::Ok(Json(SessionDto::from(&tracker.snapshot()))),
            None => SessionResponseDto::NotFound(not_found(view_id)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, body))]
    pub async fn player_event(&self, view_id: Uuid, body: PlayerEventDto) -> PlayerEventResponseDto {
        let message = match (body.kind, body.code) {
            (PlayerEventKindDto::Ready, _) => BridgeMessage::Ready,
            (PlayerEventKindDto::State, Some(code)) => BridgeMessage::State(code),
            (PlayerEventKindDto::State, None) => {
                return PlayerEventResponseDto::BadRequest(Json(ErrorDto {
                    message: "State events require a code".into(),
                }));
            }
            (PlayerEventKindDto::Telemetry, _) => BridgeMessage::Telemetry,
        };
        let sample = PlaybackSample {
            current_time: body.current_time,
            duration: body.duration,
        };
        tracing::trace!(?message, ?sample, "player event");

        match self.registry.dispatch(view_id, message, sample).await {
            Ok(()) => PlayerEventResponseDto::Accepted,
            Err(PlayerError::UnknownPlayer(_) | PlayerError::Destroyed) => {
                PlayerEventResponseDto::NotFound(not_found(view_id))
            }
            Err(e) => PlayerEventResponseDto::BadRequest(Json(ErrorDto {
                message: e.to_string(),
            })),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn unmount(&self, view_id: Uuid) -> UnmountResponseDto {
        if self.registry.unmount(view_id).await {
            UnmountResponseDto::NoContent
        } else {
            UnmountResponseDto::NotFound(not_found(view_id))
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn start_course(&self, course_id: i64) -> StartCourseResponseDto {
        match self.registry.start_course(course_id).await {
            Ok((assignment, true)) => {
                StartCourseResponseDto::Created(Json(AssignmentDto::from(&assignment)))
            }
            Ok((assignment, false)) => {
                StartCourseResponseDto::Existing(Json(AssignmentDto::from(&assignment)))
            }
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(%error, "start course failed");
                StartCourseResponseDto::BadGateway(Json(ErrorDto {
                    message: format!("Failed to start course: {}", e),
                }))
            }
        }
    }
}
