use chrono::{DateTime, Utc};
use poem_openapi::{ApiResponse, Enum, Object, payload::Json};
use uuid::Uuid;

use crate::{
    domain::{Assignment, AssignmentStatus},
    player::{PlayerState, PlayerVars},
    tracker::SessionSnapshot,
};

#[derive(Debug, Clone, Object)]
pub struct ErrorDto {
    /// Human-readable error message
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "snake_case")]
pub enum AssignmentStatusDto {
    NotStarted,
    InProgress,
    Completed,
}

impl From<AssignmentStatus> for AssignmentStatusDto {
    fn from(s: AssignmentStatus) -> Self {
        match s {
            AssignmentStatus::NotStarted => AssignmentStatusDto::NotStarted,
            AssignmentStatus::InProgress => AssignmentStatusDto::InProgress,
            AssignmentStatus::Completed => AssignmentStatusDto::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "snake_case")]
pub enum PlayerStateDto {
    Unstarted,
    Playing,
    Paused,
    Ended,
}

impl From<PlayerState> for PlayerStateDto {
    fn from(s: PlayerState) -> Self {
        match s {
            PlayerState::Unstarted => PlayerStateDto::Unstarted,
            PlayerState::Playing => PlayerStateDto::Playing,
            PlayerState::Paused => PlayerStateDto::Paused,
            PlayerState::Ended => PlayerStateDto::Ended,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct AssignmentDto {
    pub id: i64,
    pub course_id: i64,
    pub user_id: i64,
    pub status: AssignmentStatusDto,
    pub progress_percent: u8,
    pub course_title: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Assignment> for AssignmentDto {
    fn from(a: &Assignment) -> Self {
        AssignmentDto {
            id: a.id,
            course_id: a.course_id,
            user_id: a.user_id,
            status: a.status.into(),
            progress_percent: a.progress_percent,
            course_title: a.course_title.clone(),
            last_activity_at: a.last_activity_at,
            completed_at: a.completed_at,
        }
    }
}

/// Parameters for constructing the embedded player
#[derive(Debug, Clone, Object)]
pub struct PlayerVarsDto {
    pub autoplay: u8,
    pub controls: u8,
    pub modestbranding: u8,
    pub rel: u8,
    pub playsinline: u8,
}

impl From<PlayerVars> for PlayerVarsDto {
    fn from(v: PlayerVars) -> Self {
        PlayerVarsDto {
            autoplay: v.autoplay,
            controls: v.controls,
            modestbranding: v.modestbranding,
            rel: v.rel,
            playsinline: v.playsinline,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct MountRequestDto {
    pub course_id: i64,
    /// Course video URL; defaults to the course's own video
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Object)]
pub struct CourseViewDto {
    /// Whether playback progress is being tracked for this view
    pub tracking: bool,
    /// Present when tracking; used for player events and unmount
    pub view_id: Option<Uuid>,
    pub video_id: Option<String>,
    pub embed_url: Option<String>,
    pub player_vars: Option<PlayerVarsDto>,
    /// No assignment exists yet; offer "Start Course"
    pub can_start_course: bool,
    pub assignment: Option<AssignmentDto>,
}

#[derive(Debug, Clone, Object)]
pub struct SessionDto {
    pub view_id: Uuid,
    pub current_percent: u8,
    pub last_reported_percent: u8,
    pub player_state: PlayerStateDto,
    pub polling: bool,
    pub sync_in_flight: bool,
    pub assignment: AssignmentDto,
}

impl From<&SessionSnapshot> for SessionDto {
    fn from(s: &SessionSnapshot) -> Self {
        SessionDto {
            view_id: s.player_id,
            current_percent: s.current_percent,
            last_reported_percent: s.last_reported_percent,
            player_state: s.player_state.into(),
            polling: s.polling,
            sync_in_flight: s.sync_in_flight,
            assignment: (&s.assignment).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "snake_case")]
pub enum PlayerEventKindDto {
    Ready,
    State,
    Telemetry,
}

#[derive(Debug, Clone, Object)]
pub struct PlayerEventDto {
    pub kind: PlayerEventKindDto,
    /// Raw player state code, required for `state`
    pub code: Option<i32>,
    /// Playback position in seconds
    pub current_time: Option<f64>,
    /// Video duration in seconds
    pub duration: Option<f64>,
}

#[derive(ApiResponse)]
pub enum MountResponseDto {
    /// Tracker attached
    #[oai(status = 201)]
    Tracking(Json<CourseViewDto>),

    /// View mounted without tracking
    #[oai(status = 200)]
    Untracked(Json<CourseViewDto>),

    /// Upstream LMS error
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum SessionResponseDto {
    #[oai(status = 200)]
    Ok(Json<SessionDto>),

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum PlayerEventResponseDto {
    /// Event forwarded to the tracker
    #[oai(status = 202)]
    Accepted,

    #[oai(status = 400)]
    BadRequest(Json<ErrorDto>),

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum UnmountResponseDto {
    /// Tracker detached
    #[oai(status = 204)]
    NoContent,

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum StartCourseResponseDto {
    /// Assignment created
    #[oai(status = 201)]
    Created(Json<AssignmentDto>),

    /// The course was already started
    #[oai(status = 200)]
    Existing(Json<AssignmentDto>),

    /// Upstream LMS error
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}
