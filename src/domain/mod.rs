pub mod mapping;
pub mod models;
pub mod video;

pub use models::{Assignment, AssignmentId, AssignmentStatus, CourseId, ProgressUpdate, UserId};
pub use video::VideoRef;
