pub mod course_view;
pub mod health;
