// HTTP surface consumed by the course detail page and its embedded player

pub mod models;
pub mod registry;
pub mod routes;
pub mod services;

pub use registry::CourseViewRegistry;
pub use routes::CourseViewApi;
