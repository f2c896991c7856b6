use poem_openapi::payload::PlainText;

use crate::course_api::CourseViewRegistry;

pub struct HealthService<'a> {
    pub registry: &'a CourseViewRegistry,
}

impl<'a> HealthService<'a> {
    pub fn new(registry: &'a CourseViewRegistry) -> Self {
        Self { registry }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn status_text(&self) -> PlainText<String> {
        let views = self.registry.active_count().await;
        match self.registry.store().my_assignments().await {
            Ok(list) => PlainText(format!(
                "LMS reachable assignments={} active_views={}",
                list.len(),
                views
            )),
            Err(e) => PlainText(format!("error: {:#} active_views={}", e, views)),
        }
    }
}
