//! The directory payload: everything the app shows, cached as one unit.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Resource, Service, Testimonial};

/// Services, resources and testimonials as a single cacheable unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DirectoryPayload {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub testimonials: Vec<Testimonial>,
}

/// Where the payload currently exposed to the app came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Remote,
    Cache,
    Static,
}

impl DataSource {
    pub fn label(&self) -> &'static str {
        match self {
            DataSource::Remote => "live",
            DataSource::Cache => "cached",
            DataSource::Static => "default",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("service {0} has a blank title")]
    BlankServiceTitle(i64),

    #[error("duplicate service id {0}")]
    DuplicateServiceId(i64),

    #[error("resource {0} has a blank title")]
    BlankResourceTitle(i64),

    #[error("testimonial {0} has no content")]
    BlankTestimonial(i64),

    #[error("testimonial {id} has rating {rating}, expected 1-5")]
    RatingOutOfRange { id: i64, rating: u8 },
}

impl DirectoryPayload {
    pub fn new(
        services: Vec<Service>,
        resources: Vec<Resource>,
        testimonials: Vec<Testimonial>,
    ) -> Self {
        Self {
            services,
            resources,
            testimonials,
        }
    }

    /// A payload with no services has nothing to show, whatever else it holds.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Check the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::with_capacity(self.services.len());
        for service in &self.services {
            if service.title.trim().is_empty() {
                return Err(ValidationError::BlankServiceTitle(service.id));
            }
            if !seen.insert(service.id) {
                return Err(ValidationError::DuplicateServiceId(service.id));
            }
        }

        if let Some(resource) = self.resources.iter().find(|r| r.title.trim().is_empty()) {
            return Err(ValidationError::BlankResourceTitle(resource.id));
        }

        for testimonial in &self.testimonials {
            if testimonial.content.trim().is_empty() {
                return Err(ValidationError::BlankTestimonial(testimonial.id));
            }
            if !testimonial.has_valid_rating() {
                return Err(ValidationError::RatingOutOfRange {
                    id: testimonial.id,
                    rating: testimonial.rating,
                });
            }
        }

        Ok(())
    }

    pub fn services_in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Service> {
        self.services
            .iter()
            .filter(move |s| s.category.eq_ignore_ascii_case(category))
    }

    pub fn active_services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter().filter(|s| s.is_active)
    }

    pub fn featured_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_featured && r.is_public)
    }

    /// Testimonials that are both featured and approved for display.
    pub fn featured_testimonials(&self) -> impl Iterator<Item = &Testimonial> {
        self.testimonials
            .iter()
            .filter(|t| t.is_featured && t.is_approved)
    }

    pub fn find_service(&self, id: i64) -> Option<&Service> {
        self.services.iter().find(|s| s.id == id)
    }

    /// Distinct service categories in listing order.
    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for service in &self.services {
            if !out.contains(&service.category.as_str()) {
                out.push(&service.category);
            }
        }
        out
    }
}
