use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        featured::FeaturedError,
        flags::FlagError,
        repos::{RepoError, SearchError},
        syndication::FeedError,
        taxonomy::TaxonomyError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Error returned by HTTP handlers: a public message plus a diagnostic report.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: String,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn internal(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            error,
        )
    }

    fn search_unavailable(source: &'static str, error: &SearchError) -> Self {
        Self::from_error(
            source,
            StatusCode::BAD_GATEWAY,
            "Search index unavailable",
            error,
        )
    }

    fn repo(source: &'static str, error: &RepoError) -> Self {
        match error {
            RepoError::NotFound => {
                Self::from_error(source, StatusCode::NOT_FOUND, "Resource not found", error)
            }
            RepoError::InvalidInput { .. } => Self::from_error(
                source,
                StatusCode::BAD_REQUEST,
                "Request could not be processed",
                error,
            ),
            RepoError::Timeout => Self::from_error(
                source,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                error,
            ),
            RepoError::Persistence(_) => Self::internal(source, error),
        }
    }

    fn domain(source: &'static str, error: &DomainError) -> Self {
        match error {
            DomainError::Validation { .. } => Self::from_error(
                source,
                StatusCode::BAD_REQUEST,
                error.to_string(),
                error,
            ),
            DomainError::NotFound { .. } => {
                Self::from_error(source, StatusCode::NOT_FOUND, "Resource not found", error)
            }
            DomainError::Invariant { .. } => Self::internal(source, error),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<TaxonomyError> for HttpError {
    fn from(error: TaxonomyError) -> Self {
        const SOURCE: &str = "infra::http::taxonomy_error_to_http_error";
        match &error {
            TaxonomyError::Search(err) => HttpError::search_unavailable(SOURCE, err),
        }
    }
}

impl From<FeaturedError> for HttpError {
    fn from(error: FeaturedError) -> Self {
        const SOURCE: &str = "infra::http::featured_error_to_http_error";
        match &error {
            FeaturedError::PermissionDenied(_) => {
                HttpError::from_error(SOURCE, StatusCode::FORBIDDEN, "Permission denied", &error)
            }
            FeaturedError::UnresolvedTarget => HttpError::from_error(
                SOURCE,
                StatusCode::UNPROCESSABLE_ENTITY,
                error.to_string(),
                &error,
            ),
            FeaturedError::Validation(err) => HttpError::domain(SOURCE, err),
            FeaturedError::Search(err) => HttpError::search_unavailable(SOURCE, err),
            FeaturedError::Repo(err) => HttpError::repo(SOURCE, err),
        }
    }
}

impl From<FlagError> for HttpError {
    fn from(error: FlagError) -> Self {
        const SOURCE: &str = "infra::http::flag_error_to_http_error";
        match &error {
            FlagError::Repo(err) => HttpError::repo(SOURCE, err),
        }
    }
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        const SOURCE: &str = "infra::http::feed_error_to_http_error";
        match &error {
            FeedError::Validation(err) => HttpError::domain(SOURCE, err),
            FeedError::Repo(err) => HttpError::repo(SOURCE, err),
        }
    }
}

/// Errors surfaced at the binary edge.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_target_keeps_its_message() {
        let error = HttpError::from(FeaturedError::UnresolvedTarget);
        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            error.public_message,
            "No records created, invalid journalKey or DOI specified."
        );
    }

    #[test]
    fn report_walks_the_source_chain() {
        let error = TaxonomyError::Search(SearchError::Transport("refused".to_string()));
        let http = HttpError::from(error);
        assert_eq!(http.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(http.report.messages.len(), 2);
        assert_eq!(http.report.messages[1], "search transport error: refused");
    }

    #[test]
    fn permission_denied_maps_to_forbidden() {
        let error = HttpError::from(FeaturedError::PermissionDenied("nope".to_string()));
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
    }
}
