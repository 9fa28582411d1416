//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse, status codes)
//! - Check every route compiles and names a real method
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::routing::{pattern, MethodFilter};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyApiKey,

    #[error("router.base_path `{0}` must start with `/`")]
    InvalidBasePath(String),

    #[error("route `{route}`: invalid method `{method}`")]
    InvalidMethod { route: String, method: String },

    #[error("route `{route}`: {reason}")]
    InvalidPattern { route: String, reason: String },

    #[error("route `{route}`: invalid status {status}")]
    InvalidStatus { route: String, status: u16 },

    #[error("route `{route}`: invalid header `{header}`")]
    InvalidHeader { route: String, header: String },

    #[error("duplicate route name `{0}`")]
    DuplicateRouteName(String),
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero {
            field: "listener.max_connections",
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.request_secs",
        });
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero {
            field: "limits.max_body_bytes",
        });
    }
    if !config.router.base_path.is_empty() && !config.router.base_path.starts_with('/') {
        errors.push(ValidationError::InvalidBasePath(config.router.base_path.clone()));
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::EmptyApiKey);
        }
    }

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRouteName(route.name.clone()));
        }
        if route.method.parse::<MethodFilter>().is_err() {
            errors.push(ValidationError::InvalidMethod {
                route: route.name.clone(),
                method: route.method.clone(),
            });
        }
        if let Err(err) = pattern::compile(&route.path) {
            errors.push(ValidationError::InvalidPattern {
                route: route.name.clone(),
                reason: err.to_string(),
            });
        }
        if StatusCode::from_u16(route.status).is_err() {
            errors.push(ValidationError::InvalidStatus {
                route: route.name.clone(),
                status: route.status,
            });
        }
        let headers = route
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(std::iter::once(("content-type", route.content_type.as_str())));
        for (name, value) in headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::InvalidHeader {
                    route: route.name.clone(),
                    header: name.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
