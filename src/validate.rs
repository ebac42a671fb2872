//! Field-level validation for resource configurations.
//!
//! Validators run before any network call and collect every problem in a
//! configuration rather than stopping at the first one.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {resource_type} configuration: {}", join_errors(.errors))]
pub struct ValidationError {
    pub resource_type: String,
    pub errors: Vec<FieldError>,
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn single(resource_type: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            errors: vec![FieldError {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }

    /// Wraps a deserialization failure of the configuration document.
    pub fn from_config(resource_type: &str, err: serde_json::Error) -> Self {
        Self::single(resource_type, "<config>", err.to_string())
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

/// A regex compiled on first use. A pattern that fails to compile is logged
/// once and matches nothing.
pub(crate) struct LazyPattern {
    pattern: &'static str,
    cell: OnceLock<Option<Regex>>,
}

impl LazyPattern {
    pub(crate) const fn new(pattern: &'static str) -> Self {
        Self {
            pattern,
            cell: OnceLock::new(),
        }
    }

    pub(crate) fn get(&self) -> Option<&Regex> {
        self.cell
            .get_or_init(|| {
                let Ok(re) = Regex::new(self.pattern) else {
                    tracing::error!(pattern = self.pattern, "built-in pattern failed to compile");
                    return None;
                };
                Some(re)
            })
            .as_ref()
    }

    pub(crate) fn is_match(&self, value: &str) -> bool {
        self.get().is_some_and(|re| re.is_match(value))
    }
}

static SERVICE_NAME: LazyPattern =
    LazyPattern::new(r"^[a-zA-Z](?:[a-zA-Z0-9-]{0,48}[a-zA-Z0-9])?$");

// Length is checked separately; counted repetitions of large classes blow
// past the regex size limit.
static RESOURCE_GROUP: LazyPattern = LazyPattern::new(r"^[-A-Za-z0-9_.()]*[-A-Za-z0-9_()]$");

static CHILD_NAME: LazyPattern = LazyPattern::new(r"^[0-9a-zA-Z][0-9a-zA-Z-]{0,79}$");

static API_PATH: LazyPattern =
    LazyPattern::new(r"^(?:|[A-Za-z0-9_.][A-Za-z0-9_\-/.]*[A-Za-z0-9_\-]|[A-Za-z0-9_])$");

static EMAIL: LazyPattern = LazyPattern::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$");

static ISO8601_DURATION: LazyPattern = LazyPattern::new(
    r"^P(?:\d+Y)?(?:\d+M)?(?:\d+W)?(?:\d+D)?(?:T(?:\d+H)?(?:\d+M)?(?:\d+(?:\.\d+)?S)?)?$",
);

/// Accumulates field errors for one configuration.
#[derive(Debug)]
pub struct Validator {
    resource_type: &'static str,
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new(resource_type: &'static str) -> Self {
        Self {
            resource_type,
            errors: Vec::new(),
        }
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
        self
    }

    pub fn require(&mut self, condition: bool, field: &str, message: &str) -> &mut Self {
        if !condition {
            self.error(field, message);
        }
        self
    }

    pub fn not_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, "must not be empty");
        }
        self
    }

    pub fn opt_not_empty(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.not_empty(field, value);
        }
        self
    }

    pub fn service_name(&mut self, field: &str, value: &str) -> &mut Self {
        if !SERVICE_NAME.is_match(value) {
            self.error(
                field,
                "must be 1-50 characters, start with a letter, contain only letters, digits and hyphens, and not end with a hyphen",
            );
        }
        self
    }

    pub fn resource_group_name(&mut self, field: &str, value: &str) -> &mut Self {
        if value.chars().count() > 90 || !RESOURCE_GROUP.is_match(value) {
            self.error(
                field,
                "must be 1-90 characters of letters, digits, '-', '_', '.', '(' or ')' and not end with '.'",
            );
        }
        self
    }

    /// Names of entities nested under a service (APIs, loggers, gateways, ...).
    pub fn child_name(&mut self, field: &str, value: &str) -> &mut Self {
        if !CHILD_NAME.is_match(value) {
            self.error(
                field,
                "must be 1-80 characters, start with a letter or digit and contain only letters, digits and hyphens",
            );
        }
        self
    }

    pub fn api_path(&mut self, field: &str, value: &str) -> &mut Self {
        if value.chars().count() > 400 || !API_PATH.is_match(value) {
            self.error(
                field,
                "must be at most 400 characters, not start with '/' and not end with '/' or '.'",
            );
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !EMAIL.is_match(value) {
            self.error(field, "must be a valid email address");
        }
        self
    }

    pub fn http_url(&mut self, field: &str, value: &str) -> &mut Self {
        let valid = reqwest::Url::parse(value)
            .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host());
        if !valid {
            self.error(field, "must be a URL with an http or https scheme");
        }
        self
    }

    pub fn iso8601_duration(&mut self, field: &str, value: &str) -> &mut Self {
        if value == "P" || value.ends_with('T') || !ISO8601_DURATION.is_match(value) {
            self.error(field, "must be an ISO 8601 duration, e.g. PT1M");
        }
        self
    }

    pub fn length_between(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let len = value.chars().count();
        if len < min || len > max {
            self.error(
                field,
                format!("length must be between {} and {}, got {}", min, max, len),
            );
        }
        self
    }

    pub fn range<T>(&mut self, field: &str, value: T, min: T, max: T) -> &mut Self
    where
        T: PartialOrd + fmt::Display,
    {
        if value < min || value > max {
            self.error(
                field,
                format!("must be between {} and {}, got {}", min, max, value),
            );
        }
        self
    }

    /// Exactly one of the named fields must be set.
    pub fn exactly_one_of(&mut self, fields: &[(&str, bool)]) -> &mut Self {
        let set = fields.iter().filter(|(_, present)| *present).count();
        if set != 1 {
            let names: Vec<String> = fields.iter().map(|(name, _)| format!("`{}`", name)).collect();
            let field = fields.first().map(|(name, _)| *name).unwrap_or("<config>");
            self.error(
                field,
                format!("exactly one of {} must be set", names.join(", ")),
            );
        }
        self
    }

    pub fn conflicts_with(
        &mut self,
        field: &str,
        present: bool,
        other: &str,
        other_present: bool,
    ) -> &mut Self {
        if present && other_present {
            self.error(field, format!("conflicts with `{}`", other));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(ValidationError {
            resource_type: self.resource_type.to_string(),
            errors: std::mem::take(&mut self.errors),
        })
    }
}
