//! Normalized identity and its input validation.
use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

const MAX_USERNAME: usize = 255;
const MAX_EMAIL: usize = 320;
const MAX_FULL_NAME: usize = 500;
const MAX_GROUP: usize = 255;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._\-@]+$").expect("valid username regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

/// Identity extracted from one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// Ordered, de-duplicated (first occurrence wins).
    pub groups: Vec<String>,
}

impl Principal {
    /// Trims and validates raw values. Blank email/full name count as absent,
    /// blank groups are dropped.
    pub fn new<I>(
        username: &str,
        email: Option<&str>,
        full_name: Option<&str>,
        groups: I,
    ) -> Result<Self, AppError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::MissingPrincipal("empty username".into()));
        }
        validate_username(username)?;

        let email = non_blank(email);
        if let Some(email) = email.as_deref() {
            validate_email(email)?;
        }

        let full_name = non_blank(full_name);
        if let Some(name) = full_name.as_deref() {
            validate_full_name(name)?;
        }

        let mut normalized: Vec<String> = Vec::new();
        for group in groups {
            let group = group.as_ref().trim();
            if group.is_empty() || normalized.iter().any(|g| g == group) {
                continue;
            }
            validate_group(group)?;
            normalized.push(group.to_string());
        }

        Ok(Self {
            username: username.to_string(),
            email,
            full_name,
            groups: normalized,
        })
    }
}

fn non_blank(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::InvalidPrincipal(msg.into())
}

pub fn validate_username(username: &str) -> Result<(), AppError> {
    if username.len() > MAX_USERNAME {
        return Err(invalid(format!("username longer than {MAX_USERNAME} characters")));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(invalid("username contains invalid characters"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.len() > MAX_EMAIL {
        return Err(invalid(format!("email longer than {MAX_EMAIL} characters")));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(invalid("malformed email"));
    }
    Ok(())
}

pub fn validate_full_name(name: &str) -> Result<(), AppError> {
    if name.chars().count() > MAX_FULL_NAME {
        return Err(invalid(format!("name longer than {MAX_FULL_NAME} characters")));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("name contains control characters"));
    }
    Ok(())
}

pub fn validate_group(group: &str) -> Result<(), AppError> {
    if group.chars().count() > MAX_GROUP {
        return Err(invalid(format!("group longer than {MAX_GROUP} characters")));
    }
    if group.chars().any(char::is_control) {
        return Err(invalid("group contains control characters"));
    }
    Ok(())
}
