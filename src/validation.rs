use crate::constants::{MAX_DAILY_LIMIT_MINUTES, MAX_FOCUS_MINUTES, MAX_SITE_NAME_LEN, MAX_TASK_TITLE_LEN};
use crate::error::AppError;
use url::Url;

/// Validate a requested focus session duration in minutes.
pub fn validate_focus_minutes(minutes: u32) -> Result<u32, AppError> {
    if minutes == 0 {
        return Err(AppError::InvalidInput {
            field: "duration_minutes",
            reason: "must be positive".into(),
        });
    }
    if minutes > MAX_FOCUS_MINUTES {
        return Err(AppError::InvalidInput {
            field: "duration_minutes",
            reason: format!("cannot exceed {MAX_FOCUS_MINUTES} minutes"),
        });
    }
    Ok(minutes)
}

/// Validate the daily app usage limit.
pub fn validate_daily_limit(minutes: u32) -> Result<(), AppError> {
    if minutes > MAX_DAILY_LIMIT_MINUTES {
        return Err(AppError::InvalidInput {
            field: "daily_time_limit_minutes",
            reason: format!("cannot exceed {MAX_DAILY_LIMIT_MINUTES} minutes"),
        });
    }
    Ok(())
}

/// Validate a task title.
pub fn validate_task_title(title: &str) -> Result<&str, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidInput {
            field: "title",
            reason: "cannot be empty".into(),
        });
    }
    if title.len() > MAX_TASK_TITLE_LEN {
        return Err(AppError::InvalidInput {
            field: "title",
            reason: format!("cannot exceed {MAX_TASK_TITLE_LEN} characters"),
        });
    }
    Ok(title)
}

/// Validate a blocked site's display name.
pub fn validate_site_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput {
            field: "name",
            reason: "cannot be empty".into(),
        });
    }
    if name.len() > MAX_SITE_NAME_LEN {
        return Err(AppError::InvalidInput {
            field: "name",
            reason: format!("cannot exceed {MAX_SITE_NAME_LEN} characters"),
        });
    }
    Ok(name)
}

/// Validate a blocked site's URL or bare domain.
pub fn validate_site_url(url: &str) -> Result<&str, AppError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidInput {
            field: "url",
            reason: "cannot be empty".into(),
        });
    }
    if url.chars().any(char::is_whitespace) {
        return Err(AppError::InvalidInput {
            field: "url",
            reason: "cannot contain whitespace".into(),
        });
    }
    // Bare domains are stored as typed; parse them as https for the host check.
    let with_scheme = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    let parsed = Url::parse(&with_scheme).map_err(|e| AppError::InvalidInput {
        field: "url",
        reason: e.to_string(),
    })?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(AppError::InvalidInput {
            field: "url",
            reason: "must name a host".into(),
        });
    }
    Ok(url)
}

/// Validate a native app package identifier.
pub fn validate_package_name(package: &str) -> Result<&str, AppError> {
    let package = package.trim();
    if package.is_empty() {
        return Err(AppError::InvalidInput {
            field: "package",
            reason: "cannot be empty".into(),
        });
    }
    Ok(package)
}

/// Validate hours reported by the companion context.
pub fn validate_hours(hours: f64) -> Result<f64, AppError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(AppError::InvalidInput {
            field: "hours",
            reason: "must be a positive number".into(),
        });
    }
    Ok(hours)
}
