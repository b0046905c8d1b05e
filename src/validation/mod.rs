//! Input validation for public submissions and operator accounts.

use std::fmt;

use crate::models::CreateReportRequest;

/// The 36 states of the federation plus the Federal Capital Territory.
pub const NIGERIAN_STATES: [&str; 37] = [
    "Abia",
    "Adamawa",
    "Akwa Ibom",
    "Anambra",
    "Bauchi",
    "Bayelsa",
    "Benue",
    "Borno",
    "Cross River",
    "Delta",
    "Ebonyi",
    "Edo",
    "Ekiti",
    "Enugu",
    "FCT",
    "Gombe",
    "Imo",
    "Jigawa",
    "Kaduna",
    "Kano",
    "Katsina",
    "Kebbi",
    "Kogi",
    "Kwara",
    "Lagos",
    "Nasarawa",
    "Niger",
    "Ogun",
    "Ondo",
    "Osun",
    "Oyo",
    "Plateau",
    "Rivers",
    "Sokoto",
    "Taraba",
    "Yobe",
    "Zamfara",
];

const MIN_PASSWORD_LEN: usize = 8;
const MIN_DESCRIPTION_LEN: usize = 10;
const MAX_DESCRIPTION_LEN: usize = 5000;

/// A password complexity rule that was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    MinLength,
    Uppercase,
    Lowercase,
    Digit,
    Symbol,
}

impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PasswordRule::MinLength => "at least 8 characters",
            PasswordRule::Uppercase => "an uppercase letter",
            PasswordRule::Lowercase => "a lowercase letter",
            PasswordRule::Digit => "a digit",
            PasswordRule::Symbol => "a symbol",
        };
        f.write_str(text)
    }
}

/// Check a password against the complexity policy, reporting every failed rule.
pub fn validate_password(password: &str) -> Result<(), Vec<PasswordRule>> {
    let mut failed = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        failed.push(PasswordRule::MinLength);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        failed.push(PasswordRule::Uppercase);
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        failed.push(PasswordRule::Lowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        failed.push(PasswordRule::Digit);
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        failed.push(PasswordRule::Symbol);
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(failed)
    }
}

/// Human readable message for a failed password check.
pub fn describe_password_failures(failed: &[PasswordRule]) -> String {
    let parts: Vec<String> = failed.iter().map(|r| r.to_string()).collect();
    format!("Password must contain {}", parts.join(", "))
}

/// Canonical spelling of a state name, matched case-insensitively.
pub fn canonical_state(name: &str) -> Option<&'static str> {
    let trimmed = name.trim();
    let trimmed = trimmed
        .strip_suffix(" State")
        .or_else(|| trimmed.strip_suffix(" state"))
        .unwrap_or(trimmed);

    if trimmed.eq_ignore_ascii_case("abuja") || trimmed.eq_ignore_ascii_case("federal capital territory") {
        return Some("FCT");
    }

    NIGERIAN_STATES
        .iter()
        .copied()
        .find(|s| s.eq_ignore_ascii_case(trimmed))
}

pub fn is_valid_state(name: &str) -> bool {
    canonical_state(name).is_some()
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.contains(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}

/// Digits with an optional leading `+`, 7 to 15 digits long.
pub fn validate_phone(phone: &str) -> bool {
    let digits = phone.trim().strip_prefix('+').unwrap_or(phone.trim());
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validate a public report submission. Returns the first problem found.
pub fn validate_new_report(request: &CreateReportRequest) -> Result<(), String> {
    let description_len = request.description.trim().chars().count();
    if description_len < MIN_DESCRIPTION_LEN {
        return Err(format!(
            "Description must be at least {} characters",
            MIN_DESCRIPTION_LEN
        ));
    }
    if description_len > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        ));
    }
    if request.location.trim().is_empty() {
        return Err("Location is required".to_string());
    }
    if !is_valid_state(&request.state) {
        return Err(format!("Unknown state: {}", request.state));
    }

    match (request.latitude, request.longitude) {
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                return Err("Coordinates are out of range".to_string());
            }
        }
        (None, None) => {}
        _ => return Err("Latitude and longitude must be provided together".to_string()),
    }

    if request.is_anonymous {
        if request.reporter_name.is_some()
            || request.reporter_phone.is_some()
            || request.reporter_email.is_some()
        {
            return Err("Anonymous reports must not include reporter details".to_string());
        }
    } else {
        if let Some(phone) = &request.reporter_phone {
            if !validate_phone(phone) {
                return Err("Reporter phone number is invalid".to_string());
            }
        }
        if let Some(email) = &request.reporter_email {
            if !validate_email(email) {
                return Err("Reporter email is invalid".to_string());
            }
        }
    }

    Ok(())
}
