//! Input validation for API requests.
//!
//! Validation runs before any workflow call so a rejected request never
//! touches the stores. Multiple field errors are collected with
//! `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{Role, SignupRequest};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;

lazy_static! {
    /// Pragmatic address check: one @, no whitespace, a dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$"
    ).unwrap();

    /// Roster ids are alphanumeric with optional dashes or slashes
    static ref ROSTER_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_-]*$").unwrap();

    static ref GRADUATION_YEAR_REGEX: Regex = Regex::new(r"^(19|20)\d{2}$").unwrap();
}

/// Validate an email address. Surrounding whitespace is ignored.
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > MAX_EMAIL_LEN {
        return Err(format!("Email is too long (max {} characters)", MAX_EMAIL_LEN));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name is too long (max {} characters)", MAX_NAME_LEN));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err("Name contains invalid characters".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password is too long (max {} characters)",
            MAX_PASSWORD_LEN
        ));
    }

    Ok(())
}

/// Validate a roster id (PRN). Required for students only.
pub fn validate_roster_id(roster_id: Option<&str>, role: Role) -> Result<(), String> {
    let roster_id = roster_id.map(str::trim).unwrap_or_default();

    if roster_id.is_empty() {
        if role.requires_roster_check() {
            return Err("PRN is required for students".to_string());
        }
        return Ok(());
    }

    if roster_id.len() > 64 {
        return Err("PRN is too long (max 64 characters)".to_string());
    }

    if !ROSTER_ID_REGEX.is_match(roster_id) {
        return Err("Invalid PRN format".to_string());
    }

    Ok(())
}

/// Optional four digit year
pub fn validate_graduation_year(year: Option<&str>) -> Result<(), String> {
    match year.map(str::trim) {
        None | Some("") => Ok(()),
        Some(y) if GRADUATION_YEAR_REGEX.is_match(y) => Ok(()),
        Some(_) => Err("Graduation year must be a four digit year".to_string()),
    }
}

/// Parse the wire role name, accepting the legacy placement officer spellings
pub fn validate_role(role: Option<&str>) -> Result<Role, String> {
    match role.map(str::trim) {
        None | Some("") => Err("Role is required".to_string()),
        Some(r) => r
            .parse()
            .map_err(|_| "Role must be one of student, alumni, teacher, tpo".to_string()),
    }
}

/// Validate a signup body, collecting every field error.
/// Returns the parsed role.
pub fn validate_signup(req: &SignupRequest) -> Result<Role, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let role = match validate_role(req.role.as_deref()) {
        Ok(role) => Some(role),
        Err(e) => {
            errors.add("role", e);
            None
        }
    };

    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    if let Some(role) = role {
        if let Err(e) = validate_roster_id(req.roster_id.as_deref(), role) {
            errors.add("rosterId", e);
        }
    }
    if let Err(e) = validate_graduation_year(req.graduation_year.as_deref()) {
        errors.add("graduationYear", e);
    }

    errors.finish()?;
    // finish() only succeeds when the role parsed
    role.ok_or_else(|| ApiError::validation_field("role", "Role is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(role: Role) -> SignupRequest {
        SignupRequest {
            name: "Asha Rao".to_string(),
            roster_id: Some("PRN001".to_string()),
            graduation_year: Some("2026".to_string()),
            email: "asha@example.edu".to_string(),
            password: "hunter2hunter2".to_string(),
            role: Some(role.as_str().to_string()),
        }
    }

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("asha@example.edu").is_ok());
        assert!(validate_email("  Asha.Rao+cu@mail.example.co.in ").is_ok());
        assert!(validate_email("o'neil@example.com").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("asha").is_err());
        assert!(validate_email("asha@localhost").is_err());
        assert!(validate_email("asha @example.com").is_err());
        assert!(validate_email("asha@@example.com").is_err());
        assert!(validate_email("asha@-example.com").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
        assert!(validate_password("exactly8").is_ok());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LEN + 1)).is_err());
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("Asha Rao").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("Asha\u{0007}").is_err());
        assert!(validate_name(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_roster_id_required_only_for_students() {
        assert!(validate_roster_id(None, Role::Student).is_err());
        assert!(validate_roster_id(Some("  "), Role::Student).is_err());
        assert!(validate_roster_id(None, Role::Alumni).is_ok());
        assert!(validate_roster_id(Some("PRN-2021/044"), Role::Student).is_ok());
        assert!(validate_roster_id(Some("PRN 001"), Role::Student).is_err());
    }

    #[test]
    fn test_graduation_year() {
        assert!(validate_graduation_year(None).is_ok());
        assert!(validate_graduation_year(Some("")).is_ok());
        assert!(validate_graduation_year(Some("2015")).is_ok());
        assert!(validate_graduation_year(Some("15")).is_err());
        assert!(validate_graduation_year(Some("2O15")).is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(validate_role(Some("alumni")), Ok(Role::Alumni));
        assert_eq!(validate_role(Some(" placementOfficer")), Ok(Role::PlacementOfficer));
        assert!(validate_role(None).is_err());
        assert!(validate_role(Some("admin")).is_err());
    }

    #[test]
    fn test_missing_role_is_a_field_error() {
        let mut req = signup(Role::Student);
        req.role = None;
        let err = validate_signup(&req).unwrap_err();
        assert!(err.to_string().contains("Role is required"));

        req.role = Some("dean".to_string());
        assert!(validate_signup(&req).is_err());
    }

    #[test]
    fn test_validate_signup_collects_fields() {
        assert_eq!(validate_signup(&signup(Role::Student)).unwrap(), Role::Student);

        let mut bad = signup(Role::Student);
        bad.name = String::new();
        bad.email = "nope".to_string();
        bad.roster_id = None;
        let err = validate_signup(&bad).unwrap_err();
        assert!(err.to_string().contains("3 fields"));
    }

    #[test]
    fn test_validate_signup_alumni_without_prn() {
        let mut alumni = signup(Role::Alumni);
        alumni.roster_id = None;
        assert!(validate_signup(&alumni).is_ok());
    }
}
