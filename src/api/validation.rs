//! Input validation for API requests.
//!
//! Field validators return `Result<(), String>` so handlers can collect
//! them into a `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Good-enough email shape check; deliverability is not our problem
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"
    ).unwrap();

    /// ISBN-10 or ISBN-13, dashes and spaces allowed, X check digit allowed
    static ref ISBN_CHARS_REGEX: Regex = Regex::new(
        r"^[0-9Xx][0-9Xx \-]*$"
    ).unwrap();

    /// Calendar dates are stored as YYYY-MM-DD
    static ref DATE_REGEX: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}$"
    ).unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err("Password must contain at least one letter and one digit".to_string());
    }

    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name is required".to_string());
    }
    if name.len() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Title is required".to_string());
    }
    if title.len() > 255 {
        return Err("Title is too long (max 255 characters)".to_string());
    }
    Ok(())
}

pub fn validate_author(author: &str) -> Result<(), String> {
    if author.trim().is_empty() {
        return Err("Author is required".to_string());
    }
    if author.len() > 100 {
        return Err("Author is too long (max 100 characters)".to_string());
    }
    Ok(())
}

/// Validate an ISBN: correct character set and 10 or 13 significant digits.
/// Check-digit arithmetic is deliberately not enforced; real catalogs carry
/// plenty of ISBNs that fail it.
pub fn validate_isbn(isbn: &str) -> Result<(), String> {
    if isbn.is_empty() {
        return Err("ISBN is required".to_string());
    }
    if isbn.len() > 50 {
        return Err("ISBN is too long (max 50 characters)".to_string());
    }
    if !ISBN_CHARS_REGEX.is_match(isbn) {
        return Err("ISBN may only contain digits, dashes, spaces and X".to_string());
    }

    let significant = isbn.chars().filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x').count();
    if significant != 10 && significant != 13 {
        return Err("ISBN must have 10 or 13 digits".to_string());
    }

    Ok(())
}

pub fn validate_category(category: &str) -> Result<(), String> {
    if category.trim().is_empty() {
        return Err("Category is required".to_string());
    }
    if category.len() > 50 {
        return Err("Category is too long (max 50 characters)".to_string());
    }
    Ok(())
}

pub fn validate_shelf_location(shelf_location: &str) -> Result<(), String> {
    if shelf_location.trim().is_empty() {
        return Err("Shelf location is required".to_string());
    }
    if shelf_location.len() > 50 {
        return Err("Shelf location is too long (max 50 characters)".to_string());
    }
    Ok(())
}

pub fn validate_rating(rating: i64) -> Result<(), String> {
    if !(1..=5).contains(&rating) {
        return Err("Rating must be between 1 and 5".to_string());
    }
    Ok(())
}

pub fn validate_comment(comment: &str) -> Result<(), String> {
    if comment.trim().is_empty() {
        return Err("Comment is required".to_string());
    }
    if comment.len() > 2000 {
        return Err("Comment is too long (max 2000 characters)".to_string());
    }
    Ok(())
}

pub fn validate_role(role: &str) -> Result<(), String> {
    role.parse::<crate::db::Role>()
        .map(|_| ())
        .map_err(|_| "Invalid role. Must be one of: Reader, Librarian".to_string())
}

/// Validate an optional YYYY-MM-DD date field
pub fn validate_date(date: &Option<String>, field_name: &str) -> Result<(), String> {
    if let Some(d) = date {
        if d.is_empty() {
            return Ok(()); // Empty string treated as no date
        }
        if !DATE_REGEX.is_match(d)
            || chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").is_err()
        {
            return Err(format!("Invalid {} (expected YYYY-MM-DD)", field_name));
        }
    }
    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }
    Ok(())
}
