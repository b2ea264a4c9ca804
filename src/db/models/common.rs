//! Shared domain enums. Rows store these as TEXT; the enums carry the
//! parsing and display rules.

use serde::{Deserialize, Serialize};

/// User role. Librarians administer the catalog, users and settings;
/// readers borrow, reserve and review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Reader,
    Librarian,
}

impl Default for Role {
    fn default() -> Self {
        Self::Reader
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reader => write!(f, "Reader"),
            Self::Librarian => write!(f, "Librarian"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reader" => Ok(Self::Reader),
            "Librarian" => Ok(Self::Librarian),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Availability state of a book. Authoritative: maintained transactionally
/// by borrow, return and reservation transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookStatus {
    Available,
    Borrowed,
    Reserved,
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "Available"),
            Self::Borrowed => write!(f, "Borrowed"),
            Self::Reserved => write!(f, "Reserved"),
        }
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(Self::Available),
            "Borrowed" => Ok(Self::Borrowed),
            "Reserved" => Ok(Self::Reserved),
            _ => Err(format!("Unknown book status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Fulfilled => write!(f, "Fulfilled"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Fulfilled" => Ok(Self::Fulfilled),
            "Cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown reservation status: {}", s)),
        }
    }
}

/// Today as the `YYYY-MM-DD` form used for all stored calendar dates.
pub fn today_string() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::from_str("Librarian").unwrap(), Role::Librarian);
        assert_eq!(Role::Reader.to_string(), "Reader");
        assert!(Role::from_str("Admin").is_err());
    }

    #[test]
    fn test_book_status_round_trip() {
        assert_eq!(BookStatus::from_str("Available").unwrap(), BookStatus::Available);
        assert_eq!(BookStatus::Borrowed.to_string(), "Borrowed");
        assert!(BookStatus::from_str("Lost").is_err());
    }
}
