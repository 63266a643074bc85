use crate::error::ApiError;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::sync::OnceLock;

const EMAIL_PATTERN: &str = r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,4}$";

/// Compiled email address matcher, shared across requests.
pub fn email_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"))
}

/// Collects field errors. The first message recorded for a field wins.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` under `key` unless `ok` holds.
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// `Ok(())` when no errors were recorded, otherwise a 422 carrying them.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::FailedValidation(self.errors))
        }
    }
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.iter().any(|p| p == value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wins() {
        let mut v = Validator::new();
        v.add_error("title", "must be provided");
        v.add_error("title", "must not be more than 500 bytes long");
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()["title"], "must be provided");
    }

    #[test]
    fn check_only_records_failures() {
        let mut v = Validator::new();
        v.check(true, "year", "must be provided");
        assert!(v.valid());
        v.check(false, "year", "must be provided");
        assert!(!v.valid());
    }

    #[test]
    fn finish_reports_failed_validation() {
        let mut v = Validator::new();
        v.check(false, "email", "must be a valid email address");
        match v.finish() {
            Err(ApiError::FailedValidation(errors)) => {
                assert_eq!(errors["email"], "must be a valid email address");
            }
            other => panic!("expected FailedValidation, got {:?}", other),
        }
    }

    #[test]
    fn helpers() {
        assert!(permitted_value(&"id", &["id", "title"]));
        assert!(!permitted_value(&"year", &["id", "title"]));
        assert!(unique(&["drama", "comedy"]));
        assert!(!unique(&["drama", "drama"]));
        assert!(matches("alice@example.com", email_rx()));
        assert!(!matches("alice@", email_rx()));
    }
}
