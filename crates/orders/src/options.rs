//! Priced job options.
//!
//! Every option is a catalog key. Keys are normalised (trimmed, lower-cased)
//! but never checked against a catalog here: an unknown key is a legal value
//! that simply prices at zero.

use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, ValueObject};

/// Urgency level applied when none is given (0 % surcharge).
pub const DEFAULT_URGENCY: &str = "standard";

/// Diamond-edge finish applied when none is given.
pub const DEFAULT_DIAMOND_FINISH: &str = "none";

/// Maximum number of engravings on one job.
pub const MAX_ENGRAVINGS: u8 = 2;

/// The option fields of a job that drive its price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Mounting category (e.g. "rimmed", "drilled", "nylon-cord").
    pub category: String,
    /// Lens treatments, in the order they were selected.
    #[serde(default)]
    pub lens_options: Vec<String>,
    #[serde(default = "default_urgency")]
    pub urgency: String,
    #[serde(default = "default_diamond_finish")]
    pub diamond_finish: String,
    #[serde(default)]
    pub engraving_count: u8,
    #[serde(default)]
    pub shape_change: bool,
}

impl ValueObject for JobOptions {}

fn default_urgency() -> String {
    DEFAULT_URGENCY.to_string()
}

fn default_diamond_finish() -> String {
    DEFAULT_DIAMOND_FINISH.to_string()
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl JobOptions {
    /// Options for a bare job of the given mounting category.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            lens_options: Vec::new(),
            urgency: default_urgency(),
            diamond_finish: default_diamond_finish(),
            engraving_count: 0,
            shape_change: false,
        }
    }

    pub fn with_lens_option(mut self, key: impl Into<String>) -> Self {
        self.lens_options.push(key.into());
        self
    }

    pub fn with_urgency(mut self, key: impl Into<String>) -> Self {
        self.urgency = key.into();
        self
    }

    pub fn with_diamond_finish(mut self, key: impl Into<String>) -> Self {
        self.diamond_finish = key.into();
        self
    }

    pub fn with_engravings(mut self, count: u8) -> Self {
        self.engraving_count = count;
        self
    }

    pub fn with_shape_change(mut self, shape_change: bool) -> Self {
        self.shape_change = shape_change;
        self
    }

    /// Validate and normalise.
    ///
    /// - the category is required;
    /// - empty urgency / finish fall back to their defaults;
    /// - lens options form a set: blanks and repeats are dropped, first
    ///   selection order is kept;
    /// - at most [`MAX_ENGRAVINGS`] engravings.
    pub fn normalized(&self) -> DomainResult<Self> {
        let category = normalize_key(&self.category);
        if category.is_empty() {
            return Err(DomainError::validation("mounting category is required"));
        }

        if self.engraving_count > MAX_ENGRAVINGS {
            return Err(DomainError::validation(format!(
                "engraving count must be at most {MAX_ENGRAVINGS}"
            )));
        }

        let mut lens_options: Vec<String> = Vec::with_capacity(self.lens_options.len());
        for key in self.lens_options.iter().map(|k| normalize_key(k)) {
            if !key.is_empty() && !lens_options.contains(&key) {
                lens_options.push(key);
            }
        }

        let urgency = match normalize_key(&self.urgency) {
            k if k.is_empty() => default_urgency(),
            k => k,
        };
        let diamond_finish = match normalize_key(&self.diamond_finish) {
            k if k.is_empty() => default_diamond_finish(),
            k => k,
        };

        Ok(Self {
            category,
            lens_options,
            urgency,
            diamond_finish,
            engraving_count: self.engraving_count,
            shape_change: self.shape_change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_standard_urgency_and_no_finish() {
        let opts = JobOptions::new("rimmed");
        assert_eq!(opts.urgency, "standard");
        assert_eq!(opts.diamond_finish, "none");
        assert_eq!(opts.engraving_count, 0);
        assert!(!opts.shape_change);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let opts: JobOptions = serde_json::from_str(r#"{"category":"drilled"}"#).unwrap();
        assert_eq!(opts, JobOptions::new("drilled"));
    }

    #[test]
    fn normalisation_lowercases_and_dedupes_lens_options() {
        let opts = JobOptions::new(" Rimmed ")
            .with_lens_option("Polish")
            .with_lens_option("tint")
            .with_lens_option("polish ")
            .with_lens_option("   ")
            .with_urgency("")
            .normalized()
            .unwrap();

        assert_eq!(opts.category, "rimmed");
        assert_eq!(opts.lens_options, vec!["polish".to_string(), "tint".to_string()]);
        assert_eq!(opts.urgency, "standard");
    }

    #[test]
    fn empty_category_is_rejected() {
        let err = JobOptions::new("  ").normalized().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn three_engravings_are_rejected() {
        let err = JobOptions::new("rimmed").with_engravings(3).normalized().unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("at most 2") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(JobOptions::new("rimmed").with_engravings(2).normalized().is_ok());
    }
}
