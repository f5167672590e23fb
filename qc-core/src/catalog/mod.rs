//! Acceptance test definitions consumed by the sequencer.
//!
//! A [`TestCatalog`] is fixed for the lifetime of a session: the sequencer
//! walks it in order and never mutates it. Definitions are serde-friendly so
//! station configuration files can replace or extend the built-in tests.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod microphone;

pub use microphone::{QC_RMS_THRESHOLD, mic_balance_test};

/// Static description of one acceptance test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Unique display name, also the key results are upserted under.
    pub name: String,
    /// Command tag written in the envelope `type` field.
    pub command: String,
    /// Event `kind` the peripheral answers with when it differs from `command`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_kind: Option<String>,
    /// Test parameters forwarded verbatim in the envelope payload.
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Time allowed between dispatch and a correlated result.
    pub timeout_ms: u64,
    /// Per-channel threshold; the session default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_threshold: Option<f64>,
    #[serde(default)]
    pub description: String,
}

impl TestDefinition {
    /// Returns the configured timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns `true` when an inbound `kind` discriminator answers this test.
    #[must_use]
    pub fn answers_kind(&self, kind: &str) -> bool {
        kind == self.command || self.result_kind.as_deref() == Some(kind)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.command.trim().is_empty() {
            return Err(CatalogError::EmptyCommand(self.name.clone()));
        }
        if self.timeout_ms == 0 {
            return Err(CatalogError::ZeroTimeout(self.name.clone()));
        }
        Ok(())
    }
}

/// Errors reported while building a [`TestCatalog`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CatalogError {
    EmptyName,
    EmptyCommand(String),
    ZeroTimeout(String),
    DuplicateName(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::EmptyName => f.write_str("test definition without a name"),
            CatalogError::EmptyCommand(name) => write!(f, "test `{name}` has no command tag"),
            CatalogError::ZeroTimeout(name) => write!(f, "test `{name}` has a zero timeout"),
            CatalogError::DuplicateName(name) => write!(f, "test `{name}` is defined twice"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Ordered, validated list of test definitions.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCatalog {
    tests: Vec<TestDefinition>,
}

impl TestCatalog {
    /// Validates and wraps the provided definitions.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] when a definition is incomplete or two
    /// definitions share a name.
    pub fn new(tests: Vec<TestDefinition>) -> Result<Self, CatalogError> {
        for (index, test) in tests.iter().enumerate() {
            test.validate()?;
            if tests[..index].iter().any(|earlier| earlier.name == test.name) {
                return Err(CatalogError::DuplicateName(test.name.clone()));
            }
        }
        Ok(Self { tests })
    }

    /// Catalog containing only the microphone balance test.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            tests: vec![mic_balance_test()],
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TestDefinition> {
        self.tests.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, TestDefinition> {
        self.tests.iter()
    }
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
