/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use unistate_runtime::StoreConfig;
///
/// let config = StoreConfig::default().with_label("checkout");
/// assert_eq!(config.label(), "checkout");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    label: String,
}

impl StoreConfig {
    /// Label used when none is configured
    pub const DEFAULT_LABEL: &'static str = "store";

    /// Create a configuration with the given label
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Set the label used in log spans, metric labels and health checks
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The configured label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LABEL)
    }
}
