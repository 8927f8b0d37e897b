//! Registry configuration

/// What to do with variable names and write payloads that exceed their
/// fixed bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Silently cut the value down to the bound
    #[default]
    Clip,
    /// Fail with an explicit error
    Reject,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Clip => "clip",
            OverflowPolicy::Reject => "reject",
        }
    }
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clip" => Ok(OverflowPolicy::Clip),
            "reject" => Ok(OverflowPolicy::Reject),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for a [`Registry`](crate::registry::Registry)
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConfig {
    /// Applies to names over 63 bytes and writes over 255 bytes
    pub overflow: OverflowPolicy,
}

impl RegistryConfig {
    pub fn with_overflow(overflow: OverflowPolicy) -> Self {
        Self { overflow }
    }
}
