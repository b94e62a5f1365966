use std::fmt;

/// Grant/deny result of authorization, with audit context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether access is allowed.
    pub granted: bool,
    /// Why, for audit logs. Always set on denials.
    pub reason: Option<String>,
    /// Name of the strategy that decided; `None` when nothing matched.
    pub strategy: Option<String>,
}

impl Decision {
    pub fn grant() -> Self {
        Self { granted: true, reason: None, strategy: None }
    }

    pub fn grant_because(reason: impl Into<String>) -> Self {
        Self { granted: true, reason: Some(reason.into()), strategy: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { granted: false, reason: Some(reason.into()), strategy: None }
    }

    pub(crate) fn decided_by(mut self, strategy: &str) -> Self {
        self.strategy = Some(strategy.to_string());
        self
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.granted { "granted" } else { "denied" })?;
        if let Some(strategy) = &self.strategy {
            write!(f, " by {}", strategy)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}
