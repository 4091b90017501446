use std::fmt;
use std::str::FromStr;

/// How a missing (`NA`) condition result is treated when building a row mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum NaPolicy {
    /// Leave the row untouched.
    #[default]
    False,
    /// Apply the assignment as if the condition held.
    True,
    /// Set the target cell to `NA`.
    Na,
}

impl fmt::Display for NaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaPolicy::False => write!(f, "false"),
            NaPolicy::True => write!(f, "true"),
            NaPolicy::Na => write!(f, "na"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown NA policy '{0}', expected one of: false, true, na")]
pub struct UnknownNaPolicy(String);

impl FromStr for NaPolicy {
    type Err = UnknownNaPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" => Ok(NaPolicy::False),
            "true" => Ok(NaPolicy::True),
            "na" => Ok(NaPolicy::Na),
            _ => Err(UnknownNaPolicy(s.to_owned())),
        }
    }
}

/// Options for a single `modify` call.
///
/// ```
/// use remodel::{ModifyOptions, NaPolicy};
///
/// let options = ModifyOptions::independent().with_na_condition(NaPolicy::Na);
/// assert!(!options.sequential);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ModifyOptions {
    /// Each rule observes the writes of the rules before it. When `false`,
    /// every rule reads the unmodified input.
    pub sequential: bool,
    pub na_condition: NaPolicy,
}

impl Default for ModifyOptions {
    fn default() -> Self {
        Self {
            sequential: true,
            na_condition: NaPolicy::False,
        }
    }
}

impl ModifyOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with independent (snapshot) execution.
    #[must_use]
    pub fn independent() -> Self {
        Self::default().with_sequential(false)
    }

    #[must_use]
    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    #[must_use]
    pub fn with_na_condition(mut self, policy: NaPolicy) -> Self {
        self.na_condition = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ModifyOptions::default();
        assert!(options.sequential);
        assert_eq!(options.na_condition, NaPolicy::False);
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("FALSE".parse::<NaPolicy>(), Ok(NaPolicy::False));
        assert_eq!(" na ".parse::<NaPolicy>(), Ok(NaPolicy::Na));
        assert!("maybe".parse::<NaPolicy>().is_err());
    }

    #[test]
    fn builder_methods() {
        let options = ModifyOptions::new()
            .with_sequential(false)
            .with_na_condition(NaPolicy::True);
        assert_eq!(options, ModifyOptions::independent().with_na_condition(NaPolicy::True));
    }
}
