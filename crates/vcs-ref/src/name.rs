use std::fmt;

use crate::RefError;

/// A validated reference name (`refs/heads/main`, `HEAD`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(String);

impl RefName {
    /// Validate and wrap a ref name.
    pub fn new(name: impl Into<String>) -> Result<Self, RefError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this name lives in the `refs/` namespace.
    pub fn is_in_refs(&self) -> bool {
        self.0.starts_with("refs/")
    }

    /// The trailing component (`main` for `refs/heads/main`).
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    fn validate(name: &str) -> Result<(), RefError> {
        let reject = |reason: &str| {
            Err(RefError::InvalidName {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };

        if name.is_empty() {
            return reject("empty");
        }
        if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
            return reject("empty path component");
        }
        if name == "@" {
            return reject("'@' alone is reserved");
        }
        if name.contains("..") {
            return reject("contains '..'");
        }
        if name.contains("@{") {
            return reject("contains '@{'");
        }
        for byte in name.bytes() {
            if byte < 0x20 || byte == 0x7f {
                return reject("control character");
            }
            if matches!(byte, b' ' | b'~' | b'^' | b':' | b'?' | b'*' | b'[' | b'\\') {
                return reject("forbidden character");
            }
        }
        for component in name.split('/') {
            if component.starts_with('.') || component.ends_with('.') {
                return reject("component starts or ends with '.'");
            }
            if component.ends_with(".lock") {
                return reject("component ends with '.lock'");
            }
        }
        Ok(())
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RefName {
    type Err = RefError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
