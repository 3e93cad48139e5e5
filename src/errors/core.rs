use thiserror::Error;

/// Core error type for the armature container
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("No managed object registered under name '{name}'")]
    NotFound { name: String },

    #[error("No candidate found for capability '{capability}'")]
    NoMatchingCandidate { capability: String },

    #[error(
        "Ambiguous single-result request for capability '{capability}': {} candidates: [{}]",
        candidates.len(),
        candidates.join(", ")
    )]
    Ambiguous {
        capability: String,
        candidates: Vec<String>,
    },

    #[error("Circular dependency detected for '{name}': {chain}")]
    CircularDependency { name: String, chain: String },

    #[error("Object '{name}' is currently in creation: unresolvable constructor-level cycle or reentrant request")]
    CurrentlyInCreation { name: String },

    #[error(
        "Creation of '{name}' not allowed while the registry is in destruction \
         (do not request managed objects from a disposal action)"
    )]
    CreationRejected { name: String },

    #[error("Object '{name}' is not of the required type '{expected}' (actual: {actual})")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("An object is already registered under name '{name}'")]
    AlreadyRegistered { name: String },

    #[error("Overriding the definition of '{name}' is not permitted by this store")]
    OverrideNotAllowed { name: String },

    #[error("Invalid descriptor for '{name}': {message}")]
    InvalidDescriptor { name: String, message: String },

    #[error("Alias '{alias}' would form a cycle with name '{name}'")]
    AliasCycle { alias: String, name: String },

    #[error(
        "Creation of '{name}' failed: {message}{}",
        if related.is_empty() { String::new() } else { format!(" ({} related cause(s))", related.len()) }
    )]
    CreationFailed {
        name: String,
        message: String,
        related: Vec<ContainerError>,
    },

    #[error("Disposal of '{name}' failed: {message}")]
    DisposalFailed { name: String, message: String },

    #[error("Snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContainerError {
    /// Create a new not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a new invalid-descriptor error
    pub fn invalid_descriptor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new creation-failed error without related causes
    pub fn creation_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CreationFailed {
            name: name.into(),
            message: message.into(),
            related: Vec::new(),
        }
    }

    /// Attach suppressed errors gathered during the creation attempt
    pub fn with_related(mut self, mut causes: Vec<ContainerError>) -> Self {
        if let Self::CreationFailed {
            ref mut related, ..
        } = self
        {
            related.append(&mut causes);
        }
        self
    }

    /// Check whether this error means the name simply was not registered
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::NoMatchingCandidate { .. }
        )
    }

    /// Check whether this error is an ambiguity failure
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }

    /// Check whether this error is any of the circular-construction failures
    pub fn is_circular(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. } | Self::CurrentlyInCreation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_message_enumerates_candidates() {
        let err = ContainerError::Ambiguous {
            capability: "dyn Codec".to_string(),
            candidates: vec!["json".to_string(), "yaml".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("json"));
        assert!(msg.contains("yaml"));
        assert!(msg.contains("2 candidates"));
    }

    #[test]
    fn creation_failed_reports_related_count() {
        let err = ContainerError::creation_failed("svc", "boom")
            .with_related(vec![ContainerError::not_found("dep")]);
        assert!(err.to_string().contains("1 related cause"));
    }

    #[test]
    fn predicates_classify_variants() {
        assert!(ContainerError::not_found("a").is_not_found());
        assert!(ContainerError::CurrentlyInCreation {
            name: "a".to_string()
        }
        .is_circular());
        assert!(!ContainerError::not_found("a").is_ambiguous());
    }
}
