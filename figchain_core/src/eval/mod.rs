//! Rule-based evaluation: maps a [`FigFamily`](crate::model::FigFamily) plus evaluation
//! attributes to a specific fig version.
use std::collections::HashMap;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::model::{Fig, FigFamily};
use crate::{Error, EvaluationError};

mod rules;

/// Attributes a fig family's rollout rules are evaluated against.
pub type Attributes = HashMap<String, String>;

/// Context for a single evaluation request.
///
/// Carries both the rule inputs (string attributes) and the request-scoped lifetime: a
/// cancellation token and an optional deadline that every network-crossing step of the request
/// observes. Create one per operation; do not store it long-term.
///
/// # Examples
///
/// ```
/// use figchain_core::eval::EvaluationContext;
///
/// let ctx = EvaluationContext::new(
///     [("user_id".to_owned(), "123".to_owned())].into_iter().collect(),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    /// Attributes the rollout rules are matched against.
    pub attributes: Attributes,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl EvaluationContext {
    /// Create a context with the given attributes and no cancellation or deadline.
    pub fn new(attributes: Attributes) -> Self {
        EvaluationContext {
            attributes,
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Attach a cancellation token. In-flight network operations abort when it fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set an absolute deadline for the request.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline of `timeout` from now.
    pub fn with_timeout(self, timeout: std::time::Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// The context's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the context has been cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Merge another context's attributes into this one; the other side wins on conflicts. The
    /// request handle (cancellation, deadline) of `self` is preserved.
    pub fn merge(&self, other: &EvaluationContext) -> EvaluationContext {
        let mut attributes = self.attributes.clone();
        attributes.extend(
            other
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        EvaluationContext {
            attributes,
            cancellation: self.cancellation.clone(),
            deadline: self.deadline,
        }
    }

    /// Run a network-crossing future, aborting it (by drop) if the context is cancelled or its
    /// deadline expires first.
    pub async fn run<T>(
        &self,
        fut: impl std::future::Future<Output = crate::Result<T>>,
    ) -> crate::Result<T> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancellation.cancelled() => Err(Error::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(Error::Cancelled),
                result = fut => result,
            },
            None => tokio::select! {
                _ = self.cancellation.cancelled() => Err(Error::Cancelled),
                result = fut => result,
            },
        }
    }
}

impl FigFamily {
    /// Evaluate this family against the context's attributes.
    ///
    /// Rules are checked in order and the first match wins; when no rule matches, the default
    /// version (if any) is served. Returns `Ok(None)` when nothing applies.
    ///
    /// # Errors
    ///
    /// [`EvaluationError::FigVersionMissing`] when the selected version does not resolve to any
    /// fig in the family.
    pub fn evaluate(
        &self,
        context: &EvaluationContext,
    ) -> Result<Option<&Fig>, EvaluationError> {
        for rule in &self.rules {
            if rule.matches(&context.attributes) {
                return self.fig_by_version(&rule.target_version).map(Some);
            }
        }

        if let Some(default_version) = &self.default_version {
            return self.fig_by_version(default_version).map(Some);
        }

        Ok(None)
    }

    fn fig_by_version(&self, version: &str) -> Result<&Fig, EvaluationError> {
        self.figs
            .iter()
            .find(|fig| fig.version == version)
            .ok_or_else(|| EvaluationError::FigVersionMissing {
                version: version.to_owned(),
            })
    }
}
