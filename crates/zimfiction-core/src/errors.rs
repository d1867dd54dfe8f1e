//! The error taxonomy of spec.md §7: `PlanError` and `WriteError` are
//! fatal and abort the whole build; `InputCorruption`/`RenderError` are
//! per-job (handled entirely inside `zimfiction-render` by dropping the
//! job and incrementing a counter, so they never reach this type).

use thiserror::Error;

use zimfiction_zim::ZimError;

/// A fatal planning-time defect (§7 `PlanError`): "integer overflow on
/// counts, invariant violation detected" — abort the build.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Two distinct names within the same scope normalize to the same
    /// slug (§8 scenario 2): detected before any job referencing either
    /// name is emitted, rather than surfacing later as a duplicate ZIM
    /// path.
    #[error("slug collision in {scope}: {a:?} and {b:?} both normalize to {slug:?}")]
    SlugCollision {
        scope: String,
        a: String,
        b: String,
        slug: String,
    },

    /// A count used for pagination or chart math overflowed its integer
    /// type.
    #[error("counter overflow computing {0}")]
    CounterOverflow(String),
}

/// The top-level build error (§7): anything that reaches this type is
/// fatal and the build is considered failed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Write(#[from] ZimError),

    /// A store query failed. The store's own errors are opaque
    /// `anyhow::Error` values (§6.1); wrapped here rather than given a
    /// dedicated variant since the core has no way to classify them
    /// further.
    #[error("store error: {0}")]
    Store(anyhow::Error),

    /// SIGINT or equivalent was received; the partial output was cleaned
    /// up (§5, §7).
    #[error("build cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for BuildError {
    fn from(e: anyhow::Error) -> Self {
        BuildError::Store(e)
    }
}

impl BuildError {
    /// The process exit code this error maps to (§6.4): everything here
    /// is a fatal build error (`1`); argument validation (`2`) and
    /// cancellation (`130`) are handled separately by the CLI and by
    /// [`BuildError::Cancelled`].
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Cancelled => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_maps_to_130() {
        assert_eq!(BuildError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn plan_and_write_errors_map_to_1() {
        let plan = BuildError::Plan(PlanError::CounterOverflow("words".into()));
        assert_eq!(plan.exit_code(), 1);
    }

    #[test]
    fn anyhow_errors_convert_via_from() {
        let e: BuildError = anyhow::anyhow!("boom").into();
        assert!(matches!(e, BuildError::Store(_)));
    }
}
