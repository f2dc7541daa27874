//! The precondition engine.
//!
//! Every mutation of an object is gated by up to four optional
//! caller-supplied conditions on the current generation and metageneration.
//! [`PreconditionSet::check`] is a pure function of the current state and
//! the requested conditions; all supplied conditions must pass.

use gcstack_storage_model::{StorageError, StorageRequest, StorageResult};

/// The four optional match conditions carried by a request.
///
/// An absent object is modeled as generation `0` with no metageneration:
/// `ifGenerationMatch=0` passes only when the object does not exist, which is
/// how callers express create-only-if-absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreconditionSet {
    /// The current generation must equal this value.
    pub if_generation_match: Option<i64>,
    /// The current generation must not equal this value.
    pub if_generation_not_match: Option<i64>,
    /// The current metageneration must equal this value.
    pub if_metageneration_match: Option<i64>,
    /// The current metageneration must not equal this value.
    pub if_metageneration_not_match: Option<i64>,
}

impl PreconditionSet {
    /// Parse the standard condition parameters (`ifGenerationMatch`, ...).
    pub fn standard(request: &StorageRequest) -> StorageResult<Self> {
        Self::from_params(
            request,
            "ifGenerationMatch",
            "ifGenerationNotMatch",
            "ifMetagenerationMatch",
            "ifMetagenerationNotMatch",
        )
    }

    /// Parse the source-object condition parameters used by copy and rewrite
    /// (`ifSourceGenerationMatch`, ...).
    pub fn source(request: &StorageRequest) -> StorageResult<Self> {
        Self::from_params(
            request,
            "ifSourceGenerationMatch",
            "ifSourceGenerationNotMatch",
            "ifSourceMetagenerationMatch",
            "ifSourceMetagenerationNotMatch",
        )
    }

    fn from_params(
        request: &StorageRequest,
        generation_match: &str,
        generation_not_match: &str,
        metageneration_match: &str,
        metageneration_not_match: &str,
    ) -> StorageResult<Self> {
        Ok(Self {
            if_generation_match: request.query_i64(generation_match)?,
            if_generation_not_match: request.query_i64(generation_not_match)?,
            if_metageneration_match: request.query_i64(metageneration_match)?,
            if_metageneration_not_match: request.query_i64(metageneration_not_match)?,
        })
    }

    /// Whether no condition was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Verify every supplied condition against the current state.
    ///
    /// `current_metageneration` is `None` when the object is absent; in that
    /// case any metageneration condition fails because there is nothing to
    /// compare against.
    pub fn check(
        &self,
        current_generation: i64,
        current_metageneration: Option<i64>,
    ) -> StorageResult<()> {
        if let Some(generation) = self.if_generation_match {
            if generation != current_generation {
                return Err(StorageError::precondition_failed(format!(
                    "expected generation {generation}, current is {current_generation}"
                )));
            }
        }
        // The not-match check applies even to an absent object (generation 0).
        if let Some(generation) = self.if_generation_not_match {
            if generation == current_generation {
                return Err(StorageError::precondition_failed(format!(
                    "generation is {current_generation}"
                )));
            }
        }

        match current_metageneration {
            None => {
                if self.if_metageneration_match.is_some()
                    || self.if_metageneration_not_match.is_some()
                {
                    return Err(StorageError::precondition_failed(
                        "metageneration condition on an absent object",
                    ));
                }
            }
            Some(current) => {
                if let Some(metageneration) = self.if_metageneration_not_match {
                    if metageneration == current {
                        return Err(StorageError::precondition_failed(format!(
                            "metageneration is {current}"
                        )));
                    }
                }
                if let Some(metageneration) = self.if_metageneration_match {
                    if metageneration != current {
                        return Err(StorageError::precondition_failed(format!(
                            "expected metageneration {metageneration}, current is {current}"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
