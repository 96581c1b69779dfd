//! Redeemers and per-workflow redeemer tables
//!
//! A redeemer selects a validator branch by constructor tag. Nothing at the type
//! level ties a tag to the external validator, so every workflow declares a fixed
//! [`RedeemerTable`] and can check it against the validator's blueprint at startup.

use crate::blueprint::Blueprint;
use crate::datum::{Datum, FieldValue};
use crate::error::{BlueprintError, EncodingError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Input supplied when spending a script-locked UTXO or minting under a policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Datum", try_from = "Datum")]
pub struct Redeemer {
    pub tag: u64,
    pub fields: Vec<Datum>,
}

/// Build a redeemer from a tag and ordered fields
///
/// # Errors
///
/// Returns an [`EncodingError`] if any field cannot be represented as a datum.
pub fn build_redeemer<I>(tag: u64, fields: I) -> Result<Redeemer, EncodingError>
where
    I: IntoIterator,
    I::Item: Into<FieldValue>,
{
    let fields = fields
        .into_iter()
        .map(|field| field.into().into_datum())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Redeemer { tag, fields })
}

impl Redeemer {
    /// Redeemer with no fields
    #[must_use]
    pub const fn bare(tag: u64) -> Self {
        Self {
            tag,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn to_datum(&self) -> Datum {
        Datum::constr(self.tag, self.fields.clone())
    }

    /// Read a redeemer back from its constructor datum
    ///
    /// # Errors
    ///
    /// Returns an error if the datum is not a constructor.
    pub fn from_datum(datum: &Datum) -> Result<Self, EncodingError> {
        match datum {
            Datum::Constr { tag, fields } => Ok(Self {
                tag: *tag,
                fields: fields.clone(),
            }),
            other => Err(EncodingError::NotAConstructor(other.kind().to_string())),
        }
    }

    /// Encode with the JSON datum codec
    ///
    /// # Errors
    ///
    /// Returns an error if a field is not representable in the codec.
    pub fn encode(&self) -> Result<String, EncodingError> {
        self.to_datum().encode()
    }

    /// Decode from the JSON datum codec
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed or not a constructor.
    pub fn decode(s: &str) -> Result<Self, EncodingError> {
        Self::from_datum(&Datum::decode(s)?)
    }
}

impl From<Redeemer> for Datum {
    fn from(redeemer: Redeemer) -> Self {
        Self::Constr {
            tag: redeemer.tag,
            fields: redeemer.fields,
        }
    }
}

impl TryFrom<Datum> for Redeemer {
    type Error = EncodingError;

    fn try_from(datum: Datum) -> Result<Self, Self::Error> {
        Self::from_datum(&datum)
    }
}

/// One row of a redeemer table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemerSpec {
    pub action: &'static str,
    pub tag: u64,
    pub arity: usize,
}

/// Fixed mapping from workflow actions to validator branches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemerTable {
    pub workflow: &'static str,
    pub entries: &'static [RedeemerSpec],
}

impl RedeemerTable {
    #[must_use]
    pub fn spec(&self, action: &str) -> Option<&RedeemerSpec> {
        self.entries.iter().find(|spec| spec.action == action)
    }

    /// Build the redeemer for `action`
    ///
    /// # Errors
    ///
    /// Returns an error for unknown actions, wrong field counts or unrepresentable fields.
    pub fn build<I>(&self, action: &str, fields: I) -> Result<Redeemer, EncodingError>
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        let spec = self.spec(action).ok_or_else(|| EncodingError::UnknownAction {
            workflow: self.workflow,
            action: action.to_string(),
        })?;
        let redeemer = build_redeemer(spec.tag, fields)?;
        if redeemer.fields.len() != spec.arity {
            return Err(EncodingError::ArityMismatch {
                action: spec.action,
                expected: spec.arity,
                actual: redeemer.fields.len(),
            });
        }
        Ok(redeemer)
    }

    /// Build the redeemer for a field-less action
    ///
    /// # Errors
    ///
    /// Returns an error for unknown actions or actions that take fields.
    pub fn bare(&self, action: &str) -> Result<Redeemer, EncodingError> {
        self.build(action, Vec::<FieldValue>::new())
    }

    /// Check every row against the redeemer schema published in a blueprint
    ///
    /// # Errors
    ///
    /// Returns [`BlueprintError::RedeemerMismatch`] when a tag is missing from the
    /// schema or its field count differs.
    pub fn verify(&self, blueprint: &Blueprint, validator_title: &str) -> Result<(), BlueprintError> {
        let constructors = blueprint.redeemer_constructors(validator_title)?;
        for spec in self.entries {
            let Some(schema) = constructors.iter().find(|c| c.index == spec.tag) else {
                return Err(BlueprintError::RedeemerMismatch {
                    workflow: self.workflow,
                    detail: format!("no constructor {} for `{}`", spec.tag, spec.action),
                });
            };
            if schema.arity != spec.arity {
                return Err(BlueprintError::RedeemerMismatch {
                    workflow: self.workflow,
                    detail: format!(
                        "`{}` has {} field(s), blueprint constructor {} has {}",
                        spec.action, spec.arity, spec.tag, schema.arity
                    ),
                });
            }
            if let Some(title) = &schema.title {
                if normalize(title) != normalize(spec.action) {
                    warn!(
                        workflow = self.workflow,
                        action = spec.action,
                        blueprint_title = %title,
                        "redeemer title differs from blueprint"
                    );
                }
            }
        }
        debug!(workflow = self.workflow, validator = validator_title, "redeemer table verified");
        Ok(())
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
