//! Contract blueprints (CIP-57 `plutus.json`) and parameter application
//!
//! Loading a blueprint gives access to the compiled validators and their published
//! redeemer schemas. Applying parameters to a compiled validator requires a script
//! toolchain and is delegated to a [`ScriptParameterizer`].
//!
//! # Example
//!
//! ```ignore
//! use scriptflow::blueprint::Blueprint;
//!
//! let blueprint = Blueprint::from_file("onchain/aiken/plutus.json")?;
//! let validator = blueprint.apply("htlc.htlc", &params, &parameterizer)?;
//! ```

use crate::datum::Datum;
use crate::error::BlueprintError;
use crate::ledger::{Address, NetworkId, ScriptHash};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as Json};
use std::path::Path;

/// Plutus language version of a validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlutusVersion {
    V1,
    V2,
    #[default]
    V3,
}

/// Blueprint preamble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preamble {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, rename = "plutusVersion")]
    pub plutus_version: PlutusVersion,
}

/// A titled schema reference (datum, redeemer or parameter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub schema: Json,
}

/// A validator entry as published in the blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintValidator {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemer: Option<Argument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Argument>,
    #[serde(rename = "compiledCode")]
    pub compiled_code: String,
    pub hash: ScriptHash,
}

impl BlueprintValidator {
    /// Decode the hex-encoded compiled code
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not valid hex.
    pub fn code_bytes(&self) -> Result<Vec<u8>, BlueprintError> {
        hex::decode(&self.compiled_code).map_err(|e| BlueprintError::InvalidCode(e.to_string()))
    }
}

/// Shape of one redeemer constructor published in a blueprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorSchema {
    pub title: Option<String>,
    pub index: u64,
    pub arity: usize,
}

/// A parsed contract blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub preamble: Preamble,
    pub validators: Vec<BlueprintValidator>,
    #[serde(default)]
    pub definitions: JsonMap<String, Json>,
}

impl Blueprint {
    /// Load a blueprint from a `plutus.json` file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BlueprintError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a blueprint from JSON text
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, BlueprintError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Find a validator by full title or by its `module.name` prefix
    ///
    /// # Errors
    ///
    /// Returns an error if no validator matches.
    pub fn validator(&self, title: &str) -> Result<&BlueprintValidator, BlueprintError> {
        let prefix = format!("{title}.");
        self.validators
            .iter()
            .find(|v| v.title == title || v.title.starts_with(&prefix))
            .ok_or_else(|| BlueprintError::ValidatorNotFound(title.to_string()))
    }

    /// Follow `$ref` pointers into `definitions`
    ///
    /// # Errors
    ///
    /// Returns an error for references outside `#/definitions/` or to missing entries.
    pub fn resolve<'a>(&'a self, schema: &'a Json) -> Result<&'a Json, BlueprintError> {
        let mut current = schema;
        // Bounded so that cyclic references cannot loop forever
        for _ in 0..32 {
            let Some(reference) = current.get("$ref").and_then(Json::as_str) else {
                return Ok(current);
            };
            let key = reference
                .strip_prefix("#/definitions/")
                .ok_or_else(|| BlueprintError::BadReference(reference.to_string()))?
                .replace("~1", "/")
                .replace("~0", "~");
            current = self
                .definitions
                .get(&key)
                .ok_or_else(|| BlueprintError::BadReference(reference.to_string()))?;
        }
        Err(BlueprintError::BadReference("reference chain too deep".into()))
    }

    /// Constructors of the validator's redeemer type
    ///
    /// # Errors
    ///
    /// Returns an error if the validator is missing or its schema cannot be resolved.
    pub fn redeemer_constructors(&self, title: &str) -> Result<Vec<ConstructorSchema>, BlueprintError> {
        let validator = self.validator(title)?;
        let Some(redeemer) = &validator.redeemer else {
            return Ok(Vec::new());
        };
        let schema = self.resolve(&redeemer.schema)?;

        let variants: Vec<&Json> = match schema.get("anyOf").and_then(Json::as_array) {
            Some(any_of) => any_of.iter().collect(),
            None => vec![schema],
        };

        let mut constructors = Vec::new();
        for variant in variants {
            let variant = self.resolve(variant)?;
            if variant.get("dataType").and_then(Json::as_str) != Some("constructor") {
                continue;
            }
            let index = variant
                .get("index")
                .and_then(Json::as_u64)
                .ok_or_else(|| BlueprintError::BadReference("constructor without index".into()))?;
            let arity = variant
                .get("fields")
                .and_then(Json::as_array)
                .map_or(0, Vec::len);
            constructors.push(ConstructorSchema {
                title: variant.get("title").and_then(Json::as_str).map(str::to_string),
                index,
                arity,
            });
        }
        Ok(constructors)
    }

    /// Apply parameters to a validator through `parameterizer`
    ///
    /// Validators without declared parameters are returned as published.
    ///
    /// # Errors
    ///
    /// Returns an error if the validator is missing, the parameter count differs from
    /// the blueprint, or parameter application fails.
    pub fn apply<P: ScriptParameterizer + ?Sized>(
        &self,
        title: &str,
        params: &[Datum],
        parameterizer: &P,
    ) -> Result<Validator, BlueprintError> {
        let validator = self.validator(title)?;
        if params.len() != validator.parameters.len() {
            return Err(BlueprintError::Parameters(format!(
                "`{}` takes {} parameter(s), got {}",
                validator.title,
                validator.parameters.len(),
                params.len()
            )));
        }
        if params.is_empty() {
            return Validator::from_blueprint(validator, self.preamble.plutus_version);
        }
        parameterizer.apply_parameters(validator, params)
    }
}

/// An executable validator: hash plus the code attached to spending transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub hash: ScriptHash,
    #[serde(with = "hex::serde")]
    pub code: Vec<u8>,
    pub version: PlutusVersion,
}

impl Validator {
    /// Use a published validator as-is
    ///
    /// # Errors
    ///
    /// Returns an error if the compiled code is not valid hex.
    pub fn from_blueprint(
        validator: &BlueprintValidator,
        version: PlutusVersion,
    ) -> Result<Self, BlueprintError> {
        Ok(Self {
            hash: validator.hash,
            code: validator.code_bytes()?,
            version,
        })
    }

    /// Script address locking outputs to this validator
    #[must_use]
    pub const fn address(&self, network: NetworkId) -> Address {
        Address::script(network, self.hash)
    }
}

/// Applies parameters to a compiled validator
///
/// Implementations wrap the script toolchain that rewrites the compiled code and
/// recomputes its hash.
pub trait ScriptParameterizer {
    /// Produce the parameterized validator
    fn apply_parameters(
        &self,
        validator: &BlueprintValidator,
        params: &[Datum],
    ) -> Result<Validator, BlueprintError>;
}
