use serde::{Deserialize, Serialize};

/// Knobs that trade fidelity to source semantics for smaller output.
///
/// The defaults preserve source semantics exactly.  Options can be loaded from JSON, where every
/// field is optional:
///
/// ```
/// let options = jslower::CompileOptions::from_json_str(r#"{ "omit_downcasts": true }"#).unwrap();
/// assert!(options.omit_downcasts);
/// assert!(!options.omit_integer_clipping);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Turn explicit reference downcasts into no-ops instead of checked runtime casts.
    pub omit_downcasts: bool,
    /// Don't check for `null` when unwrapping a nullable value.
    pub omit_nullable_checks: bool,
    /// Don't wrap unchecked integer arithmetic to its type's range.  Checked arithmetic is
    /// still range-checked.
    pub omit_integer_clipping: bool,
    /// Namespace object through which the reference runtime library is reached.
    pub runtime_namespace: String,
    /// Prefix for temporaries named by [`GensymContext`][`crate::GensymContext`].
    pub temporary_prefix: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            omit_downcasts: false,
            omit_nullable_checks: false,
            omit_integer_clipping: false,
            runtime_namespace: "$rt".to_owned(),
            temporary_prefix: "$t".to_owned(),
        }
    }
}

impl CompileOptions {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json_string(&self) -> String {
        // a struct of plain fields always serializes
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_and_defaults() {
        let options = CompileOptions::from_json_str("{}").unwrap();
        assert_eq!(options, CompileOptions::default());

        let mut options = CompileOptions::default();
        options.omit_integer_clipping = true;
        options.runtime_namespace = "ss".to_owned();
        let json = options.to_json_string();
        assert_eq!(CompileOptions::from_json_str(&json).unwrap(), options);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(CompileOptions::from_json_str(r#"{ "omit_everything": true }"#).is_err());
    }
}
