use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::error::DeclarationError;

/// Declarative form of one test, as written by an activity author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestDeclaration {
    pub name: String,
    #[serde(default)]
    pub precmds: Vec<String>,
    pub cmds: Vec<String>,
    #[serde(default)]
    pub postcmds: Vec<String>,
    #[serde(default)]
    pub fatal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub checks: Vec<CheckDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDeclaration {
    #[serde(rename = "type", default)]
    pub kind: CheckKind,
    pub output: CheckOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    #[default]
    Exact,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutput {
    Stdout,
    Stderr,
    File,
}

impl TestDeclaration {
    /// Decode the opaque per-test blob (base64 of the JSON record).
    pub fn from_blob(blob: &str) -> Result<Self, DeclarationError> {
        let bytes = STANDARD.decode(blob.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn to_blob(&self) -> Result<String, DeclarationError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let decl: TestDeclaration = serde_json::from_str(
            r#"{"name":"t","cmds":["./a.out"],"checks":[{"output":"stdout","content":"hi\n"}]}"#,
        )
        .unwrap();

        assert!(decl.precmds.is_empty());
        assert!(decl.postcmds.is_empty());
        assert!(!decl.fatal);
        assert_eq!(decl.timeout_ms, None);
        assert_eq!(decl.checks[0].kind, CheckKind::Exact);
        assert_eq!(decl.checks[0].output, CheckOutput::Stdout);
    }

    #[test]
    fn blob_decodes_to_the_same_declaration() {
        let decl = TestDeclaration {
            name: "writes file".into(),
            precmds: vec!["rm -f out.txt".into()],
            cmds: vec!["./a.out > out.txt".into()],
            postcmds: vec!["rm -f out.txt".into()],
            fatal: true,
            timeout_ms: Some(500),
            checks: vec![CheckDeclaration {
                kind: CheckKind::Regex,
                output: CheckOutput::File,
                filename: Some("out.txt".into()),
                content: "^4[0-9]$".into(),
            }],
        };
        let blob = decl.to_blob().unwrap();
        assert_eq!(TestDeclaration::from_blob(&blob).unwrap(), decl);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<TestDeclaration>(r#"{"name":"t","cmds":[],"retries":3}"#);
        assert!(err.is_err());
    }

    #[test]
    fn garbage_blob_is_an_encoding_error() {
        let err = TestDeclaration::from_blob("not base64 !!").unwrap_err();
        assert!(matches!(err, DeclarationError::Encoding(_)));
    }
}
