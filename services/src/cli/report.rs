use crate::error::Error;
use serde::Serialize;

/// Machine readable description of a failed command, printed to `STDERR`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub message: String,
    pub causes: Vec<String>,
}

impl ErrorReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}

impl From<&anyhow::Error> for ErrorReport {
    fn from(error: &anyhow::Error) -> Self {
        let kind = match error.downcast_ref::<Error>() {
            Some(Error::Operator { source }) => <&'static str>::from(source).to_string(),
            Some(error) => <&'static str>::from(error).to_string(),
            None => "Error".to_string(),
        };

        Self {
            error: kind,
            message: error.to_string(),
            causes: error.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}
