use crate::record::ProviderData;
use crate::sheet::MarksSheet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing student identifier")]
    MissingIdentifier,

    #[error("request carries neither providerData nor sheet")]
    MissingPayload,

    #[error("invalid {field} payload: {source}")]
    InvalidPayload {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("no stored inputs for {0}")]
    NoStoredInputs(String),

    #[error("failed to read stored inputs: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::MissingIdentifier
            | ProviderError::MissingPayload
            | ProviderError::InvalidPayload { .. } => "bad_params",
            ProviderError::NoStoredInputs(_) => "not_found",
            ProviderError::Storage(_) => "provider_failed",
        }
    }
}

/// Source of the raw marks and profile fields for a student.
pub trait MarksProvider {
    fn fetch(&self, identifier: &str) -> Result<ProviderData, ProviderError>;
}

/// Trims an identifier and rejects blank ones.
pub fn require_identifier(identifier: &str) -> Result<&str, ProviderError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::MissingIdentifier);
    }
    Ok(trimmed)
}

/// Reads provider data embedded in request params, either already averaged
/// into score groups (`providerData`) or as raw portal tables (`sheet`).
pub struct PayloadProvider<'a> {
    params: &'a serde_json::Value,
}

impl<'a> PayloadProvider<'a> {
    pub fn new(params: &'a serde_json::Value) -> Self {
        Self { params }
    }
}

impl MarksProvider for PayloadProvider<'_> {
    fn fetch(&self, identifier: &str) -> Result<ProviderData, ProviderError> {
        let identifier = require_identifier(identifier)?;

        if let Some(raw) = self.params.get("providerData") {
            return serde_json::from_value::<ProviderData>(raw.clone()).map_err(|source| {
                ProviderError::InvalidPayload {
                    field: "providerData",
                    source,
                }
            });
        }

        if let Some(raw) = self.params.get("sheet") {
            let sheet: MarksSheet =
                serde_json::from_value(raw.clone()).map_err(|source| {
                    ProviderError::InvalidPayload {
                        field: "sheet",
                        source,
                    }
                })?;
            return Ok(sheet.into_provider_data(identifier));
        }

        Err(ProviderError::MissingPayload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_provider_data() {
        let params = json!({
            "pin": "2212345",
            "providerData": {
                "name": "Ravi",
                "unitScores": [[70, 74]],
                "sessionScores": [55]
            }
        });
        let data = PayloadProvider::new(&params).fetch("2212345").expect("fetch");
        assert_eq!(data.name.as_deref(), Some("Ravi"));
        assert_eq!(data.unit_scores, vec![vec![70, 74]]);
        assert_eq!(data.session_scores, vec![55]);
        assert_eq!(data.photo_base64, None);
    }

    #[test]
    fn reads_sheet() {
        let params = json!({
            "sheet": {
                "unitRows": [
                    ["", "", "", "", "", "", "70"],
                    ["", "", "", "", "", "", "74"]
                ],
                "sessionRows": [["h"], ["", "", "", "", "", "55"]],
                "photoSrc": "data:image/jpg;base64,aGVsbG8="
            }
        });
        let data = PayloadProvider::new(&params).fetch("2212345").expect("fetch");
        assert_eq!(data.unit_scores, vec![vec![70, 74, 0]]);
        assert_eq!(data.session_scores, vec![55]);
        assert_eq!(data.photo_base64.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn rejects_blank_identifier_and_missing_payload() {
        let params = json!({});
        let err = PayloadProvider::new(&params).fetch("  ").unwrap_err();
        assert!(matches!(err, ProviderError::MissingIdentifier));
        let err = PayloadProvider::new(&params).fetch("22").unwrap_err();
        assert!(matches!(err, ProviderError::MissingPayload));
        assert_eq!(err.code(), "bad_params");
    }

    #[test]
    fn malformed_payload_is_reported() {
        let params = json!({ "providerData": { "unitScores": "nope" } });
        let err = PayloadProvider::new(&params).fetch("22").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidPayload { field: "providerData", .. }));
    }
}
