//! Request and response payloads exchanged with the Murmur API.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub grant_type: String,
}

impl LoginRequest {
    pub fn password_grant(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            grant_type: "password".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub last_sign_in_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user: Option<UserConfig>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistFileType {
    Wheel,
    Source,
}

impl DistFileType {
    pub fn as_str(self) -> &'static str {
        match self {
            DistFileType::Wheel => "wheel",
            DistFileType::Source => "source",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishFile {
    pub filename: String,
    pub file_type: DistFileType,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactPublishRequest {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<JsonValue>,
    pub files: Vec<PublishFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUploadUrl {
    pub file_type: DistFileType,
    pub signed_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPublishResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signed_upload_urls: Vec<SignedUploadUrl>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn login_response_tolerates_missing_optionals() {
        let parsed: LoginResponse = serde_json::from_value(json!({
            "access_token": "abc",
            "user": { "username": "ada", "email": "ada@example.com" }
        }))
        .unwrap();
        assert_eq!(parsed.token_type, "bearer");
        assert_eq!(
            parsed.user.and_then(|u| u.username).as_deref(),
            Some("ada")
        );
    }

    #[test]
    fn publish_request_omits_empty_optionals() {
        let request = ArtifactPublishRequest {
            name: "search".into(),
            version: "1.0.0".into(),
            artifact_type: "tool".into(),
            scope: "ada".into(),
            description: None,
            dependencies: vec![],
            metadata: None,
            instructions: None,
            files: vec![PublishFile {
                filename: "ada_search-1.0.0-py3-none-any.whl".into(),
                file_type: DistFileType::Wheel,
                sha256: "00".into(),
                size: 2,
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "tool");
        assert_eq!(value["files"][0]["file_type"], "wheel");
        assert!(value.get("instructions").is_none());
        assert!(value.get("description").is_none());
    }
}
