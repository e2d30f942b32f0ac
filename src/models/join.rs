use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential handed to the video engine.
///
/// Token mode carries a signed per-user token; sign mode carries the static
/// app sign. Resolved once at the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JoinCredential {
    #[serde(rename = "token")]
    TokenBased { token: String },
    #[serde(rename = "sign")]
    SignBased {
        #[serde(rename = "appSign")]
        app_sign: String,
    },
}

/// Join descriptor returned by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinDescriptor {
    #[serde(rename = "appID")]
    pub app_id: u32,
    #[serde(flatten)]
    pub credential: JoinCredential,
    #[serde(rename = "roomID")]
    pub room_id: Option<String>,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A live participant in a room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceInfo {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipants {
    #[serde(rename = "roomID")]
    pub room_id: String,
    pub count: usize,
    pub participants: Vec<PresenceInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_descriptor_wire_shape() {
        let descriptor = JoinDescriptor {
            app_id: 42,
            credential: JoinCredential::TokenBased {
                token: "abc".to_string(),
            },
            room_id: Some("12345678".to_string()),
            user_id: "u1".to_string(),
            user_name: "Alice".to_string(),
            expires_at: None,
        };

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["appID"], 42);
        assert_eq!(json["kind"], "token");
        assert_eq!(json["token"], "abc");
        assert_eq!(json["roomID"], "12345678");
        assert_eq!(json["userName"], "Alice");

        let back: JoinDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_sign_descriptor_wire_shape() {
        let json = serde_json::json!({
            "appID": 7,
            "kind": "sign",
            "appSign": "deadbeef",
            "roomID": null,
            "userID": "u1",
            "userName": "Bob"
        });

        let descriptor: JoinDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(
            descriptor.credential,
            JoinCredential::SignBased {
                app_sign: "deadbeef".to_string()
            }
        );
        assert!(descriptor.room_id.is_none());
    }
}
