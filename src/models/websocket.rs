use serde::{ Serialize, Deserialize };
use super::chat::Turn;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "reset")]
    Reset,
    #[serde(rename = "history")]
    History,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "response")] Response {
        content: String,
        /// Model that produced the reply; absent when every model failed.
        model: Option<String>,
        timestamp: i64,
    },
    #[serde(rename = "rejected")] Rejected {
        reason: String,
    },
    #[serde(rename = "history")] History {
        turns: Vec<Turn>,
        pending: bool,
        model: Option<String>,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "cleared")]
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_client_messages() {
        let chat: ClientMessage = serde_json::from_str(r#"{"type":"chat","content":"hi"}"#).unwrap();
        assert_eq!(chat, ClientMessage::Chat { content: "hi".to_string() });

        let reset: ClientMessage = serde_json::from_str(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(reset, ClientMessage::Reset);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn server_messages_carry_type_tag() {
        let value = serde_json::to_value(ServerMessage::Processing).unwrap();
        assert_eq!(value, json!({ "type": "processing" }));

        let value = serde_json::to_value(ServerMessage::Response {
            content: "hi".to_string(),
            model: None,
            timestamp: 7,
        }).unwrap();
        assert_eq!(value, json!({ "type": "response", "content": "hi", "model": null, "timestamp": 7 }));
    }
}
