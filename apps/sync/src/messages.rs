//! Message taxonomy shared by every context of the extension.
//!
//! Wire shape is `{ "type": TAG, "data": payload }`, with `data` omitted for
//! tags that carry nothing. Each context matches `Message` exhaustively, so a
//! new tag does not compile until every context decides what to do with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::resume::ProfileDocument;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// page/popup → background. Replies `{ data }`.
    GetResumeData,
    /// page/popup → background. Replies `{ success }`, then `ResumeUpdated` fan-out.
    SaveResumeData(ProfileDocument),
    /// bridge → background. Replies `{ success }`, no fan-out.
    SyncFromWeb(ProfileDocument),
    /// background → all pages, after a save.
    ResumeUpdated(ProfileDocument),
    /// background → all pages, after the store reported a change.
    ResumeSynced(ProfileDocument),
    /// background/bridge → page. Replies `{ data }` with the page-local object.
    GetPageData,
    /// page → bridge.
    ResumeUpdatedFromPage(ProfileDocument),
    /// page → bridge. Answered with `ExtensionDataResponse`.
    RequestExtensionData,
    /// bridge → page.
    ExtensionDataResponse(Value),
    /// bridge → page.
    ResumeUpdatedFromExtension(ProfileDocument),
}

impl Message {
    pub fn tag(&self) -> &'static str {
        match self {
            Message::GetResumeData => "GET_RESUME_DATA",
            Message::SaveResumeData(_) => "SAVE_RESUME_DATA",
            Message::SyncFromWeb(_) => "SYNC_FROM_WEB",
            Message::ResumeUpdated(_) => "RESUME_UPDATED",
            Message::ResumeSynced(_) => "RESUME_SYNCED",
            Message::GetPageData => "GET_PAGE_DATA",
            Message::ResumeUpdatedFromPage(_) => "RESUME_UPDATED_FROM_PAGE",
            Message::RequestExtensionData => "REQUEST_EXTENSION_DATA",
            Message::ExtensionDataResponse(_) => "EXTENSION_DATA_RESPONSE",
            Message::ResumeUpdatedFromExtension(_) => "RESUME_UPDATED_FROM_EXTENSION",
        }
    }
}

/// Response to a request-style message.
///
/// Variant order matters for untagged decoding: `Failed` must be tried
/// before `Ack` because an `Ack` pattern would also accept a failure body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Data { data: Value },
    Failed { success: bool, error: String },
    Ack { success: bool },
}

impl Reply {
    pub fn data(data: Value) -> Self {
        Reply::Data { data }
    }

    pub fn success() -> Self {
        Reply::Ack { success: true }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Reply::Failed {
            success: false,
            error: error.into(),
        }
    }

    /// The `data` payload, or `None` for acknowledgements.
    pub fn into_data(self) -> Option<Value> {
        match self {
            Reply::Data { data } => Some(data),
            Reply::Failed { .. } | Reply::Ack { .. } => None,
        }
    }
}

/// The `{}` payload used whenever there is nothing to report.
pub fn empty_data() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_message_wire_shape() {
        let value = serde_json::to_value(Message::GetResumeData).unwrap();
        assert_eq!(value, json!({ "type": "GET_RESUME_DATA" }));

        let parsed: Message =
            serde_json::from_value(json!({ "type": "REQUEST_EXTENSION_DATA" })).unwrap();
        assert_eq!(parsed, Message::RequestExtensionData);
    }

    #[test]
    fn test_payload_message_wire_shape() {
        let parsed: Message = serde_json::from_value(json!({
            "type": "SAVE_RESUME_DATA",
            "data": { "personalInfo": { "fullName": "A" } }
        }))
        .unwrap();
        match parsed {
            Message::SaveResumeData(doc) => assert_eq!(doc.personal_info["fullName"], "A"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let result = serde_json::from_value::<Message>(json!({ "type": "DELETE_RESUME_DATA" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_tag_matches_serialized_type() {
        let samples = vec![
            Message::GetResumeData,
            Message::SaveResumeData(ProfileDocument::default()),
            Message::SyncFromWeb(ProfileDocument::default()),
            Message::ResumeUpdated(ProfileDocument::default()),
            Message::ResumeSynced(ProfileDocument::default()),
            Message::GetPageData,
            Message::ResumeUpdatedFromPage(ProfileDocument::default()),
            Message::RequestExtensionData,
            Message::ExtensionDataResponse(empty_data()),
            Message::ResumeUpdatedFromExtension(ProfileDocument::default()),
        ];
        for message in samples {
            let value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["type"], message.tag());
        }
    }

    #[test]
    fn test_reply_shapes() {
        assert_eq!(serde_json::to_value(Reply::success()).unwrap(), json!({ "success": true }));
        assert_eq!(
            serde_json::to_value(Reply::data(empty_data())).unwrap(),
            json!({ "data": {} })
        );

        let failed: Reply =
            serde_json::from_value(json!({ "success": false, "error": "disk full" })).unwrap();
        assert_eq!(failed, Reply::failed("disk full"));

        let ack: Reply = serde_json::from_value(json!({ "success": true })).unwrap();
        assert_eq!(ack, Reply::success());
    }
}
