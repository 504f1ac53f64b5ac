use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageRef(pub String);

/// What the attachment guard sees of an incoming file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCandidate {
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
}

/// An incoming file with its bytes. `size_bytes` is taken from the payload,
/// never from the client's declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl FileUpload {
    pub fn candidate(&self) -> FileCandidate {
        FileCandidate {
            file_name: self.file_name.clone(),
            size_bytes: self.content.len() as u64,
            content_type: self.content_type.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub request_id: RequestId,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// A file that passed the guard and was written to object storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub request_id: RequestId,
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub storage_ref: StorageRef,
}
