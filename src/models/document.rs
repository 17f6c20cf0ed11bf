use serde::{Deserialize, Serialize};

use crate::models::{ApiError, DocHandle, ErrorBody, PermissionUpdate, UserMini};

/// What a freshly created or never-edited document contains
pub const EMPTY_DOCUMENT: &str = "<p></p>";

/// Caller's access to a document, as reported by the fetch endpoint
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Read access granted only because the document is public
    #[default]
    Public,
    Reader,
    Writer,
    Admin,
    Owner,
}

impl AccessLevel {
    pub fn can_write(self) -> bool {
        matches!(self, AccessLevel::Writer | AccessLevel::Admin | AccessLevel::Owner)
    }
}

/// Document body as sent by the backend
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawDoc {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub owner: Option<UserMini>,
    #[serde(default)]
    pub admins: Vec<UserMini>,
    #[serde(default)]
    pub writers: Vec<UserMini>,
    #[serde(default)]
    pub readers: Vec<UserMini>,
}

/// Response of `GET /{handle}`
#[derive(Deserialize, Debug)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DocumentResponse {
    Success {
        doc: RawDoc,
        #[serde(default, rename = "accessLevel")]
        access_level: AccessLevel,
    },
    Error {
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl DocumentResponse {
    pub fn into_view(self, handle: &DocHandle) -> Result<DocumentView, ApiError> {
        match self {
            DocumentResponse::Success { doc, access_level } => {
                Ok(DocumentView::from_raw(handle.clone(), doc, access_level))
            }
            DocumentResponse::Error { details, message } => {
                let body = ErrorBody { details, message };
                Err(ApiError::Rejected(body.describe("document unavailable")))
            }
        }
    }
}

/// A fetched document, validated and with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentView {
    pub handle: DocHandle,
    pub content: String,
    pub title: String,
    pub is_public: bool,
    pub owner: Option<UserMini>,
    pub admins: Vec<UserMini>,
    pub writers: Vec<UserMini>,
    pub readers: Vec<UserMini>,
    pub access_level: AccessLevel,
}

impl DocumentView {
    pub fn from_raw(handle: DocHandle, doc: RawDoc, access_level: AccessLevel) -> Self {
        Self {
            handle,
            content: doc
                .content
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| EMPTY_DOCUMENT.to_string()),
            title: doc.title.unwrap_or_default(),
            is_public: doc.is_public.unwrap_or(true),
            owner: doc.owner,
            admins: doc.admins,
            writers: doc.writers,
            readers: doc.readers,
            access_level,
        }
    }

    /// Anyone may edit a public document, otherwise only writers and above
    pub fn can_edit(&self) -> bool {
        self.is_public || self.access_level.can_write()
    }

    pub fn is_admin_or_owner(&self, email: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| o.email == email)
            || self.admins.iter().any(|a| a.email == email)
    }

    /// Warning for a permission change by `email` that the backend will likely refuse
    pub fn permission_warning(&self, email: Option<&str>) -> Option<String> {
        match email {
            Some(email) if self.is_admin_or_owner(email) => None,
            Some(email) => Some(format!("{} is neither owner nor admin of {}", email, self.handle)),
            None => Some(format!("not signed in; only the owner or an admin can share {}", self.handle)),
        }
    }

    /// Title to show, falling back to the key
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            self.handle.as_str()
        } else {
            &self.title
        }
    }
}

/// Bodies accepted by `POST /docs`
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocsRequest {
    Create,
    #[serde(rename_all = "camelCase")]
    SetPublic {
        doc_id: String,
        public: bool,
        doc_title: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateDocPermissions {
        doc_id: String,
        updates: Vec<PermissionUpdate>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateTitle {
        doc_id: String,
        title: String,
    },
}

/// Body of `PUT /docs/{handle}`
#[derive(Serialize, Debug, Clone)]
pub struct SaveRequest<'a> {
    pub content: &'a str,
}

/// `{status, message?}` reply of every write endpoint
#[derive(Deserialize, Debug)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WriteReply {
    Success {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, rename = "isPublic")]
        is_public: Option<bool>,
    },
    Error {
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl WriteReply {
    /// Returns the reported public flag, if the endpoint sent one
    pub fn into_result(self, fallback: &str) -> Result<Option<bool>, ApiError> {
        match self {
            WriteReply::Success { is_public, .. } => Ok(is_public),
            WriteReply::Error { details, message } => {
                Err(ApiError::Rejected(ErrorBody { details, message }.describe(fallback)))
            }
        }
    }
}

/// Reply of the create endpoint: the new document's URL, or an error body
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum CreateReply {
    Created { url: String },
    Failed(ErrorBody),
}

/// One entry of the document list
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub doc_key: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Reply of `GET /docs`
#[derive(Deserialize, Debug)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DocumentListReply {
    Success {
        #[serde(default)]
        docs: Vec<DocumentSummary>,
    },
    Error {
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}
