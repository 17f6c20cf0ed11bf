use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::models::{
    ApiError, CreateReply, DocHandle, DocsRequest, DocumentListReply, DocumentResponse,
    DocumentSummary, DocumentView, ErrorBody, Login, LoginReply, PermissionUpdate, SaveRequest,
    UserMini, UserRequest, WriteReply,
};
use crate::validation;

/// Client for the document REST API.
///
/// Carries the session token explicitly; nothing is read from ambient state.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("inlyne-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Same client bound to another session token
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a document with its metadata, permission lists and the caller's access level
    pub async fn fetch_document(&self, handle: &DocHandle) -> Result<DocumentView, ApiError> {
        debug!("Fetching document {}", handle);
        let url = format!("{}/{}", self.base_url, handle);
        let resp = self
            .authed(self.client.get(&url))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let reply: DocumentResponse = read_json(resp).await?;
        reply.into_view(handle).inspect_err(|e| {
            error!("Failed to fetch document {}: {}", handle, e);
        })
    }

    /// Durably store the document content
    pub async fn save_document(&self, handle: &DocHandle, content: &str) -> Result<(), ApiError> {
        let token = self.require_token()?;
        let url = format!("{}/docs/{}", self.base_url, handle);
        let resp = self
            .client
            .put(&url)
            .bearer_auth(token)
            .json(&SaveRequest { content })
            .send()
            .await?;
        let reply: WriteReply = read_json(resp).await?;
        reply.into_result("Save failed")?;
        info!("Saved document {} ({} bytes)", handle, content.len());
        Ok(())
    }

    /// Toggle public access. Returns the flag the backend reports.
    pub async fn set_public(&self, handle: &DocHandle, public: bool, title: &str) -> Result<bool, ApiError> {
        let request = DocsRequest::SetPublic {
            doc_id: handle.to_string(),
            public,
            doc_title: title.to_string(),
        };
        let reported = self.post_docs(&request, "Toggle failed").await?;
        Ok(reported.unwrap_or(public))
    }

    /// Create an empty document and return its key
    pub async fn create_document(&self) -> Result<DocHandle, ApiError> {
        let url = format!("{}/docs", self.base_url);
        let resp = self
            .authed(self.client.post(&url))
            .json(&DocsRequest::Create)
            .send()
            .await?;
        match read_json::<CreateReply>(resp).await? {
            CreateReply::Created { url } => {
                let handle = DocHandle::from_url(&url)?;
                info!("Created document {}", handle);
                Ok(handle)
            }
            CreateReply::Failed(body) => Err(ApiError::Rejected(body.describe("Create failed"))),
        }
    }

    pub async fn update_permissions(
        &self,
        handle: &DocHandle,
        updates: Vec<PermissionUpdate>,
    ) -> Result<(), ApiError> {
        for update in &updates {
            validation::validate_email(&update.user_email)?;
        }
        let request = DocsRequest::UpdateDocPermissions { doc_id: handle.to_string(), updates };
        self.post_docs(&request, "Permission update failed").await?;
        Ok(())
    }

    pub async fn rename_document(&self, handle: &DocHandle, title: &str) -> Result<(), ApiError> {
        let request = DocsRequest::UpdateTitle { doc_id: handle.to_string(), title: title.to_string() };
        self.post_docs(&request, "Rename failed").await?;
        Ok(())
    }

    /// Documents the signed-in user can access
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, ApiError> {
        let token = self.require_token()?;
        let url = format!("{}/docs", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        match read_json::<DocumentListReply>(resp).await? {
            DocumentListReply::Success { docs } => Ok(docs),
            DocumentListReply::Error { details, message } => {
                Err(ApiError::Rejected(ErrorBody { details, message }.describe("Listing failed")))
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Login, ApiError> {
        let request = UserRequest::UserLogin { email: email.to_string(), password: password.to_string() };
        let resp = self.client.post(self.user_url()).json(&request).send().await?;
        match read_json::<LoginReply>(resp).await? {
            LoginReply::Success { token, pfp_url } => {
                info!("Signed in as {}", email);
                Ok(Login { token, pfp_url })
            }
            LoginReply::Error { details, message } => {
                Err(ApiError::Rejected(ErrorBody { details, message }.describe("Login failed")))
            }
        }
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str, confirm: &str) -> Result<(), ApiError> {
        validation::validate_email(email)?;
        validation::validate_new_password(password, confirm)?;
        let request = UserRequest::UserSignup {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp = self.client.post(self.user_url()).json(&request).send().await?;
        read_json::<WriteReply>(resp).await?.into_result("Sign-up failed")?;
        Ok(())
    }

    pub async fn fetch_profile(&self) -> Result<UserMini, ApiError> {
        let token = self.require_token()?;
        let resp = self
            .client
            .get(self.user_url())
            .query(&[("requestType", "getUserData")])
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http { status: status.as_u16(), message });
        }
        read_json(resp).await
    }

    pub async fn update_username(&self, username: &str) -> Result<(), ApiError> {
        self.post_user(&UserRequest::UpdateUsername { new_username: username.to_string() }, "Username update failed")
            .await
    }

    pub async fn update_email(&self, email: &str) -> Result<(), ApiError> {
        validation::validate_email(email)?;
        self.post_user(&UserRequest::UpdateEmail { new_email: email.to_string() }, "Email update failed")
            .await
    }

    pub async fn update_password(&self, password: &str, confirm: &str) -> Result<(), ApiError> {
        validation::validate_new_password(password, confirm)?;
        self.post_user(&UserRequest::UpdatePassword { new_password: password.to_string() }, "Password update failed")
            .await
    }

    async fn post_docs(&self, request: &DocsRequest, fallback: &str) -> Result<Option<bool>, ApiError> {
        let token = self.require_token()?;
        let url = format!("{}/docs", self.base_url);
        let resp = self.client.post(&url).bearer_auth(token).json(request).send().await?;
        read_json::<WriteReply>(resp).await?.into_result(fallback)
    }

    async fn post_user(&self, request: &UserRequest, fallback: &str) -> Result<(), ApiError> {
        let token = self.require_token()?;
        let resp = self.client.post(self.user_url()).bearer_auth(token).json(request).send().await?;
        read_json::<WriteReply>(resp).await?.into_result(fallback)?;
        Ok(())
    }

    fn user_url(&self) -> String {
        format!("{}/user", self.base_url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn require_token(&self) -> Result<&str, ApiError> {
        self.token.as_deref().ok_or(ApiError::NotSignedIn)
    }
}

/// Decode a JSON body. The backend sends `{status: "error", …}` bodies with
/// non-2xx codes too, so the body is tried first and the HTTP status only
/// reported when the body is unusable.
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let status = resp.status();
    let text = resp.text().await?;
    match serde_json::from_str::<T>(&text) {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.describe(status.canonical_reason().unwrap_or("request failed")))
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
            Err(ApiError::Http { status: status.as_u16(), message })
        }
        Err(e) => Err(ApiError::Malformed(e.to_string())),
    }
}
