//! Admin credential injection.
//!
//! The backend expects the admin id as an `adminId` query parameter on
//! GET requests and as a field of JSON bodies on everything else.

pub const ADMIN_ID_FIELD: &str = "adminId";

/// Source of the admin credential attached to outgoing requests.
pub trait CredentialProvider: Send + Sync {
    fn admin_id(&self) -> Option<String>;
}

/// Attaches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn admin_id(&self) -> Option<String> {
        None
    }
}

/// A fixed admin id, typically read from configuration.
#[derive(Debug, Clone)]
pub struct StaticCredential(pub String);

impl CredentialProvider for StaticCredential {
    fn admin_id(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Merge the admin id into a JSON object body.
///
/// An id already present in the body is left alone; non-object bodies are
/// returned untouched.
pub(crate) fn inject_into_body(
    provider: &dyn CredentialProvider,
    mut body: serde_json::Value,
) -> serde_json::Value {
    if let (Some(admin_id), Some(object)) = (provider.admin_id(), body.as_object_mut()) {
        object
            .entry(ADMIN_ID_FIELD)
            .or_insert(serde_json::Value::String(admin_id));
    }
    body
}
