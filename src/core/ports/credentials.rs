/// Supplies the bearer token attached to every chat service request.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}
