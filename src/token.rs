use uuid::Uuid;

/// Source of unguessable identifiers for certificates.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs (122 random bits).
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTokens;

impl TokenGenerator for UuidTokens {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
