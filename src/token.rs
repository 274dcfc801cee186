//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::model::Id;

const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("system clock is before unix epoch")]
    Clock(#[from] std::time::SystemTimeError),
    #[error("subject is not a valid id")]
    Subject(#[from] uuid::Error),
    #[error("empty signing secret")]
    MissingSecret,
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Identifies the expiration time, in seconds.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the instance that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
}

impl Claims {
    /// Parsed `sub` claim.
    pub fn user_id(&self) -> Result<Id, TokenError> {
        Ok(self.sub.parse()?)
    }
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    name: String,
    lifetime: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with HMAC-SHA256.
    pub fn new(
        name: &str,
        secret: &str,
        expiration_days: u64,
    ) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            name: name.to_owned(),
            lifetime: expiration_days * SECONDS_PER_DAY,
        })
    }

    /// Token lifetime in seconds.
    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    /// Create a new [`jsonwebtoken`].
    pub fn create(&self, user_id: Id) -> Result<String, TokenError> {
        let time = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let claims = Claims {
            exp: time + self.lifetime,
            iat: time,
            iss: self.name.clone(),
            sub: user_id.to_string(),
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.name]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_decode() {
        let manager = TokenManager::new("leadhub", "secret", 7).unwrap();
        let id = Id::new_v4();

        let token = manager.create(id).unwrap();
        let claims = manager.decode(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), id);
        assert_eq!(claims.exp - claims.iat, 7 * SECONDS_PER_DAY);
        assert_eq!(manager.lifetime(), 604_800);
    }

    #[test]
    fn test_foreign_tokens_are_rejected() {
        let manager = TokenManager::new("leadhub", "secret", 7).unwrap();
        let other_secret = TokenManager::new("leadhub", "other", 7).unwrap();
        let other_issuer = TokenManager::new("other", "secret", 7).unwrap();

        let id = Id::new_v4();
        assert!(manager.decode(&other_secret.create(id).unwrap()).is_err());
        assert!(manager.decode(&other_issuer.create(id).unwrap()).is_err());
        assert!(manager.decode("not.a.jwt").is_err());
    }

    #[test]
    fn test_empty_secret() {
        assert!(matches!(
            TokenManager::new("leadhub", "", 7),
            Err(TokenError::MissingSecret)
        ));
    }
}
