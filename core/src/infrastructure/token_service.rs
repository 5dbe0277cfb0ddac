// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Thin wrapper binding `domain::token` to the configured HMAC secret, so
//! callers never pass raw key bytes around the application layer.

use crate::domain::token::{self, TokenPayload};

#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
}

impl TokenService {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    pub fn generate(
        &self,
        client_id: &str,
        tool_id: &str,
        ttl_seconds: i64,
        context_key: Option<&str>,
    ) -> Result<String, token::TokenError> {
        token::generate(client_id, tool_id, ttl_seconds, &self.secret, context_key)
    }

    pub fn verify(
        &self,
        candidate: &str,
        client_id: &str,
        tool_id: &str,
        context_key: Option<&str>,
    ) -> bool {
        token::verify(candidate, client_id, tool_id, &self.secret, context_key)
    }

    pub fn decode(&self, candidate: &str) -> Result<TokenPayload, token::TokenError> {
        token::decode(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_verify_through_the_service() {
        let svc = TokenService::new("a-sufficiently-long-test-secret-value");
        let token = svc.generate("client-1", "write_file", 300, None).unwrap();
        assert!(svc.verify(&token, "client-1", "write_file", None));
        assert!(!svc.verify(&token, "client-2", "write_file", None));
    }
}
