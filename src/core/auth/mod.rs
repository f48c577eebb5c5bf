//! Authentication and session lifecycle
//!
//! This module provides:
//! - JWT access token generation and validation
//! - Opaque refresh token issuing
//! - The credential gateway seam
//! - Session management with refresh token rotation and reuse detection

pub mod gateway;
pub mod issuer;
pub mod jwt;
pub mod service;

pub use gateway::{AuthGateway, Credentials, GatewayError, UserIdentity};
pub use issuer::{TokenIssuer, generate_token_value, hash_token};
pub use jwt::{AccessClaims, JwtConfig, JwtError, JwtService};
pub use service::{
    AuthResponse, RefreshFailure, RevokeFailure, SessionError, SessionManager, TokenPair,
};
