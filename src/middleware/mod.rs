/*
 * Responsibility
 * - Pipeline stages (authn / authz / signer), independent of HTTP
 * - HTTP cross-cutting layers applied to the whole router
 */
pub mod authn;
pub mod authz;
pub mod http;
pub mod signer;

pub use authn::AuthnInterceptor;
pub use authz::{AuthzInterceptor, PolicyInput};
pub use signer::SigningInterceptor;
