//! Authorization: the remote decision-service client and the strategies
//! that turn a request payload into a verdict.

pub mod client;
pub mod evaluator;

pub use client::{HttpPolicyClient, PolicyClient, PolicyClientError};
pub use evaluator::{
    AuthorizationResult, Authorizer, InProcessAuthorizer, PolicyLocation, RemoteAuthorizer,
};
