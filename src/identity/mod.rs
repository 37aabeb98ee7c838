//! Sessions, principals and the gates that admit requests.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod federation;
mod lifecycle;
mod request_context;
mod authorizer;

pub use principal::{Principal, Identity, ADMIN_PRINCIPAL};
pub use session::{Session, SessionError, SessionId, SessionStore};
pub use provider::{
    AuthProvider, CredentialEvidence, CredentialVerifier, FederationEvidence, FederationVerifier,
    LocalAuthProvider, LoginRequest, SessionCredentials, VerifierError,
};
pub use federation::{ChallengeFederation, sign_challenge, CHALLENGE_TTL};
pub use lifecycle::{LoginFailure, SessionLifecycle, SessionSummary};
pub use request_context::{QueryParams, RequestContext, RequestShape, FEDERATION_HEADER};
pub use authorizer::{Gate, GateOutcome, run_gates};
