//! Data models for the site-selection backend.
//!
//! - `user`: identities, credentials and the login/profile payloads
//! - `site`: project requirements, ranked recommendations and analysis history

pub mod site;
pub mod user;

pub use site::{
    JobHistory, LandUse, ProjectRequirements, Recommendation, RecommendationResponse,
    RequirementsError,
};
pub use user::{
    AuthResponse, Credentials, Profile, Registration, UserIdentity, DEFAULT_ROLE, ROLES,
};
