//! Hosted backend: typed rows, REST client and session handling.

mod api_types;
pub mod client;
pub mod session;
pub mod types;

use async_trait::async_trait;
use color_eyre::Result;

use crate::cache::DomainKey;

pub use client::{BackendClient, PasswordAuth};
pub use session::{AuthProvider, Session, SessionStore, SessionUser, TokenEndpoint};
pub use types::{Hackathon, Profile, Task};

/// Authoritative queries, scoped by team membership.
#[async_trait]
pub trait Backend: Send + Sync {
  /// Teams the user belongs to.
  async fn team_ids(&self, user_id: &str) -> Result<Vec<String>>;

  /// Hackathons of the given teams, ordered by submission deadline.
  async fn hackathons(&self, team_ids: &[String]) -> Result<Vec<Hackathon>>;

  /// Tasks of the given teams with assignee profiles, ordered by deadline.
  async fn tasks(&self, team_ids: &[String]) -> Result<Vec<Task>>;

  /// One page of row ids from `table`.
  async fn ids_page(
    &self,
    table: DomainKey,
    team_ids: &[String],
    offset: usize,
    limit: usize,
  ) -> Result<Vec<String>>;
}
