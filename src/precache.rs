//! Post-login precache fan-out.
//!
//! After a successful sign-in the shell routes and every task and
//! hackathon detail page of the user's teams are handed to the worker so
//! they can be opened offline later. Runs once, in the background.

use color_eyre::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::cache::DomainKey;
use crate::config::PrecacheConfig;
use crate::worker::WorkerHandle;

/// What one precache run posted to the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheSummary {
  pub routes: usize,
  pub detail_urls: usize,
  pub batches: usize,
}

/// Start the fan-out for `user_id`. Errors are logged, never returned.
pub fn spawn_after_login(
  backend: Arc<dyn Backend>,
  user_id: String,
  worker: WorkerHandle,
  config: PrecacheConfig,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    match run(backend.as_ref(), &user_id, &worker, &config).await {
      Ok(summary) => info!(
        routes = summary.routes,
        detail_urls = summary.detail_urls,
        batches = summary.batches,
        "precache requested"
      ),
      Err(e) => warn!(error = %e, "precache aborted"),
    }
  })
}

/// One precache pass.
pub async fn run(
  backend: &dyn Backend,
  user_id: &str,
  worker: &WorkerHandle,
  config: &PrecacheConfig,
) -> Result<PrecacheSummary> {
  let mut summary = PrecacheSummary::default();

  if worker.precache(config.routes.clone()) {
    summary.routes = config.routes.len();
  }

  let teams = backend.team_ids(user_id).await?;
  if teams.is_empty() {
    debug!("no teams, skipping detail pages");
    return Ok(summary);
  }

  let (tasks, hackathons) = tokio::join!(
    fetch_all_ids(backend, DomainKey::Tasks, &teams, config.page_size),
    fetch_all_ids(backend, DomainKey::Hackathons, &teams, config.page_size),
  );

  let urls: Vec<String> = tasks
    .iter()
    .map(|id| format!("/tasks/{}", id))
    .chain(hackathons.iter().map(|id| format!("/hackathons/{}", id)))
    .collect();
  summary.detail_urls = urls.len();

  for batch in urls.chunks(config.batch_size.max(1)) {
    if !worker.precache(batch.to_vec()) {
      warn!("worker gone, dropping remaining precache batches");
      break;
    }
    summary.batches += 1;
  }

  Ok(summary)
}

/// Page through every id of `table`. Stops at the first short page; a
/// failed page ends the walk with what was collected so far.
/// A zero page size is treated as one.
pub async fn fetch_all_ids(
  backend: &dyn Backend,
  table: DomainKey,
  team_ids: &[String],
  page_size: usize,
) -> Vec<String> {
  let page_size = page_size.max(1);
  let mut ids = Vec::new();
  let mut offset = 0;

  loop {
    let page = match backend.ids_page(table, team_ids, offset, page_size).await {
      Ok(page) => page,
      Err(e) => {
        warn!(table = %table, offset, error = %e, "id page failed");
        break;
      }
    };

    let count = page.len();
    ids.extend(page);

    if count < page_size {
      break;
    }
    offset += page_size;
  }

  ids
}
