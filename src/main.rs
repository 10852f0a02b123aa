use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

use hacknotify::backend::{
  AuthProvider, Backend, BackendClient, Hackathon, PasswordAuth, Session, SessionStore, Task,
};
use hacknotify::cache::{CacheStorage, LocalCache, NoopStorage, SqliteStorage};
use hacknotify::config::Config;
use hacknotify::online::{ConnectivityMonitor, ConnectivitySignal};
use hacknotify::query::{Query, QueryState};
use hacknotify::screens::{DashboardData, Screen, ScreenLoader};
use hacknotify::views::{self, DashboardSummary, Reminder, ReminderKind, Urgency};
use hacknotify::worker::{
  HttpNetwork, PrecacheReport, RequestMode, ResponseSource, ServiceWorker, SqliteResponseStore,
  WorkerHandle, WorkerMessage, WorkerRequest,
};
use hacknotify::{db, logging, precache};

const PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "hacknotify")]
#[command(about = "Hackathon deadlines and team tasks, online or off")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hacknotify/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Don't read or write the local offline cache
  #[arg(long)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in and warm the offline cache
  Login { email: String },
  /// Deadlines and tasks at a glance
  Dashboard,
  /// Hackathons of your teams
  Hackathons,
  /// Tasks of your teams
  Tasks {
    /// Only open tasks assigned to you
    #[arg(long)]
    mine: bool,
  },
  /// Deadline reminders due now and tasks due this week
  Reminders,
  /// Connectivity, session and cache status
  Status,
  /// Drive the service worker directly
  Worker {
    #[command(subcommand)]
    command: WorkerCommand,
  },
}

#[derive(Subcommand, Debug)]
enum WorkerCommand {
  /// Cache the shell manifest into the current generation
  Install,
  /// Take control and drop old generations
  Activate,
  /// Offer one request to the worker
  Fetch {
    /// App-relative path or absolute URL
    path: String,
    /// Treat as a page navigation
    #[arg(long)]
    navigate: bool,
    #[arg(long, default_value = "GET")]
    method: String,
  },
  /// Precache the given URLs
  Precache { urls: Vec<String> },
  /// Deliver a raw JSON message, e.g. '{"type":"PRECACHE_URLS","urls":["/"]}'
  Post { message: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let data_dir = db::data_dir()?;
  let _log_guard = logging::init(&data_dir.join("logs"))?;

  if args.no_cache {
    run(args.command, &config, &data_dir, LocalCache::new(NoopStorage)).await
  } else {
    let storage = SqliteStorage::open(&data_dir.join("offline.db"))?;
    let cache = LocalCache::new(storage).with_prefix(config.offline.cache_prefix.clone());
    run(args.command, &config, &data_dir, cache).await
  }
}

async fn run<S: CacheStorage + 'static>(
  command: Command,
  config: &Config,
  data_dir: &Path,
  cache: LocalCache<S>,
) -> Result<()> {
  let sessions = SessionStore::new(data_dir.join("session.json"));

  match command {
    // Only the worker runs without backend credentials
    Command::Worker { command } => {
      let session = sessions.load().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unreadable session");
        None
      });
      let worker = build_worker(config, data_dir, session.as_ref())?;
      worker_command(command, &worker).await
    }
    Command::Login { email } => {
      let client = BackendClient::new(config)?;
      let auth = PasswordAuth::new(client.clone(), sessions);
      login(&email, config, data_dir, client, &auth).await
    }
    Command::Status => {
      let (client, _auth, session) = connect(config, sessions).await?;
      let monitor = ConnectivityMonitor::spawn(client, PROBE_INTERVAL).await;
      let worker = build_worker(config, data_dir, session.as_ref())?;
      status(&monitor.signal(), session.as_ref(), &worker, config)
    }
    screen => {
      let (client, auth, _session) = connect(config, sessions).await?;
      let monitor = ConnectivityMonitor::spawn(client.clone(), PROBE_INTERVAL).await;
      let loader = ScreenLoader::new(Arc::new(client), auth, cache);
      show_screen(screen, loader).await?;
      print_actions(&monitor.signal());
      Ok(())
    }
  }
}

/// Backend client acting as the current user. An expired session is
/// refreshed before the client picks up its token.
async fn connect(
  config: &Config,
  sessions: SessionStore,
) -> Result<(BackendClient, Arc<PasswordAuth>, Option<Session>)> {
  let client = BackendClient::new(config)?;
  let auth = Arc::new(PasswordAuth::new(client.clone(), sessions));

  let session = auth.current_session().await.unwrap_or_else(|e| {
    warn!(error = %e, "ignoring unreadable session");
    None
  });
  let client = match &session {
    Some(session) => client.with_session(session),
    None => client,
  };

  Ok((client, auth, session))
}

fn build_worker(config: &Config, data_dir: &Path, session: Option<&Session>) -> Result<ServiceWorker> {
  let origin =
    Url::parse(&config.app.origin).map_err(|e| eyre!("Invalid app origin {}: {}", config.app.origin, e))?;

  let mut network = HttpNetwork::new()?;
  if let Some(session) = session {
    network = network.with_bearer(session.access_token.clone());
  }

  let store = SqliteResponseStore::open(&data_dir.join("responses.db"))?;
  Ok(ServiceWorker::new(
    config.worker.clone(),
    origin,
    Arc::new(store),
    Arc::new(network),
  ))
}

async fn login(
  email: &str,
  config: &Config,
  data_dir: &Path,
  client: BackendClient,
  auth: &PasswordAuth,
) -> Result<()> {
  let password = Config::get_password()?;
  let session = auth.sign_in(email, &password).await?;
  println!(
    "Signed in as {}",
    session.user.email.as_deref().unwrap_or(email)
  );

  let worker = build_worker(config, data_dir, Some(&session))?;
  if let Err(e) = worker.start().await {
    println!("Offline shell unavailable: {}", e);
    return Ok(());
  }

  let backend: Arc<dyn Backend> = Arc::new(client.with_session(&session));
  let (handle, rx) = WorkerHandle::channel();
  let listener = worker.listen(rx);
  let fan_out = precache::spawn_after_login(
    backend,
    session.user.id.clone(),
    handle,
    config.precache.clone(),
  );

  // Let the fan-out finish and the worker drain it before the process exits
  fan_out
    .await
    .map_err(|e| eyre!("Precache task failed: {}", e))?;
  listener
    .await
    .map_err(|e| eyre!("Worker task failed: {}", e))?;

  println!("Offline copies refreshed");
  Ok(())
}

async fn show_screen<S: CacheStorage + 'static>(screen: Command, loader: ScreenLoader<S>) -> Result<()> {
  match screen {
    Command::Dashboard => {
      let user_id = loader.current_user().await?.id;
      let state = settle(move || {
        let loader = loader.clone();
        async move { loader.dashboard().await.map_err(|e| e.to_string()) }
      })
      .await?;
      print_state(&state, |data| print_dashboard(data, &user_id));
    }
    Command::Hackathons => {
      let state = settle(move || {
        let loader = loader.clone();
        async move { loader.hackathons().await.map_err(|e| e.to_string()) }
      })
      .await?;
      print_state(&state, |hackathons| print_hackathons(hackathons));
    }
    Command::Reminders => {
      let user_id = loader.current_user().await?.id;
      let state = settle(move || {
        let loader = loader.clone();
        async move { loader.dashboard().await.map_err(|e| e.to_string()) }
      })
      .await?;
      print_state(&state, |data| print_reminders(data, &user_id));
    }
    Command::Tasks { mine } => {
      let user_id = loader.current_user().await?.id;
      let state = settle(move || {
        let loader = loader.clone();
        async move { loader.tasks().await.map_err(|e| e.to_string()) }
      })
      .await?;
      print_state(&state, |tasks| {
        if mine {
          print_tasks(&views::my_tasks(tasks, &user_id));
        } else {
          print_tasks(&tasks.iter().collect::<Vec<_>>());
        }
      });
    }
    _ => {}
  }
  Ok(())
}

/// Run one query cycle to completion.
async fn settle<T, F, Fut>(fetcher: F) -> Result<QueryState<T>>
where
  T: Clone + Send + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: std::future::Future<Output = Result<Screen<T>, String>> + Send + 'static,
{
  let mut query = Query::new(fetcher);
  query.fetch();
  query.settle().await;

  match query.state() {
    QueryState::Error(e) => Err(eyre!("{}", e)),
    state => Ok(state.clone()),
  }
}

fn print_state<T>(state: &QueryState<T>, render: impl FnOnce(&T)) {
  if matches!(state, QueryState::NoTeam) {
    println!("You are not on a team yet. Create or join one to get started.");
    return;
  }
  if let Some(notice) = state.notice() {
    println!("[{}]", notice);
  }
  if let Some(data) = state.data() {
    render(data);
  }
}

fn print_dashboard(data: &DashboardData, user_id: &str) {
  let now = Utc::now();
  let summary = DashboardSummary::compute(&data.hackathons, &data.tasks, user_id, now);

  if let Some(user) = &data.user {
    println!("Welcome back, {}", user.name.as_deref().unwrap_or(&user.id));
  }
  println!(
    "{} hackathons, {} upcoming, {} open tasks for you, {} overdue, {} done",
    summary.hackathon_count,
    summary.upcoming.len(),
    summary.my_tasks.len(),
    summary.overdue.len(),
    summary.completed.len()
  );

  println!("\nUrgent deadlines");
  if summary.urgent.is_empty() {
    println!("  nothing due in the next {} days", views::URGENT_WINDOW_DAYS);
  }
  for hackathon in &summary.urgent {
    print_hackathon(hackathon);
  }

  println!("\nYour pending tasks");
  if summary.pending.is_empty() {
    println!("  all caught up");
  }
  print_tasks(&summary.pending);
}

fn print_reminders(data: &DashboardData, user_id: &str) {
  let now = Utc::now();

  println!("Reminders");
  let due = views::due_reminders(&data.hackathons, &data.tasks, user_id, now);
  if due.is_empty() {
    println!("  none due right now");
  }
  for reminder in &due {
    print_reminder(reminder);
  }

  println!("\nTasks due in the next {} days", views::URGENT_WINDOW_DAYS);
  let soon = views::tasks_due_within(&data.tasks, now, views::URGENT_WINDOW_DAYS);
  if soon.is_empty() {
    println!("  none");
  }
  print_tasks(&soon);
}

fn print_reminder(reminder: &Reminder) {
  let what = match reminder.kind {
    ReminderKind::Registration => "registration closes",
    ReminderKind::Submission => "submission due",
    ReminderKind::Task => "task due",
  };
  let when = match reminder.days {
    0 => "within 12 hours".to_string(),
    1 => "in 1 day".to_string(),
    days => format!("in {} days", days),
  };
  println!(
    "  {:<40} {} {} ({})",
    reminder.title,
    what,
    when,
    reminder.deadline.format("%Y-%m-%d %H:%M")
  );
}

fn print_hackathons(hackathons: &[Hackathon]) {
  if hackathons.is_empty() {
    println!("No hackathons yet");
  }
  for hackathon in hackathons {
    print_hackathon(hackathon);
  }
}

fn print_hackathon(hackathon: &Hackathon) {
  let now = Utc::now();
  let due = match hackathon.submission_deadline_at() {
    Some(deadline) => format!(
      "{} ({})",
      deadline.format("%Y-%m-%d %H:%M"),
      badge(views::urgency(deadline, now))
    ),
    None => "no deadline".to_string(),
  };
  println!("  {:<40} {}", hackathon.title, due);
}

fn print_tasks(tasks: &[&Task]) {
  let now = Utc::now();
  for task in tasks {
    let assignee = task
      .assignee
      .as_ref()
      .and_then(|p| p.name.clone())
      .unwrap_or_else(|| "unassigned".to_string());
    let due = task
      .deadline_at()
      .map(|d| format!("{} ({})", d.format("%Y-%m-%d"), badge(views::urgency(d, now))))
      .unwrap_or_default();
    println!("  [{:<11}] {:<40} {:<16} {}", task.status, task.title, assignee, due);
  }
}

fn badge(urgency: Urgency) -> &'static str {
  match urgency {
    Urgency::Overdue => "overdue",
    Urgency::Today => "today",
    Urgency::Tomorrow => "tomorrow",
    Urgency::Later => "upcoming",
  }
}

fn print_actions(signal: &ConnectivitySignal) {
  if !signal.actions_enabled() {
    println!("\nOffline: creating and editing are disabled until the connection returns");
  }
}

fn status(
  signal: &ConnectivitySignal,
  session: Option<&Session>,
  worker: &ServiceWorker,
  config: &Config,
) -> Result<()> {
  println!(
    "Connectivity: {}",
    if signal.is_online() { "online" } else { "offline" }
  );
  match session {
    Some(session) => println!(
      "Signed in:    {}",
      session.user.email.as_deref().unwrap_or(&session.user.id)
    ),
    None => println!("Signed in:    no"),
  }
  println!("Cache:        {}", config.worker.cache_name);
  println!("Generations:  {}", worker.generations()?.join(", "));
  Ok(())
}

async fn worker_command(command: WorkerCommand, worker: &ServiceWorker) -> Result<()> {
  match command {
    WorkerCommand::Install => {
      worker.install().await?;
      println!("Installed {}", worker.generation());
    }
    WorkerCommand::Activate => {
      let deleted = worker.activate()?;
      if deleted.is_empty() {
        println!("Activated; no old generations");
      } else {
        println!("Activated; deleted {}", deleted.join(", "));
      }
    }
    WorkerCommand::Fetch {
      path,
      navigate,
      method,
    } => {
      if let Err(e) = worker.start().await {
        warn!(error = %e, "worker not installed, requests pass through");
      }

      let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;
      let mut request = WorkerRequest::get(worker.resolve(&path)?).with_method(method);
      if navigate {
        request.mode = RequestMode::Navigate;
      }

      let (response, source) = worker.respond(request).await?;
      let source = match source {
        ResponseSource::Cache => "cache",
        ResponseSource::Network => "network",
        ResponseSource::OfflineDocument => "offline document",
      };
      println!("{} from {} ({} bytes)", response.status, source, response.body.len());
    }
    WorkerCommand::Precache { urls } => {
      worker.start().await?;
      print_report(worker.precache(&urls).await);
    }
    WorkerCommand::Post { message } => {
      let Some(message) = WorkerMessage::from_json(&message) else {
        println!("Ignored: not a message the worker understands");
        return Ok(());
      };
      worker.start().await?;
      print_report(worker.handle_message(message).await);
    }
  }
  Ok(())
}

fn print_report(report: PrecacheReport) {
  println!("Stored {}, failed {}", report.stored, report.failed.len());
  for url in report.failed {
    println!("  failed: {}", url);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_worker_commands_run_without_backend_key() {
    std::env::remove_var("HACKNOTIFY_ANON_KEY");
    std::env::remove_var("SUPABASE_ANON_KEY");

    let config = Config::parse(
      "backend:\n  url: https://db.example.com\napp:\n  origin: https://app.example.com\n",
    )
    .unwrap();
    let data_dir = std::env::temp_dir().join(format!("hacknotify-cli-test-{}", std::process::id()));

    let activate = Command::Worker {
      command: WorkerCommand::Activate,
    };
    run(activate, &config, &data_dir, LocalCache::new(NoopStorage))
      .await
      .unwrap();

    // Backend commands still report the missing key
    let status = run(Command::Status, &config, &data_dir, LocalCache::new(NoopStorage)).await;
    assert!(status.is_err());
  }
}
