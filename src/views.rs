//! Derived views over the last rendered collections.
//!
//! Everything here is a pure function of the collection and the instant
//! passed in; none of it fetches or caches.

use chrono::{DateTime, Duration, Utc};

use crate::backend::{Hackathon, Task};

/// Horizon of the "urgent deadlines" view.
pub const URGENT_WINDOW_DAYS: i64 = 7;
const URGENT_LIMIT: usize = 3;
const PENDING_LIMIT: usize = 5;

fn deadlines(h: &Hackathon) -> impl Iterator<Item = DateTime<Utc>> {
  [h.reg_deadline_at(), h.submission_deadline_at()]
    .into_iter()
    .flatten()
}

/// Hackathons with any deadline still ahead.
pub fn upcoming_deadlines(hackathons: &[Hackathon], now: DateTime<Utc>) -> Vec<&Hackathon> {
  hackathons
    .iter()
    .filter(|h| deadlines(h).any(|d| d > now))
    .collect()
}

/// First few hackathons with a deadline in `(now, now + 7 days]`.
pub fn urgent_deadlines(hackathons: &[Hackathon], now: DateTime<Utc>) -> Vec<&Hackathon> {
  let horizon = now + Duration::days(URGENT_WINDOW_DAYS);
  hackathons
    .iter()
    .filter(|h| deadlines(h).any(|d| d > now && d <= horizon))
    .take(URGENT_LIMIT)
    .collect()
}

/// Open tasks assigned to `user_id`.
pub fn my_tasks<'a>(tasks: &'a [Task], user_id: &str) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|t| t.assigned_to.as_deref() == Some(user_id) && !t.is_done())
    .collect()
}

/// The first few of [`my_tasks`].
pub fn pending_tasks<'a>(tasks: &'a [Task], user_id: &str) -> Vec<&'a Task> {
  let mut mine = my_tasks(tasks, user_id);
  mine.truncate(PENDING_LIMIT);
  mine
}

/// Open tasks whose deadline has passed.
pub fn overdue_tasks(tasks: &[Task], now: DateTime<Utc>) -> Vec<&Task> {
  tasks
    .iter()
    .filter(|t| !t.is_done() && t.deadline_at().is_some_and(|d| d < now))
    .collect()
}

pub fn completed_tasks(tasks: &[Task]) -> Vec<&Task> {
  tasks.iter().filter(|t| t.is_done()).collect()
}

/// Open tasks with a deadline in `(now, now + days]`.
pub fn tasks_due_within(tasks: &[Task], now: DateTime<Utc>, days: i64) -> Vec<&Task> {
  let horizon = now + Duration::days(days);
  tasks
    .iter()
    .filter(|t| !t.is_done() && t.deadline_at().is_some_and(|d| d > now && d <= horizon))
    .collect()
}

/// Badge for a single deadline, by UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
  Overdue,
  Today,
  Tomorrow,
  Later,
}

pub fn urgency(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Urgency {
  if deadline < now {
    return Urgency::Overdue;
  }
  let today = now.date_naive();
  let day = deadline.date_naive();
  if day == today {
    Urgency::Today
  } else if today.succ_opt() == Some(day) {
    Urgency::Tomorrow
  } else {
    Urgency::Later
  }
}

/// Which reminder, if any, is due for a deadline at `now`.
///
/// Returns `Some(7)`, `Some(3)` or `Some(1)` when the whole number of days
/// left is exactly that, and `Some(0)` when the deadline is at most twelve
/// hours away. Reminders are computed on elapsed time, not calendar days.
pub fn reminder_window(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
  let left = deadline - now;
  if left < Duration::zero() {
    return None;
  }

  if left <= Duration::hours(12) {
    return Some(0);
  }

  match left.num_days() {
    days @ (7 | 3 | 1) => Some(days),
    _ => None,
  }
}

/// What a reminder is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
  Registration,
  Submission,
  Task,
}

/// A deadline whose reminder is due at the given instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Reminder<'a> {
  pub kind: ReminderKind,
  pub title: &'a str,
  pub deadline: DateTime<Utc>,
  /// Value of [`reminder_window`] for this deadline
  pub days: i64,
}

/// Reminders due at `now` for hackathon deadlines and the user's open tasks.
pub fn due_reminders<'a>(
  hackathons: &'a [Hackathon],
  tasks: &'a [Task],
  user_id: &str,
  now: DateTime<Utc>,
) -> Vec<Reminder<'a>> {
  let hackathon_deadlines = hackathons.iter().flat_map(|h| {
    [
      (ReminderKind::Registration, h.title.as_str(), h.reg_deadline_at()),
      (ReminderKind::Submission, h.title.as_str(), h.submission_deadline_at()),
    ]
  });
  let task_deadlines = my_tasks(tasks, user_id)
    .into_iter()
    .map(|t| (ReminderKind::Task, t.title.as_str(), t.deadline_at()));

  hackathon_deadlines
    .chain(task_deadlines)
    .filter_map(|(kind, title, deadline)| {
      let deadline = deadline?;
      let days = reminder_window(deadline, now)?;
      Some(Reminder {
        kind,
        title,
        deadline,
        days,
      })
    })
    .collect()
}

/// Everything the dashboard shows besides the raw lists.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary<'a> {
  pub hackathon_count: usize,
  pub upcoming: Vec<&'a Hackathon>,
  pub urgent: Vec<&'a Hackathon>,
  pub my_tasks: Vec<&'a Task>,
  pub pending: Vec<&'a Task>,
  pub overdue: Vec<&'a Task>,
  pub completed: Vec<&'a Task>,
}

impl<'a> DashboardSummary<'a> {
  pub fn compute(
    hackathons: &'a [Hackathon],
    tasks: &'a [Task],
    user_id: &str,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      hackathon_count: hackathons.len(),
      upcoming: upcoming_deadlines(hackathons, now),
      urgent: urgent_deadlines(hackathons, now),
      my_tasks: my_tasks(tasks, user_id),
      pending: pending_tasks(tasks, user_id),
      overdue: overdue_tasks(tasks, now),
      completed: completed_tasks(tasks),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
  }

  fn hackathon(id: &str, submission: Option<DateTime<Utc>>) -> Hackathon {
    Hackathon {
      id: id.to_string(),
      submission_deadline: submission.map(|d| d.to_rfc3339()),
      ..Default::default()
    }
  }

  fn task(id: &str, status: &str, assigned_to: Option<&str>, deadline: Option<DateTime<Utc>>) -> Task {
    Task {
      id: id.to_string(),
      status: status.to_string(),
      assigned_to: assigned_to.map(String::from),
      deadline: deadline.map(|d| d.to_rfc3339()),
      ..Default::default()
    }
  }

  #[test]
  fn test_urgent_window_bounds() {
    let list = vec![
      hackathon("past", Some(now() - Duration::hours(1))),
      hackathon("two-days", Some(now() + Duration::days(2))),
      hackathon("edge", Some(now() + Duration::days(7))),
      hackathon("far", Some(now() + Duration::days(8))),
      hackathon("none", None),
    ];

    let ids: Vec<&str> = urgent_deadlines(&list, now()).iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["two-days", "edge"]);

    let upcoming: Vec<&str> = upcoming_deadlines(&list, now())
      .iter()
      .map(|h| h.id.as_str())
      .collect();
    assert_eq!(upcoming, vec!["two-days", "edge", "far"]);
  }

  #[test]
  fn test_urgent_considers_registration_deadline() {
    let mut h = hackathon("reg", Some(now() + Duration::days(30)));
    h.reg_deadline = Some((now() + Duration::days(1)).to_rfc3339());
    let list = vec![h];
    assert_eq!(urgent_deadlines(&list, now()).len(), 1);
  }

  #[test]
  fn test_urgent_is_capped() {
    let list: Vec<Hackathon> = (0..5)
      .map(|i| hackathon(&format!("h{}", i), Some(now() + Duration::days(1))))
      .collect();
    assert_eq!(urgent_deadlines(&list, now()).len(), 3);
  }

  #[test]
  fn test_task_views() {
    let tasks = vec![
      task("mine-open", "todo", Some("me"), Some(now() - Duration::days(1))),
      task("mine-done", "done", Some("me"), Some(now() - Duration::days(1))),
      task("theirs", "in_progress", Some("you"), Some(now() + Duration::days(2))),
      task("unassigned", "todo", None, None),
    ];

    let ids = |v: Vec<&Task>| v.into_iter().map(|t| t.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(my_tasks(&tasks, "me")), vec!["mine-open"]);
    assert_eq!(ids(overdue_tasks(&tasks, now())), vec!["mine-open"]);
    assert_eq!(ids(completed_tasks(&tasks)), vec!["mine-done"]);
    assert_eq!(ids(tasks_due_within(&tasks, now(), 3)), vec!["theirs"]);
  }

  #[test]
  fn test_pending_is_capped() {
    let tasks: Vec<Task> = (0..8)
      .map(|i| task(&format!("t{}", i), "todo", Some("me"), None))
      .collect();
    assert_eq!(pending_tasks(&tasks, "me").len(), 5);
  }

  #[test]
  fn test_urgency_badges() {
    assert_eq!(urgency(now() - Duration::minutes(1), now()), Urgency::Overdue);
    assert_eq!(urgency(now() + Duration::hours(3), now()), Urgency::Today);
    assert_eq!(urgency(now() + Duration::hours(20), now()), Urgency::Tomorrow);
    assert_eq!(urgency(now() + Duration::days(3), now()), Urgency::Later);
  }

  #[test]
  fn test_reminder_window_edges() {
    let at = |d: Duration| reminder_window(now() + d, now());

    assert_eq!(at(Duration::hours(-1)), None);
    assert_eq!(at(Duration::zero()), Some(0));
    assert_eq!(at(Duration::hours(12)), Some(0));
    assert_eq!(at(Duration::hours(13)), None);
    assert_eq!(at(Duration::hours(24)), Some(1));
    assert_eq!(at(Duration::hours(47)), Some(1));
    assert_eq!(at(Duration::hours(48)), None);
    assert_eq!(at(Duration::days(3) + Duration::hours(5)), Some(3));
    assert_eq!(at(Duration::days(7)), Some(7));
    assert_eq!(at(Duration::days(8)), None);
  }

  #[test]
  fn test_due_reminders() {
    let mut h = hackathon("h", Some(now() + Duration::days(3) + Duration::hours(2)));
    h.title = "Spring Jam".to_string();
    h.reg_deadline = Some((now() + Duration::days(5)).to_rfc3339());
    let hackathons = vec![h];

    let mut tasks = vec![
      task("soon", "todo", Some("me"), Some(now() + Duration::hours(6))),
      task("done", "done", Some("me"), Some(now() + Duration::hours(6))),
      task("theirs", "todo", Some("you"), Some(now() + Duration::hours(6))),
    ];
    tasks[0].title = "Record demo".to_string();

    let due = due_reminders(&hackathons, &tasks, "me", now());
    let summary: Vec<_> = due.iter().map(|r| (r.kind, r.title, r.days)).collect();
    assert_eq!(
      summary,
      vec![
        (ReminderKind::Submission, "Spring Jam", 3),
        (ReminderKind::Task, "Record demo", 0),
      ]
    );
  }

  #[test]
  fn test_dashboard_summary() {
    let hackathons = vec![hackathon("soon", Some(now() + Duration::days(2)))];
    let tasks = vec![task("a", "todo", Some("me"), None)];

    let summary = DashboardSummary::compute(&hackathons, &tasks, "me", now());
    assert_eq!(summary.hackathon_count, 1);
    assert_eq!(summary.urgent.len(), 1);
    assert_eq!(summary.pending.len(), 1);
    assert!(summary.overdue.is_empty());
  }
}
