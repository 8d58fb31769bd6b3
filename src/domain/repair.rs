/// Validation and repair of raw device records
///
/// Records read back from device storage may have been written by older
/// clients or been partially corrupted. Each `repair_*` function takes one
/// raw JSON record and either returns a well-formed entity, listing what it
/// had to fix, or rejects the record with a reason when it cannot be saved
/// (no emoji, no content, no log date...).

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::domain::{Habit, HabitLog, HabitId, Todo, TimerSession, TimerSessionId, TodoId};

/// What happened while repairing a batch of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    /// Records that were kept after fixing one or more fields
    pub repaired: Vec<String>,
    /// Records that could not be kept, with the reason
    pub dropped: Vec<String>,
    /// The dropped records as they were read, so a rewrite can keep them
    pub rejected: Vec<Value>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty() && self.dropped.is_empty()
    }
}

/// Outcome for a single record
type Repair<T> = Result<(T, Vec<String>), String>;

/// Repair every record of a batch, dropping the ones that cannot be saved
pub fn repair_all<T, F>(records: Vec<Value>, label: &str, mut repair: F) -> (Vec<T>, RepairReport)
where
    F: FnMut(Value) -> Repair<T>,
{
    let mut kept = Vec::with_capacity(records.len());
    let mut report = RepairReport::default();

    for (index, record) in records.into_iter().enumerate() {
        match repair(record.clone()) {
            Ok((value, fixes)) => {
                if !fixes.is_empty() {
                    report
                        .repaired
                        .push(format!("{} #{}: {}", label, index + 1, fixes.join(", ")));
                }
                kept.push(value);
            }
            Err(reason) => {
                report.dropped.push(format!("{} #{}: {}", label, index + 1, reason));
                report.rejected.push(record);
            }
        }
    }

    (kept, report)
}

/// Repair one habit record belonging to `owner_id`
pub fn repair_habit(raw: Value, owner_id: &str) -> Repair<Habit> {
    let mut record = into_object(raw)?;
    let mut fixes = Vec::new();

    let emoji = non_empty_string(&record, "emoji").ok_or("missing emoji")?;
    let emoji = Habit::validate_emoji(&emoji).map_err(|e| e.to_string())?;
    record.insert("emoji".into(), Value::String(emoji));

    ensure_id(&mut record, &mut fixes, || HabitId::new().to_string());
    ensure_owner(&mut record, owner_id, &mut fixes);
    let created_at = ensure_created_at(&mut record, &mut fixes);

    if date_field(&record, "start_date").is_none() {
        record.insert(
            "start_date".into(),
            Value::String(created_at.date_naive().to_string()),
        );
        fixes.push("start_date reset to creation day".to_string());
    }

    if let Some(value) = record.get("frequency") {
        if serde_json::from_value::<crate::domain::Frequency>(value.clone()).is_err() {
            record.remove("frequency");
            fixes.push("unknown frequency reset to daily".to_string());
        }
    }

    let current = counter(&record, "current_streak", &mut fixes);
    let mut longest = counter(&record, "longest_streak", &mut fixes);
    if longest < current {
        longest = current;
        fixes.push("longest_streak raised to current_streak".to_string());
    }
    record.insert("current_streak".into(), Value::from(current));
    record.insert("longest_streak".into(), Value::from(longest));

    if record.get("last_check_date").is_some_and(|v| !v.is_null())
        && date_field(&record, "last_check_date").is_none()
    {
        record.insert("last_check_date".into(), Value::Null);
        fixes.push("unreadable last_check_date cleared".to_string());
    }

    finish(record, fixes)
}

/// Repair one todo record belonging to `owner_id`
pub fn repair_todo(raw: Value, owner_id: &str) -> Repair<Todo> {
    let mut record = into_object(raw)?;
    let mut fixes = Vec::new();

    let content = non_empty_string(&record, "content").ok_or("missing content")?;
    let content = Todo::validate_content(&content).map_err(|e| e.to_string())?;
    record.insert("content".into(), Value::String(content));

    ensure_id(&mut record, &mut fixes, || TodoId::new().to_string());
    ensure_owner(&mut record, owner_id, &mut fixes);
    let created_at = ensure_created_at(&mut record, &mut fixes);

    let completed = match record.get("is_completed") {
        Some(Value::Bool(b)) => *b,
        None | Some(Value::Null) => false,
        Some(_) => {
            fixes.push("is_completed coerced to false".to_string());
            false
        }
    };
    record.insert("is_completed".into(), Value::Bool(completed));

    let has_stamp = timestamp_field(&record, "completed_at").is_some();
    if completed && !has_stamp {
        record.insert("completed_at".into(), Value::String(created_at.to_rfc3339()));
        fixes.push("completed_at stamped".to_string());
    } else if !completed && record.get("completed_at").is_some_and(|v| !v.is_null()) {
        record.insert("completed_at".into(), Value::Null);
        fixes.push("completed_at cleared on open todo".to_string());
    }

    finish(record, fixes)
}

/// Repair one habit log record belonging to `owner_id`
pub fn repair_log(raw: Value, owner_id: &str) -> Repair<HabitLog> {
    let mut record = into_object(raw)?;
    let mut fixes = Vec::new();

    non_empty_string(&record, "habit_id").ok_or("missing habit_id")?;
    date_field(&record, "log_date").ok_or("missing or unreadable log_date")?;

    ensure_owner(&mut record, owner_id, &mut fixes);
    ensure_created_at(&mut record, &mut fixes);

    finish(record, fixes)
}

/// Repair one timer session record belonging to `owner_id`
pub fn repair_timer_session(raw: Value, owner_id: &str) -> Repair<TimerSession> {
    let mut record = into_object(raw)?;
    let mut fixes = Vec::new();

    let duration = record
        .get("duration_seconds")
        .and_then(Value::as_u64)
        .and_then(|d| u32::try_from(d).ok())
        .ok_or("missing duration_seconds")?;
    TimerSession::validate_duration(duration).map_err(|e| e.to_string())?;
    timestamp_field(&record, "started_at").ok_or("missing or unreadable started_at")?;

    ensure_id(&mut record, &mut fixes, || TimerSessionId::new().to_string());
    ensure_owner(&mut record, owner_id, &mut fixes);

    finish(record, fixes)
}

/// Keep only the first log per `(habit_id, log_date)`
///
/// The duplicates carry nothing the kept log lacks, so they count as repairs.
pub fn dedupe_logs(logs: Vec<HabitLog>, report: &mut RepairReport) -> Vec<HabitLog> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(logs.len());
    for log in logs {
        if seen.insert((log.habit_id.clone(), log.log_date)) {
            kept.push(log);
        } else {
            report.repaired.push(format!(
                "duplicate log for habit {} on {} removed",
                log.habit_id, log.log_date
            ));
        }
    }
    kept
}

// Field helpers

fn into_object(raw: Value) -> Result<Map<String, Value>, String> {
    match raw {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected an object, found {}", type_name(&other))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn non_empty_string(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn date_field(record: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn timestamp_field(record: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn ensure_id(record: &mut Map<String, Value>, fixes: &mut Vec<String>, generate: impl FnOnce() -> String) {
    if non_empty_string(record, "id").is_none() {
        record.insert("id".into(), Value::String(generate()));
        fixes.push("id generated".to_string());
    }
}

fn ensure_owner(record: &mut Map<String, Value>, owner_id: &str, fixes: &mut Vec<String>) {
    if record.get("owner_id").and_then(Value::as_str) != Some(owner_id) {
        record.insert("owner_id".into(), Value::String(owner_id.to_string()));
        fixes.push("owner_id realigned".to_string());
    }
}

fn ensure_created_at(record: &mut Map<String, Value>, fixes: &mut Vec<String>) -> DateTime<Utc> {
    match timestamp_field(record, "created_at") {
        Some(ts) => ts,
        None => {
            let now = Utc::now();
            record.insert("created_at".into(), Value::String(now.to_rfc3339()));
            fixes.push("created_at stamped".to_string());
            now
        }
    }
}

/// Non-negative integer counter; anything else becomes 0
fn counter(record: &Map<String, Value>, key: &str, fixes: &mut Vec<String>) -> u32 {
    match record.get(key) {
        None | Some(Value::Null) => 0,
        Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => n,
            None => {
                fixes.push(format!("{} reset to 0", key));
                0
            }
        },
    }
}

fn finish<T: DeserializeOwned>(record: Map<String, Value>, fixes: Vec<String>) -> Repair<T> {
    serde_json::from_value(Value::Object(record))
        .map(|value| (value, fixes))
        .map_err(|e| format!("unreadable record: {}", e))
}
