/// Domain validation, identity shape and local record repair
use chrono::NaiveDate;
use habit_sync::domain::repair::{repair_all, repair_habit, repair_log, repair_todo};
use habit_sync::*;
use serde_json::json;

#[cfg(test)]
mod domain_unit_tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_anonymous_identity_shape() {
        let identity = Identity::new_anonymous();
        assert!(identity.is_anonymous());
        assert_eq!(identity.kind(), IdentityKind::Anonymous);

        let parts: Vec<&str> = identity.id().splitn(3, '_').collect();
        assert_eq!(parts[0], "anon");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);

        assert_ne!(Identity::new_anonymous(), identity);
    }

    #[test]
    fn test_identity_wire_format() {
        let identity = Identity::Authenticated("user_1".to_string());
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json, json!({"kind": "authenticated", "id": "user_1"}));

        let back: Identity = serde_json::from_value(json!({"kind": "anonymous", "id": "anon_1_x"})).unwrap();
        assert_eq!(back, Identity::Anonymous("anon_1_x".to_string()));
    }

    #[test]
    fn test_new_habit_starts_with_zero_streak() {
        let habit = Habit::new("owner", NewHabit::daily("  🏃  ", date("2024-01-01"))).unwrap();
        assert_eq!(habit.emoji, "🏃");
        assert_eq!(habit.current_streak, 0);
        assert_eq!(habit.longest_streak, 0);
        assert_eq!(habit.last_check_date, None);
        assert_eq!(habit.frequency, Frequency::Daily);

        let err = Habit::new("owner", NewHabit::daily("   ", date("2024-01-01"))).unwrap_err();
        assert!(matches!(err, DomainError::InvalidEmoji(_)));
    }

    #[test]
    fn test_todo_completion_stamps() {
        let mut todo = Todo::new("owner", NewTodo::open("Water plants")).unwrap();
        assert!(todo.completed_at.is_none());

        assert!(todo.set_completed(true));
        assert!(todo.completed_at.is_some());
        assert!(!todo.set_completed(true));

        assert!(todo.set_completed(false));
        assert!(todo.completed_at.is_none());

        assert!(Todo::new("owner", NewTodo::open("")).is_err());
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::new(date("2024-01-02"), date("2024-01-01")).is_err());
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();
        assert!(range.contains(date("2024-01-31")));
        assert!(!range.contains(date("2024-02-01")));
        assert!(parse_date("01/02/2024").is_err());
    }

    #[test]
    fn test_repair_habit_records() {
        let records = vec![
            json!({
                "id": "h1",
                "owner_id": "someone_else",
                "emoji": "📚",
                "start_date": "not a date",
                "current_streak": -4,
                "longest_streak": 2,
                "created_at": "2024-01-01T08:00:00Z"
            }),
            json!({"id": "h2", "emoji": "  "}),
            json!("not an object"),
        ];

        let (habits, report) = repair_all(records, "Habit", |raw| repair_habit(raw, "anon_1"));

        assert_eq!(habits.len(), 1);
        let habit = &habits[0];
        assert_eq!(habit.owner_id, "anon_1");
        assert_eq!(habit.start_date, date("2024-01-01"));
        assert_eq!(habit.current_streak, 0);
        assert_eq!(habit.longest_streak, 2);

        assert_eq!(report.dropped.len(), 2);
        assert!(!report.repaired.is_empty());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_repair_todo_and_log_records() {
        let (todos, report) = repair_all(
            vec![json!({"content": "Call mom", "is_completed": "yes"})],
            "Todo",
            |raw| repair_todo(raw, "anon_1"),
        );
        assert_eq!(todos.len(), 1);
        assert!(!todos[0].is_completed);
        assert!(todos[0].completed_at.is_none());
        assert!(!report.repaired.is_empty());

        let (logs, report) = repair_all(
            vec![
                json!({"habit_id": "h1", "log_date": "2024-01-03"}),
                json!({"habit_id": "h1", "log_date": "yesterday"}),
            ],
            "Habit log",
            |raw| repair_log(raw, "anon_1"),
        );
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_date, date("2024-01-03"));
        assert_eq!(report.dropped.len(), 1);
    }
}
