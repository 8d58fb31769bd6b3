/// Repository behaviour on both backends
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use habit_sync::*;

use crate::support::{date, identities, local_store, repository, FlakyStore};

#[cfg(test)]
mod repository_integration_tests {
    use super::*;

    async fn log(repo: &HabitRepository, identity: &Identity, habit_id: &HabitId, day: &str) -> Habit {
        match repo.log_completion(identity, habit_id, date(day), None).await.unwrap() {
            Completion::Logged { habit, .. } => habit,
            Completion::Unlogged { .. } => panic!("{} was already logged", day),
        }
    }

    #[tokio::test]
    async fn test_streak_scenario_on_both_backends() {
        let repo = repository();

        for identity in identities() {
            let habit = repo
                .create_habit(&identity, NewHabit::daily("📚", date("2024-01-01")))
                .await
                .unwrap();
            assert_eq!(habit.current_streak, 0);

            log(&repo, &identity, &habit.id, "2024-01-01").await;
            log(&repo, &identity, &habit.id, "2024-01-02").await;
            let after_three = log(&repo, &identity, &habit.id, "2024-01-03").await;
            assert_eq!((after_three.current_streak, after_three.longest_streak), (3, 3));

            // 01-04 skipped: the grace day holds
            let after_grace = log(&repo, &identity, &habit.id, "2024-01-05").await;
            assert_eq!(after_grace.current_streak, 4);

            // 01-06 and 01-07 skipped: starts over
            let after_reset = log(&repo, &identity, &habit.id, "2024-01-08").await;
            assert_eq!(after_reset.current_streak, 1);
            assert_eq!(after_reset.longest_streak, 4);

            let stored = repo.get_habit(&identity, &habit.id).await.unwrap();
            assert_eq!(stored, after_reset);
            assert_eq!(repo.list_logs(&identity, &habit.id, None).await.unwrap().len(), 5);
        }
    }

    #[tokio::test]
    async fn test_unlog_then_log_is_idempotent() {
        let repo = repository();

        for identity in identities() {
            let habit = repo
                .create_habit(&identity, NewHabit::daily("🧘", date("2024-03-01")))
                .await
                .unwrap();
            for day in ["2024-03-01", "2024-03-02", "2024-03-04", "2024-03-05"] {
                log(&repo, &identity, &habit.id, day).await;
            }

            let before = repo.get_habit(&identity, &habit.id).await.unwrap();
            for day in ["2024-03-05", "2024-03-02"] {
                repo.unlog_completion(&identity, &habit.id, date(day)).await.unwrap();
                let after = log(&repo, &identity, &habit.id, day).await;

                assert_eq!(after.current_streak, before.current_streak);
                assert_eq!(after.longest_streak, before.longest_streak);
                assert_eq!(after.last_check_date, before.last_check_date);
            }
        }
    }

    #[tokio::test]
    async fn test_longest_streak_survives_unlogs() {
        let repo = repository();

        for identity in identities() {
            let habit = repo
                .create_habit(&identity, NewHabit::daily("💧", date("2024-01-01")))
                .await
                .unwrap();
            for day in ["2024-01-01", "2024-01-02", "2024-01-03"] {
                log(&repo, &identity, &habit.id, day).await;
            }

            let mut longest = 3;
            for day in ["2024-01-03", "2024-01-02", "2024-01-01"] {
                let habit = repo.unlog_completion(&identity, &habit.id, date(day)).await.unwrap();
                assert!(habit.longest_streak >= longest);
                longest = habit.longest_streak;
            }

            let emptied = repo.get_habit(&identity, &habit.id).await.unwrap();
            assert_eq!(emptied.current_streak, 0);
            assert_eq!(emptied.longest_streak, 3);
            assert_eq!(emptied.last_check_date, None);
        }
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let repo = repository();
        let alice = Identity::Authenticated("user_alice".to_string());
        let bob = Identity::Authenticated("user_bob".to_string());
        let anon_a = Identity::Anonymous("anon_1_aaaaaaaaa".to_string());
        let anon_b = Identity::Anonymous("anon_2_bbbbbbbbb".to_string());

        for (owner, other) in [(&alice, &bob), (&anon_a, &anon_b)] {
            let habit = repo
                .create_habit(owner, NewHabit::daily("🎸", date("2024-01-01")))
                .await
                .unwrap();
            let todo = repo.create_todo(owner, NewTodo::open("Tune guitar")).await.unwrap();

            assert!(repo.list_habits(other).await.unwrap().is_empty());
            assert!(repo.list_todos(other).await.unwrap().is_empty());

            let err = repo
                .log_completion(other, &habit.id, date("2024-01-01"), None)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                RepositoryError::Storage(StorageError::PermissionDenied { .. } | StorageError::HabitNotFound { .. })
            ));
            assert!(repo.delete_todo(other, &todo.id).await.is_err());
            assert!(repo.delete_habit(other, &habit.id).await.is_err());

            // Owner's rows are untouched
            assert_eq!(repo.list_habits(owner).await.unwrap().len(), 1);
            assert_eq!(repo.list_todos(owner).await.unwrap().len(), 1);
            assert!(repo.list_logs(owner, &habit.id, None).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_remote_ownership_errors_are_distinguishable() {
        let repo = repository();
        let alice = Identity::Authenticated("user_alice".to_string());
        let bob = Identity::Authenticated("user_bob".to_string());
        let nobody = Identity::Authenticated(String::new());

        let habit = repo
            .create_habit(&alice, NewHabit::daily("🏊", date("2024-01-01")))
            .await
            .unwrap();

        let err = repo.get_habit(&bob, &habit.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Storage(StorageError::PermissionDenied { .. })));

        let err = repo.get_habit(&alice, &HabitId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Storage(StorageError::HabitNotFound { .. })));

        let err = repo.list_habits(&nobody).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Storage(StorageError::NotAuthenticated)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_habit_cascades_logs() {
        let repo = repository();

        for identity in identities() {
            let habit = repo
                .create_habit(&identity, NewHabit::daily("🌱", date("2024-01-01")))
                .await
                .unwrap();
            log(&repo, &identity, &habit.id, "2024-01-01").await;
            log(&repo, &identity, &habit.id, "2024-01-02").await;

            repo.delete_habit(&identity, &habit.id).await.unwrap();

            assert!(repo.list_habits(&identity).await.unwrap().is_empty());
            let err = repo.list_logs(&identity, &habit.id, None).await.unwrap_err();
            assert!(matches!(err, RepositoryError::Storage(StorageError::HabitNotFound { .. })));
        }
    }

    #[tokio::test]
    async fn test_log_range_and_notes() {
        let repo = repository();

        for identity in identities() {
            let habit = repo
                .create_habit(&identity, NewHabit::daily("✍️", date("2024-01-01")))
                .await
                .unwrap();
            for day in ["2024-01-01", "2024-01-02", "2024-01-10"] {
                log(&repo, &identity, &habit.id, day).await;
            }
            repo.log_completion(&identity, &habit.id, date("2024-01-11"), Some("two pages".to_string()))
                .await
                .unwrap();

            let range = DateRange::new(date("2024-01-02"), date("2024-01-10")).unwrap();
            let logs = repo.list_logs(&identity, &habit.id, Some(range)).await.unwrap();
            let days: Vec<NaiveDate> = logs.iter().map(|l| l.log_date).collect();
            assert_eq!(days, vec![date("2024-01-02"), date("2024-01-10")]);

            let all = repo.list_logs(&identity, &habit.id, None).await.unwrap();
            assert_eq!(all.last().unwrap().note.as_deref(), Some("two pages"));
        }
    }

    #[tokio::test]
    async fn test_failed_habit_update_rolls_back_log() {
        let (_, local) = local_store();
        let remote = Arc::new(FlakyStore::new());
        let repo = HabitRepository::new(local, remote.clone());
        let user = Identity::Authenticated("user_alice".to_string());

        let habit = repo
            .create_habit(&user, NewHabit::daily("🏋️", date("2024-01-01")))
            .await
            .unwrap();
        log(&repo, &user, &habit.id, "2024-01-01").await;

        remote.fail_habit_updates.store(true, Ordering::SeqCst);
        let err = repo
            .log_completion(&user, &habit.id, date("2024-01-02"), None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let logs = repo.list_logs(&user, &habit.id, None).await.unwrap();
        assert_eq!(logs.len(), 1);
        let stored = repo.get_habit(&user, &habit.id).await.unwrap();
        assert_eq!(stored.current_streak, 1);

        // Unlog failures restore the removed log as well
        assert!(repo.unlog_completion(&user, &habit.id, date("2024-01-01")).await.is_err());
        assert_eq!(repo.list_logs(&user, &habit.id, None).await.unwrap().len(), 1);

        remote.fail_habit_updates.store(false, Ordering::SeqCst);
        let retried = log(&repo, &user, &habit.id, "2024-01-02").await;
        assert_eq!(retried.current_streak, 2);
    }

    #[tokio::test]
    async fn test_concurrent_logs_converge_after_repair() {
        let repo = repository();

        for identity in identities() {
            let reading = repo
                .create_habit(&identity, NewHabit::daily("📖", date("2024-01-01")))
                .await
                .unwrap();
            let running = repo
                .create_habit(&identity, NewHabit::daily("🏃", date("2024-01-01")))
                .await
                .unwrap();

            // Different habits: both writes land
            let (a, b) = futures::join!(
                repo.log_completion(&identity, &reading.id, date("2024-01-01"), None),
                repo.log_completion(&identity, &running.id, date("2024-01-01"), None),
            );
            assert!(matches!(a.unwrap(), Completion::Logged { .. }));
            assert!(matches!(b.unwrap(), Completion::Logged { .. }));

            // Same habit, different days: last write wins until a recompute
            let (a, b) = futures::join!(
                repo.log_completion(&identity, &reading.id, date("2024-01-02"), None),
                repo.log_completion(&identity, &reading.id, date("2024-01-03"), None),
            );
            a.unwrap();
            b.unwrap();

            repo.repair_streaks(&identity).await.unwrap();
            let reading = repo.get_habit(&identity, &reading.id).await.unwrap();
            assert_eq!(reading.current_streak, 3);
            assert_eq!(reading.last_check_date, Some(date("2024-01-03")));
        }
    }

    #[tokio::test]
    async fn test_todo_and_timer_operations() {
        let repo = repository();

        for identity in identities() {
            let todo = repo.create_todo(&identity, NewTodo::open("Buy milk")).await.unwrap();
            let done = repo.set_todo_completed(&identity, &todo.id, true).await.unwrap();
            assert!(done.is_completed);
            assert!(done.completed_at.is_some());

            let reopened = repo.set_todo_completed(&identity, &todo.id, false).await.unwrap();
            assert!(reopened.completed_at.is_none());

            let habit = repo
                .create_habit(&identity, NewHabit::daily("🎹", date("2024-01-01")))
                .await
                .unwrap();
            let session = repo
                .record_timer_session(
                    &identity,
                    NewTimerSession {
                        habit_id: Some(habit.id.clone()),
                        started_at: chrono::Utc::now(),
                        duration_seconds: 25 * 60,
                        completed: true,
                    },
                )
                .await
                .unwrap();
            assert_eq!(session.owner_id, identity.id());

            let usage = repo.usage(&identity).await.unwrap();
            assert_eq!(
                usage,
                Usage {
                    habits: 1,
                    todos: 1,
                    timer_sessions: 1
                }
            );

            repo.delete_todo(&identity, &todo.id).await.unwrap();
            let err = repo.delete_todo(&identity, &todo.id).await.unwrap_err();
            assert!(matches!(err, RepositoryError::Storage(StorageError::TodoNotFound { .. })));
        }
    }
}
