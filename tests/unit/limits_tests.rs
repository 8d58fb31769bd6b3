/// Feature limit table and tier resolution
use habit_sync::*;

#[cfg(test)]
mod limit_policy_tests {
    use super::*;

    #[test]
    fn test_limit_table() {
        let anonymous = FeatureLimitPolicy::limits(Some(IdentityKind::Anonymous), false);
        assert_eq!(anonymous.max_habits, Some(3));
        assert_eq!(anonymous.max_todos, Some(3));
        assert_eq!(anonymous.max_timer_sessions, Some(10));
        assert!(!anonymous.can_sync);
        assert!(anonymous.can_export);

        let free = FeatureLimitPolicy::limits(Some(IdentityKind::Authenticated), false);
        assert_eq!(free.max_habits, Some(3));
        assert_eq!(free.max_todos, Some(3));
        assert_eq!(free.max_timer_sessions, Some(10));
        assert!(free.can_sync);
        assert!(free.can_export);

        let premium = FeatureLimitPolicy::limits(Some(IdentityKind::Authenticated), true);
        assert_eq!(premium.max_habits, None);
        assert_eq!(premium.max_todos, None);
        assert_eq!(premium.max_timer_sessions, None);
        assert!(premium.can_sync);

        let fallback = FeatureLimitPolicy::limits(None, false);
        assert_eq!(fallback.max_habits, Some(1));
        assert_eq!(fallback.max_todos, Some(1));
        assert_eq!(fallback.max_timer_sessions, Some(5));
        assert!(!fallback.can_sync);
        assert!(!fallback.can_export);
    }

    #[test]
    fn test_premium_without_account_is_fallback() {
        assert_eq!(Tier::resolve(Some(IdentityKind::Anonymous), true), Tier::Fallback);
        assert_eq!(
            FeatureLimitPolicy::limits(Some(IdentityKind::Anonymous), true),
            FeatureLimits::for_tier(Tier::Fallback)
        );
    }

    #[test]
    fn test_fourth_todo_rejected_at_cap() {
        let free = FeatureLimitPolicy::limits(Some(IdentityKind::Authenticated), false);

        for count in 0..3 {
            tokio_test::assert_ok!(FeatureLimitPolicy::check(&free, Resource::Todos, count));
        }
        let err = tokio_test::assert_err!(FeatureLimitPolicy::check(&free, Resource::Todos, 3));
        assert_eq!(
            err,
            LimitError::QuotaExceeded {
                resource: Resource::Todos,
                limit: 3
            }
        );
        assert!(err.to_string().contains("at most 3 todos"));
    }

    #[test]
    fn test_limits_serialize_camel_case() {
        let json = serde_json::to_value(FeatureLimits::for_tier(Tier::Premium)).unwrap();
        assert_eq!(json["maxHabits"], serde_json::Value::Null);
        assert_eq!(json["canSync"], true);
    }
}
