/// Streak engine properties over many generated log histories
use chrono::{Duration, NaiveDate};
use habit_sync::*;

#[cfg(test)]
mod streak_property_tests {
    use super::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
    }

    /// Small deterministic generator so every run sees the same histories
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }
    }

    /// Sorted distinct dates with gaps of 1 to 4 days
    fn history(rng: &mut Lcg, len: usize) -> Vec<NaiveDate> {
        let mut offset = 0;
        let mut dates = Vec::with_capacity(len);
        for _ in 0..len {
            dates.push(day(offset));
            offset += 1 + rng.next(4) as i64;
        }
        dates
    }

    #[test]
    fn test_gapless_history_counts_every_day() {
        for len in 1..40 {
            let dates: Vec<NaiveDate> = (0..len).map(day).collect();
            let last = *dates.last().unwrap();

            let state = StreakEngine::recompute(&dates, last, 0);
            assert_eq!(state.current_streak, len as u32);
            assert_eq!(state.longest_streak, len as u32);
        }
    }

    #[test]
    fn test_grace_day_keeps_streak_when_evaluated_next_day() {
        let mut rng = Lcg(7);
        for len in 1..30 {
            let dates = history(&mut rng, len);
            let last = *dates.last().unwrap();

            let on_day = StreakEngine::recompute(&dates, last, 0);
            let next_day = StreakEngine::recompute(&dates, last + Duration::days(1), 0);
            let grace_day = StreakEngine::recompute(&dates, last + Duration::days(2), 0);
            let lapsed = StreakEngine::recompute(&dates, last + Duration::days(3), 0);

            assert_eq!(next_day.current_streak, on_day.current_streak);
            assert_eq!(grace_day.current_streak, on_day.current_streak);
            assert_eq!(lapsed.current_streak, 0);
            assert_eq!(lapsed.longest_streak, on_day.longest_streak);
        }
    }

    #[test]
    fn test_log_after_long_gap_starts_over() {
        let mut rng = Lcg(11);
        for len in 1..30 {
            let dates = history(&mut rng, len);
            let state = StreakEngine::recompute_at_last_log(&dates, 0);
            let last = state.last_check_date.unwrap();

            for gap in 3..8 {
                match StreakEngine::apply_log(&state, last + Duration::days(gap)) {
                    LogEffect::Applied(next) => {
                        assert_eq!(next.current_streak, 1);
                        assert_eq!(next.longest_streak, state.longest_streak);
                    }
                    other => panic!("expected applied log, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_incremental_matches_recompute() {
        let mut rng = Lcg(42);
        for _ in 0..200 {
            let len = 1 + rng.next(25) as usize;
            let dates = history(&mut rng, len);

            let mut state = StreakState::default();
            for (i, date) in dates.iter().enumerate() {
                state = match StreakEngine::apply_log(&state, *date) {
                    LogEffect::Applied(next) => next,
                    other => panic!("expected applied log, got {:?}", other),
                };
                let canonical = StreakEngine::recompute_at_last_log(&dates[..=i], 0);
                assert_eq!(state, canonical);
            }
        }
    }

    #[test]
    fn test_longest_never_decreases() {
        let mut rng = Lcg(3);
        let dates = history(&mut rng, 60);
        let mut longest = 0;
        let mut logged: Vec<NaiveDate> = Vec::new();

        // Interleave appends with removals of random logged days
        for date in dates {
            logged.push(date);
            let state = StreakEngine::recompute_at_last_log(&logged, longest);
            assert!(state.longest_streak >= longest);
            longest = state.longest_streak;

            if rng.next(3) == 0 && logged.len() > 1 {
                let idx = rng.next(logged.len() as u64) as usize;
                logged.remove(idx);
                let state = StreakEngine::recompute_at_last_log(&logged, longest);
                assert!(state.longest_streak >= longest);
                longest = state.longest_streak;
            }
        }
    }

    #[test]
    fn test_unlog_then_relog_restores_state() {
        let mut rng = Lcg(99);
        for len in 2..30 {
            let dates = history(&mut rng, len);
            let before = StreakEngine::recompute_at_last_log(&dates, 0);

            let last = *dates.last().unwrap();
            let remaining = &dates[..dates.len() - 1];
            let unlogged = StreakEngine::recompute_at_last_log(remaining, before.longest_streak);

            let relogged = match StreakEngine::apply_log(&unlogged, last) {
                LogEffect::Applied(state) => state,
                other => panic!("expected applied log, got {:?}", other),
            };

            assert_eq!(relogged.current_streak, before.current_streak);
            assert_eq!(relogged.longest_streak, before.longest_streak);
            assert_eq!(relogged.last_check_date, before.last_check_date);
        }
    }

    #[test]
    fn test_documented_scenario() {
        let logs = [day(0), day(1), day(2)];
        let state = StreakEngine::recompute_at_last_log(&logs, 0);
        assert_eq!((state.current_streak, state.longest_streak), (3, 3));

        let state = match StreakEngine::apply_log(&state, day(4)) {
            LogEffect::Applied(state) => state,
            other => panic!("expected applied log, got {:?}", other),
        };
        assert_eq!(state.current_streak, 4);
        assert_eq!(state.missed_days, 0);

        let state = match StreakEngine::apply_log(&state, day(7)) {
            LogEffect::Applied(state) => state,
            other => panic!("expected applied log, got {:?}", other),
        };
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.longest_streak, 4);
    }

    #[test]
    fn test_status_walks_through_the_grace_day() {
        let state = StreakEngine::recompute_at_last_log(&[day(0), day(1)], 0);

        assert_eq!(StreakEngine::status(&state, day(1)), StreakStatus::CompletedToday);
        assert_eq!(StreakEngine::status(&state, day(2)), StreakStatus::Pending);
        assert_eq!(StreakEngine::status(&state, day(3)), StreakStatus::AtRisk);
        assert!(state.is_at_risk(day(3)));
        assert_eq!(StreakEngine::status(&state, day(4)), StreakStatus::Lapsed);

        assert_eq!(StreakEngine::effective_streak(&state, day(3)), 2);
        assert_eq!(StreakEngine::effective_streak(&state, day(4)), 0);
        assert_eq!(state.evaluated_at(day(4)).missed_days, 2);
        assert_eq!(
            StreakEngine::status(&StreakState::default(), day(0)),
            StreakStatus::NotStarted
        );
    }
}
