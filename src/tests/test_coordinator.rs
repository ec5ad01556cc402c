use crate::{Mode, Tier, TierOptions, TierVerdict, WindowState, coordinator};

fn verdict(allowed: bool, remaining: u64, wait_micros: u64) -> TierVerdict {
    TierVerdict {
        allowed,
        used: 0,
        remaining,
        wait_micros,
    }
}

#[test]
fn first_tier_is_always_charged_the_full_increment() {
    for mode in [Mode::Uniform, Mode::Binary, Mode::Nary] {
        assert_eq!(mode.charge(7, 0), 7, "{mode}");
    }
}

#[test]
fn later_tiers_are_charged_per_mode() {
    assert_eq!(Mode::Uniform.charge(5, 1), 5);
    assert_eq!(Mode::Uniform.charge(5, 4), 5);

    assert_eq!(Mode::Binary.charge(5, 1), 1);
    assert_eq!(Mode::Binary.charge(5, 4), 1);

    assert_eq!(Mode::Nary.charge(5, 1), 3);
    assert_eq!(Mode::Nary.charge(5, 2), 2);
    assert_eq!(Mode::Nary.charge(5, 4), 1);
    assert_eq!(Mode::Nary.charge(1, 3), 1);
}

#[test]
fn combine_allows_only_when_every_tier_allows() {
    let result = Mode::Uniform.combine(3, &[verdict(true, 7, 0), verdict(true, 4, 0)]);
    assert!(result.is_allowed());
    assert_eq!(result.actions_recorded, 3);
    assert_eq!(result.actions_remaining, 1);
    assert_eq!(result.wait_micros, 0);

    let result = Mode::Binary.combine(
        3,
        &[verdict(false, 0, 200), verdict(true, 7, 0), verdict(false, 2, 900)],
    );
    assert!(!result.is_allowed());
    assert_eq!(result.actions_recorded, 0);
    assert_eq!(result.actions_remaining, 0);
    assert_eq!(result.wait_micros, 900);
}

#[test]
fn combine_reduces_remaining_by_the_recorded_charge() {
    let verdicts = [verdict(true, 10, 0), verdict(true, 4, 0)];

    assert_eq!(Mode::Uniform.combine(3, &verdicts).actions_remaining, 1);
    assert_eq!(Mode::Binary.combine(3, &verdicts).actions_remaining, 3);
    assert_eq!(Mode::Nary.combine(3, &verdicts).actions_remaining, 2);
}

#[test]
fn combine_reports_untouched_capacity_when_denied() {
    // The second tier admitted on its own, but nothing is recorded.
    let verdicts = [verdict(false, 4, 1_000), verdict(true, 5, 0)];

    for mode in [Mode::Uniform, Mode::Binary, Mode::Nary] {
        let result = mode.combine(3, &verdicts);
        assert!(!result.is_allowed());
        assert_eq!(result.actions_remaining, 4, "{mode}");
    }
}

#[test]
fn later_tier_judges_the_full_increment() {
    let tiers = [
        Tier::new("", &TierOptions::new(10_000, 10)).unwrap(),
        Tier::new("1", &TierOptions::new(10_000, 2)).unwrap(),
    ];

    for mode in [Mode::Uniform, Mode::Binary, Mode::Nary] {
        let mut first = WindowState::new();
        let mut second = WindowState::new();

        let result = coordinator::admit(mode, &tiers, &mut [&mut first, &mut second], 3, 3_000);

        assert!(!result.is_allowed(), "{mode}");
        assert_eq!(result.actions_remaining, 2, "{mode}");
        assert_eq!(result.wait_micros, 10_000_000, "{mode}");
        assert_eq!(first.last_action_micros(), None, "{mode}");
    }
}

#[test]
fn admit_commits_to_all_tiers_or_none() {
    let tiers = [
        Tier::new("", &TierOptions::new(1_000, 10).buckets(10)).unwrap(),
        Tier::new("1", &TierOptions::new(10_000, 2).buckets(10)).unwrap(),
    ];
    let mut first = WindowState::new();
    let mut second = WindowState::new();

    // Saturate the second tier only.
    second.commit(&tiers[1], 2, 0);

    let result = coordinator::admit(
        Mode::Uniform,
        &tiers,
        &mut [&mut first, &mut second],
        1,
        10,
    );

    assert!(!result.is_allowed());
    assert_eq!(first.used(&tiers[0], 10), 0, "denied request must not touch the first tier");
    assert_eq!(second.used(&tiers[1], 10), 2);

    let result = coordinator::admit(
        Mode::Uniform,
        &tiers,
        &mut [&mut first, &mut second],
        1,
        10_000_000,
    );

    assert!(result.is_allowed());
    assert_eq!(first.used(&tiers[0], 10_000_000), 1);
    assert_eq!(second.used(&tiers[1], 10_000_000), 1);
    assert_eq!(first.last_action_micros(), Some(10_000_000));
    assert_eq!(second.last_action_micros(), Some(10_000_000));
}

#[test]
fn admit_commits_the_per_tier_charge() {
    let tiers = [
        Tier::new("", &TierOptions::new(1_000, 100).buckets(10)).unwrap(),
        Tier::new("1", &TierOptions::new(1_000, 100).buckets(10)).unwrap(),
        Tier::new("2", &TierOptions::new(1_000, 100).buckets(10)).unwrap(),
    ];

    for (mode, expected) in [
        (Mode::Uniform, [6, 6, 6]),
        (Mode::Binary, [6, 1, 1]),
        (Mode::Nary, [6, 3, 2]),
    ] {
        let mut a = WindowState::new();
        let mut b = WindowState::new();
        let mut c = WindowState::new();

        let result = coordinator::admit(mode, &tiers, &mut [&mut a, &mut b, &mut c], 6, 0);
        assert_eq!(result.actions_recorded, 6, "{mode}");

        let used = [a.used(&tiers[0], 0), b.used(&tiers[1], 0), c.used(&tiers[2], 0)];
        assert_eq!(used, expected, "{mode}");
    }
}
