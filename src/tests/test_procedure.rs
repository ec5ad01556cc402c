use crate::{
    AdmissionRequest, LocalWindowStore, Mode, RateLimiter, RateLimiterOptions, TierOptions,
    storage_key,
};

fn single() -> RateLimiter<LocalWindowStore> {
    RateLimiter::new(
        RateLimiterOptions::single(
            "MyNamespace",
            TierOptions::new(10_000, 5)
                .min_difference_ms(500)
                .buckets(10_000),
        ),
        LocalWindowStore::new(),
    )
    .unwrap()
}

fn multi_tiers() -> Vec<TierOptions> {
    vec![
        TierOptions::new(10_000, 5).min_difference_ms(500),
        TierOptions::new(100_000, 25),
    ]
}

fn wire(limiter: &RateLimiter<LocalWindowStore>, request: impl Into<AdmissionRequest>) -> Vec<String> {
    limiter.prepare(&request.into(), 3_000).unwrap().wire_args()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn storage_key_omits_empty_segments() {
    assert_eq!(storage_key("ns", "", ""), "ns");
    assert_eq!(storage_key("ns", "1", ""), "ns:1");
    assert_eq!(storage_key("ns", "", "user"), "ns:user");
    assert_eq!(storage_key("ns", "a", "user"), "ns:a:user");
    assert_eq!(storage_key("", "", "user"), "user");
    assert_eq!(storage_key("", "", ""), "");
}

#[test]
fn single_tier_without_subject_or_increment() {
    assert_eq!(
        wire(&single(), ()),
        strings(&["1", "MyNamespace", "1", "1", "3000", "500000", "5", "1000", "10000"])
    );
}

#[test]
fn single_tier_with_increment() {
    assert_eq!(
        wire(&single(), 3u64),
        strings(&["1", "MyNamespace", "1", "3", "3000", "500000", "5", "1000", "10000"])
    );
}

#[test]
fn single_tier_with_subject_and_increment() {
    assert_eq!(
        wire(&single(), ("action", 3u64)),
        strings(&["1", "MyNamespace:action", "1", "3", "3000", "500000", "5", "1000", "10000"])
    );
}

#[test]
fn positional_tiers() {
    let limiter = RateLimiter::new(
        RateLimiterOptions::list("MyNamespace", multi_tiers()),
        LocalWindowStore::new(),
    )
    .unwrap();

    assert_eq!(
        wire(&limiter, ()),
        strings(&[
            "2", "MyNamespace", "MyNamespace:1", "1", "1", "3000", "500000", "0", "5", "25",
            "1000", "10000", "10000", "10000",
        ])
    );

    assert_eq!(
        wire(&limiter, ("action", 3u64)),
        strings(&[
            "2", "MyNamespace:action", "MyNamespace:1:action", "1", "3", "3000", "500000", "0",
            "5", "25", "1000", "10000", "10000", "10000",
        ])
    );
}

#[test]
fn named_tiers() {
    let tiers = multi_tiers();
    let limiter = RateLimiter::new(
        RateLimiterOptions::named(
            "MyNamespace",
            [("a", tiers[0].clone()), ("b", tiers[1].clone())],
        ),
        LocalWindowStore::new(),
    )
    .unwrap();

    assert_eq!(
        wire(&limiter, ()),
        strings(&[
            "2", "MyNamespace:a", "MyNamespace:b", "1", "1", "3000", "500000", "0", "5", "25",
            "1000", "10000", "10000", "10000",
        ])
    );

    assert_eq!(
        wire(&limiter, ("action", 3u64)),
        strings(&[
            "2", "MyNamespace:a:action", "MyNamespace:b:action", "1", "3", "3000", "500000", "0",
            "5", "25", "1000", "10000", "10000", "10000",
        ])
    );
}

#[test]
fn mode_ordinal_is_forwarded() {
    for mode in [Mode::Uniform, Mode::Binary, Mode::Nary] {
        let limiter = RateLimiter::new(
            RateLimiterOptions::list("ns", multi_tiers()).mode(mode),
            LocalWindowStore::new(),
        )
        .unwrap();

        let evaluation = limiter.prepare(&AdmissionRequest::default(), 1).unwrap();
        assert_eq!(evaluation.scalar_args()[0], u64::from(mode.ordinal()));
        assert_eq!(evaluation.mode(), mode);
        assert_eq!(evaluation.keys(), limiter.keys_for("").as_slice());
    }
}
