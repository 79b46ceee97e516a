use super::*;

#[test]
fn fake_clock_advances_monotonic_and_wall_clock_together() {
    let clock = FakeClock::new();
    let start_instant = clock.now();
    let start_utc = clock.now_utc();

    clock.advance(Duration::from_secs(30));

    assert_eq!(clock.now() - start_instant, Duration::from_secs(30));
    assert_eq!(clock.now_utc() - start_utc, chrono::Duration::seconds(30));
}

#[test]
fn set_utc_only_moves_wall_clock() {
    let clock = FakeClock::new();
    let before = clock.now();
    let later = Utc::now();

    clock.set_utc(later);

    assert_eq!(clock.now_utc(), later);
    assert_eq!(clock.now(), before);
}
