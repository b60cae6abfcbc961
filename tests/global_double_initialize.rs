use std::time::Duration;

use surface_cache::global;

#[test]
#[should_panic(expected = "already been initialized")]
fn initializing_twice_is_rejected() {
    global::initialize(1_000, Duration::from_secs(60));
    global::initialize(1_000, Duration::from_secs(60));
}
